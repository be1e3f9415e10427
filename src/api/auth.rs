use crate::api::{ApiState, error::ApiError, oauth::ProviderName};
use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::{IntoResponse, IntoResponseParts, Redirect, Response, ResponseParts},
};
use axum_extra::extract::PrivateCookieJar;
use cookie::Cookie;
use std::convert::Infallible;
use tracing::{debug, trace};

pub static USER_COOKIE_NAME: &str = "user";
pub static PROVIDER_COOKIE_NAME: &str = "provider";

/// Cookies are encrypted and authenticated with the configured session key,
/// so clients can neither read nor forge them.
pub(super) struct SecureCookieStorage {
    jar: PrivateCookieJar,
}

impl FromRequestParts<ApiState> for SecureCookieStorage {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.config.session_key.clone());

        Ok(Self { jar })
    }
}

impl IntoResponseParts for SecureCookieStorage {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.jar.into_response_parts(res)
    }
}

impl SecureCookieStorage {
    pub fn remove<C>(self, cookie: C) -> SecureCookieStorage
    where
        C: Into<Cookie<'static>>,
    {
        Self {
            jar: self.jar.remove(cookie),
        }
    }

    pub fn add<C>(self, cookie: C) -> SecureCookieStorage
    where
        C: Into<Cookie<'static>>,
    {
        Self {
            jar: self.jar.add(cookie),
        }
    }

    pub fn get(&self, name: &str) -> Option<Cookie<'static>> {
        self.jar.get(name)
    }
}

/// The logged-in user: a provider specific identifier (GitHub user id, Discord email)
/// and the provider it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub provider: ProviderName,
}

impl FromRequestParts<ApiState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, ApiError> {
        let Ok(cookie_storage) = SecureCookieStorage::from_request_parts(parts, state).await;

        let Some(user) = cookie_storage
            .get(USER_COOKIE_NAME)
            .map(|cookie| cookie.value().to_owned())
            .filter(|user| !user.is_empty())
        else {
            trace!("no valid user cookie");
            return Err(ApiError::NotLoggedIn);
        };

        let provider = cookie_storage
            .get(PROVIDER_COOKIE_NAME)
            .ok_or(ApiError::NotLoggedIn)?
            .value()
            .parse::<ProviderName>()
            .map_err(|e| {
                debug!("invalid provider cookie: {e}");
                ApiError::NotLoggedIn
            })?;

        Ok(Session { user, provider })
    }
}

fn session_cookie(name: &'static str, value: String, domain: Option<&str>) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_max_age(cookie::time::Duration::hours(1));
    if let Some(domain) = domain {
        cookie.set_domain(domain.to_owned());
    }

    cookie
}

/// Store `session` in the `user` and `provider` cookies, replacing any earlier session
pub(super) fn login(
    session: &Session,
    cookie_storage: SecureCookieStorage,
    domain: Option<&str>,
) -> SecureCookieStorage {
    cookie_storage
        .add(session_cookie(
            USER_COOKIE_NAME,
            session.user.clone(),
            domain,
        ))
        .add(session_cookie(
            PROVIDER_COOKIE_NAME,
            session.provider.to_string(),
            domain,
        ))
}

/// Handles `GET /logout` by removing the session cookies.
pub(super) async fn logout(
    State(state): State<ApiState>,
    cookie_storage: SecureCookieStorage,
) -> Response {
    let domain = state.config.cookie_domain.as_deref();
    let cookie_storage = cookie_storage
        .remove(session_cookie(USER_COOKIE_NAME, String::new(), domain))
        .remove(session_cookie(PROVIDER_COOKIE_NAME, String::new(), domain));

    (cookie_storage, Redirect::to("/")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{StubProvider, TestServer, session_cookie_header, set_cookies};
    use http::StatusCode;

    #[tokio::test]
    async fn logout_clears_session() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);
        let session = session_cookie_header(&server.key, "583231", "github");

        let response = server.get("/logout", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        for name in [USER_COOKIE_NAME, PROVIDER_COOKIE_NAME] {
            let cookie = cookies.iter().find(|c| c.name() == name).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.path(), Some("/"));
            assert_eq!(cookie.max_age(), Some(cookie::time::Duration::ZERO));
        }
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(USER_COOKIE_NAME, "a@b.com".to_string(), Some("localhost"));

        assert_eq!(cookie.value(), "a@b.com");
        assert_eq!(cookie.domain(), Some("localhost"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), None);
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(3600)));
    }
}
