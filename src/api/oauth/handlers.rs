//! Request handlers for the provider OAuth flow.
//!
//! `begin_auth` sends the browser to the provider, `auth_callback` receives it
//! back, turns the authorization code into a user and stores the session cookies.
use crate::api::{
    ApiState,
    auth::{SecureCookieStorage, Session, login},
    oauth::{CSRF_COOKIE_NAME, Error, OAuthService, ProviderName},
};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use cookie::{Cookie, SameSite};
use oauth2::{AuthorizationCode, CsrfToken, TokenResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

/// Handles `GET /auth/{provider}`.
/// Generates the authorization URL and CSRF token, sets the CSRF token as a cookie,
/// and redirects the user to the authorization URL.
///
/// # Errors
///
/// Returns an `Error` if the provider is unknown or not configured.
pub(in crate::api) async fn begin_auth(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    cookie_storage: SecureCookieStorage,
) -> Result<Response, Error> {
    let provider: ProviderName = provider.parse()?;

    match provider {
        ProviderName::Github => oauth_login(state.providers.github()?, cookie_storage),
        ProviderName::Discord => oauth_login(state.providers.discord()?, cookie_storage),
    }
}

fn oauth_login<S: OAuthService>(
    service: &S,
    cookie_storage: SecureCookieStorage,
) -> Result<Response, Error> {
    // Generate the authorization URL and CSRF token
    let (auth_url, csrf_token) = service
        .oauth_client()
        .authorize_url(CsrfToken::new_random)
        .add_scopes(S::scopes())
        .url();

    let csrf_cookie_value = serde_json::to_string(&CsrfState {
        provider: S::PROVIDER,
        token: csrf_token,
    })?;

    let mut csrf_cookie = Cookie::new(CSRF_COOKIE_NAME, csrf_cookie_value);
    csrf_cookie.set_http_only(true);
    csrf_cookie.set_same_site(SameSite::Lax);
    csrf_cookie.set_max_age(cookie::time::Duration::minutes(5));
    csrf_cookie.set_path("/");

    let cookie_storage = cookie_storage.add(csrf_cookie);

    trace!(provider = %S::PROVIDER, "redirecting to provider");

    Ok((cookie_storage, Redirect::to(auth_url.as_str())).into_response())
}

/// Contents of the CSRF cookie, binding the state to the provider it was issued for
#[derive(Debug, Serialize, Deserialize)]
struct CsrfState {
    provider: ProviderName,
    token: CsrfToken,
}

/// Represents the request parameters for the authorization request.
///
/// Providers leave out `code` and send `error` instead when the user
/// declines the login.
#[derive(Debug, Deserialize)]
pub(in crate::api) struct AuthRequest {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Handles `GET /auth/{provider}/callback`.
/// Validates the CSRF token, exchanges the authorization code for an access token,
/// fetches the user and sets the `user` and `provider` session cookies.
///
/// # Returns
///
/// A temporary redirect to `/whoamI`, with the session cookies set.
///
/// # Errors
///
/// Returns an `Error` if the CSRF token is missing or does not match, the code
/// cannot be exchanged or the user cannot be fetched. No session cookies are set then.
pub(in crate::api) async fn auth_callback(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthRequest>,
    cookie_storage: SecureCookieStorage,
) -> Result<Response, Error> {
    let provider: ProviderName = provider.parse()?;

    match provider {
        ProviderName::Github => {
            authorize(state.providers.github()?, &state, query, cookie_storage).await
        }
        ProviderName::Discord => {
            authorize(state.providers.discord()?, &state, query, cookie_storage).await
        }
    }
}

async fn authorize<S: OAuthService>(
    service: &S,
    state: &ApiState,
    query: AuthRequest,
    cookie_storage: SecureCookieStorage,
) -> Result<Response, Error> {
    if let Some(reason) = query.error {
        debug!(provider = %S::PROVIDER, %reason, "provider did not grant access");
        return Err(Error::AccessDenied(reason));
    }

    // Get the CSRF token cookie from the cookie jar
    let mut csrf_cookie = cookie_storage
        .get(CSRF_COOKIE_NAME)
        .ok_or(Error::MissingCSRFCookie)?;
    csrf_cookie.set_path("/");

    let csrf_state: CsrfState = serde_json::from_str(csrf_cookie.value())?;
    let state_matches = constant_time_eq::constant_time_eq(
        query.state.as_deref().unwrap_or_default().as_bytes(),
        csrf_state.token.secret().as_bytes(),
    );

    if csrf_state.provider != S::PROVIDER || !state_matches {
        return Err(Error::CSRFTokenMismatch);
    }

    let code = query
        .code
        .ok_or_else(|| Error::AccessDenied("missing authorization code".to_string()))?;

    // Exchange the authorization code for an access token
    let token = service
        .oauth_client()
        .exchange_code(AuthorizationCode::new(code))
        .request_async(&state.http_client)
        .await
        .map_err(|e| {
            error!(
                provider = %S::PROVIDER,
                "OAuth flow failed. Cannot exchange authorization code: {e:?}"
            );
            Error::OauthToken(e.to_string())
        })?;

    let user = service
        .fetch_user(&state.http_client, token.access_token())
        .await?;
    debug!(
        provider = %S::PROVIDER,
        user_id = %user.user_id,
        nickname = %user.nickname,
        "user logged in"
    );

    let session = Session {
        user: S::session_identifier(user)?,
        provider: S::PROVIDER,
    };

    // An earlier session is always replaced
    let cookie_storage = login(&session, cookie_storage, state.config.cookie_domain.as_deref());
    let cookie_storage = cookie_storage.remove(csrf_cookie);

    Ok((cookie_storage, Redirect::temporary("/whoamI")).into_response())
}
