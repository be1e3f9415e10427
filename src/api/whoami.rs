use crate::api::{
    ApiState,
    auth::Session,
    error::ApiError,
    oauth::{GithubProfile, ProviderName},
};
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WhoamiResponse {
    Github {
        cookie: String,
        user: GithubProfile,
    },
    Discord {
        #[serde(rename = "user-email")]
        user_email: String,
    },
}

/// Handles `GET /whoamI`.
///
/// GitHub sessions are resolved to the public profile of the account,
/// Discord sessions only carry the email address and are answered directly.
pub async fn whoami(State(state): State<ApiState>, session: Session) -> Result<Response, ApiError> {
    trace!(provider = %session.provider, "whoami");

    let response = match session.provider {
        ProviderName::Github => {
            let profile = state
                .providers
                .github()?
                .public_profile(&state.http_client, &session.user)
                .await?
                .ok_or(ApiError::NotFound)?;

            WhoamiResponse::Github {
                cookie: session.user,
                user: profile,
            }
        }
        ProviderName::Discord => WhoamiResponse::Discord {
            user_email: session.user,
        },
    };

    Ok(Json(response).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{StubProvider, TestServer, deserialize_body, session_cookie_header};
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn github_profile() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);
        let session = session_cookie_header(&server.key, "octocat", "github");

        let response = server.get("/whoamI", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = deserialize_body(response.into_body()).await;
        assert_eq!(
            body,
            json!({
                "cookie": "octocat",
                "user": {
                    "UserName": "octocat",
                    "ID": 1,
                    "Public_Repos": 8,
                    "Followers": 4000,
                },
            })
        );
        assert_eq!(stub.api_requests(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn github_unknown_user_is_not_found() {
        // an upstream failure is reported with its own status, never as a 200
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);
        let session = session_cookie_header(&server.key, "nobody", "github");

        let response = server.get("/whoamI", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: Value = deserialize_body(response.into_body()).await;
        assert_eq!(body, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    #[traced_test]
    async fn github_upstream_failure_is_bad_gateway() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);
        let session = session_cookie_header(&server.key, "broken", "github");

        let response = server.get("/whoamI", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let session = session_cookie_header(&server.key, "garbled", "github");
        let response = server.get("/whoamI", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    #[traced_test]
    async fn discord_email_without_lookup() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);
        let session = session_cookie_header(&server.key, "e@mail.com", "discord");

        let response = server.get("/whoamI", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: WhoamiResponse = deserialize_body(response.into_body()).await;
        assert_eq!(
            body,
            WhoamiResponse::Discord {
                user_email: "e@mail.com".to_string()
            }
        );
        assert_eq!(stub.api_requests(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_cookies_are_unauthorized() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);

        let response = server.get("/whoamI", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body: Value = deserialize_body(response.into_body()).await;
        assert_eq!(body, json!({ "error": "Not logged in" }));
        assert_eq!(stub.api_requests(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn forged_cookies_are_ignored() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);

        let response = server
            .get("/whoamI", Some("user=octocat; provider=github"))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(stub.api_requests(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_provider_cookie_is_unauthorized() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);
        let session = session_cookie_header(&server.key, "octocat", "gitlab");

        let response = server.get("/whoamI", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
