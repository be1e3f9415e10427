use crate::api::oauth;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("OAuth error: {0}")]
    OAuth(#[from] oauth::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response<axum::body::Body> {
        error!("API server error: {self} {self:?}");

        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::NotLoggedIn => (StatusCode::UNAUTHORIZED, "Not logged in".to_string()),
            ApiError::OAuth(err) => (err.status_code(), err.user_message()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::oauth::ProviderName, test::deserialize_body};
    use serde_json::Value;

    async fn render(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        (response.status(), deserialize_body(response.into_body()).await)
    }

    #[tokio::test]
    async fn status_per_error_kind() {
        let cases = [
            (ApiError::NotFound, StatusCode::NOT_FOUND),
            (ApiError::NotLoggedIn, StatusCode::UNAUTHORIZED),
            (
                oauth::Error::UnknownProvider("gitlab".to_string()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                oauth::Error::CSRFTokenMismatch.into(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                oauth::Error::AccessDenied("access_denied".to_string()).into(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                oauth::Error::FetchUser(ProviderName::Github, "timeout".to_string()).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                oauth::Error::MissingEmail(ProviderName::Discord).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (error, expected) in cases {
            let (status, _) = render(error).await;
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn details_stay_server_side() {
        let (_, body) =
            render(oauth::Error::FetchUser(ProviderName::Github, "dns error".to_string()).into())
                .await;

        assert_eq!(
            body,
            serde_json::json!({ "error": "An error occurred while fetching the github user" })
        );
    }
}
