use crate::api::{error::ApiError, oauth::ProviderName};
use axum::response::{IntoResponse, Response};
use http::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown provider {0}")]
    UnknownProvider(String),
    #[error("provider {0} is not configured")]
    ProviderNotConfigured(ProviderName),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("oauth token {0}")]
    OauthToken(String),
    #[error("fetching {0} user {1}")]
    FetchUser(ProviderName, String),
    #[error("parsing {0} user {1}")]
    ParseUser(ProviderName, String),
    #[error("{0} account has no email address")]
    MissingEmail(ProviderName),
    #[error("json {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing csrf cookie")]
    MissingCSRFCookie,
    #[error("the CSRF token did not match")]
    CSRFTokenMismatch,
    #[error("access denied: {0}")]
    AccessDenied(String),
}

impl Error {
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownProvider(_) | Self::ProviderNotConfigured(_) => {
                "Unknown provider".to_string()
            }
            Self::InvalidUrl(_) => "Invalid provider URL".to_string(),
            Self::OauthToken(_) => "Error fetching OAuth token".to_string(),
            Self::FetchUser(provider, _) => {
                format!("An error occurred while fetching the {provider} user")
            }
            Self::ParseUser(provider, _) => {
                format!("An error occurred while parsing the {provider} user")
            }
            Self::MissingEmail(provider) => {
                format!("Your {provider} account does not have a verified email address")
            }
            Self::Json(_) => "An error occurred while processing JSON".to_string(),
            Self::MissingCSRFCookie => "Missing CSRF cookie".to_string(),
            Self::CSRFTokenMismatch => "The CSRF token did not match".to_string(),
            Self::AccessDenied(_) => "Login was cancelled".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UnknownProvider(_) | Error::ProviderNotConfigured(_) => StatusCode::NOT_FOUND,

            Error::InvalidUrl(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,

            Error::FetchUser(..) | Error::ParseUser(..) => StatusCode::BAD_GATEWAY,

            Error::MissingEmail(_) => StatusCode::UNPROCESSABLE_ENTITY,

            Error::OauthToken(_)
            | Error::MissingCSRFCookie
            | Error::CSRFTokenMismatch
            | Error::AccessDenied(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
