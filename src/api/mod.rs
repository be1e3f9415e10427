use crate::config::AppConfig;
use axum::{
    Json, Router,
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
};
use reqwest::redirect::Policy;
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

mod auth;
mod error;
pub mod oauth;
mod whoami;

pub use auth::{PROVIDER_COOKIE_NAME, Session, USER_COOKIE_NAME};
pub use error::ApiError;
pub use whoami::WhoamiResponse;

pub(crate) static USER_AGENT_VALUE: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ApiServerError {
    #[error("failed to bind to address: {0}")]
    Bind(std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("invalid provider configuration: {0}")]
    Provider(#[from] oauth::Error),
}

/// Shared, read-only state of all request handlers
#[derive(Clone)]
pub struct ApiState {
    config: Arc<AppConfig>,
    providers: oauth::Providers,
    http_client: reqwest::Client,
}

impl ApiState {
    pub fn new(config: AppConfig) -> Result<Self, ApiServerError> {
        // never follow redirects from providers, see
        // https://docs.rs/oauth2/latest/oauth2/#security-warning
        let http_client = reqwest::Client::builder()
            .use_rustls_tls()
            .redirect(Policy::none())
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            providers: oauth::Providers::new(&config)?,
            config: Arc::new(config),
            http_client,
        })
    }
}

pub fn router(state: ApiState) -> Router {
    let request_timeout = state.config.request_timeout();

    Router::new()
        .route("/", get(index))
        .route("/healthy", get(healthy))
        .route("/auth/{provider}", get(oauth::begin_auth))
        .route("/auth/{provider}/callback", get(oauth::auth_callback))
        .route("/whoamI", get(whoami::whoami))
        .route("/logout", get(auth::logout))
        .layer((
            TraceLayer::new_for_http(),
            TimeoutLayer::new(request_timeout),
        ))
        .with_state(state)
}

pub struct ApiServer {
    router: Router,
    socket: SocketAddr,
    shutdown: CancellationToken,
}

impl ApiServer {
    pub fn new(config: AppConfig, shutdown: CancellationToken) -> Result<ApiServer, ApiServerError> {
        let socket = config.listen_addr;
        let router = router(ApiState::new(config)?);

        Ok(ApiServer {
            router,
            socket,
            shutdown,
        })
    }

    pub async fn serve(self) -> Result<(), ApiServerError> {
        let listener = TcpListener::bind(self.socket)
            .await
            .map_err(ApiServerError::Bind)?;

        info!("API server listening on {}", self.socket);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(self.shutdown.cancelled_owned())
            .await
            .map_err(ApiServerError::Serve)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async {
            let token = self.shutdown.clone();
            if let Err(e) = self.serve().await {
                error!("server error: {:?}", e);
                token.cancel();
                error!("shutting down API server")
            }
        })
    }
}

async fn index(State(state): State<ApiState>) -> impl IntoResponse {
    let links: String = state
        .providers
        .configured()
        .into_iter()
        .map(|provider| {
            format!("<li><a href=\"/auth/{provider}\">Sign in with {provider}</a></li>\n")
        })
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Who am I?</title></head>
<body>
<ul>
{links}</ul>
<p><a href="/whoamI">Who am I?</a> · <a href="/logout">Log out</a></p>
</body>
</html>
"#
    ))
}

#[derive(Debug, Serialize)]
struct HealthyResponse {
    healthy: bool,
    status: &'static str,
}

async fn healthy() -> Json<HealthyResponse> {
    Json(HealthyResponse {
        healthy: true,
        status: "OK",
    })
}

#[cfg(test)]
mod tests {
    use crate::test::{StubProvider, TestServer, deserialize_body};
    use http::StatusCode;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn healthy() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::new(&stub);

        let response = server.get("/healthy", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = deserialize_body(response.into_body()).await;
        assert_eq!(body, json!({ "healthy": true, "status": "OK" }));
    }

    #[tokio::test]
    async fn index_lists_configured_providers() {
        let stub = StubProvider::spawn().await;
        let server = TestServer::github_only(&stub);

        let response = server.get("/", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains(r#"href="/auth/github""#));
        assert!(!body.contains("/auth/discord"));
    }
}
