use axum_extra::extract::cookie::Key;
use base64ct::Encoding;
use std::{env, net::SocketAddr, time::Duration};
use thiserror::Error;
use tracing::warn;
use url::Url;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4000";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:4000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";

const DISCORD_AUTH_URL: &str = "https://discord.com/oauth2/authorize";
const DISCORD_TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
const DISCORD_API_URL: &str = "https://discord.com/api";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing variable from environment: {0}")]
    MissingEnvironmentVariable(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("no OAuth provider configured, set ClientID/CLIENT_SECRET or DISCORD/DISCORD_SECRET")]
    NoProvider,
}

/// Credentials and endpoints of a single OAuth provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Url,
    pub token_url: Url,
    /// Base of the provider REST API used for profile lookups
    pub api_url: Url,
}

/// Process-wide configuration, read once at startup and immutable afterwards.
#[derive(Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Base URL the browser uses to reach this server, callback URLs are derived from it
    pub public_url: Url,
    /// `Domain` attribute for the session cookies, host-only when `None`
    pub cookie_domain: Option<String>,
    pub session_key: Key,
    pub http_timeout: Duration,
    pub github: Option<ProviderConfig>,
    pub discord: Option<ProviderConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "LISTEN_ADDR",
                reason: e.to_string(),
            })?;

        let public_url = parse_url(
            "PUBLIC_URL",
            var("PUBLIC_URL").as_deref().unwrap_or(DEFAULT_PUBLIC_URL),
        )?;

        let session_key = match var("SESSION_KEY") {
            Some(encoded) => {
                let bytes = base64ct::Base64::decode_vec(encoded.trim()).map_err(|e| {
                    ConfigError::Invalid {
                        name: "SESSION_KEY",
                        reason: e.to_string(),
                    }
                })?;
                Key::try_from(bytes.as_slice()).map_err(|_| ConfigError::Invalid {
                    name: "SESSION_KEY",
                    reason: "key must be at least 64 bytes".to_string(),
                })?
            }
            None => {
                warn!("Did not find SESSION_KEY env var, sessions will not survive a restart");
                Key::generate()
            }
        };

        let http_timeout = match var("HTTP_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(secs.parse().map_err(
                |e: std::num::ParseIntError| ConfigError::Invalid {
                    name: "HTTP_TIMEOUT_SECS",
                    reason: e.to_string(),
                },
            )?),
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let github = provider_config(
            &var,
            ("ClientID", "CLIENT_SECRET"),
            ("GITHUB_AUTH_URL", GITHUB_AUTH_URL),
            ("GITHUB_TOKEN_URL", GITHUB_TOKEN_URL),
            ("GITHUB_API_URL", GITHUB_API_URL),
        )?;
        let discord = provider_config(
            &var,
            ("DISCORD", "DISCORD_SECRET"),
            ("DISCORD_AUTH_URL", DISCORD_AUTH_URL),
            ("DISCORD_TOKEN_URL", DISCORD_TOKEN_URL),
            ("DISCORD_API_URL", DISCORD_API_URL),
        )?;

        if github.is_none() && discord.is_none() {
            return Err(ConfigError::NoProvider);
        }

        Ok(Self {
            listen_addr,
            public_url,
            cookie_domain: var("COOKIE_DOMAIN"),
            session_key,
            http_timeout,
            github,
            discord,
        })
    }
}

impl AppConfig {
    /// Upper bound for handling one incoming request. A login callback makes
    /// two outbound calls in sequence, each bounded by `http_timeout`.
    pub fn request_timeout(&self) -> Duration {
        self.http_timeout * 2 + Duration::from_secs(1)
    }
}

/// A provider is only registered when both its id and secret are present.
/// Having only one of them is treated as a configuration mistake.
fn provider_config<F>(
    var: &F,
    (id_var, secret_var): (&'static str, &'static str),
    (auth_var, auth_default): (&'static str, &str),
    (token_var, token_default): (&'static str, &str),
    (api_var, api_default): (&'static str, &str),
) -> Result<Option<ProviderConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (client_id, client_secret) = match (var(id_var), var(secret_var)) {
        (Some(id), Some(secret)) => (id, secret),
        (None, None) => return Ok(None),
        (Some(_), None) => return Err(ConfigError::MissingEnvironmentVariable(secret_var)),
        (None, Some(_)) => return Err(ConfigError::MissingEnvironmentVariable(id_var)),
    };

    let endpoint = |name: &'static str, default: &str| {
        parse_url(name, var(name).as_deref().unwrap_or(default))
    };

    Ok(Some(ProviderConfig {
        client_id,
        client_secret,
        auth_url: endpoint(auth_var, auth_default)?,
        token_url: endpoint(token_var, token_default)?,
        api_url: endpoint(api_var, api_default)?,
    }))
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    value.parse().map_err(|e: url::ParseError| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
