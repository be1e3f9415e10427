mod discord;
mod error;
mod github;
mod handlers;

use crate::config::{AppConfig, ProviderConfig};
pub use discord::DiscordOauthService;
pub use error::Error;
pub use github::{GithubOauthService, GithubProfile};
pub(super) use handlers::{auth_callback, begin_auth};
use oauth2::{
    AccessToken, AuthUrl, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl,
    Scope, StandardRevocableToken, TokenUrl,
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use url::Url;

static CSRF_COOKIE_NAME: &str = "CSRF";

pub(super) type ProviderOAuthClient = Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Github,
    Discord,
}

impl ProviderName {
    pub const ALL: [ProviderName; 2] = [ProviderName::Github, ProviderName::Discord];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Github => "github",
            ProviderName::Discord => "discord",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProviderName::Github),
            "discord" => Ok(ProviderName::Discord),
            other => Err(Error::UnknownProvider(other.to_string())),
        }
    }
}

/// The user as reported by the provider right after logging in.
/// Only the session identifier ends up in a cookie, the rest is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub user_id: String,
    pub nickname: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// An OAuth identity provider users can log in with.
pub(super) trait OAuthService: Send + Sync {
    const PROVIDER: ProviderName;

    fn scopes() -> Vec<Scope>;

    fn oauth_client(&self) -> &ProviderOAuthClient;

    /// Look up the user that owns `token`
    fn fetch_user(
        &self,
        http_client: &reqwest::Client,
        token: &AccessToken,
    ) -> impl Future<Output = Result<ProviderUser, Error>> + Send;

    /// The value stored in the `user` session cookie
    fn session_identifier(user: ProviderUser) -> Result<String, Error>;
}

/// All providers configured for this process.
#[derive(Clone)]
pub struct Providers {
    github: Option<GithubOauthService>,
    discord: Option<DiscordOauthService>,
}

impl Providers {
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let callback = |provider: ProviderName| {
            config
                .public_url
                .join(&format!("/auth/{provider}/callback"))
                .map_err(|e| Error::InvalidUrl(e.to_string()))
        };

        let github = config
            .github
            .as_ref()
            .map(|github| {
                callback(ProviderName::Github).map(|url| GithubOauthService::new(github, url))
            })
            .transpose()?;
        let discord = config
            .discord
            .as_ref()
            .map(|discord| {
                callback(ProviderName::Discord).map(|url| DiscordOauthService::new(discord, url))
            })
            .transpose()?;

        Ok(Self { github, discord })
    }

    pub fn github(&self) -> Result<&GithubOauthService, Error> {
        self.github
            .as_ref()
            .ok_or(Error::ProviderNotConfigured(ProviderName::Github))
    }

    pub fn discord(&self) -> Result<&DiscordOauthService, Error> {
        self.discord
            .as_ref()
            .ok_or(Error::ProviderNotConfigured(ProviderName::Discord))
    }

    pub fn configured(&self) -> Vec<ProviderName> {
        ProviderName::ALL
            .into_iter()
            .filter(|provider| match provider {
                ProviderName::Github => self.github.is_some(),
                ProviderName::Discord => self.discord.is_some(),
            })
            .collect()
    }
}

fn oauth_client(config: &ProviderConfig, redirect_url: Url) -> ProviderOAuthClient {
    BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_uri(AuthUrl::from_url(config.auth_url.clone()))
        .set_token_uri(TokenUrl::from_url(config.token_url.clone()))
        .set_redirect_uri(RedirectUrl::from_url(redirect_url))
}

/// Append `segments` to the path of `base`, each percent-encoded as a single segment
fn api_url(base: &Url, segments: &[&str]) -> Result<Url, Error> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names() {
        assert_eq!("github".parse::<ProviderName>().unwrap(), ProviderName::Github);
        assert_eq!("discord".parse::<ProviderName>().unwrap(), ProviderName::Discord);
        assert!(matches!(
            "GitHub".parse::<ProviderName>(),
            Err(Error::UnknownProvider(name)) if name == "GitHub"
        ));
        assert_eq!(ProviderName::Discord.to_string(), "discord");
    }

    #[test]
    fn api_url_escapes_segments() {
        let base: Url = "https://api.github.com".parse().unwrap();
        assert_eq!(
            api_url(&base, &["user", "583231"]).unwrap().as_str(),
            "https://api.github.com/user/583231"
        );
        assert_eq!(
            api_url(&base, &["user", "../orgs/x?y"]).unwrap().as_str(),
            "https://api.github.com/user/..%2Forgs%2Fx%3Fy"
        );

        let base: Url = "https://discord.com/api".parse().unwrap();
        assert_eq!(
            api_url(&base, &["users", "@me"]).unwrap().as_str(),
            "https://discord.com/api/users/@me"
        );
    }
}
