use crate::{
    api::{
        USER_AGENT_VALUE,
        oauth::{
            Error, OAuthService, ProviderName, ProviderOAuthClient, ProviderUser, api_url,
            oauth_client,
        },
    },
    config::ProviderConfig,
};
use http::{HeaderValue, header::USER_AGENT};
use oauth2::{AccessToken, AuthType, Scope};
use serde::Deserialize;
use url::Url;

static DISCORD_CDN_URL: &str = "https://cdn.discordapp.com";

/// Represents the Discord OAuth service.
#[derive(Clone)]
pub struct DiscordOauthService {
    oauth_client: ProviderOAuthClient,
    api_url: Url,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    global_name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    verified: bool,
    avatar: Option<String>,
}

impl DiscordUser {
    fn avatar_url(&self) -> Option<String> {
        self.avatar
            .as_ref()
            .map(|hash| format!("{DISCORD_CDN_URL}/avatars/{}/{hash}.png", self.id))
    }
}

impl DiscordOauthService {
    pub fn new(config: &ProviderConfig, redirect_url: Url) -> Self {
        Self {
            // Discord expects the client credentials in the form body
            oauth_client: oauth_client(config, redirect_url).set_auth_type(AuthType::RequestBody),
            api_url: config.api_url.clone(),
        }
    }
}

impl OAuthService for DiscordOauthService {
    const PROVIDER: ProviderName = ProviderName::Discord;

    fn scopes() -> Vec<Scope> {
        vec![
            Scope::new("identify".to_string()),
            Scope::new("email".to_string()),
        ]
    }

    fn oauth_client(&self) -> &ProviderOAuthClient {
        &self.oauth_client
    }

    async fn fetch_user(
        &self,
        http_client: &reqwest::Client,
        token: &AccessToken,
    ) -> Result<ProviderUser, Error> {
        let url = api_url(&self.api_url, &["users", "@me"])?;

        let user: DiscordUser = http_client
            .get(url)
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE))
            .bearer_auth(token.secret())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::FetchUser(ProviderName::Discord, e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::ParseUser(ProviderName::Discord, e.to_string()))?;

        let avatar_url = user.avatar_url();
        // unverified addresses can be claimed by anyone, so they do not identify the user
        let email = user.email.filter(|_| user.verified);

        Ok(ProviderUser {
            user_id: user.id,
            nickname: user.global_name.unwrap_or(user.username),
            email,
            avatar_url,
        })
    }

    fn session_identifier(user: ProviderUser) -> Result<String, Error> {
        user.email.ok_or(Error::MissingEmail(ProviderName::Discord))
    }
}
