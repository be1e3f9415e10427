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
use http::{
    HeaderValue, StatusCode,
    header::{ACCEPT, USER_AGENT},
};
use oauth2::{AccessToken, Scope};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, trace};
use url::Url;

pub(super) static GITHUB_ACCEPT_TYPE: &str = "application/vnd.github+json";

/// Represents the GitHub OAuth service.
#[derive(Clone)]
pub struct GithubOauthService {
    oauth_client: ProviderOAuthClient,
    api_url: Url,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    id: i64,
    email: Option<String>,
    avatar_url: Option<String>,
}

/// Public profile of a GitHub account, as shown by `/whoamI`.
///
/// Read from the fields GitHub uses, written with the field names clients of
/// this service expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubProfile {
    #[serde(rename(serialize = "UserName", deserialize = "login"))]
    pub username: String,
    #[serde(rename(serialize = "ID", deserialize = "id"))]
    pub id: i64,
    #[serde(rename(serialize = "Public_Repos", deserialize = "public_repos"))]
    pub public_repos: i64,
    #[serde(rename(serialize = "Followers", deserialize = "followers"))]
    pub followers: i64,
}

impl GithubOauthService {
    pub fn new(config: &ProviderConfig, redirect_url: Url) -> Self {
        Self {
            oauth_client: oauth_client(config, redirect_url),
            api_url: config.api_url.clone(),
        }
    }

    /// Fetch the public profile of the account with the given id.
    ///
    /// The request is unauthenticated. Returns `None` if GitHub does not know the account.
    pub async fn public_profile(
        &self,
        http_client: &reqwest::Client,
        identifier: &str,
    ) -> Result<Option<GithubProfile>, Error> {
        let url = api_url(&self.api_url, &["user", identifier])?;
        trace!(%url, "fetching public GitHub profile");

        let response = http_client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT_TYPE))
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE))
            .send()
            .await
            .map_err(|e| Error::FetchUser(ProviderName::Github, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(identifier, "GitHub does not know this user");
                Ok(None)
            }
            status if !status.is_success() => Err(Error::FetchUser(
                ProviderName::Github,
                format!("GitHub responded with {status}"),
            )),
            _ => response
                .json()
                .await
                .map(Some)
                .map_err(|e| Error::ParseUser(ProviderName::Github, e.to_string())),
        }
    }

    async fn fetch_gh_api<T>(
        &self,
        http_client: &reqwest::Client,
        url: Url,
        token: &AccessToken,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        http_client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT_TYPE))
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE))
            .bearer_auth(token.secret())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::FetchUser(ProviderName::Github, e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::ParseUser(ProviderName::Github, e.to_string()))
    }
}

impl OAuthService for GithubOauthService {
    const PROVIDER: ProviderName = ProviderName::Github;

    fn scopes() -> Vec<Scope> {
        vec![
            Scope::new("read:user".to_string()),
            Scope::new("user:email".to_string()),
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
        let url = api_url(&self.api_url, &["user"])?;
        let user: GitHubUser = self.fetch_gh_api(http_client, url, token).await?;

        Ok(ProviderUser {
            user_id: user.id.to_string(),
            nickname: user.login,
            email: user.email,
            avatar_url: user.avatar_url,
        })
    }

    fn session_identifier(user: ProviderUser) -> Result<String, Error> {
        Ok(user.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_is_renamed_for_clients() {
        let profile: GithubProfile = serde_json::from_value(json!({
            "login": "octocat",
            "id": 1,
            "public_repos": 8,
            "followers": 4000,
            "site_admin": false,
        }))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&profile).unwrap(),
            json!({
                "UserName": "octocat",
                "ID": 1,
                "Public_Repos": 8,
                "Followers": 4000,
            })
        );
    }

    #[test]
    fn session_uses_user_id() {
        let user = ProviderUser {
            user_id: "583231".to_string(),
            nickname: "octocat".to_string(),
            email: None,
            avatar_url: None,
        };

        assert_eq!(
            GithubOauthService::session_identifier(user).unwrap(),
            "583231"
        );
    }
}
