//! GitHub REST client implementing [`SourceGateway`].

use async_trait::async_trait;
use contribs_core::{
    ContributorRecord, GatewayError, GatewayResult, Organization, Repository, SourceGateway,
};
use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::GitHubConfig;
use crate::Result;

/// Media type of the GitHub v3 JSON API
pub const GITHUB_JSON: &str = "application/vnd.github+json";

/// GitHub client for repository and contributor listings.
///
/// Only the first page of each listing is requested, sized by
/// [`GitHubConfig::per_page`].
#[derive(Debug, Clone)]
pub struct GitHubGateway {
    config: GitHubConfig,
    http: reqwest::Client,
}

impl GitHubGateway {
    /// Create a client after validating `config`.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;

        info!(api_url = %config.api_url, authenticated = config.token.is_some(), "GitHub gateway ready");
        Ok(GitHubGateway { config, http })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.config.username, &self.config.token) {
            (Some(username), Some(token)) => request.basic_auth(username, Some(token)),
            (None, Some(token)) => request.bearer_auth(token),
            _ => request,
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, url: String) -> GatewayResult<Vec<T>> {
        debug!(%url, "GET");
        let request = self.authorize(self.http.get(&url).header(ACCEPT, GITHUB_JSON));
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        decode_list(status, &url, &body)
    }
}

#[async_trait]
impl SourceGateway for GitHubGateway {
    async fn list_repositories(&self, org: &Organization) -> GatewayResult<Vec<Repository>> {
        let repos: Vec<Repository> = self.get_list(self.config.repos_url(org.as_str())).await?;
        info!(org = %org, repos = repos.len(), "listed repositories");
        Ok(repos)
    }

    async fn list_contributors(
        &self,
        org: &Organization,
        repo: &str,
    ) -> GatewayResult<Vec<ContributorRecord>> {
        self.get_list(self.config.contributors_url(org.as_str(), repo))
            .await
    }
}

/// Decode one listing response.
///
/// `204 No Content` (GitHub's answer for an empty repository) is an empty
/// list; any other non-2xx status is [`GatewayError::Status`].
pub fn decode_list<T: DeserializeOwned>(status: u16, url: &str, body: &[u8]) -> GatewayResult<Vec<T>> {
    match status {
        204 => Ok(Vec::new()),
        200..=299 => serde_json::from_slice(body)
            .map_err(|e| GatewayError::Decode(format!("{url}: {e}"))),
        _ => Err(GatewayError::Status {
            status,
            url: url.to_string(),
        }),
    }
}
