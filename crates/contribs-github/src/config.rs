//! GitHub client configuration

use std::fmt;
use std::time::Duration;

use crate::error::GitHubError;
use crate::Result;

/// Public GitHub REST endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub's maximum page size
pub const DEFAULT_PER_PAGE: u32 = 100;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const API_URL_ENV: &str = "GITHUB_API_URL";
pub const USERNAME_ENV: &str = "GITHUB_USERNAME";
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Connection settings for [`GitHubGateway`](crate::GitHubGateway).
#[derive(Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    /// API base URL, without trailing slash
    pub api_url: String,
    /// Account name for basic auth
    pub username: Option<String>,
    /// Personal access token
    pub token: Option<String>,
    /// Entries requested per listing call (1..=100)
    pub per_page: u32,
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("per_page", &self.per_page)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl GitHubConfig {
    /// Config for a specific API endpoint, anonymous.
    pub fn new(api_url: &str) -> Self {
        GitHubConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            username: None,
            token: None,
            per_page: DEFAULT_PER_PAGE,
            user_agent: format!("contribs/{}", env!("CARGO_PKG_VERSION")),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a new config from environment variables
    ///
    /// Reads:
    /// - GITHUB_API_URL (optional, default: https://api.github.com)
    /// - GITHUB_USERNAME (optional)
    /// - GITHUB_TOKEN (optional)
    pub fn from_env() -> Self {
        let api_url = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&api_url);
        config.username = non_empty_env(USERNAME_ENV);
        config.token = non_empty_env(TOKEN_ENV);
        config
    }

    /// Basic auth with username and token
    pub fn with_credentials(mut self, username: &str, token: &str) -> Self {
        self.username = Some(username.to_string());
        self.token = Some(token.to_string());
        self
    }

    /// Bearer token auth
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Check value ranges before building a client.
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(GitHubError::InvalidConfig(format!(
                "api_url must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        if !(1..=100).contains(&self.per_page) {
            return Err(GitHubError::InvalidConfig(format!(
                "per_page must be within 1..=100, got {}",
                self.per_page
            )));
        }
        if self.username.is_some() && self.token.is_none() {
            return Err(GitHubError::InvalidConfig(
                "username given without a token".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(GitHubError::InvalidConfig("timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// `{api_url}/orgs/{org}/repos?per_page=N`
    pub fn repos_url(&self, org: &str) -> String {
        format!("{}/orgs/{}/repos?per_page={}", self.api_url, org, self.per_page)
    }

    /// `{api_url}/repos/{org}/{repo}/contributors?per_page=N`
    pub fn contributors_url(&self, org: &str, repo: &str) -> String {
        format!(
            "{}/repos/{}/{}/contributors?per_page={}",
            self.api_url, org, repo, self.per_page
        )
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_public_api() {
        let config = GitHubConfig::default();
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.per_page, 100);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("contribs/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = GitHubConfig::new("http://localhost:8080/");
        assert_eq!(
            config.repos_url("acme"),
            "http://localhost:8080/orgs/acme/repos?per_page=100"
        );
        assert_eq!(
            config.contributors_url("acme", "widgets"),
            "http://localhost:8080/repos/acme/widgets/contributors?per_page=100"
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range_page_size() {
        assert!(GitHubConfig::default().with_per_page(0).validate().is_err());
        assert!(GitHubConfig::default().with_per_page(101).validate().is_err());
        assert!(GitHubConfig::default().with_per_page(1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_username_without_token() {
        let mut config = GitHubConfig::default();
        config.username = Some("octocat".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("without a token"));
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        assert!(GitHubConfig::new("ftp://example.com").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = GitHubConfig::default().with_credentials("octocat", "ghp_secret");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("octocat"));
        assert!(!rendered.contains("ghp_secret"));
    }
}
