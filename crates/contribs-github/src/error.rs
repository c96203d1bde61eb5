//! Error types for contribs-github

use thiserror::Error;

/// Errors raised while configuring or building the GitHub client.
///
/// Request failures are reported as
/// [`GatewayError`](contribs_core::GatewayError) through the gateway trait.
#[derive(Error, Debug)]
pub enum GitHubError {
    /// Configuration value out of range or inconsistent
    #[error("invalid GitHub configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Client(err.to_string())
    }
}
