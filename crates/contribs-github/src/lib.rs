//! GitHub REST implementation of the contribs `SourceGateway`.
//!
//! Lists an organization's repositories and each repository's contributors
//! through the GitHub v3 REST API.

mod client;
mod config;
mod error;

pub use client::{decode_list, GitHubGateway, GITHUB_JSON};
pub use config::{
    GitHubConfig, API_URL_ENV, DEFAULT_API_URL, DEFAULT_PER_PAGE, DEFAULT_TIMEOUT, TOKEN_ENV,
    USERNAME_ENV,
};
pub use error::GitHubError;

/// Result type for contribs-github setup operations
pub type Result<T> = std::result::Result<T, GitHubError>;
