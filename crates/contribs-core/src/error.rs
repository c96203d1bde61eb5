//! Error taxonomy for loading and aggregating contributors.
//!
//! Cancellation is not an error: it surfaces as
//! [`StrategyOutcome::Canceled`](crate::strategy::StrategyOutcome) and
//! [`LoadState::Canceled`](crate::model::LoadState).

use thiserror::Error;

/// Failure reported by a [`SourceGateway`](crate::gateway::SourceGateway) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request could not be sent or the connection broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Outcome of a single Fetch Unit that did not produce records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("contributors fetch for repo '{repo}' failed: {source}")]
    Gateway {
        repo: String,
        #[source]
        source: GatewayError,
    },

    /// The load was canceled before or while the unit ran.
    #[error("contributors fetch for repo '{repo}' canceled")]
    Canceled { repo: String },
}

impl FetchError {
    pub fn repo(&self) -> &str {
        match self {
            FetchError::Gateway { repo, .. } | FetchError::Canceled { repo } => repo,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, FetchError::Canceled { .. })
    }
}

/// Raised by the ranking consistency checks on [`AggregatedResult`](crate::model::AggregatedResult).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("aggregation invariant violated: {detail}")]
pub struct AggregationError {
    pub detail: String,
}

impl AggregationError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Why a load ended in [`LoadState::Failed`](crate::model::LoadState).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Listing the organization's repositories failed; no units were launched.
    #[error("failed to list repositories for org '{org}': {source}")]
    Repositories {
        org: String,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    AggregationInvariant(#[from] AggregationError),

    /// A spawned unit or the strategy itself panicked or was aborted.
    #[error("load task failed: {0}")]
    Task(String),
}

impl LoadError {
    /// The repository whose fetch failed, when the failure came from a unit.
    pub fn repo(&self) -> Option<&str> {
        match self {
            LoadError::Fetch(err) => Some(err.repo()),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for LoadError {
    fn from(err: tokio::task::JoinError) -> Self {
        LoadError::Task(err.to_string())
    }
}

/// Result alias for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Raised when parsing an unknown strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variant '{0}', expected one of: {1}")]
pub struct UnknownVariant(pub String, pub String);
