//! Contribs core: concurrent fetch, aggregation and reporting of an
//! organization's contributors.
//!
//! ## Pipeline
//!
//! `LoadController` -> `SourceGateway::list_repositories` -> one Fetch Unit per
//! repository, scheduled by an `ExecutionStrategy` -> `Tally` -> `ResultSink`.
//!
//! ## Key Components
//!
//! - `SourceGateway`: where repositories and contributor records come from
//! - `ExecutionStrategy` / `Variant`: how fetches are scheduled and when
//!   partial snapshots are reported
//! - `aggregate` / `Tally`: order-independent merge into a ranked list
//! - `LoadController` / `LoadHandle`: one load end-to-end, cancellation and
//!   the single terminal state
//! - `ResultSink`: receiver of `LoadState` notifications

pub mod aggregator;
pub mod config;
pub mod controller;
mod error;
pub mod fakes;
pub mod fetch;
pub mod gateway;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod sink;
pub mod strategy;
pub mod telemetry;

pub use aggregator::{aggregate, Tally};
pub use config::{ExecutionConfig, DEFAULT_STREAM_BUFFER, HANDOFF_CAPACITY, STREAM_BUFFER_ENV};
pub use controller::{LoadController, LoadHandle};
pub use error::{
    AggregationError, FetchError, GatewayError, GatewayResult, LoadError, UnknownVariant,
};
pub use fetch::{fetch_contributors, Interruption};
pub use gateway::SourceGateway;
pub use model::{
    format_elapsed, AggregatedContributor, AggregatedResult, ContributorRecord, LoadId, LoadState,
    Organization, Repository,
};
pub use sink::{ChannelSink, FanOutSink, ResultSink, TracingSink};
pub use strategy::{ExecutionStrategy, RunContext, StrategyOutcome, Variant};
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
