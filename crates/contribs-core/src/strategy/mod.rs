//! Execution strategies: how Fetch Units are scheduled and when partial
//! aggregates are reported.
//!
//! Every variant implements [`ExecutionStrategy`] and shares the aggregation
//! contract ([`Tally`](crate::aggregator::Tally)) and the cancellation contract
//! (the [`RunContext::token`]). Variants differ only in scheduling:
//!
//! - [`serial`]: sequential, structured-sequential and progressive
//! - [`offloaded`]: sequential on a blocking worker thread
//! - [`callbacks`]: concurrent units reporting through completion callbacks
//! - [`fan_out`]: concurrent all-or-nothing, cancellable and non-cancellable
//! - [`fan_in`]: concurrent producers, capacity-1 hand-off queue, one consumer
//! - [`streaming`]: arrival-order merge, unbuffered or buffered
//!
//! Strategies never share a mutable accumulator: results reach the single
//! accumulator through a return value or a channel.

pub mod callbacks;
pub mod fan_in;
pub mod fan_out;
pub mod offloaded;
pub mod serial;
pub mod streaming;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregator::Tally;
use crate::config::ExecutionConfig;
use crate::error::{FetchError, LoadError, UnknownVariant};
use crate::fetch::{fetch_contributors, Interruption};
use crate::gateway::SourceGateway;
use crate::model::{AggregatedResult, ContributorRecord, Organization, Repository};

pub use callbacks::CallbackFanOut;
pub use fan_in::BoundedFanIn;
pub use fan_out::{FanOut, NonCancellableFanOut};
pub use offloaded::Offloaded;
pub use serial::Serial;
pub use streaming::{BufferedStreaming, Streaming};

/// How a strategy run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Aggregate over every repository's records.
    Finished(AggregatedResult),
    Canceled,
    Failed(LoadError),
}

/// Sends partial snapshots to the controller.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<AggregatedResult>,
}

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AggregatedResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand a complete snapshot to the controller.
    pub fn report(&self, snapshot: AggregatedResult) {
        // a closed receiver means the load already settled
        let _ = self.tx.send(snapshot);
    }
}

/// Everything a strategy needs for one run.
#[derive(Clone)]
pub struct RunContext {
    pub org: Organization,
    pub gateway: Arc<dyn SourceGateway>,
    /// Owned by the controller; strategies only observe it.
    pub token: CancellationToken,
    pub progress: ProgressSender,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("org", &self.org)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl RunContext {
    /// Build a self-contained unit future over owned copies of the context,
    /// suitable for spawning. The unit observes `token`.
    pub(crate) fn unit(
        &self,
        repo: Repository,
        token: CancellationToken,
        interruption: Interruption,
    ) -> impl Future<Output = Arrival> + Send + 'static {
        let gateway = Arc::clone(&self.gateway);
        let org = self.org.clone();
        async move {
            let result =
                fetch_contributors(gateway.as_ref(), &org, &repo, &token, interruption).await;
            Arrival {
                repo: repo.name,
                result,
            }
        }
    }
}

/// One unit's result as it reaches the accumulator.
#[derive(Debug)]
pub(crate) struct Arrival {
    pub repo: String,
    pub result: Result<Vec<ContributorRecord>, FetchError>,
}

/// Scheduling policy for the Fetch Units of one load.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn variant(&self) -> Variant;

    /// Fetch every repository in `repos` and aggregate the results.
    ///
    /// Partial snapshots, if any, go through `ctx.progress`; the final
    /// aggregate is the returned outcome.
    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome;
}

/// Map a failed unit onto the run outcome: cancellation stays cancellation,
/// anything else fails the load.
pub(crate) fn unit_failure(err: FetchError) -> StrategyOutcome {
    if err.is_canceled() {
        StrategyOutcome::Canceled
    } else {
        StrategyOutcome::Failed(LoadError::Fetch(err))
    }
}

/// Wait for every remaining task in `units`, discarding results.
pub(crate) async fn drain<T: 'static>(units: &mut JoinSet<T>) {
    while units.join_next().await.is_some() {}
}

/// Where [`merge_arrivals`] stopped.
pub(crate) enum Merged {
    /// The arrival stream ended; the tally holds everything that arrived.
    Exhausted(Tally),
    /// Cancellation or a failed unit ended the merge early.
    Stopped(StrategyOutcome),
}

/// Merge arrivals in the order they come, reporting a snapshot after every
/// arrival except the one that completes `total`.
pub(crate) async fn merge_arrivals<S>(ctx: &RunContext, arrivals: &mut S, total: usize) -> Merged
where
    S: Stream<Item = Arrival> + Unpin,
{
    let mut tally = Tally::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => return Merged::Stopped(StrategyOutcome::Canceled),
            next = arrivals.next() => next,
        };
        let Some(arrival) = next else {
            return Merged::Exhausted(tally);
        };
        match arrival.result {
            Ok(records) => {
                tally.absorb(&records);
                if tally.lists_absorbed() < total {
                    ctx.progress.report(tally.snapshot());
                }
            }
            Err(err) => {
                debug!(repo = %arrival.repo, "unit failed, stopping merge");
                return Merged::Stopped(unit_failure(err));
            }
        }
    }
}

/// Final outcome once every producer is done.
pub(crate) fn settle_tally(ctx: &RunContext, tally: Tally, total: usize) -> StrategyOutcome {
    if tally.lists_absorbed() < total {
        return StrategyOutcome::Failed(LoadError::Task(format!(
            "{} of {total} units never delivered a result",
            total - tally.lists_absorbed()
        )));
    }
    if ctx.token.is_cancelled() {
        return StrategyOutcome::Canceled;
    }
    StrategyOutcome::Finished(tally.snapshot())
}

/// Selectable strategy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    Sequential,
    Offloaded,
    Callbacks,
    StructuredSequential,
    FanOut,
    NonCancellableFanOut,
    Progressive,
    BoundedFanIn,
    Streaming,
    BufferedStreaming,
}

impl Variant {
    pub const ALL: [Variant; 10] = [
        Variant::Sequential,
        Variant::Offloaded,
        Variant::Callbacks,
        Variant::StructuredSequential,
        Variant::FanOut,
        Variant::NonCancellableFanOut,
        Variant::Progressive,
        Variant::BoundedFanIn,
        Variant::Streaming,
        Variant::BufferedStreaming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Sequential => "sequential",
            Variant::Offloaded => "offloaded",
            Variant::Callbacks => "callbacks",
            Variant::StructuredSequential => "structured-sequential",
            Variant::FanOut => "fan-out",
            Variant::NonCancellableFanOut => "non-cancellable-fan-out",
            Variant::Progressive => "progressive",
            Variant::BoundedFanIn => "bounded-fan-in",
            Variant::Streaming => "streaming",
            Variant::BufferedStreaming => "buffered-streaming",
        }
    }

    /// One-line description for help output.
    pub fn describe(&self) -> &'static str {
        match self {
            Variant::Sequential => "one repository at a time on the load task",
            Variant::Offloaded => "one repository at a time on a blocking worker thread",
            Variant::Callbacks => "all repositories at once, completion callbacks",
            Variant::StructuredSequential => {
                "one repository at a time, in-flight calls cancellable"
            }
            Variant::FanOut => "all repositories at once, all-or-nothing",
            Variant::NonCancellableFanOut => {
                "all repositories at once, issued calls always run to completion"
            }
            Variant::Progressive => "one repository at a time, snapshot after each",
            Variant::BoundedFanIn => "all at once, capacity-1 queue, snapshot per arrival",
            Variant::Streaming => "all at once, unbuffered merge, snapshot per arrival",
            Variant::BufferedStreaming => "all at once, buffered merge, snapshot per arrival",
        }
    }

    /// Whether the variant publishes `InProgress` snapshots before finishing.
    pub fn reports_progress(&self) -> bool {
        matches!(
            self,
            Variant::Progressive
                | Variant::BoundedFanIn
                | Variant::Streaming
                | Variant::BufferedStreaming
        )
    }

    /// Instantiate the strategy.
    pub fn build(&self, config: &ExecutionConfig) -> Arc<dyn ExecutionStrategy> {
        match self {
            Variant::Sequential => Arc::new(Serial::sequential()),
            Variant::Offloaded => Arc::new(Offloaded),
            Variant::Callbacks => Arc::new(CallbackFanOut),
            Variant::StructuredSequential => Arc::new(Serial::structured()),
            Variant::FanOut => Arc::new(FanOut),
            Variant::NonCancellableFanOut => Arc::new(NonCancellableFanOut),
            Variant::Progressive => Arc::new(Serial::progressive()),
            Variant::BoundedFanIn => Arc::new(BoundedFanIn),
            Variant::Streaming => Arc::new(Streaming),
            Variant::BufferedStreaming => Arc::new(BufferedStreaming::new(config.stream_buffer)),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Variant::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Variant::ALL.iter().map(Variant::as_str).collect();
                UnknownVariant(s.to_string(), names.join(", "))
            })
    }
}
