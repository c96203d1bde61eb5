//! Load Controller: drives one load from repository listing to its terminal
//! state.
//!
//! Each call to [`LoadController::load`] creates a fresh [`CancellationToken`]
//! and a [`LoadHandle`]. The controller publishes `InProgress([])` on start,
//! forwards every partial snapshot of the strategy, and settles the load
//! exactly once: the first of completion, failure or cancel wins and every
//! later notification for that load is discarded.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::ExecutionConfig;
use crate::error::LoadError;
use crate::gateway::SourceGateway;
use crate::metrics::METRICS;
use crate::model::{AggregatedResult, LoadId, LoadState, Organization};
use crate::obs::{emit_load_settled, emit_load_started, emit_repositories_listed, load_span};
use crate::sink::ResultSink;
use crate::strategy::{ExecutionStrategy, ProgressSender, RunContext, StrategyOutcome, Variant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates loads against one gateway and one sink.
///
/// At most one load is active: starting another cancels the one in flight.
pub struct LoadController {
    gateway: Arc<dyn SourceGateway>,
    sink: Arc<dyn ResultSink>,
    config: ExecutionConfig,
    active: Mutex<Option<LoadHandle>>,
}

impl fmt::Debug for LoadController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadController")
            .field("config", &self.config)
            .field("active", &*lock(&self.active))
            .finish()
    }
}

impl LoadController {
    pub fn new(gateway: Arc<dyn SourceGateway>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            gateway,
            sink,
            config: ExecutionConfig::default(),
            active: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// The most recently started load, settled or not.
    pub fn current(&self) -> Option<LoadHandle> {
        lock(&self.active).clone()
    }

    /// Start loading `org` with `variant`, canceling any load still in flight.
    ///
    /// Must be called from within a tokio runtime; the load runs on a spawned
    /// task and reports through the sink.
    pub fn load(&self, org: Organization, variant: Variant) -> LoadHandle {
        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            if previous.cancel() {
                debug!(load_id = %previous.id().short(), "superseded by a new load");
            }
        }
        let handle = self.start(org, variant);
        *active = Some(handle.clone());
        handle
    }

    /// Cancel the active load. Returns `false` when nothing was in progress
    /// or the load had already settled.
    pub fn cancel(&self) -> bool {
        match self.current() {
            Some(handle) => handle.cancel(),
            None => false,
        }
    }

    /// Load and wait for the terminal state. With a `deadline`, the load is
    /// canceled through the regular cancel path once it expires.
    pub async fn run(
        &self,
        org: Organization,
        variant: Variant,
        deadline: Option<Duration>,
    ) -> LoadState {
        let handle = self.load(org, variant);
        let Some(deadline) = deadline else {
            return handle.wait().await;
        };

        tokio::select! {
            state = handle.wait() => state,
            _ = tokio::time::sleep(deadline) => {
                warn!(
                    load_id = %handle.id().short(),
                    deadline_ms = deadline.as_millis() as u64,
                    "deadline expired, canceling load"
                );
                handle.cancel();
                handle.wait().await
            }
        }
    }

    fn start(&self, org: Organization, variant: Variant) -> LoadHandle {
        let load_id = LoadId::new();
        let token = CancellationToken::new();
        let reporter = Arc::new(StateReporter::new(load_id, Arc::clone(&self.sink)));

        // clears whatever the sink showed for the previous load
        reporter.progress(AggregatedResult::default());
        emit_load_started(load_id, &org, variant);

        let (progress, partials) = ProgressSender::channel();
        let ctx = RunContext {
            org: org.clone(),
            gateway: Arc::clone(&self.gateway),
            token: token.clone(),
            progress,
        };
        let strategy = variant.build(&self.config);
        let span = load_span(load_id, &org, variant);
        tokio::spawn(drive(ctx, partials, strategy, Arc::clone(&reporter)).instrument(span));

        LoadHandle {
            id: load_id,
            org,
            variant,
            token,
            reporter,
        }
    }
}

/// Caller's view of one load.
#[derive(Clone)]
pub struct LoadHandle {
    id: LoadId,
    org: Organization,
    variant: Variant,
    token: CancellationToken,
    reporter: Arc<StateReporter>,
}

impl fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle")
            .field("id", &self.id)
            .field("org", &self.org)
            .field("variant", &self.variant)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl LoadHandle {
    pub fn id(&self) -> LoadId {
        self.id
    }

    pub fn org(&self) -> &Organization {
        &self.org
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Settle the load as `Canceled` and signal its token.
    ///
    /// Returns `true` only for the call that actually canceled; repeated
    /// calls, or calls after the load settled, do nothing.
    pub fn cancel(&self) -> bool {
        let canceled = self.reporter.settle(LoadState::Canceled);
        self.token.cancel();
        if canceled {
            info!(load_id = %self.id.short(), "load canceled");
        }
        canceled
    }

    pub fn is_settled(&self) -> bool {
        self.reporter.terminal.borrow().is_some()
    }

    /// Terminal state, once reached.
    pub fn state(&self) -> Option<LoadState> {
        self.reporter.terminal.borrow().clone()
    }

    /// Wait for the terminal state.
    pub async fn wait(&self) -> LoadState {
        let mut terminal = self.reporter.terminal.subscribe();
        let settled = terminal
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|state| state.clone());
        // the sender lives in the reporter this handle holds, so it cannot close
        settled.unwrap_or(LoadState::Canceled)
    }
}

struct Published {
    settled: bool,
    last: AggregatedResult,
}

/// Single publishing point of one load. Terminal states are first-wins and
/// nothing is published after one.
struct StateReporter {
    load_id: LoadId,
    sink: Arc<dyn ResultSink>,
    started: Instant,
    published: Mutex<Published>,
    terminal: watch::Sender<Option<LoadState>>,
}

impl StateReporter {
    fn new(load_id: LoadId, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            load_id,
            sink,
            started: Instant::now(),
            published: Mutex::new(Published {
                settled: false,
                last: AggregatedResult::default(),
            }),
            terminal: watch::Sender::new(None),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn progress(&self, partial: AggregatedResult) {
        let mut published = lock(&self.published);
        if published.settled {
            return;
        }
        let checked = partial
            .check_ranking()
            .and_then(|()| partial.check_extends(&published.last));
        if let Err(err) = checked {
            let state = LoadState::Failed {
                cause: LoadError::AggregationInvariant(err),
            };
            self.publish_terminal(published, state);
            return;
        }
        self.sink.publish(
            self.load_id,
            &LoadState::InProgress {
                partial: partial.clone(),
            },
        );
        published.last = partial;
    }

    /// Returns `false` when the load had already settled.
    fn settle(&self, state: LoadState) -> bool {
        let published = lock(&self.published);
        if published.settled {
            return false;
        }
        self.publish_terminal(published, state);
        true
    }

    fn publish_terminal(&self, mut published: MutexGuard<'_, Published>, state: LoadState) {
        published.settled = true;
        self.sink.publish(self.load_id, &state);
        drop(published);

        METRICS.inc_loads_settled();
        emit_load_settled(self.load_id, &state, self.elapsed().as_millis() as u64);
        self.terminal.send_replace(Some(state));
    }
}

async fn drive(
    ctx: RunContext,
    mut partials: mpsc::UnboundedReceiver<AggregatedResult>,
    strategy: Arc<dyn ExecutionStrategy>,
    reporter: Arc<StateReporter>,
) {
    let run = AssertUnwindSafe(execute(ctx, strategy)).catch_unwind();
    tokio::pin!(run);
    let outcome = loop {
        tokio::select! {
            biased;
            Some(partial) = partials.recv() => reporter.progress(partial),
            outcome = &mut run => break outcome,
        }
    };
    while let Ok(partial) = partials.try_recv() {
        reporter.progress(partial);
    }

    let state = match outcome {
        Ok(StrategyOutcome::Finished(result)) => LoadState::Completed {
            result,
            elapsed: reporter.elapsed(),
        },
        Ok(StrategyOutcome::Canceled) => LoadState::Canceled,
        Ok(StrategyOutcome::Failed(cause)) => LoadState::Failed { cause },
        Err(panic) => LoadState::Failed {
            cause: LoadError::Task(format!("strategy panicked: {}", panic_message(&*panic))),
        },
    };
    if !reporter.settle(state) {
        debug!("load already settled, discarding strategy outcome");
    }
}

async fn execute(ctx: RunContext, strategy: Arc<dyn ExecutionStrategy>) -> StrategyOutcome {
    if ctx.token.is_cancelled() {
        return StrategyOutcome::Canceled;
    }
    let listed = tokio::select! {
        biased;
        _ = ctx.token.cancelled() => return StrategyOutcome::Canceled,
        listed = ctx.gateway.list_repositories(&ctx.org) => listed,
    };
    let repos = match listed {
        Ok(repos) => repos,
        Err(source) => {
            return StrategyOutcome::Failed(LoadError::Repositories {
                org: ctx.org.to_string(),
                source,
            })
        }
    };

    emit_repositories_listed(&ctx.org, repos.len());
    if repos.is_empty() {
        return StrategyOutcome::Finished(AggregatedResult::default());
    }
    strategy.run(ctx, repos).await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingSink;

    #[test]
    fn test_panic_message_extracts_str_and_string() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[tokio::test]
    async fn test_reporter_settles_once_and_drops_later_progress() {
        let sink = Arc::new(RecordingSink::new());
        let id = LoadId::new();
        let reporter = StateReporter::new(id, sink.clone());

        assert!(reporter.settle(LoadState::Canceled));
        assert!(!reporter.settle(LoadState::Canceled));
        reporter.progress(AggregatedResult::default());

        assert_eq!(sink.states_for(id), vec![LoadState::Canceled]);
        assert_eq!(*reporter.terminal.borrow(), Some(LoadState::Canceled));
    }

    #[tokio::test]
    async fn test_reporter_rejects_shrinking_snapshot() {
        let sink = Arc::new(RecordingSink::new());
        let id = LoadId::new();
        let reporter = StateReporter::new(id, sink.clone());

        let bigger = crate::aggregator::aggregate([vec![
            crate::model::ContributorRecord::new("x", 3),
            crate::model::ContributorRecord::new("y", 1),
        ]]);
        let smaller =
            crate::aggregator::aggregate([vec![crate::model::ContributorRecord::new("x", 3)]]);
        reporter.progress(bigger);
        reporter.progress(smaller);

        let states = sink.states_for(id);
        assert_eq!(states.len(), 2);
        assert!(matches!(
            &states[1],
            LoadState::Failed {
                cause: LoadError::AggregationInvariant(_)
            }
        ));
    }
}
