//! All-or-nothing concurrent fetches.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::aggregator::Tally;
use crate::error::LoadError;
use crate::fetch::Interruption;
use crate::model::Repository;
use crate::strategy::{
    drain, unit_failure, Arrival, ExecutionStrategy, RunContext, StrategyOutcome, Variant,
};

/// Every repository is fetched at once inside one cancellation scope. The
/// first failure cancels the scope, so siblings stop early, and the load
/// fails. The aggregate is delivered once, after every unit succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FanOut;

#[async_trait]
impl ExecutionStrategy for FanOut {
    fn variant(&self) -> Variant {
        Variant::FanOut
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let scope = ctx.token.child_token();
        let mut units = JoinSet::new();
        for repo in repos {
            units.spawn(ctx.unit(repo, scope.clone(), Interruption::Cooperative));
        }

        let mut tally = Tally::new();
        while let Some(joined) = units.join_next().await {
            let failure = match joined {
                Ok(Arrival {
                    result: Ok(records),
                    ..
                }) => {
                    tally.absorb(&records);
                    continue;
                }
                Ok(Arrival {
                    repo,
                    result: Err(err),
                }) => {
                    debug!(%repo, remaining = units.len(), "unit failed, canceling siblings");
                    unit_failure(err)
                }
                Err(err) => StrategyOutcome::Failed(LoadError::from(err)),
            };
            scope.cancel();
            drain(&mut units).await;
            return failure;
        }

        if ctx.token.is_cancelled() {
            return StrategyOutcome::Canceled;
        }
        StrategyOutcome::Finished(tally.snapshot())
    }
}

/// Every repository is fetched at once, each on its own detached task.
///
/// Units check the load token only when they are issued; an issued call
/// always runs to completion. A failure fails the load immediately without
/// signalling siblings, and a cancel stops waiting while the calls already
/// issued finish in the background with their results discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonCancellableFanOut;

#[async_trait]
impl ExecutionStrategy for NonCancellableFanOut {
    fn variant(&self) -> Variant {
        Variant::NonCancellableFanOut
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let mut pending: FuturesUnordered<JoinHandle<Arrival>> = repos
            .into_iter()
            .map(|repo| {
                tokio::spawn(ctx.unit(repo, ctx.token.clone(), Interruption::RunToCompletion))
            })
            .collect();

        let mut tally = Tally::new();
        loop {
            let joined = tokio::select! {
                biased;
                _ = ctx.token.cancelled() => {
                    // dropping the handles detaches the tasks
                    debug!(detached = pending.len(), "load canceled, issued calls keep running");
                    return StrategyOutcome::Canceled;
                }
                joined = pending.next() => joined,
            };
            match joined {
                None => break,
                Some(Ok(Arrival {
                    result: Ok(records),
                    ..
                })) => tally.absorb(&records),
                Some(Ok(Arrival {
                    repo,
                    result: Err(err),
                })) => {
                    warn!(%repo, still_running = pending.len(), "unit failed, siblings are not canceled");
                    return unit_failure(err);
                }
                Some(Err(err)) => return StrategyOutcome::Failed(LoadError::from(err)),
            }
        }

        if ctx.token.is_cancelled() {
            return StrategyOutcome::Canceled;
        }
        StrategyOutcome::Finished(tally.snapshot())
    }
}
