//! Sequential loading moved off the runtime onto a blocking worker thread.

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::debug;

use crate::aggregator::Tally;
use crate::error::LoadError;
use crate::fetch::{fetch_contributors, Interruption};
use crate::model::Repository;
use crate::strategy::{unit_failure, ExecutionStrategy, RunContext, StrategyOutcome, Variant};

/// Runs every fetch, one after another, on a `spawn_blocking` thread that
/// drives each call with [`Handle::block_on`]. The whole result is handed back
/// once, when the thread finishes. Cancellation is checked between
/// repositories; an issued call always completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offloaded;

#[async_trait]
impl ExecutionStrategy for Offloaded {
    fn variant(&self) -> Variant {
        Variant::Offloaded
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let runtime = Handle::current();
        let worker = tokio::task::spawn_blocking(move || {
            let mut tally = Tally::new();
            for repo in &repos {
                if ctx.token.is_cancelled() {
                    debug!(repo = %repo.name, "worker stopping, load canceled");
                    return StrategyOutcome::Canceled;
                }
                let fetched = runtime.block_on(fetch_contributors(
                    ctx.gateway.as_ref(),
                    &ctx.org,
                    repo,
                    &ctx.token,
                    Interruption::RunToCompletion,
                ));
                match fetched {
                    Ok(records) => tally.absorb(&records),
                    Err(err) => return unit_failure(err),
                }
            }
            if ctx.token.is_cancelled() {
                return StrategyOutcome::Canceled;
            }
            StrategyOutcome::Finished(tally.snapshot())
        });

        match worker.await {
            Ok(outcome) => outcome,
            Err(err) => StrategyOutcome::Failed(LoadError::from(err)),
        }
    }
}
