//! Concurrent fetches that report through completion callbacks.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregator::Tally;
use crate::error::{FetchError, LoadError};
use crate::fetch::Interruption;
use crate::model::{ContributorRecord, Repository};
use crate::strategy::{unit_failure, ExecutionStrategy, RunContext, StrategyOutcome, Variant};

/// Launch the fetch of `repo` and invoke `on_done` with its result.
///
/// The callback runs on the task that performed the fetch.
pub fn fetch_with_callback<F>(
    ctx: &RunContext,
    repo: Repository,
    token: CancellationToken,
    on_done: F,
) where
    F: FnOnce(Result<Vec<ContributorRecord>, FetchError>) + Send + 'static,
{
    let unit = ctx.unit(repo, token, Interruption::Cooperative);
    tokio::spawn(async move {
        let arrival = unit.await;
        on_done(arrival.result);
    });
}

/// Every repository is fetched at once; each completion callback forwards its
/// result to the single accumulator over a channel. The merged result is
/// delivered once, after the last callback. No partial snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackFanOut;

#[async_trait]
impl ExecutionStrategy for CallbackFanOut {
    fn variant(&self) -> Variant {
        Variant::Callbacks
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let expected = repos.len();
        let scope = ctx.token.child_token();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for repo in repos {
            let done_tx = done_tx.clone();
            fetch_with_callback(&ctx, repo, scope.clone(), move |result| {
                let _ = done_tx.send(result);
            });
        }
        // the channel closes once the last callback has fired
        drop(done_tx);

        let mut tally = Tally::new();
        while let Some(result) = done_rx.recv().await {
            match result {
                Ok(records) => tally.absorb(&records),
                Err(err) => {
                    debug!(repo = %err.repo(), "callback reported failure, canceling siblings");
                    scope.cancel();
                    return unit_failure(err);
                }
            }
        }
        if tally.lists_absorbed() < expected {
            // a unit task died without invoking its callback
            return StrategyOutcome::Failed(LoadError::Task(format!(
                "{} of {expected} callbacks never fired",
                expected - tally.lists_absorbed()
            )));
        }
        StrategyOutcome::Finished(tally.snapshot())
    }
}
