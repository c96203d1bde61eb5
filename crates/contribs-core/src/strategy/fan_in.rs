//! Concurrent producers feeding a single consumer through a capacity-1 queue.

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::HANDOFF_CAPACITY;
use crate::error::LoadError;
use crate::fetch::Interruption;
use crate::model::Repository;
use crate::strategy::{
    drain, merge_arrivals, settle_tally, Arrival, ExecutionStrategy, Merged, RunContext,
    StrategyOutcome, Variant,
};

/// Each repository gets a producer task that fetches and then pushes its
/// result into a hand-off queue of capacity [`HANDOFF_CAPACITY`]; a producer
/// blocks until the consumer has taken the previous result. The consumer
/// merges in arrival order and reports a snapshot per arrival.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundedFanIn;

#[async_trait]
impl ExecutionStrategy for BoundedFanIn {
    fn variant(&self) -> Variant {
        Variant::BoundedFanIn
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let total = repos.len();
        let scope = ctx.token.child_token();
        let (tx, mut rx) = mpsc::channel::<Arrival>(HANDOFF_CAPACITY);

        let mut producers = JoinSet::new();
        for repo in repos {
            let tx = tx.clone();
            let unit = ctx.unit(repo, scope.clone(), Interruption::Cooperative);
            producers.spawn(async move {
                // errors only once the consumer has gone away
                let _ = tx.send(unit.await).await;
            });
        }
        drop(tx);

        let merged = {
            let mut arrivals = stream::poll_fn(|cx| rx.poll_recv(cx));
            merge_arrivals(&ctx, &mut arrivals, total).await
        };

        match merged {
            Merged::Stopped(outcome) => {
                scope.cancel();
                // closes the queue, releasing producers blocked on send
                drop(rx);
                drain(&mut producers).await;
                outcome
            }
            Merged::Exhausted(tally) => {
                while let Some(joined) = producers.join_next().await {
                    if let Err(err) = joined {
                        return StrategyOutcome::Failed(LoadError::from(err));
                    }
                }
                settle_tally(&ctx, tally, total)
            }
        }
    }
}
