//! Arrival-order merging of concurrent fetches.

use async_trait::async_trait;
use futures::stream::{self, FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::LoadError;
use crate::fetch::Interruption;
use crate::model::Repository;
use crate::strategy::{
    merge_arrivals, settle_tally, ExecutionStrategy, Merged, RunContext, StrategyOutcome,
    Variant,
};

/// All units run as one stream polled directly by the merge loop, so no
/// result is buffered between completion and merge. Returning early drops
/// every unit still in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct Streaming;

#[async_trait]
impl ExecutionStrategy for Streaming {
    fn variant(&self) -> Variant {
        Variant::Streaming
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let total = repos.len();
        let scope = ctx.token.child_token();
        let mut arrivals: FuturesUnordered<_> = repos
            .into_iter()
            .map(|repo| ctx.unit(repo, scope.clone(), Interruption::Cooperative))
            .collect();

        match merge_arrivals(&ctx, &mut arrivals, total).await {
            Merged::Stopped(outcome) => {
                scope.cancel();
                outcome
            }
            Merged::Exhausted(tally) => settle_tally(&ctx, tally, total),
        }
    }
}

/// Like [`Streaming`], but completed results are pushed by an upstream task
/// into a buffer of `buffer` entries, so fetches never wait on the merge.
#[derive(Debug, Clone, Copy)]
pub struct BufferedStreaming {
    buffer: usize,
}

impl BufferedStreaming {
    /// `buffer` of zero is raised to one.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }
}

#[async_trait]
impl ExecutionStrategy for BufferedStreaming {
    fn variant(&self) -> Variant {
        Variant::BufferedStreaming
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let total = repos.len();
        let scope = ctx.token.child_token();
        let mut units: FuturesUnordered<_> = repos
            .into_iter()
            .map(|repo| ctx.unit(repo, scope.clone(), Interruption::Cooperative))
            .collect();

        let (tx, mut rx) = mpsc::channel(self.buffer);
        let upstream = tokio::spawn(async move {
            while let Some(arrival) = units.next().await {
                if tx.send(arrival).await.is_err() {
                    break;
                }
            }
        });

        let merged = {
            let mut arrivals = stream::poll_fn(|cx| rx.poll_recv(cx));
            merge_arrivals(&ctx, &mut arrivals, total).await
        };

        match merged {
            Merged::Stopped(outcome) => {
                scope.cancel();
                upstream.abort();
                if let Err(err) = upstream.await {
                    debug!(cancelled = err.is_cancelled(), "upstream stopped");
                }
                outcome
            }
            Merged::Exhausted(tally) => match upstream.await {
                Ok(()) => settle_tally(&ctx, tally, total),
                Err(err) => StrategyOutcome::Failed(LoadError::from(err)),
            },
        }
    }
}
