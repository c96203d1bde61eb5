//! One repository at a time, on the load's own task.

use async_trait::async_trait;
use tracing::debug;

use crate::aggregator::Tally;
use crate::fetch::{fetch_contributors, Interruption};
use crate::model::Repository;
use crate::strategy::{unit_failure, ExecutionStrategy, RunContext, StrategyOutcome, Variant};

/// Serial scheduling in three flavours:
///
/// | constructor | in-flight call on cancel | snapshots |
/// |---|---|---|
/// | [`Serial::sequential`] | runs to completion, result discarded | none |
/// | [`Serial::structured`] | dropped | none |
/// | [`Serial::progressive`] | dropped | after each repository but the last |
///
/// All three check the token before each repository.
#[derive(Debug, Clone, Copy)]
pub struct Serial {
    variant: Variant,
    interruption: Interruption,
    report_progress: bool,
}

impl Serial {
    pub fn sequential() -> Self {
        Self {
            variant: Variant::Sequential,
            interruption: Interruption::RunToCompletion,
            report_progress: false,
        }
    }

    pub fn structured() -> Self {
        Self {
            variant: Variant::StructuredSequential,
            interruption: Interruption::Cooperative,
            report_progress: false,
        }
    }

    pub fn progressive() -> Self {
        Self {
            variant: Variant::Progressive,
            interruption: Interruption::Cooperative,
            report_progress: true,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for Serial {
    fn variant(&self) -> Variant {
        self.variant
    }

    async fn run(&self, ctx: RunContext, repos: Vec<Repository>) -> StrategyOutcome {
        let mut tally = Tally::new();
        let last = repos.len().saturating_sub(1);

        for (index, repo) in repos.iter().enumerate() {
            if ctx.token.is_cancelled() {
                debug!(done = index, total = repos.len(), "stopping between repositories");
                return StrategyOutcome::Canceled;
            }
            let fetched = fetch_contributors(
                ctx.gateway.as_ref(),
                &ctx.org,
                repo,
                &ctx.token,
                self.interruption,
            )
            .await;
            match fetched {
                Ok(records) => tally.absorb(&records),
                Err(err) => return unit_failure(err),
            }
            if self.report_progress && index < last {
                ctx.progress.report(tally.snapshot());
            }
        }

        if ctx.token.is_cancelled() {
            // last call finished after the cancel request; its result is discarded
            return StrategyOutcome::Canceled;
        }
        StrategyOutcome::Finished(tally.snapshot())
    }
}
