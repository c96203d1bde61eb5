//! Fetch Unit: contributors of one repository.
//!
//! The unit of concurrency and cancellation. A unit whose token is already
//! cancelled never contacts the gateway; once issued, [`Interruption`] decides
//! whether the call may be abandoned mid-flight.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::gateway::SourceGateway;
use crate::metrics::METRICS;
use crate::model::{ContributorRecord, Organization, Repository};
use crate::obs::emit_fetch_failed;

/// How an issued call reacts to cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// Race the call against the token; cancellation drops the call.
    Cooperative,
    /// Let the call finish; the caller decides whether to discard its result.
    RunToCompletion,
}

/// Fetch the contributors of `repo`.
pub async fn fetch_contributors(
    gateway: &dyn SourceGateway,
    org: &Organization,
    repo: &Repository,
    token: &CancellationToken,
    interruption: Interruption,
) -> Result<Vec<ContributorRecord>, FetchError> {
    if token.is_cancelled() {
        debug!(repo = %repo.name, "fetch skipped, load already canceled");
        return Err(FetchError::Canceled {
            repo: repo.name.clone(),
        });
    }

    METRICS.inc_fetches_started();
    let call = gateway.list_contributors(org, &repo.name);
    let response = match interruption {
        Interruption::Cooperative => {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    METRICS.inc_fetches_interrupted();
                    debug!(repo = %repo.name, "fetch interrupted by cancellation");
                    return Err(FetchError::Canceled { repo: repo.name.clone() });
                }
                response = call => response,
            }
        }
        Interruption::RunToCompletion => call.await,
    };

    match response {
        Ok(records) => {
            info!(repo = %repo.name, contributors = records.len(), "loaded contributors");
            Ok(records)
        }
        Err(source) => {
            METRICS.inc_fetches_failed();
            emit_fetch_failed(&repo.name, &source);
            Err(FetchError::Gateway {
                repo: repo.name.clone(),
                source,
            })
        }
    }
}
