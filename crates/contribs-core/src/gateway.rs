//! Source Gateway: the remote data source the loader reads from.

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::model::{ContributorRecord, Organization, Repository};

/// Injectable data source for repositories and their contributors.
///
/// Implement this trait to plug in the GitHub API or test stubs. Each call
/// returns a single pass/fail response. Dropping a call's future abandons it;
/// implementations should tolerate that.
#[async_trait]
pub trait SourceGateway: Send + Sync {
    /// List the repositories of `org`.
    async fn list_repositories(&self, org: &Organization) -> GatewayResult<Vec<Repository>>;

    /// List the contributors of `org/repo`.
    async fn list_contributors(
        &self,
        org: &Organization,
        repo: &str,
    ) -> GatewayResult<Vec<ContributorRecord>>;
}
