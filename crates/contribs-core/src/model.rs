//! Contributor data model: organizations, repositories, per-repo records and
//! the ranked aggregate produced from them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AggregationError, LoadError};

/// Identifies the organization whose repositories are loaded.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Organization(String);

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A repository of the organization. The owner is implied by the [`Organization`].
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
}

impl Repository {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Contributions of one user to one repository.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContributorRecord {
    pub login: String,
    pub contributions: u64,
}

impl ContributorRecord {
    pub fn new(login: impl Into<String>, contributions: u64) -> Self {
        Self {
            login: login.into(),
            contributions,
        }
    }
}

/// A login's contributions summed across every repository seen so far.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct AggregatedContributor {
    pub login: String,
    pub total_contributions: u64,
}

/// Ranked contributor list: `total_contributions` descending, then `login` ascending.
///
/// Only the aggregator builds these, so the ordering always holds. A new
/// snapshot replaces the previous one wholesale.
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedResult(Vec<AggregatedContributor>);

impl AggregatedResult {
    pub(crate) fn from_ranked(ranked: Vec<AggregatedContributor>) -> Self {
        Self(ranked)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AggregatedContributor> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[AggregatedContributor] {
        &self.0
    }

    /// Total for `login`, or `None` when the login has not been seen.
    pub fn total_for(&self, login: &str) -> Option<u64> {
        self.0
            .iter()
            .find(|c| c.login == login)
            .map(|c| c.total_contributions)
    }

    /// `(login, total)` pairs in rank order.
    pub fn pairs(&self) -> Vec<(&str, u64)> {
        self.0
            .iter()
            .map(|c| (c.login.as_str(), c.total_contributions))
            .collect()
    }

    /// Verify the ranking invariant: totals descending, ties by login ascending,
    /// no login listed twice.
    pub fn check_ranking(&self) -> Result<(), AggregationError> {
        for pair in self.0.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let ordered = a.total_contributions > b.total_contributions
                || (a.total_contributions == b.total_contributions && a.login < b.login);
            if !ordered {
                return Err(AggregationError::new(format!(
                    "'{}' ({}) ranked before '{}' ({})",
                    a.login, a.total_contributions, b.login, b.total_contributions
                )));
            }
        }
        Ok(())
    }

    /// Verify that this snapshot only grows `previous`: every login keeps at
    /// least its earlier total.
    pub fn check_extends(&self, previous: &AggregatedResult) -> Result<(), AggregationError> {
        for earlier in previous.iter() {
            match self.total_for(&earlier.login) {
                Some(total) if total >= earlier.total_contributions => {}
                Some(total) => {
                    return Err(AggregationError::new(format!(
                        "total for '{}' shrank from {} to {}",
                        earlier.login, earlier.total_contributions, total
                    )))
                }
                None => {
                    return Err(AggregationError::new(format!(
                        "'{}' disappeared from the snapshot",
                        earlier.login
                    )))
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AggregatedResult {
    type Item = &'a AggregatedContributor;
    type IntoIter = std::slice::Iter<'a, AggregatedContributor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Identifies one load operation in logs and sink notifications.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LoadId(pub Uuid);

impl LoadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for LoadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of one load as seen by a [`ResultSink`](crate::sink::ResultSink).
///
/// `InProgress` may repeat; exactly one of the other three ends the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Complete current snapshot; replaces any earlier one.
    InProgress { partial: AggregatedResult },
    Completed {
        result: AggregatedResult,
        elapsed: Duration,
    },
    Canceled,
    Failed { cause: LoadError },
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadState::InProgress { .. })
    }

    /// The contributor list carried by this state, if any.
    pub fn contributors(&self) -> Option<&AggregatedResult> {
        match self {
            LoadState::InProgress { partial } => Some(partial),
            LoadState::Completed { result, .. } => Some(result),
            LoadState::Canceled | LoadState::Failed { .. } => None,
        }
    }

    /// Short lowercase name used in structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            LoadState::InProgress { .. } => "in_progress",
            LoadState::Completed { .. } => "completed",
            LoadState::Canceled => "canceled",
            LoadState::Failed { .. } => "failed",
        }
    }

    /// Human readable status, e.g. `completed in 1.2 sec, 3 users`.
    pub fn status_line(&self) -> String {
        match self {
            LoadState::InProgress { partial } => {
                format!("in progress, {} users so far", partial.len())
            }
            LoadState::Completed { result, elapsed } => format!(
                "completed in {}, {} users",
                format_elapsed(*elapsed),
                result.len()
            ),
            LoadState::Canceled => "canceled".to_string(),
            LoadState::Failed { cause } => format!("failed: {cause}"),
        }
    }
}

/// Render a duration as seconds with one decimal, truncated: `1234ms` -> `1.2 sec`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    format!("{}.{} sec", millis / 1000, millis % 1000 / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributor(login: &str, total: u64) -> AggregatedContributor {
        AggregatedContributor {
            login: login.to_string(),
            total_contributions: total,
        }
    }

    #[test]
    fn test_ranking_check_accepts_ties_broken_by_login() {
        let ranked = AggregatedResult::from_ranked(vec![
            contributor("x", 5),
            contributor("a", 1),
            contributor("b", 1),
        ]);
        assert!(ranked.check_ranking().is_ok());
    }

    #[test]
    fn test_ranking_check_rejects_wrong_tie_order() {
        let ranked = AggregatedResult::from_ranked(vec![contributor("b", 1), contributor("a", 1)]);
        let err = ranked.check_ranking().unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_ranking_check_rejects_duplicate_login() {
        let ranked = AggregatedResult::from_ranked(vec![contributor("a", 1), contributor("a", 1)]);
        assert!(ranked.check_ranking().is_err());
    }

    #[test]
    fn test_check_extends_detects_shrinking_total() {
        let before = AggregatedResult::from_ranked(vec![contributor("x", 3)]);
        let after = AggregatedResult::from_ranked(vec![contributor("x", 2)]);
        assert!(after.check_extends(&before).is_err());
        assert!(before.check_extends(&after).is_ok());
    }

    #[test]
    fn test_check_extends_detects_missing_login() {
        let before = AggregatedResult::from_ranked(vec![contributor("x", 3)]);
        let after = AggregatedResult::from_ranked(vec![contributor("y", 9)]);
        assert!(after.check_extends(&before).is_err());
    }

    #[test]
    fn test_format_elapsed_truncates_to_tenths() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "0.0 sec");
        assert_eq!(format_elapsed(Duration::from_millis(1299)), "1.2 sec");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "61.0 sec");
    }

    #[test]
    fn test_status_lines() {
        let result = AggregatedResult::from_ranked(vec![contributor("x", 5), contributor("y", 1)]);
        let completed = LoadState::Completed {
            result,
            elapsed: Duration::from_millis(2500),
        };
        assert_eq!(completed.status_line(), "completed in 2.5 sec, 2 users");
        assert_eq!(LoadState::Canceled.status_line(), "canceled");
        assert!(completed.is_terminal());
        assert!(!LoadState::InProgress {
            partial: AggregatedResult::default()
        }
        .is_terminal());
    }

    #[test]
    fn test_contributor_record_decodes_github_payload() {
        let json = r#"{"login":"octocat","id":1,"contributions":32,"type":"User"}"#;
        let record: ContributorRecord = serde_json::from_str(json).expect("decode");
        assert_eq!(record, ContributorRecord::new("octocat", 32));
    }

    #[test]
    fn test_aggregated_result_serializes_as_list() {
        let result = AggregatedResult::from_ranked(vec![contributor("x", 5)]);
        let json = serde_json::to_string(&result).expect("serialize");
        assert_eq!(json, r#"[{"login":"x","total_contributions":5}]"#);
    }

    #[test]
    fn test_load_id_short_is_eight_chars() {
        assert_eq!(LoadId::new().short().len(), 8);
    }
}
