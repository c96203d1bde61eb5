//! Contributor aggregation.
//!
//! [`aggregate`] merges any collection of per-repository contributor lists into
//! one ranked [`AggregatedResult`]. [`Tally`] is the incremental form used by
//! strategies that re-aggregate after every arrival; a tally that has absorbed
//! the same records as an `aggregate` call yields the identical result.

use std::collections::HashMap;

use crate::model::{AggregatedContributor, AggregatedResult, ContributorRecord};

/// Sum contributions per login across `lists` and rank the result.
///
/// Input order never affects the output.
pub fn aggregate<I, L>(lists: I) -> AggregatedResult
where
    I: IntoIterator<Item = L>,
    L: AsRef<[ContributorRecord]>,
{
    let mut tally = Tally::default();
    for list in lists {
        tally.absorb(list.as_ref());
    }
    tally.snapshot()
}

/// Running per-login totals owned by a single accumulator.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    totals: HashMap<String, u64>,
    lists_absorbed: usize,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one repository's records.
    pub fn absorb(&mut self, records: &[ContributorRecord]) {
        for record in records {
            let total = self.totals.entry(record.login.clone()).or_insert(0);
            *total = total.saturating_add(record.contributions);
        }
        self.lists_absorbed += 1;
    }

    /// Number of repository lists absorbed so far.
    pub fn lists_absorbed(&self) -> usize {
        self.lists_absorbed
    }

    /// Ranked view of the current totals.
    pub fn snapshot(&self) -> AggregatedResult {
        let mut ranked: Vec<AggregatedContributor> = self
            .totals
            .iter()
            .map(|(login, total)| AggregatedContributor {
                login: login.clone(),
                total_contributions: *total,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.total_contributions
                .cmp(&a.total_contributions)
                .then_with(|| a.login.cmp(&b.login))
        });
        AggregatedResult::from_ranked(ranked)
    }
}
