//! In-memory fakes for the gateway and sink traits (testing only)
//!
//! Provides `ScriptedGateway` and `RecordingSink` that satisfy the trait
//! contracts without any network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{AggregationError, GatewayError, GatewayResult};
use crate::gateway::SourceGateway;
use crate::model::{AggregatedResult, ContributorRecord, LoadId, LoadState, Organization, Repository};
use crate::sink::ResultSink;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RepoScript {
    delay: Duration,
    response: GatewayResult<Vec<ContributorRecord>>,
}

/// Gateway answering from a per-repository script.
///
/// Records every contributors call, which calls ran to completion and which
/// were dropped mid-flight (interrupted), and the peak number of concurrent
/// calls. Delays use `tokio::time`, so paused-clock tests stay deterministic.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    repos: Vec<Repository>,
    listing_failure: Option<GatewayError>,
    listing_delay: Duration,
    scripts: HashMap<String, RepoScript>,
    calls: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    interrupted: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository answering with `contributors`.
    pub fn with_repo(mut self, name: &str, contributors: &[(&str, u64)]) -> Self {
        let records = contributors
            .iter()
            .map(|(login, n)| ContributorRecord::new(*login, *n))
            .collect();
        self.script(name).response = Ok(records);
        self
    }

    /// Add a repository (or re-script an existing one) whose fetch fails.
    pub fn with_failure(mut self, name: &str, error: GatewayError) -> Self {
        self.script(name).response = Err(error);
        self
    }

    /// Delay the contributors call of `name`.
    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.script(name).delay = delay;
        self
    }

    /// Make the repository listing fail.
    pub fn with_listing_failure(mut self, error: GatewayError) -> Self {
        self.listing_failure = Some(error);
        self
    }

    /// Delay the repository listing.
    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    fn script(&mut self, name: &str) -> &mut RepoScript {
        if !self.repos.iter().any(|r| r.name == name) {
            self.repos.push(Repository::new(name));
        }
        self.scripts
            .entry(name.to_string())
            .or_insert_with(|| RepoScript {
                delay: Duration::ZERO,
                response: Ok(Vec::new()),
            })
    }

    /// Repositories in listing order.
    pub fn repositories(&self) -> Vec<Repository> {
        self.repos.clone()
    }

    /// Repositories whose contributors call was issued, in issue order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Calls that returned a response.
    pub fn completed(&self) -> Vec<String> {
        lock(&self.completed).clone()
    }

    /// Calls dropped before they returned.
    pub fn interrupted(&self) -> Vec<String> {
        lock(&self.interrupted).clone()
    }

    /// Calls currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously outstanding calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Marks a call interrupted unless it reaches its response.
struct CallGuard<'a> {
    gateway: &'a ScriptedGateway,
    repo: String,
    finished: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.gateway.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            lock(&self.gateway.interrupted).push(self.repo.clone());
        }
    }
}

#[async_trait]
impl SourceGateway for ScriptedGateway {
    async fn list_repositories(&self, _org: &Organization) -> GatewayResult<Vec<Repository>> {
        if !self.listing_delay.is_zero() {
            tokio::time::sleep(self.listing_delay).await;
        }
        match &self.listing_failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.repos.clone()),
        }
    }

    async fn list_contributors(
        &self,
        org: &Organization,
        repo: &str,
    ) -> GatewayResult<Vec<ContributorRecord>> {
        lock(&self.calls).push(repo.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let mut guard = CallGuard {
            gateway: self,
            repo: repo.to_string(),
            finished: false,
        };

        let script = self.scripts.get(repo).cloned();
        let delay = script.as_ref().map(|s| s.delay).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        guard.finished = true;
        lock(&self.completed).push(repo.to_string());
        drop(guard);

        match script {
            Some(script) => script.response,
            None => Err(GatewayError::Status {
                status: 404,
                url: format!("/repos/{org}/{repo}/contributors"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Sink that keeps every notification for later inspection.
#[derive(Debug)]
pub struct RecordingSink {
    states: Mutex<Vec<(LoadId, LoadState)>>,
    published: watch::Sender<usize>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            states: Mutex::new(Vec::new()),
            published: watch::Sender::new(0),
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification in publish order.
    pub fn events(&self) -> Vec<(LoadId, LoadState)> {
        lock(&self.states).clone()
    }

    /// Notifications of one load.
    pub fn states_for(&self, load: LoadId) -> Vec<LoadState> {
        lock(&self.states)
            .iter()
            .filter(|(id, _)| *id == load)
            .map(|(_, state)| state.clone())
            .collect()
    }

    /// Every state, ignoring which load published it.
    pub fn states(&self) -> Vec<LoadState> {
        lock(&self.states).iter().map(|(_, s)| s.clone()).collect()
    }

    /// Snapshots carried by `InProgress` notifications of `load`.
    pub fn partials_for(&self, load: LoadId) -> Vec<AggregatedResult> {
        self.states_for(load)
            .into_iter()
            .filter_map(|state| match state {
                LoadState::InProgress { partial } => Some(partial),
                _ => None,
            })
            .collect()
    }

    /// Terminal states of `load`; a correct controller publishes exactly one.
    pub fn terminals_for(&self, load: LoadId) -> Vec<LoadState> {
        self.states_for(load)
            .into_iter()
            .filter(LoadState::is_terminal)
            .collect()
    }

    /// Check that `load` published one terminal state, last, and that its
    /// snapshots only ever grew.
    pub fn check_load(&self, load: LoadId) -> Result<LoadState, AggregationError> {
        let states = self.states_for(load);
        let terminals: Vec<&LoadState> = states.iter().filter(|s| s.is_terminal()).collect();
        if terminals.len() != 1 {
            return Err(AggregationError::new(format!(
                "expected one terminal state, saw {}",
                terminals.len()
            )));
        }
        let last = states
            .last()
            .filter(|s| s.is_terminal())
            .cloned()
            .ok_or_else(|| AggregationError::new("terminal state is not the last notification"))?;

        let mut previous = AggregatedResult::default();
        for snapshot in states.iter().filter_map(LoadState::contributors) {
            snapshot.check_ranking()?;
            snapshot.check_extends(&previous)?;
            previous = snapshot.clone();
        }
        Ok(last)
    }

    /// Wait until `predicate` holds for the notifications published so far.
    pub async fn wait_until<F>(&self, predicate: F)
    where
        F: Fn(&[(LoadId, LoadState)]) -> bool,
    {
        let mut published = self.published.subscribe();
        let _ = published
            .wait_for(|_| predicate(&lock(&self.states)))
            .await;
    }
}

impl ResultSink for RecordingSink {
    fn publish(&self, load: LoadId, state: &LoadState) {
        let count = {
            let mut states = lock(&self.states);
            states.push((load, state.clone()));
            states.len()
        };
        self.published.send_replace(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_gateway_lists_repos_in_insertion_order() {
        let gateway = ScriptedGateway::new()
            .with_repo("b", &[("x", 1)])
            .with_repo("a", &[])
            .with_delay("b", Duration::from_millis(1));
        let repos = gateway
            .list_repositories(&Organization::new("acme"))
            .await
            .unwrap();
        let names: Vec<&str> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_unknown_repo_is_not_found() {
        let gateway = ScriptedGateway::new();
        let err = gateway
            .list_contributors(&Organization::new("acme"), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 404, .. }));
        assert_eq!(gateway.completed(), vec!["nope".to_string()]);
        assert_eq!(gateway.in_flight(), 0);
    }

    #[test]
    fn test_recording_sink_check_load_rejects_missing_terminal() {
        let sink = RecordingSink::new();
        let load = LoadId::new();
        sink.publish(
            load,
            &LoadState::InProgress {
                partial: AggregatedResult::default(),
            },
        );
        assert!(sink.check_load(load).is_err());
        sink.publish(load, &LoadState::Canceled);
        assert_eq!(sink.check_load(load).unwrap(), LoadState::Canceled);
        sink.publish(load, &LoadState::Canceled);
        assert!(sink.check_load(load).is_err());
    }
}
