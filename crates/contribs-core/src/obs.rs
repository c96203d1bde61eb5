//! Structured observability hooks for the load lifecycle.
//!
//! This module provides:
//! - a load-scoped span that the controller instruments its driver task with
//! - emission functions for key lifecycle events: start, repository listing,
//!   fetch failure, settle
//!
//! Events are emitted at `info!` level (filter with `CONTRIBS_LOG`).

use tracing::{info, warn, Span};

use crate::model::{LoadId, LoadState, Organization};
use crate::strategy::Variant;

/// Span tagging every event of one load with its id, org and variant.
pub fn load_span(load_id: LoadId, org: &Organization, variant: Variant) -> Span {
    tracing::info_span!(
        "contribs.load",
        load_id = %load_id.short(),
        org = %org,
        variant = %variant,
    )
}

/// Emit event: a load started.
pub fn emit_load_started(load_id: LoadId, org: &Organization, variant: Variant) {
    info!(event = "load.started", load_id = %load_id.short(), org = %org, variant = %variant);
}

/// Emit event: the organization's repositories were listed.
///
/// ```ignore
/// emit_repositories_listed(&org, 12);
/// // logs: event=load.repositories_listed org=acme repos=12
/// ```
pub fn emit_repositories_listed(org: &Organization, repos: usize) {
    info!(event = "load.repositories_listed", org = %org, repos = repos);
}

/// Emit event: one repository's fetch failed (warning level).
pub fn emit_fetch_failed(repo: &str, error: &dyn std::fmt::Display) {
    warn!(event = "fetch.failed", repo = %repo, error = %error);
}

/// Emit event: a load reached its terminal state.
pub fn emit_load_settled(load_id: LoadId, state: &LoadState, elapsed_ms: u64) {
    let contributors = state.contributors().map(|c| c.len()).unwrap_or(0);
    match state {
        LoadState::Failed { cause } => warn!(
            event = "load.settled",
            load_id = %load_id.short(),
            outcome = state.label(),
            elapsed_ms = elapsed_ms,
            error = %cause,
        ),
        _ => info!(
            event = "load.settled",
            load_id = %load_id.short(),
            outcome = state.label(),
            elapsed_ms = elapsed_ms,
            contributors = contributors,
        ),
    }
}
