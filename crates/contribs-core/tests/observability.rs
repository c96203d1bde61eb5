//! Observability tests for the load lifecycle.
//!
//! These verify that the structured events for load start, repository
//! listing, fetch failure and settle are emitted with their fields.

use std::sync::Arc;
use std::time::Duration;

use contribs_core::fakes::{RecordingSink, ScriptedGateway};
use contribs_core::obs::{
    emit_fetch_failed, emit_load_settled, emit_load_started, emit_repositories_listed, load_span,
};
use contribs_core::sink::{ResultSink, TracingSink};
use contribs_core::{
    GatewayError, LoadController, LoadId, LoadState, Organization, Variant,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_load_started_logs_org_and_variant() {
    emit_load_started(LoadId::new(), &Organization::new("acme"), Variant::FanOut);
    assert!(logs_contain("load.started"));
    assert!(logs_contain("org=acme"));
    assert!(logs_contain("variant=fan-out"));
}

#[traced_test]
#[test]
fn test_emit_repositories_listed_logs_count() {
    emit_repositories_listed(&Organization::new("acme"), 12);
    assert!(logs_contain("repos=12"));
}

#[traced_test]
#[test]
fn test_emit_fetch_failed_logs_warning() {
    let error = GatewayError::Transport("connection reset".into());
    emit_fetch_failed("widgets", &error);
    assert!(logs_contain("WARN"));
    assert!(logs_contain("connection reset"));
}

#[traced_test]
#[test]
fn test_emit_load_settled_logs_outcome() {
    emit_load_settled(LoadId::new(), &LoadState::Canceled, 42);
    assert!(logs_contain("outcome=\"canceled\""));
    assert!(logs_contain("elapsed_ms=42"));
}

#[traced_test]
#[test]
fn test_load_span_carries_load_id() {
    let id = LoadId::new();
    let span = load_span(id, &Organization::new("acme"), Variant::Streaming);
    let _entered = span.enter();
    tracing::info!("inside load span");
    assert!(logs_contain(&id.short()));
}

#[traced_test]
#[test]
fn test_tracing_sink_logs_status_line() {
    TracingSink.publish(LoadId::new(), &LoadState::Canceled);
    assert!(logs_contain("canceled"));
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn test_load_emits_lifecycle_events() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with_repo("a", &[("x", 3)])
            .with_failure("b", GatewayError::Status {
                status: 500,
                url: "/repos/acme/b/contributors".into(),
            })
            .with_delay("b", Duration::from_millis(5)),
    );
    let sink = Arc::new(RecordingSink::new());
    let controller = LoadController::new(gateway, sink);

    let state = controller
        .run(Organization::new("acme"), Variant::Sequential, None)
        .await;

    assert!(matches!(state, LoadState::Failed { .. }));
    assert!(logs_contain("load.started"));
    assert!(logs_contain("load.repositories_listed"));
    assert!(logs_contain("loaded contributors"));
    assert!(logs_contain("fetch.failed"));
    assert!(logs_contain("load.settled"));
    assert!(logs_contain("outcome=\"failed\""));
}
