//! Load Controller lifecycle tests: terminal states, cancellation, superseding
//! loads and deadlines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use contribs_core::fakes::{RecordingSink, ScriptedGateway};
use contribs_core::{
    ContributorRecord, GatewayError, GatewayResult, LoadController, LoadError, LoadState,
    Organization, Repository, SourceGateway, Variant,
};

fn acme() -> Organization {
    Organization::new("acme")
}

/// repos a: x=3, y=1 and b: x=2
fn example_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .with_repo("a", &[("x", 3), ("y", 1)])
        .with_repo("b", &[("x", 2)])
}

fn setup(gateway: ScriptedGateway) -> (Arc<ScriptedGateway>, Arc<RecordingSink>, LoadController) {
    let gateway = Arc::new(gateway);
    let sink = Arc::new(RecordingSink::new());
    let controller = LoadController::new(gateway.clone(), sink.clone());
    (gateway, sink, controller)
}

#[tokio::test(start_paused = true)]
async fn test_example_one_completes_with_merged_ranking() {
    let (gateway, sink, controller) = setup(example_gateway());

    let handle = controller.load(acme(), Variant::Sequential);
    let state = handle.wait().await;

    let LoadState::Completed { result, .. } = &state else {
        panic!("expected Completed, got {state:?}");
    };
    assert_eq!(result.pairs(), vec![("x", 5), ("y", 1)]);
    assert_eq!(gateway.calls(), vec!["a", "b"]);

    let states = sink.states_for(handle.id());
    assert_eq!(
        states[0],
        LoadState::InProgress {
            partial: Default::default()
        }
    );
    assert_eq!(sink.check_load(handle.id()).unwrap(), state);
    assert!(handle.is_settled());
    assert_eq!(handle.state(), Some(state));
}

#[tokio::test(start_paused = true)]
async fn test_example_two_zero_repositories_complete_immediately() {
    let (gateway, sink, controller) = setup(ScriptedGateway::new());

    let state = controller.run(acme(), Variant::FanOut, None).await;

    match state {
        LoadState::Completed { result, elapsed } => {
            assert!(result.is_empty());
            assert!(elapsed < Duration::from_millis(10));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert!(gateway.calls().is_empty());
    let id = controller.current().unwrap().id();
    assert!(sink.check_load(id).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_example_three_fan_out_failure_names_repo_and_cancels_siblings() {
    let (gateway, sink, controller) = setup(
        ScriptedGateway::new()
            .with_repo("a", &[("x", 1)])
            .with_delay("a", Duration::from_secs(1))
            .with_failure("b", GatewayError::Transport("connection reset".into()))
            .with_delay("b", Duration::from_millis(10))
            .with_repo("c", &[("y", 1)])
            .with_delay("c", Duration::from_secs(1)),
    );

    let handle = controller.load(acme(), Variant::FanOut);
    let state = handle.wait().await;

    let LoadState::Failed { cause } = &state else {
        panic!("expected Failed, got {state:?}");
    };
    assert_eq!(cause.repo(), Some("b"));
    assert!(cause.to_string().contains("connection reset"));

    let mut interrupted = gateway.interrupted();
    interrupted.sort();
    assert_eq!(interrupted, vec!["a", "c"]);
    assert_eq!(gateway.completed(), vec!["b"]);
    assert_eq!(sink.check_load(handle.id()).unwrap(), state);
}

#[tokio::test(start_paused = true)]
async fn test_example_four_cancel_after_first_progressive_unit() {
    let (gateway, sink, controller) = setup(
        ScriptedGateway::new()
            .with_repo("a", &[("x", 3)])
            .with_delay("a", Duration::from_millis(100))
            .with_repo("b", &[("y", 2)])
            .with_delay("b", Duration::from_millis(100))
            .with_repo("c", &[("z", 1)])
            .with_delay("c", Duration::from_millis(100)),
    );

    let handle = controller.load(acme(), Variant::Progressive);
    sink.wait_until(|events| {
        events
            .iter()
            .any(|(_, s)| matches!(s, LoadState::InProgress { partial } if !partial.is_empty()))
    })
    .await;
    assert!(handle.cancel());

    assert_eq!(handle.wait().await, LoadState::Canceled);
    // let the interrupted call unwind
    tokio::time::sleep(Duration::from_millis(1)).await;

    let states = sink.states_for(handle.id());
    assert_eq!(states.len(), 3);
    assert_eq!(states.last(), Some(&LoadState::Canceled));
    let last_partial = &sink.partials_for(handle.id())[1];
    assert_eq!(last_partial.pairs(), vec![("x", 3)]);

    assert_eq!(gateway.calls(), vec!["a", "b"]);
    assert_eq!(gateway.interrupted(), vec!["b"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_twice_yields_one_canceled_state() {
    let (_gateway, sink, controller) =
        setup(example_gateway().with_delay("a", Duration::from_secs(5)));

    let handle = controller.load(acme(), Variant::StructuredSequential);
    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert!(!controller.cancel());

    assert_eq!(handle.wait().await, LoadState::Canceled);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.terminals_for(handle.id()), vec![LoadState::Canceled]);
}

#[tokio::test]
async fn test_cancel_without_load_is_noop() {
    let (_gateway, sink, controller) = setup(example_gateway());
    assert!(!controller.cancel());
    assert!(controller.current().is_none());
    assert!(sink.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_completion_is_noop() {
    let (_gateway, sink, controller) = setup(example_gateway());

    let handle = controller.load(acme(), Variant::Streaming);
    assert!(matches!(handle.wait().await, LoadState::Completed { .. }));
    assert!(!controller.cancel());
    assert_eq!(sink.terminals_for(handle.id()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_load_supersedes_in_flight_load() {
    let (_gateway, sink, controller) =
        setup(example_gateway().with_delay("b", Duration::from_secs(1)));

    let first = controller.load(acme(), Variant::FanOut);
    let second = controller.load(acme(), Variant::Sequential);

    assert_eq!(first.wait().await, LoadState::Canceled);
    assert!(matches!(second.wait().await, LoadState::Completed { .. }));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(sink.terminals_for(first.id()), vec![LoadState::Canceled]);
    assert!(sink.check_load(second.id()).is_ok());

    // the first load settles before the second publishes anything
    let events = sink.events();
    let first_cancel = events
        .iter()
        .position(|(id, s)| *id == first.id() && *s == LoadState::Canceled)
        .unwrap();
    let second_start = events.iter().position(|(id, _)| *id == second.id()).unwrap();
    assert!(first_cancel < second_start);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_through_cancel_path() {
    let (gateway, sink, controller) =
        setup(example_gateway().with_delay("a", Duration::from_secs(10)));

    let started = tokio::time::Instant::now();
    let state = controller
        .run(acme(), Variant::FanOut, Some(Duration::from_secs(1)))
        .await;

    assert_eq!(state, LoadState::Canceled);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(1) && waited < Duration::from_secs(10));
    let id = controller.current().unwrap().id();
    assert_eq!(sink.check_load(id).unwrap(), LoadState::Canceled);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(gateway.interrupted(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_not_reached_returns_completion() {
    let (_gateway, _sink, controller) = setup(example_gateway());
    let state = controller
        .run(acme(), Variant::BoundedFanIn, Some(Duration::from_secs(30)))
        .await;
    assert!(matches!(state, LoadState::Completed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_repository_listing_failure_launches_no_units() {
    let (gateway, sink, controller) = setup(
        example_gateway().with_listing_failure(GatewayError::Status {
            status: 404,
            url: "/orgs/acme/repos".into(),
        }),
    );

    let state = controller.run(acme(), Variant::FanOut, None).await;

    let LoadState::Failed { cause } = &state else {
        panic!("expected Failed, got {state:?}");
    };
    assert!(matches!(cause, LoadError::Repositories { org, .. } if org == "acme"));
    assert!(gateway.calls().is_empty());
    let id = controller.current().unwrap().id();
    assert_eq!(sink.check_load(id).unwrap(), state);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_repository_listing() {
    let (gateway, _sink, controller) =
        setup(example_gateway().with_listing_delay(Duration::from_secs(5)));

    let handle = controller.load(acme(), Variant::Progressive);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(controller.cancel());

    assert_eq!(handle.wait().await, LoadState::Canceled);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_completed_elapsed_tracks_load_duration() {
    let (_gateway, _sink, controller) = setup(
        example_gateway()
            .with_delay("a", Duration::from_millis(300))
            .with_delay("b", Duration::from_millis(300)),
    );

    match controller.run(acme(), Variant::Sequential, None).await {
        LoadState::Completed { elapsed, .. } => {
            assert!(elapsed >= Duration::from_millis(600));
            assert!(elapsed < Duration::from_millis(700));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

/// Gateway whose contributor calls panic.
struct PanickingGateway;

#[async_trait]
impl SourceGateway for PanickingGateway {
    async fn list_repositories(&self, _org: &Organization) -> GatewayResult<Vec<Repository>> {
        Ok(vec![Repository::new("a"), Repository::new("b")])
    }

    async fn list_contributors(
        &self,
        _org: &Organization,
        _repo: &str,
    ) -> GatewayResult<Vec<ContributorRecord>> {
        panic!("gateway exploded")
    }
}

#[tokio::test]
async fn test_panicking_unit_settles_as_failed() {
    for variant in [Variant::Sequential, Variant::FanOut, Variant::Streaming] {
        let sink = Arc::new(RecordingSink::new());
        let controller = LoadController::new(Arc::new(PanickingGateway), sink.clone());

        let state = controller.run(acme(), variant, None).await;

        assert!(
            matches!(state, LoadState::Failed { cause: LoadError::Task(_) }),
            "{variant}: {state:?}"
        );
        let id = controller.current().unwrap().id();
        assert_eq!(sink.terminals_for(id).len(), 1);
    }
}
