//! Reconnection orchestrator integration tests

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::MockTransport;
use unison_protocol::ResponseData;
use unison_shared_config::SyncTuning;
use unison_sync_client::{
    ClockSynchronizer, ConnectionPhase, ConnectivityEvent, ReconcileOutcome, Reconciler,
    ReconnectOutcome, ReconnectionOrchestrator, TransportError,
};
use unison_test_utils::fixtures;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn orchestrator(max_attempts: u32) -> ReconnectionOrchestrator {
    let tuning = SyncTuning::default();
    let clock = Arc::new(ClockSynchronizer::new(&tuning));
    let reconciler = Arc::new(Reconciler::new(clock, &tuning));
    ReconnectionOrchestrator::new(reconciler, max_attempts)
}

#[tokio::test]
async fn foreground_while_offline_never_reconciles() {
    let transport = MockTransport::disconnected();
    let orchestrator = orchestrator(5);
    let mut local = None;

    let outcome = orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::AppForegrounded)
        .await
        .unwrap();

    assert_matches!(outcome, ReconnectOutcome::Ignored);
    assert!(transport.requests().is_empty(), "no snapshot may be fetched offline");
}

#[tokio::test]
async fn foreground_while_connected_reconciles() {
    let transport = MockTransport::connected();
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));

    let orchestrator = orchestrator(5);
    let mut local = None;

    let outcome = orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::AppForegrounded)
        .await
        .unwrap();

    assert_matches!(
        outcome,
        ReconnectOutcome::Reconciled(ReconcileOutcome::Applied { .. })
    );
    assert!(local.is_some());
}

#[tokio::test(start_paused = true)]
async fn online_retries_until_the_connection_holds() {
    let transport = MockTransport::disconnected();
    transport.push_connect_result(Err(TransportError::ConnectFailed("refused".into())));
    transport.push_connect_result(Err(TransportError::ConnectFailed("refused".into())));
    transport.push_connect_result(Ok(()));
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));

    let orchestrator = orchestrator(5);
    let mut local = None;

    let outcome = orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::Online)
        .await
        .unwrap();

    assert_matches!(outcome, ReconnectOutcome::Reconciled(_));
    assert_eq!(transport.connect_attempts(), 3);
    assert_eq!(orchestrator.phase().await, ConnectionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_park_in_the_failed_state() {
    let transport = MockTransport::disconnected();
    for _ in 0..5 {
        transport.push_connect_result(Err(TransportError::ConnectFailed("refused".into())));
    }

    let orchestrator = orchestrator(5);
    let mut local = None;

    let outcome = orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::Online)
        .await
        .unwrap();

    assert_matches!(outcome, ReconnectOutcome::Failed { attempts: 5 });
    assert_eq!(orchestrator.phase().await, ConnectionPhase::Failed);

    // A stray connectivity event does not leave the terminal state...
    let outcome = orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::Online)
        .await
        .unwrap();
    assert_matches!(outcome, ReconnectOutcome::Ignored);
    assert_eq!(transport.connect_attempts(), 5);

    // ...only an explicit user retry does, with the counter reset.
    transport.push_connect_result(Ok(()));
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));

    let outcome = orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::UserRetry)
        .await
        .unwrap();
    assert_matches!(outcome, ReconnectOutcome::Reconciled(_));
    assert_eq!(transport.connect_attempts(), 6);
}

#[tokio::test]
async fn offline_event_moves_the_phase() {
    let transport = MockTransport::connected();
    let orchestrator = orchestrator(5);
    let mut local = None;

    orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::Offline)
        .await
        .unwrap();

    assert_eq!(orchestrator.phase().await, ConnectionPhase::Offline);
}

#[tokio::test]
async fn backgrounding_is_a_no_op() {
    let transport = MockTransport::connected();
    let orchestrator = orchestrator(5);
    let mut local = None;

    let outcome = orchestrator
        .handle_event(&transport, &mut local, ConnectivityEvent::AppBackgrounded)
        .await
        .unwrap();

    assert_matches!(outcome, ReconnectOutcome::Ignored);
    assert!(transport.requests().is_empty());
}
