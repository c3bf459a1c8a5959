//! Sync engine integration tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::MockTransport;
use unison_protocol::{
    ClientRequest, PlaybackStatus, ResponseData, ServerEvent, SyncState,
};
use unison_shared_config::SyncTuning;
use unison_sync_client::{SyncEngine, TransportError};
use unison_test_utils::fixtures;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn engine(transport: Arc<MockTransport>) -> SyncEngine {
    SyncEngine::new(transport, &SyncTuning::default())
}

#[tokio::test]
async fn join_applies_the_snapshot_and_resyncs_the_clock() {
    let transport = Arc::new(MockTransport::connected());
    transport.set_server_offset_ms(1_000);
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a", "b"],
        0,
        now_ms(),
    )))));

    let engine = engine(transport.clone());
    let snapshot = engine.join_room("123456").await.unwrap();

    assert_eq!(snapshot.code, "123456");
    let local = engine.local_state().await.unwrap();
    assert_eq!(local.room_code, "123456");
    assert_eq!(local.playlist.len(), 2);

    // Join triggers a full clock sync round.
    let probes = transport
        .requests()
        .iter()
        .filter(|r| matches!(r, ClientRequest::TimeSyncRequest { .. }))
        .count();
    assert_eq!(probes, SyncTuning::default().clock_probe_count);
    let offset = engine.clock().offset_ms();
    assert!(
        (offset - 1_000.0).abs() < 50.0,
        "offset {offset} should be near the configured 1000ms"
    );
}

#[tokio::test]
async fn play_supersedes_the_last_confirmed_version() {
    let transport = Arc::new(MockTransport::connected());
    // Snapshot confirms version 1.
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));

    let engine = engine(transport.clone());
    engine.join_room("123456").await.unwrap();

    let confirmed = fixtures::playing_sync("a", 0, now_ms(), 2);
    transport.push_response(Ok(Some(ResponseData::Sync(confirmed))));

    engine.play(None, 0).await.unwrap();

    let intent_version = transport
        .requests()
        .iter()
        .find_map(|r| match r {
            ClientRequest::SyncPlay(intent) => Some(intent.version),
            _ => None,
        })
        .unwrap();
    assert_eq!(intent_version, 2, "intent supersedes confirmed version 1");

    // The server-confirmed state is what lands in the mirror.
    assert_eq!(engine.local_state().await.unwrap().sync.version, 2);
}

#[tokio::test]
async fn playback_ops_require_a_room() {
    let transport = Arc::new(MockTransport::connected());
    let engine = engine(transport);

    let err = engine.play(None, 0).await.unwrap_err();
    assert_matches!(err, TransportError::Failed(_));
}

#[tokio::test]
async fn requests_fail_fast_when_disconnected() {
    let transport = Arc::new(MockTransport::disconnected());
    let engine = engine(transport);

    let err = engine.join_room("123456").await.unwrap_err();
    assert_matches!(err, TransportError::NotConnected);
}

#[tokio::test(start_paused = true)]
async fn hung_requests_resolve_to_timeout() {
    let transport = Arc::new(MockTransport::connected());
    // Far beyond the 5s request timeout.
    transport.set_request_delay(Duration::from_secs(30));

    let engine = engine(transport);
    let err = engine.heartbeat().await.unwrap_err();
    assert_matches!(err, TransportError::Timeout);
}

#[tokio::test]
async fn out_of_order_sync_push_cannot_regress_the_mirror() {
    let transport = Arc::new(MockTransport::connected());
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));

    let engine = engine(transport);
    engine.join_room("123456").await.unwrap();

    // A newer state arrives first...
    let newer = fixtures::playing_sync("a", 30_000, now_ms(), 4);
    engine.handle_event(ServerEvent::SyncStateChanged(newer)).await;
    assert_eq!(engine.local_state().await.unwrap().sync.version, 4);

    // ...then a late delivery of an older one. It must be dropped.
    let older = fixtures::playing_sync("a", 5_000, now_ms(), 2);
    engine.handle_event(ServerEvent::SyncStateChanged(older)).await;

    let local = engine.local_state().await.unwrap();
    assert_eq!(local.sync.version, 4);
    assert_eq!(local.sync.position_ms, 30_000);
}

#[tokio::test]
async fn queue_ack_updates_the_local_queue() {
    let transport = Arc::new(MockTransport::connected());
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));

    let engine = engine(transport.clone());
    engine.join_room("123456").await.unwrap();

    let view = fixtures::snapshot("123456", &["a", "b"], 0, now_ms()).queue_view();
    transport.push_response(Ok(Some(ResponseData::Queue(view))));

    let result = engine.add_track("b").await.unwrap();
    assert_eq!(result.playlist.len(), 2);

    let local = engine.local_state().await.unwrap();
    assert_eq!(local.playlist.len(), 2);
}

#[tokio::test]
async fn rejections_surface_their_server_code() {
    let transport = Arc::new(MockTransport::connected());
    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));

    let engine = engine(transport.clone());
    engine.join_room("123456").await.unwrap();

    transport.push_response(Err(TransportError::Rejected {
        code: "TRACK_CHANGE_DEBOUNCED".into(),
        message: "another track change was accepted".into(),
    }));

    let err = engine.play(Some("b".into()), 0).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.code(), Some("TRACK_CHANGE_DEBOUNCED"));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_task_ticks_only_while_in_a_room() {
    let transport = Arc::new(MockTransport::connected());
    let engine = Arc::new(engine(transport.clone()));
    let task = engine.start_heartbeat();

    // No room joined: a full interval passes with no heartbeat.
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert!(!transport
        .requests()
        .iter()
        .any(|r| matches!(r, ClientRequest::SyncHeartbeat(_))));

    transport.push_response(Ok(Some(ResponseData::Room(fixtures::snapshot(
        "123456",
        &["a"],
        0,
        now_ms(),
    )))));
    engine.join_room("123456").await.unwrap();

    transport.push_response(Ok(Some(ResponseData::Heartbeat { server_time_ms: 1 })));
    tokio::time::sleep(Duration::from_secs(301)).await;

    assert!(transport
        .requests()
        .iter()
        .any(|r| matches!(r, ClientRequest::SyncHeartbeat(_))));

    task.abort();
}

#[tokio::test]
async fn pushed_snapshot_seeds_an_empty_mirror() {
    let transport = Arc::new(MockTransport::connected());
    let engine = engine(transport);

    let state_before: Option<SyncState> = engine.local_state().await.map(|l| l.sync);
    assert!(state_before.is_none());

    engine
        .handle_event(ServerEvent::StateSnapshot(fixtures::snapshot(
            "654321",
            &["x"],
            0,
            now_ms(),
        )))
        .await;

    let local = engine.local_state().await.unwrap();
    assert_eq!(local.room_code, "654321");
    assert_eq!(local.sync.status, PlaybackStatus::Playing);
}
