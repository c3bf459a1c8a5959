//! Disconnect/reconnect race tests
//!
//! The property under test: a disconnect notification for a session that
//! has already been superseded by a newer session for the same client
//! identity never removes that member.

mod common;

use common::now_ms;
use unison_protocol::{ConnectionState, ControlMode};
use unison_server::rooms::{IdentityTracker, Member, RoomRegistry};
use uuid::Uuid;

#[tokio::test]
async fn superseded_disconnect_never_evicts_the_member() {
    let registry = RoomRegistry::new(50);
    let identity = IdentityTracker::new();
    let now = now_ms();

    let room = registry.create(Member::new("alice", "Alice", now), ControlMode::Open, now);
    let code = room.code().to_string();

    // Alice's first session connects and joins.
    let old_session = Uuid::new_v4();
    identity.register("alice", old_session, "Alice");
    identity.set_room("alice", Some(code.clone()));

    // A fast reconnect: the new session registers before the old
    // session's disconnect notification arrives.
    let new_session = Uuid::new_v4();
    let replaced = identity.register("alice", new_session, "Alice");
    assert_eq!(replaced, Some(old_session));

    // Late disconnect for the old session: it is no longer current, so
    // the handler must skip membership entirely.
    assert!(identity.release_if_current("alice", old_session).is_none());
    {
        let inner = room.lock().await;
        assert_eq!(
            inner.member("alice").unwrap().connection,
            ConnectionState::Connected,
            "member must remain connected under the new session"
        );
    }

    // Replayed disconnect notifications stay no-ops.
    assert!(identity.release_if_current("alice", old_session).is_none());
    assert!(identity.is_current("alice", new_session));
    assert_eq!(identity.room_of("alice").as_deref(), Some(code.as_str()));
}

#[tokio::test]
async fn genuine_disconnect_marks_the_member_without_removal() {
    let registry = RoomRegistry::new(50);
    let identity = IdentityTracker::new();
    let now = now_ms();

    let room = registry.create(Member::new("alice", "Alice", now), ControlMode::Open, now);
    let session = Uuid::new_v4();
    identity.register("alice", session, "Alice");
    identity.set_room("alice", Some(room.code().to_string()));

    // The session is still current, so its disconnect is genuine.
    let record = identity.release_if_current("alice", session).unwrap();
    assert_eq!(record.room_code.as_deref(), Some(room.code()));

    {
        let mut inner = room.lock().await;
        assert!(inner.mark_disconnected("alice", now));
        // The record survives for a future rejoin; only its connection
        // state changed.
        let member = inner.member("alice").unwrap();
        assert_eq!(member.connection, ConnectionState::Disconnected);
    }

    // Rejoin revives the same member record.
    {
        let mut inner = room.lock().await;
        let is_new = inner.add_or_revive_member("alice", "Alice", now + 5_000);
        assert!(!is_new, "rejoin must not mint a second member");
        assert_eq!(
            inner.member("alice").unwrap().connection,
            ConnectionState::Connected
        );
        assert_eq!(inner.members.len(), 1);
    }
}
