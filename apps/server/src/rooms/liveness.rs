//! Member liveness sweeping
//!
//! Transport-level disconnects are handled by the socket tasks, but a
//! session can die without the transport ever signaling loss. The sweeper
//! catches those zombies: any member silent past the heartbeat timeout is
//! marked disconnected and a `member:timeout` event is broadcast to the
//! room. Rooms left with nobody connected are torn down after the
//! inactivity timeout.

use std::sync::Arc;

use tokio::task::JoinHandle;
use unison_protocol::{ConnectionState, ServerEvent};
use unison_shared_config::SyncTuning;

use crate::rooms::registry::RoomRegistry;
use crate::rooms::room::RoomInner;
use crate::util::now_ms;
use crate::websocket::broadcast::RoomChannels;

/// Members that have missed the heartbeat timeout
///
/// Pure so the sweep decision is unit-testable; mutation happens in the
/// caller under the room lock.
pub fn timed_out_members(inner: &RoomInner, now_ms: i64, timeout_ms: i64) -> Vec<String> {
    inner
        .members
        .iter()
        .filter(|m| {
            m.connection != ConnectionState::Disconnected
                && now_ms.saturating_sub(m.last_heartbeat_ms) > timeout_ms
        })
        .map(|m| m.client_id.clone())
        .collect()
}

/// One sweep over every room: time out silent members, reap idle rooms
pub async fn sweep_once(
    registry: &RoomRegistry,
    channels: &RoomChannels,
    tuning: &SyncTuning,
    now_ms: i64,
) {
    let timeout_ms = (tuning.heartbeat_timeout_secs * 1000) as i64;

    for room in registry.all() {
        let timed_out = {
            let mut inner = room.lock().await;
            let silent = timed_out_members(&inner, now_ms, timeout_ms);
            for client_id in &silent {
                inner.mark_disconnected(client_id, now_ms);
            }
            silent
        };

        for client_id in timed_out {
            tracing::warn!(
                room = %room.code(),
                client_id = %client_id,
                "member missed heartbeat timeout"
            );
            channels.publish(
                room.code(),
                None,
                ServerEvent::MemberTimeout { client_id },
            );
        }
    }

    let inactive_ms = (tuning.room_inactive_timeout_secs * 1000) as i64;
    for code in registry.sweep_inactive(now_ms, inactive_ms).await {
        channels.drop_room(&code);
    }
}

/// Spawn the periodic liveness sweeper
pub fn spawn_sweeper(
    registry: RoomRegistry,
    channels: RoomChannels,
    tuning: Arc<SyncTuning>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tuning.heartbeat_interval());
        // The first tick fires immediately; skip it so a fresh server
        // doesn't sweep before anyone has had a chance to heartbeat.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_once(&registry, &channels, &tuning, now_ms()).await;
        }
    })
}
