//! Room state and membership
//!
//! A room owns the only mutable copy of its playback state. Everything
//! behind `Room::lock()` mutates under a single tokio mutex, which is what
//! serializes concurrent requests for the same room; different rooms never
//! contend.

use tokio::sync::{Mutex, MutexGuard};
use unison_protocol::{
    ConnectionState, ControlMode, MemberInfo, RoomSnapshot, SyncState,
};

use crate::error::{ServerError, ServerResult};
use crate::rooms::queue::Queue;

/// Server-side record of one room member
#[derive(Debug, Clone)]
pub struct Member {
    pub client_id: String,
    pub display_name: String,
    pub connection: ConnectionState,

    /// When this member first joined (Unix ms); drives host succession
    pub connected_at_ms: i64,

    pub last_seen_ms: i64,

    /// Last explicit liveness heartbeat (Unix ms)
    pub last_heartbeat_ms: i64,

    pub latency_ms: Option<f64>,
    pub clock_offset_ms: Option<f64>,
}

impl Member {
    pub fn new(client_id: &str, display_name: &str, now_ms: i64) -> Self {
        Self {
            client_id: client_id.to_string(),
            display_name: display_name.to_string(),
            connection: ConnectionState::Connected,
            connected_at_ms: now_ms,
            last_seen_ms: now_ms,
            last_heartbeat_ms: now_ms,
            latency_ms: None,
            clock_offset_ms: None,
        }
    }

    /// Refresh activity timestamps
    pub fn touch(&mut self, now_ms: i64) {
        self.last_seen_ms = now_ms;
    }

    pub fn to_info(&self, host_id: &str) -> MemberInfo {
        MemberInfo {
            client_id: self.client_id.clone(),
            display_name: self.display_name.clone(),
            is_host: self.client_id == host_id,
            connection: self.connection,
            last_seen_ms: self.last_seen_ms,
            latency_ms: self.latency_ms,
            clock_offset_ms: self.clock_offset_ms,
        }
    }
}

/// Mutable room state; only reachable through the room lock
#[derive(Debug)]
pub struct RoomInner {
    pub host_id: String,
    pub members: Vec<Member>,
    pub queue: Queue,
    pub sync: SyncState,
    pub control_mode: ControlMode,

    /// Debounce memory for track changes (Unix ms)
    pub last_track_change_ms: Option<i64>,

    /// Last mutation of any kind (Unix ms); drives inactivity teardown
    pub last_activity_ms: i64,
}

impl RoomInner {
    pub fn member(&self, client_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.client_id == client_id)
    }

    pub fn member_mut(&mut self, client_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.client_id == client_id)
    }

    pub fn is_member(&self, client_id: &str) -> bool {
        self.member(client_id).is_some()
    }

    pub fn connected_members(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.connection == ConnectionState::Connected)
            .count()
    }

    /// Validate that `client_id` may issue control commands here
    pub fn ensure_control(&self, client_id: &str) -> ServerResult<()> {
        if !self.is_member(client_id) {
            return Err(ServerError::NotAMember(client_id.to_string()));
        }
        if self.control_mode == ControlMode::HostOnly && self.host_id != client_id {
            return Err(ServerError::NotPermitted);
        }
        Ok(())
    }

    /// Add a new member, or revive an existing record after a reconnect
    ///
    /// Returns true when this was a genuinely new member (worth a
    /// member:joined broadcast) rather than a revival of a known identity.
    pub fn add_or_revive_member(
        &mut self,
        client_id: &str,
        display_name: &str,
        now_ms: i64,
    ) -> bool {
        if let Some(member) = self.member_mut(client_id) {
            member.connection = ConnectionState::Connected;
            member.display_name = display_name.to_string();
            member.last_seen_ms = now_ms;
            member.last_heartbeat_ms = now_ms;
            false
        } else {
            self.members.push(Member::new(client_id, display_name, now_ms));
            true
        }
    }

    /// Mark a member disconnected without removing its record
    ///
    /// The record survives so a rejoin within the room's lifetime keeps
    /// the same identity and host status.
    pub fn mark_disconnected(&mut self, client_id: &str, now_ms: i64) -> bool {
        match self.member_mut(client_id) {
            Some(member) => {
                member.connection = ConnectionState::Disconnected;
                member.last_seen_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Remove a member entirely (explicit leave)
    ///
    /// When the host leaves, the longest-connected remaining member
    /// inherits the role; the room itself survives until it is empty.
    pub fn remove_member(&mut self, client_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.client_id != client_id);
        let removed = self.members.len() != before;

        if removed && self.host_id == client_id {
            if let Some(successor) = self.members.iter().min_by_key(|m| m.connected_at_ms) {
                tracing::info!(
                    old_host = %client_id,
                    new_host = %successor.client_id,
                    "host left, promoting longest-connected member"
                );
                self.host_id = successor.client_id.clone();
            }
        }

        removed
    }

    /// Full state transfer for reconciliation and join responses
    pub fn snapshot(&self, code: &str, now_ms: i64) -> RoomSnapshot {
        let view = self.queue.view();
        RoomSnapshot {
            code: code.to_string(),
            sync: self.sync.clone(),
            playlist: view.playlist,
            current_track_index: view.current_track_index,
            loop_mode: view.loop_mode,
            control_mode: self.control_mode,
            members: self
                .members
                .iter()
                .map(|m| m.to_info(&self.host_id))
                .collect(),
            server_timestamp_ms: now_ms,
        }
    }
}

/// A playback room; the per-room mutex is the serialization point for all
/// of its state mutations
#[derive(Debug)]
pub struct Room {
    code: String,
    created_at_ms: i64,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(
        code: String,
        host: Member,
        control_mode: ControlMode,
        queue_cap: usize,
        now_ms: i64,
    ) -> Self {
        let host_id = host.client_id.clone();
        Self {
            code,
            created_at_ms: now_ms,
            inner: Mutex::new(RoomInner {
                host_id,
                members: vec![host],
                queue: Queue::new(queue_cap),
                sync: SyncState::default(),
                control_mode,
                last_track_change_ms: None,
                last_activity_ms: now_ms,
            }),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub async fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().await
    }
}
