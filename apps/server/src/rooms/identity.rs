//! Connection identity tracking
//!
//! A client keeps one stable `client_id` across reconnects while its
//! transport session id changes on every connection. When a device
//! reconnects quickly, the new session's registration can arrive before
//! the old session's disconnect notification; this tracker is the
//! arbiter that keeps that race from evicting a still-present member.
//!
//! Disconnect handling is idempotent: a session that has already been
//! superseded can report its disconnect any number of times without
//! touching the membership of the client it used to carry.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// What the tracker knows about one client identity
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// The transport session currently carrying this client
    pub session_id: Uuid,

    /// Room the client is in, if any
    pub room_code: Option<String>,

    pub display_name: String,
}

/// Maps stable client identities to their current transport session
#[derive(Debug, Clone, Default)]
pub struct IdentityTracker {
    records: Arc<DashMap<String, SessionRecord>>,
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a (re)connecting session as current for `client_id`
    ///
    /// Returns the session it replaced, if any, so the caller can retire
    /// the old transport without touching membership.
    pub fn register(
        &self,
        client_id: &str,
        session_id: Uuid,
        display_name: &str,
    ) -> Option<Uuid> {
        let mut replaced = None;

        self.records
            .entry(client_id.to_string())
            .and_modify(|record| {
                replaced = Some(record.session_id);
                record.session_id = session_id;
                record.display_name = display_name.to_string();
            })
            .or_insert_with(|| SessionRecord {
                session_id,
                room_code: None,
                display_name: display_name.to_string(),
            });

        if let Some(old) = replaced {
            tracing::debug!(
                client_id = %client_id,
                old_session = %old,
                new_session = %session_id,
                "session replaced for client"
            );
        }

        replaced.filter(|old| *old != session_id)
    }

    /// Record which room the client is currently in
    pub fn set_room(&self, client_id: &str, room_code: Option<String>) {
        if let Some(mut record) = self.records.get_mut(client_id) {
            record.room_code = room_code;
        }
    }

    /// The room the client is in, if tracked
    pub fn room_of(&self, client_id: &str) -> Option<String> {
        self.records
            .get(client_id)
            .and_then(|r| r.room_code.clone())
    }

    /// Whether `session_id` is still the current session for `client_id`
    pub fn is_current(&self, client_id: &str, session_id: Uuid) -> bool {
        self.records
            .get(client_id)
            .map(|r| r.session_id == session_id)
            .unwrap_or(false)
    }

    /// Drop the mapping, but only if `session_id` is still current
    ///
    /// Returns the released record when the caller owned the identity, or
    /// None when a newer session had already taken over (in which case
    /// nothing was removed and the caller must not touch membership).
    pub fn release_if_current(&self, client_id: &str, session_id: Uuid) -> Option<SessionRecord> {
        let current = self
            .records
            .get(client_id)
            .map(|r| r.session_id == session_id)
            .unwrap_or(false);

        if !current {
            return None;
        }

        self.records.remove(client_id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
