//! WebSocket connection management
//!
//! Tracks every live transport session and the channel used to push
//! frames to it. Sessions are keyed by their ephemeral session id; the
//! mapping from stable client identity to session lives in
//! [`crate::rooms::identity::IdentityTracker`].

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use unison_protocol::ServerFrame;
use uuid::Uuid;

/// Handle for sending frames to a specific WebSocket connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Channel for frames destined to this connection
    pub sender: mpsc::UnboundedSender<ServerFrame>,

    /// Stable client identity behind this session
    pub client_id: String,

    /// When this connection was established (Unix ms)
    pub connected_at_ms: i64,

    /// Last activity timestamp (atomic for thread-safe updates)
    last_activity: Arc<AtomicI64>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerFrame>, client_id: String, now_ms: i64) -> Self {
        Self {
            sender,
            client_id,
            connected_at_ms: now_ms,
            last_activity: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    /// Update last activity timestamp
    pub fn touch(&self, now_ms: i64) {
        self.last_activity.store(now_ms, Ordering::Relaxed);
    }

    /// Get last activity timestamp
    pub fn last_seen_ms(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Send a frame to this connection
    pub fn send(&self, frame: ServerFrame) -> Result<(), SendError> {
        self.sender.send(frame).map_err(|_| SendError::Closed)
    }

    /// Check if the connection is still alive
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Error type for send operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    SessionNotFound,
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::SessionNotFound => write!(f, "session not found"),
            SendError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for SendError {}

/// Manages all live WebSocket sessions
///
/// Thread-safe; uses DashMap for concurrent access without explicit
/// locking and is wrapped in Arc for cheap cloning.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    sessions: Arc<DashMap<Uuid, ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session
    pub fn add(
        &self,
        session_id: Uuid,
        client_id: &str,
        sender: mpsc::UnboundedSender<ServerFrame>,
        now_ms: i64,
    ) {
        self.sessions.insert(
            session_id,
            ConnectionHandle::new(sender, client_id.to_string(), now_ms),
        );
        tracing::debug!(
            session = %session_id,
            client_id = %client_id,
            total = self.sessions.len(),
            "connection added"
        );
    }

    /// Drop a session
    pub fn remove(&self, session_id: Uuid) -> bool {
        let removed = self.sessions.remove(&session_id).is_some();
        if removed {
            tracing::debug!(session = %session_id, "connection removed");
        }
        removed
    }

    /// Push a frame to a specific session
    pub fn send_to(&self, session_id: Uuid, frame: ServerFrame) -> Result<(), SendError> {
        let handle = self
            .sessions
            .get(&session_id)
            .ok_or(SendError::SessionNotFound)?;
        handle.send(frame)
    }

    /// Refresh a session's activity timestamp
    pub fn touch(&self, session_id: Uuid, now_ms: i64) -> bool {
        match self.sessions.get(&session_id) {
            Some(handle) => {
                handle.touch(now_ms);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Total number of live sessions
    pub fn total(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions whose channel is gone or that have been idle past
    /// `max_idle_ms`; returns how many were removed
    pub fn cleanup_stale(&self, now_ms: i64, max_idle_ms: i64) -> usize {
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|e| {
                !e.value().is_alive() || now_ms - e.value().last_seen_ms() > max_idle_ms
            })
            .map(|e| *e.key())
            .collect();

        let mut removed = 0;
        for session_id in stale {
            if self.sessions.remove(&session_id).is_some() {
                removed += 1;
                tracing::debug!(session = %session_id, "removed stale connection");
            }
        }
        removed
    }
}
