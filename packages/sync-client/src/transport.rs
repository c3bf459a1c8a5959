//! Transport seam
//!
//! The engine talks to the server exclusively through this trait: typed
//! requests that resolve to typed acknowledgements. A hung request is the
//! transport's (or the engine's timeout wrapper's) problem to turn into
//! [`TransportError::Timeout`] — nothing upstream ever waits forever.

use async_trait::async_trait;
use thiserror::Error;
use unison_protocol::{ClientRequest, ErrorPayload, ResponseData};

/// Transport-level failures, all resolved (never thrown across the async
/// boundary as panics)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection is currently established
    #[error("transport is not connected")]
    NotConnected,

    /// The request did not complete within its timeout
    #[error("the request did not complete in time")]
    Timeout,

    /// The server acknowledged with a failure
    #[error("request rejected: {code}: {message}")]
    Rejected { code: String, message: String },

    /// The connection attempt itself failed
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Anything else the transport could not express
    #[error("transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    /// Build a rejection from a wire error payload
    pub fn from_payload(payload: ErrorPayload) -> Self {
        Self::Rejected {
            code: payload.code,
            message: payload.message,
        }
    }

    /// The server-side error code, when this is a rejection
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether this is a version/debounce conflict the caller may retry
    /// with refreshed state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.code(),
            Some("STALE_VERSION") | Some("TRACK_CHANGE_DEBOUNCED")
        )
    }
}

/// Async request/acknowledgement transport to the room server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and await its acknowledgement
    ///
    /// A successful ack resolves to its payload (None for bare acks); a
    /// failed ack resolves to [`TransportError::Rejected`].
    async fn request(&self, request: ClientRequest)
        -> Result<Option<ResponseData>, TransportError>;

    /// (Re-)establish the connection
    async fn connect(&self) -> Result<(), TransportError>;

    /// Whether connectivity is currently confirmed — a live connection,
    /// not merely a socket object that exists
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_preserves_the_server_code() {
        let err = TransportError::from_payload(ErrorPayload::new("STALE_VERSION", "too old"));
        assert_eq!(err.code(), Some("STALE_VERSION"));
        assert!(err.is_conflict());
    }

    #[test]
    fn debounce_is_a_conflict() {
        let err =
            TransportError::from_payload(ErrorPayload::new("TRACK_CHANGE_DEBOUNCED", "wait"));
        assert!(err.is_conflict());
    }

    #[test]
    fn other_rejections_are_not_conflicts() {
        let err = TransportError::from_payload(ErrorPayload::new("QUEUE_FULL", "full"));
        assert!(!err.is_conflict());
        assert!(!TransportError::Timeout.is_conflict());
        assert!(TransportError::Timeout.code().is_none());
    }
}
