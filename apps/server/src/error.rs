//! Error handling for the unison room server
//!
//! One unified error type using thiserror, with stable error codes carried
//! on WebSocket acknowledgements and HTTP status mapping for the small
//! HTTP surface. The variants follow the engine's error taxonomy:
//! validation, conflict, staleness, transport, liveness.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use unison_protocol::ErrorPayload;

use crate::rooms::queue::QueueError;
use crate::services::media::MediaError;

/// Main server error type
#[derive(Error, Debug)]
pub enum ServerError {
    // ========== Validation ==========
    /// Malformed room code
    #[error("malformed room code: {0}")]
    InvalidRoomCode(String),

    /// Malformed client identity at the handshake
    #[error("invalid client id: {0}")]
    InvalidClientId(&'static str),

    /// Room does not exist
    #[error("room {0} does not exist")]
    RoomNotFound(String),

    /// Connection has not joined a room
    #[error("this connection has not joined a room")]
    NotInRoom,

    /// Requester is not a member of the room it targets
    #[error("client {0} is not a member of this room")]
    NotAMember(String),

    /// Control mode forbids this member from issuing the command
    #[error("room is host-only and this member is not the host")]
    NotPermitted,

    /// Queue mutation rejected
    #[error(transparent)]
    Queue(#[from] QueueError),

    // ========== Conflict ==========
    /// Incoming version is not newer than the stored one
    #[error("version {incoming} is not newer than {current}")]
    StaleVersion { incoming: u64, current: u64 },

    /// Track change rejected by the leading-edge debounce
    #[error("another track change was accepted within the debounce window")]
    TrackChangeDebounced,

    // ========== External services ==========
    /// Media resolution failed
    #[error(transparent)]
    Media(#[from] MediaError),

    // ========== Transport ==========
    /// Request did not complete within its timeout
    #[error("the request did not complete in time")]
    RequestTimeout,

    // ========== Internal ==========
    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected failures at the boundary
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable code for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRoomCode(_) => "INVALID_ROOM_CODE",
            Self::InvalidClientId(_) => "INVALID_CLIENT_ID",
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::NotInRoom => "NOT_IN_ROOM",
            Self::NotAMember(_) => "NOT_A_MEMBER",
            Self::NotPermitted => "NOT_PERMITTED",
            Self::Queue(e) => e.error_code(),
            Self::StaleVersion { .. } => "STALE_VERSION",
            Self::TrackChangeDebounced => "TRACK_CHANGE_DEBOUNCED",
            Self::Media(MediaError::NotFound(_)) => "MEDIA_UNRESOLVABLE",
            Self::Media(_) => "MEDIA_SERVICE_ERROR",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Wire payload for a failed acknowledgement
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload::new(self.error_code(), self.to_string())
    }

    /// HTTP status for the error, used by the HTTP surface only
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRoomCode(_) | Self::InvalidClientId(_) | Self::Queue(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotInRoom | Self::NotAMember(_) | Self::NotPermitted => StatusCode::FORBIDDEN,
            Self::StaleVersion { .. } | Self::TrackChangeDebounced => StatusCode::CONFLICT,
            Self::Media(_) => StatusCode::BAD_GATEWAY,
            Self::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Serialization(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log with severity matched to who caused the problem
    pub fn log(&self) {
        match self {
            Self::Internal(_) | Self::Serialization(_) => {
                tracing::error!(error = %self, code = self.error_code(), "server error");
            }
            Self::Media(_) => {
                tracing::warn!(error = %self, code = self.error_code(), "media resolver error");
            }
            Self::StaleVersion { .. } | Self::TrackChangeDebounced => {
                tracing::debug!(error = %self, code = self.error_code(), "write conflict");
            }
            _ => {
                tracing::debug!(error = %self, code = self.error_code(), "client error");
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.log();
        let payload = self.payload();
        (
            self.status_code(),
            Json(serde_json::json!({
                "code": payload.code,
                "message": payload.message,
            })),
        )
            .into_response()
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
