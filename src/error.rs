//! Error types for the video room signaling client

/// Result type alias using the video room Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in video room client operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not valid in the current client state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Publisher join attempted while already a member of a room
    #[error("Already joined room {0}")]
    AlreadyJoined(u64),

    /// Handle-scoped request issued before the handle was attached
    #[error("Handle not attached: {0}")]
    HandleNotAttached(String),

    /// Session claim attempted without a previously created session
    #[error("No prior session to claim")]
    NoSessionToClaim,

    /// Publisher ICE restart attempted with no published tracks to restore
    #[error("No published tracks to restore")]
    NoPublishedTracks,

    /// Error reply from the gateway (top-level or plugin-level)
    #[error("Gateway error {code}: {reason}")]
    Gateway {
        /// Numeric gateway error code
        code: i64,
        /// Human-readable reason from the gateway
        reason: String,
    },

    /// Correlated request timed out waiting for its reply
    #[error("Request timeout: {request} after {timeout_ms}ms")]
    RequestTimeout {
        /// The request verb that timed out
        request: String,
        /// Timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// Gateway reply violated a protocol invariant (e.g. missing answer)
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Signaling transport closed while a request was pending
    #[error("Signaling transport closed")]
    TransportClosed,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Media engine error
    #[error("Media engine error: {0}")]
    MediaEngineError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error was caused by the caller (wrong state or inputs)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_)
                | Error::InvalidOperation(_)
                | Error::AlreadyJoined(_)
                | Error::HandleNotAttached(_)
                | Error::NoSessionToClaim
                | Error::NoPublishedTracks
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RequestTimeout { .. }
                | Error::TransportClosed
                | Error::WebSocketError(_)
                | Error::IoError(_)
        )
    }

    /// Check if this error came back from the gateway
    pub fn is_gateway_error(&self) -> bool {
        matches!(self, Error::Gateway { .. })
    }

    /// Get the gateway error code, if this is a gateway error
    pub fn gateway_code(&self) -> Option<i64> {
        match self {
            Error::Gateway { code, .. } => Some(*code),
            _ => None,
        }
    }
}
