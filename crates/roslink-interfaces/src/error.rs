use serde_json::Value;
use thiserror::Error;

/// High-level errors surfaced to users of the roslink client API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Failed to establish or maintain the connection to the rosbridge server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    /// A local wait did not complete in time. The remote request is not cancelled.
    #[error("Operation timed out")]
    Timeout,

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The remote side answered with `result: false`. Carries the failure payload.
    #[error("Service call failed: {0}")]
    ServiceFailed(Value),

    /// The call was never issued or its response can no longer arrive.
    #[error("Call dropped: {0}")]
    CallDropped(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// An internal error occurred within the roslink client library. This may indicate a bug.
    #[error("Internal client error: {0}")]
    InternalError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::IoError(err.to_string())
    }
}
