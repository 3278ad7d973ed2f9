use thiserror::Error;

/// Errors raised by the transport layer (L3).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Send operation failed: {0}")]
    SendFailed(String),

    #[error("Receive operation failed: {0}")]
    ReceiveFailed(String),

    /// Stream framing could not be recovered.
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported address scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Underlying I/O error: {0}")]
    Io(String),

    #[error("WebSocket protocol error: {0}")]
    WebSocket(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unknown transport error: {0}")]
    Other(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Errors raised while encoding, decoding or decompressing rosbridge frames.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame with op '{op}' is missing field '{field}'")]
    MissingField { op: String, field: &'static str },

    #[error("{codec} decompression failed: {reason}")]
    Decompression { codec: String, reason: String },

    #[error("No decoder registered for {0}")]
    NoDecoder(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors originating from the core crate itself.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration loading failed: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    LoggingSetup(String),
}

/// Errors from within the client's internal machinery, distinct from the
/// `ApiError` surfaced to users.
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An actor's mailbox was closed or full.
    #[error("Actor system error: {0}")]
    Actor(String),

    #[error("Internal operation timed out")]
    Timeout,

    #[error("Invalid internal parameters: {0}")]
    InvalidParams(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Core internal error: {0}")]
    Core(#[from] CoreError),
}

impl From<serde_json::Error> for InternalError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            InternalError::Deserialization(err.to_string())
        } else {
            InternalError::Serialization(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            ProtocolError::MalformedFrame(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}
