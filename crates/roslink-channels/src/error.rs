//! Error mapping for the channel handles.

use actix::MailboxError;
use roslink_core::error::{InternalError, TransportError};
use roslink_interfaces::ApiError;

/// Maps internal errors (actor/protocol/transport) to the public `ApiError`.
pub(crate) fn map_internal_to_api_error(internal_error: InternalError) -> ApiError {
    match internal_error {
        InternalError::Transport(TransportError::NotConnected(_)) => ApiError::NotConnected,
        InternalError::Transport(TransportError::Timeout) => ApiError::Timeout,
        InternalError::Transport(transport_err) => {
            ApiError::ConnectionFailed(transport_err.to_string())
        }
        InternalError::Protocol(protocol_err) => ApiError::ProtocolError(protocol_err.to_string()),
        InternalError::Actor(actor_err) => {
            ApiError::InternalError(format!("Internal actor error: {}", actor_err))
        }
        InternalError::Timeout => ApiError::Timeout,
        InternalError::InvalidParams(msg) => ApiError::InvalidParameters(msg),
        InternalError::Serialization(msg) | InternalError::Deserialization(msg) => {
            ApiError::ProtocolError(format!("Serialization error: {}", msg))
        }
        InternalError::Configuration(msg) => {
            ApiError::InternalError(format!("Configuration error: {}", msg))
        }
        InternalError::Core(core_err) => ApiError::InternalError(format!("Core error: {}", core_err)),
    }
}

pub(crate) fn mailbox_to_api_error(what: &str, err: MailboxError) -> ApiError {
    ApiError::InternalError(format!("Mailbox error {}: {}", what, err))
}
