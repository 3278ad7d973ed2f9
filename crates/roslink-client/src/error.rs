//! Errors specific to starting a client session.

use roslink_core::error::{CoreError, InternalError, TransportError};
use roslink_interfaces::ApiError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration loading failed: {0}")]
    Config(#[from] CoreError),

    #[error("Invalid server address: {0}")]
    InvalidAddress(TransportError),

    #[error("Connection failed: {0}")]
    Connection(InternalError),

    #[error("No connection after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Config(e) => ApiError::InternalError(format!("Config error: {}", e)),
            ClientError::InvalidAddress(e) => ApiError::InvalidParameters(e.to_string()),
            ClientError::Connection(InternalError::Transport(TransportError::Timeout))
            | ClientError::Timeout(_) => ApiError::Timeout,
            ClientError::Connection(e) => ApiError::ConnectionFailed(e.to_string()),
            ClientError::Api(api_err) => api_err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_api_timeout() {
        let err = ClientError::Connection(TransportError::Timeout.into());
        assert_eq!(ApiError::from(err), ApiError::Timeout);
        assert_eq!(
            ApiError::from(ClientError::Timeout(Duration::from_secs(1))),
            ApiError::Timeout
        );
    }

    #[test]
    fn refused_connection_maps_to_connection_failed() {
        let err = ClientError::Connection(TransportError::ConnectionFailed("refused".into()).into());
        assert!(matches!(ApiError::from(err), ApiError::ConnectionFailed(_)));
    }
}
