pub use roslink_core::error::TransportError;

/// Maps tungstenite failures onto the transport taxonomy.
#[cfg(feature = "websocket")]
pub(crate) fn from_ws_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::ConnectionClosed => TransportError::NotConnected("Connection closed".into()),
        WsError::AlreadyClosed => TransportError::NotConnected("Connection already closed".into()),
        WsError::Io(io_err) => TransportError::Io(io_err.to_string()),
        WsError::Tls(tls_err) => TransportError::Tls(tls_err.to_string()),
        WsError::Capacity(reason) => TransportError::SendFailed(format!("Capacity error: {}", reason)),
        WsError::Protocol(reason) => {
            TransportError::WebSocket(format!("Protocol violation: {}", reason))
        }
        WsError::WriteBufferFull(_) => TransportError::SendFailed("Write buffer full".into()),
        WsError::Utf8 => TransportError::ReceiveFailed("Invalid UTF-8 received".into()),
        WsError::Url(parse_err) => TransportError::InvalidAddress(parse_err.to_string()),
        WsError::Http(resp) => TransportError::ConnectionFailed(format!(
            "HTTP error during handshake: Status {}",
            resp.status()
        )),
        WsError::HttpFormat(http_err) => {
            TransportError::ConnectionFailed(format!("HTTP format error: {}", http_err))
        }
        other => TransportError::Other(other.to_string()),
    }
}
