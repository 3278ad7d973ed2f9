//! Factory function for creating Transport implementations based on ConnectParams.

use crate::error::TransportError;
use crate::traits::Transport;
use crate::types::{Address, ConnectParams};

#[cfg(feature = "tcp")]
use crate::tcp::TcpTransport;
#[cfg(feature = "websocket")]
use crate::websocket::WebSocketTransport;

/// Creates a boxed `Transport` for the address in `params`.
///
/// WebSocket URLs need the `websocket` feature, TCP endpoints the `tcp` feature.
pub fn create_transport(params: &ConnectParams) -> Result<Box<dyn Transport>, TransportError> {
    log::debug!("Creating transport for {}", params.address);

    match &params.address {
        Address::WebSocket(url) => {
            #[cfg(feature = "websocket")]
            {
                Ok(Box::new(WebSocketTransport::new(
                    url.clone(),
                    params.ws_options.clone(),
                )))
            }
            #[cfg(not(feature = "websocket"))]
            {
                log::error!("WebSocket address {}, but 'websocket' feature is not enabled.", url);
                Err(TransportError::UnsupportedScheme(
                    "WebSocket (ws/wss) requires the 'websocket' feature.".to_string(),
                ))
            }
        }
        Address::Tcp { host, port } => {
            #[cfg(feature = "tcp")]
            {
                Ok(Box::new(TcpTransport::new(host.clone(), *port, params.encoding)))
            }
            #[cfg(not(feature = "tcp"))]
            {
                log::error!("TCP address {}:{}, but 'tcp' feature is not enabled.", host, port);
                Err(TransportError::UnsupportedScheme(
                    "TCP requires the 'tcp' feature.".to_string(),
                ))
            }
        }
    }
}
