//! Implementation of the `Transport` trait using WebSockets (`tokio-tungstenite`).

use crate::error::{TransportError, from_ws_error};
use crate::traits::Transport;
use crate::types::WireMessage;
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, error, info, trace, warn};
use roslink_core::config::WebSocketConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{
        Error as TungsteniteError, protocol::Message as TungsteniteMessage,
        protocol::WebSocketConfig as TungsteniteConfig,
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, TungsteniteMessage>;
type WsSource = SplitStream<WsStream>;

/// WebSocket transport. Text frames carry JSON; binary frames carry CBOR.
pub struct WebSocketTransport {
    url: String,
    options: WebSocketConfig,
    sink: Option<WsSink>,
    source: Option<WsSource>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, options: WebSocketConfig) -> Self {
        Self {
            url: url.into(),
            options,
            sink: None,
            source: None,
        }
    }

    fn apply_options(options: &WebSocketConfig) -> TungsteniteConfig {
        let mut config = TungsteniteConfig::default();
        if options.max_message_size.is_some() {
            config.max_message_size = options.max_message_size;
        }
        if options.max_frame_size.is_some() {
            config.max_frame_size = options.max_frame_size;
        }
        config.accept_unmasked_frames = options.accept_unmasked_frames;
        config
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.sink.is_some() || self.source.is_some() {
            warn!("WebSocketTransport already connected.");
            return Err(TransportError::ConnectionFailed("Already connected".into()));
        }

        info!("Connecting WebSocket to {}", self.url);
        let ws_config = Self::apply_options(&self.options);
        let (ws_stream, response) = connect_async_with_config(self.url.as_str(), Some(ws_config), false)
            .await
            .map_err(from_ws_error)?;
        debug!("WebSocket handshake successful: status {}", response.status());

        let (sink, source) = ws_stream.split();
        self.sink = Some(sink);
        self.source = Some(source);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.source = None;
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        info!("Disconnecting WebSocket {}", self.url);
        match sink.send(TungsteniteMessage::Close(None)).await {
            Ok(_) => debug!("WebSocket Close frame sent."),
            Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed) => {
                debug!("WebSocket already closed while sending Close frame.")
            }
            Err(e) => warn!("Error sending WebSocket Close frame: {}. Closing anyway.", e),
        }
        if let Err(e) = sink.close().await {
            if !matches!(
                e,
                TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed
            ) {
                warn!("Error closing WebSocket sink: {}", e);
            }
        }
        Ok(())
    }

    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected("WebSocket sink unavailable".into()))?;
        let frame = match message {
            WireMessage::Text(text) => TungsteniteMessage::Text(text),
            WireMessage::Binary(bytes) => TungsteniteMessage::Binary(bytes),
        };
        sink.send(frame).await.map_err(from_ws_error)
    }

    async fn receive(&mut self) -> Option<Result<WireMessage, TransportError>> {
        let source = self.source.as_mut()?;

        // Control frames are answered by tungstenite; keep reading until data arrives.
        loop {
            match source.next().await? {
                Ok(TungsteniteMessage::Text(text)) => {
                    trace!("Received WebSocket text ({} bytes)", text.len());
                    return Some(Ok(WireMessage::Text(text)));
                }
                Ok(TungsteniteMessage::Binary(bytes)) => {
                    trace!("Received WebSocket binary ({} bytes)", bytes.len());
                    return Some(Ok(WireMessage::Binary(bytes)));
                }
                Ok(TungsteniteMessage::Ping(_)) | Ok(TungsteniteMessage::Pong(_)) => continue,
                Ok(TungsteniteMessage::Close(close_frame)) => {
                    info!("Received WebSocket Close frame: {:?}", close_frame);
                    return None;
                }
                Ok(TungsteniteMessage::Frame(_)) => {
                    warn!("Received unexpected raw WebSocket frame, ignoring.");
                    continue;
                }
                Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed) => {
                    info!("WebSocket connection closed while receiving.");
                    return None;
                }
                Err(e) => {
                    error!("WebSocket receive error: {}", e);
                    return Some(Err(from_ws_error(e)));
                }
            }
        }
    }
}
