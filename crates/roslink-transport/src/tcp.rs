//! Implementation of the `Transport` trait over a raw TCP socket.

use crate::error::TransportError;
use crate::framing::JsonFrameCodec;
use crate::traits::Transport;
use crate::types::WireMessage;
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, info, warn};
use roslink_core::config::TextEncoding;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

type TcpFramed = Framed<TcpStream, JsonFrameCodec>;

/// rosbridge over raw TCP. Frames are JSON text; binary frames are not
/// supported on this transport.
pub struct TcpTransport {
    host: String,
    port: u16,
    encoding: TextEncoding,
    sink: Option<SplitSink<TcpFramed, String>>,
    source: Option<SplitStream<TcpFramed>>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, encoding: TextEncoding) -> Self {
        Self {
            host: host.into(),
            port,
            encoding,
            sink: None,
            source: None,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.sink.is_some() {
            return Err(TransportError::ConnectionFailed("Already connected".into()));
        }
        info!("Connecting TCP to {}:{}", self.host, self.port);
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (sink, source) = Framed::new(stream, JsonFrameCodec::new(self.encoding)).split();
        self.sink = Some(sink);
        self.source = Some(source);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.source = None;
        if let Some(mut sink) = self.sink.take() {
            info!("Disconnecting TCP {}:{}", self.host, self.port);
            if let Err(e) = sink.close().await {
                warn!("Error closing TCP stream: {}", e);
            }
        }
        Ok(())
    }

    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected("TCP stream unavailable".into()))?;
        match message {
            WireMessage::Text(text) => sink.send(text).await,
            WireMessage::Binary(_) => Err(TransportError::SendFailed(
                "binary frames are not supported over TCP".into(),
            )),
        }
    }

    async fn receive(&mut self) -> Option<Result<WireMessage, TransportError>> {
        let source = self.source.as_mut()?;
        source.next().await.map(|frame| frame.map(WireMessage::Text))
    }
}
