//! An in-process transport pair.
//!
//! [`memory_pair`] returns a [`MemoryTransport`] to hand to a connection and
//! the [`MemoryPeer`] that plays the server side of it.

use crate::error::TransportError;
use crate::traits::Transport;
use crate::types::WireMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<WireMessage>,
    outbound: mpsc::UnboundedSender<WireMessage>,
    connected: bool,
    refuse: Option<TransportError>,
}

/// The server end of a [`memory_pair`].
pub struct MemoryPeer {
    to_client: Option<mpsc::UnboundedSender<WireMessage>>,
    from_client: mpsc::UnboundedReceiver<WireMessage>,
}

pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            inbound,
            outbound,
            connected: false,
            refuse: None,
        },
        MemoryPeer {
            to_client: Some(to_client),
            from_client,
        },
    )
}

impl MemoryTransport {
    /// Makes every connection attempt fail with `error`.
    pub fn refusing(mut self, error: TransportError) -> Self {
        self.refuse = Some(error);
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if let Some(error) = self.refuse.clone() {
            return Err(error);
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.inbound.close();
        Ok(())
    }

    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected("memory transport".into()));
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::SendFailed("peer dropped".into()))
    }

    async fn receive(&mut self) -> Option<Result<WireMessage, TransportError>> {
        if !self.connected {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }
}

impl MemoryPeer {
    /// Delivers a text frame to the client. Returns `false` once closed.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(WireMessage::Text(text.into()))
    }

    pub fn send_binary(&self, bytes: Vec<u8>) -> bool {
        self.send(WireMessage::Binary(bytes))
    }

    pub fn send(&self, message: WireMessage) -> bool {
        match &self.to_client {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Waits for the next frame written by the client.
    pub async fn next_outgoing(&mut self) -> Option<WireMessage> {
        self.from_client.recv().await
    }

    /// Returns a frame only if one is already waiting.
    pub fn try_next_outgoing(&mut self) -> Option<WireMessage> {
        self.from_client.try_recv().ok()
    }

    /// Ends the stream as if the server had closed the connection.
    pub fn close(&mut self) {
        self.to_client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut transport, mut peer) = memory_pair();
        transport.connect().await.unwrap();

        transport.send(WireMessage::from("hello")).await.unwrap();
        assert_eq!(peer.next_outgoing().await, Some(WireMessage::from("hello")));

        assert!(peer.send_text("world"));
        assert_eq!(
            transport.receive().await,
            Some(Ok(WireMessage::from("world")))
        );

        peer.close();
        assert_eq!(transport.receive().await, None);
    }

    #[tokio::test]
    async fn refusing_transport_fails_connect() {
        let (transport, _peer) = memory_pair();
        let mut transport = transport.refusing(TransportError::ConnectionFailed("refused".into()));
        assert!(transport.connect().await.is_err());
        assert!(transport.send(WireMessage::from("x")).await.is_err());
    }
}
