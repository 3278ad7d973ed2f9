use crate::error::TransportError;
use crate::types::WireMessage;
use async_trait::async_trait;

/// An abstract bidirectional connection carrying rosbridge frames.
///
/// Implementations handle the specifics of WebSockets, TCP or in-process
/// channels. `receive` only ever yields complete frames.
#[async_trait]
pub trait Transport: Send + Unpin {
    /// Establishes the connection based on parameters provided during creation.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Closes the connection gracefully. Calling it twice is harmless.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Sends one frame. Only valid after a successful `connect`.
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError>;

    /// Waits for the next frame.
    ///
    /// # Returns
    /// * `Some(Ok(frame))` - A complete frame arrived.
    /// * `Some(Err(TransportError))` - The connection failed while receiving.
    /// * `None` - The remote end closed the connection gracefully.
    async fn receive(&mut self) -> Option<Result<WireMessage, TransportError>>;
}
