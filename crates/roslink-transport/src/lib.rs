//! # roslink Transport (raw communication)
//!
//! This crate establishes and manages the connection to a rosbridge server,
//! over WebSocket or raw TCP, and moves whole frames in both directions.
//!
//! It defines the `Transport` trait for abstracting the byte carrier and
//! provides the `ConnectionActor` that owns one connection inside the actor
//! system. An in-process [`memory_pair`] stands in for a server in tests.

pub mod connection;
pub mod error;
pub mod factory;
#[cfg(feature = "tcp")]
pub mod framing;
pub mod memory;
#[cfg(feature = "tcp")]
pub mod tcp;
pub mod traits;
pub mod types;
#[cfg(feature = "websocket")]
pub mod websocket;

// Re-export key items
pub use connection::{
    ConnectionActor, ConnectionState, ConnectionStatusUpdate, Disconnect, IncomingMessage,
    SendMessage, TransportSource,
};
pub use error::TransportError;
pub use factory::create_transport;
pub use memory::{MemoryPeer, MemoryTransport, memory_pair};
pub use traits::Transport;
pub use types::{Address, ConnectParams, WireMessage};
