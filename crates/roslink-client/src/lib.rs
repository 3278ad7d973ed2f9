//! # roslink Client Library
//!
//! Entry point of the roslink client. It ties together the interface, core,
//! transport, protocol handling and channel crates.
//!
//! Users call [`connect`] to obtain a [`Session`] and open [`Topic`],
//! [`Service`], [`ActionClient`] and [`Action`] channels on it.

// Re-export the L1 API for user convenience
pub use roslink_interfaces::{
    ActionClientEvent, ActionClientOptions, ActionOptions, ApiError, AuthParams, GoalEvent,
    GoalId, GoalState, GoalStatus, GoalStatusCode, Message, SUPPORTED_COMPRESSIONS,
    ServiceOptions, ServiceRequest, ServiceResponse, SessionEvent, Time, TopicOptions,
};

// Channels
pub use roslink_channels::{Action, ActionClient, Goal, GoalSnapshot, Service, Topic};

// Session engine
pub use roslink_protocol_handler::{FrameCodec, Session};

// Export value for JSON parsing/serialization
pub use serde_json::{Value, json};

// Core types for advanced setup
pub use roslink_core::{Config, ListenerId, SessionConfig, load_config};

// Transports for custom connections
pub use roslink_transport::{
    Address, ConnectParams, MemoryPeer, MemoryTransport, Transport, memory_pair,
};

mod connect;
mod error;

pub use connect::connect;
pub use error::ClientError;
