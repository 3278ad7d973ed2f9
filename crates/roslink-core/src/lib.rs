//! # roslink Core
//!
//! Shared infrastructure for the roslink crates: configuration loading,
//! logging setup, the internal error taxonomy and the callback registry used
//! to notify listeners.

pub mod config;
pub mod error;
pub mod listeners;
pub mod logging;

pub use config::{Config, SessionConfig, TextEncoding, TransportConfig, load_config};
pub use error::{CoreError, InternalError, ProtocolError, TransportError};
pub use listeners::{Callback, ListenerId, Listeners};
