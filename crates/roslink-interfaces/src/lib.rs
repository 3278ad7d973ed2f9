//! # roslink Interfaces (L1 - Public API Contract)
//!
//! This crate defines the public-facing types of the roslink client: message
//! payload wrappers, per-channel option structs, session events, actionlib
//! goal status types and the `ApiError` returned at the API boundary.

mod common;
mod error;
mod goal;
mod options;

pub use common::*;
pub use error::*;
pub use goal::*;
pub use options::*;
