//! # roslink
//!
//! A rosbridge protocol client. This crate re-exports [`roslink_client`];
//! see that crate for the entry points.

pub use roslink_client::*;
