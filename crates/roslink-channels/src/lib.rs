//! # roslink channels (L2)
//!
//! Typed channels over a [`Session`](roslink_protocol_handler::Session):
//! topics, services, actionlib clients and rosbridge actions.
//!
//! Each stateful channel runs as an actix actor behind a cloneable handle.
//! Handles must be created inside a running actix system.

pub mod action;
pub mod action_client;
mod error;
pub mod service;
pub mod topic;

pub use action::Action;
pub use action_client::{ActionClient, Goal, GoalSnapshot, goal_envelope, new_goal_id};
pub use service::{CallOutcome, PendingCall, Service, ServiceHandler};
pub use topic::Topic;
