//! Construction options for the channel handles.

use std::time::Duration;

/// Compression names rosbridge understands for `subscribe`.
pub const SUPPORTED_COMPRESSIONS: [&str; 4] = ["none", "png", "cbor", "cbor-raw"];

/// Options for a topic channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicOptions {
    /// Topic name, like `/cmd_vel`.
    pub name: String,
    /// Message type, like `std_msgs/String`.
    pub message_type: String,
    /// One of [`SUPPORTED_COMPRESSIONS`]. Default `"none"`; anything else is
    /// downgraded to `"none"` with a warning.
    pub compression: String,
    /// Minimum milliseconds between messages. Default 0; negative values are
    /// clamped to 0 with a warning.
    pub throttle_rate: i64,
    /// Queue size of the bridge side publisher. Default 100.
    pub queue_size: u32,
    /// Latch published messages. Default `false`.
    pub latch: bool,
    /// Queue length of the bridge side subscriber. Default 0.
    pub queue_length: u32,
    /// Re-issue subscribe/advertise after the session reconnects. Default `true`.
    pub reconnect_on_close: bool,
}

impl TopicOptions {
    pub fn new(name: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message_type: message_type.into(),
            compression: "none".to_string(),
            throttle_rate: 0,
            queue_size: 100,
            latch: false,
            queue_length: 0,
            reconnect_on_close: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Service name, like `/add_two_ints`.
    pub name: String,
    /// Service type, like `rospy_tutorials/AddTwoInts`.
    pub service_type: String,
}

impl ServiceOptions {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
        }
    }
}

/// Options for an actionlib client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionClientOptions {
    /// Action server namespace, like `/fibonacci`.
    pub server_name: String,
    /// Action message type, like `actionlib_tutorials/FibonacciAction`.
    pub action_name: String,
    /// Emit a client `timeout` event when no status arrives within this window.
    pub timeout: Option<Duration>,
    pub omit_feedback: bool,
    pub omit_status: bool,
    pub omit_result: bool,
}

impl ActionClientOptions {
    pub fn new(server_name: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            action_name: action_name.into(),
            timeout: None,
            omit_feedback: false,
            omit_status: false,
            omit_result: false,
        }
    }
}

/// Options for a rosbridge action (`send_action_goal` protocol).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOptions {
    /// Action name, like `/fibonacci`.
    pub name: String,
    /// Action type, like `example_interfaces/action/Fibonacci`.
    pub action_type: String,
}

impl ActionOptions {
    pub fn new(name: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_type: action_type.into(),
        }
    }
}
