//! actionlib goal status types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A ROS time stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    #[serde(alias = "sec")]
    pub secs: i64,
    #[serde(alias = "nanosec")]
    pub nsecs: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalId {
    #[serde(default)]
    pub stamp: Time,
    pub id: String,
}

impl GoalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            stamp: Time::default(),
            id: id.into(),
        }
    }
}

/// One entry of an `actionlib_msgs/GoalStatusArray`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStatus {
    pub goal_id: GoalId,
    pub status: u8,
    #[serde(default)]
    pub text: String,
}

impl GoalStatus {
    pub fn code(&self) -> Option<GoalStatusCode> {
        GoalStatusCode::from_u8(self.status)
    }
}

/// `actionlib_msgs/GoalStatus` status constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GoalStatusCode {
    Pending = 0,
    Active = 1,
    Preempted = 2,
    Succeeded = 3,
    Aborted = 4,
    Rejected = 5,
    Preempting = 6,
    Recalling = 7,
    Recalled = 8,
    Lost = 9,
}

impl GoalStatusCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        use GoalStatusCode::*;
        Some(match code {
            0 => Pending,
            1 => Active,
            2 => Preempted,
            3 => Succeeded,
            4 => Aborted,
            5 => Rejected,
            6 => Preempting,
            7 => Recalling,
            8 => Recalled,
            9 => Lost,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            GoalStatusCode::Pending
                | GoalStatusCode::Active
                | GoalStatusCode::Preempting
                | GoalStatusCode::Recalling
        )
    }
}

/// Coarse lifecycle of a goal as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    Pending,
    Active,
    Succeeded,
    Aborted,
    Preempted,
    TimedOut,
}

impl From<GoalStatusCode> for GoalState {
    fn from(code: GoalStatusCode) -> Self {
        match code {
            GoalStatusCode::Pending => GoalState::Pending,
            GoalStatusCode::Active | GoalStatusCode::Preempting | GoalStatusCode::Recalling => {
                GoalState::Active
            }
            GoalStatusCode::Succeeded => GoalState::Succeeded,
            GoalStatusCode::Aborted | GoalStatusCode::Rejected | GoalStatusCode::Lost => {
                GoalState::Aborted
            }
            GoalStatusCode::Preempted | GoalStatusCode::Recalled => GoalState::Preempted,
        }
    }
}

/// Events delivered to the listeners of one goal.
#[derive(Debug, Clone, PartialEq)]
pub enum GoalEvent {
    Status(GoalStatus),
    Feedback(Value),
    Result(Value),
    /// No status arrived within the goal's timeout.
    Timeout,
}

/// Events delivered to the listeners of an action client.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionClientEvent {
    /// The full status array of the latest `status` message.
    Status(Vec<GoalStatus>),
    /// Feedback for any goal, including ones this client did not send.
    Feedback(Value),
    /// A result for any goal.
    Result(Value),
    /// No status arrived within the client's timeout.
    Timeout,
}
