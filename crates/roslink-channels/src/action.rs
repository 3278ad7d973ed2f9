//! Actions over the rosbridge `send_action_goal` operations.

use crate::error::map_internal_to_api_error;
use log::{debug, trace};
use roslink_interfaces::{ActionOptions, ApiError, Message as RosMessage};
use roslink_protocol_handler::{FrameListener, OutgoingCall, Session};
use serde_json::Value;

/// Handle to one action. Stateless apart from its options; the goals it sends
/// are tracked by the session under their call ids.
#[derive(Debug, Clone)]
pub struct Action {
    session: Session,
    options: ActionOptions,
}

impl Action {
    pub fn new(session: &Session, options: ActionOptions) -> Self {
        Self {
            session: session.clone(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn action_type(&self) -> &str {
        &self.options.action_type
    }

    /// Sends `goal` and returns its call id, which identifies the goal for
    /// [`Action::cancel_goal`].
    ///
    /// `on_feedback` runs for every feedback frame. Exactly one of `on_result`
    /// or `on_failure` runs, with the result values.
    pub async fn send_goal<R, B, F>(
        &self,
        goal: impl Into<RosMessage>,
        on_result: R,
        mut on_feedback: B,
        on_failure: F,
    ) -> Result<String, ApiError>
    where
        R: FnOnce(Value) + Send + 'static,
        B: FnMut(Value) + Send + 'static,
        F: FnOnce(Value) + Send + 'static,
    {
        let mut on_result = Some(on_result);
        let mut on_failure = Some(on_failure);
        let listener = FrameListener::repeating(move |frame| {
            let values = frame.get("values").cloned().unwrap_or(Value::Null);
            match frame.get("op").and_then(Value::as_str) {
                Some("action_feedback") => on_feedback(values),
                Some("action_result") => {
                    if frame.get("result").and_then(Value::as_bool) == Some(false) {
                        if let Some(callback) = on_failure.take() {
                            debug!("Action goal failed: {}", values);
                            callback(values);
                        }
                    } else if let Some(callback) = on_result.take() {
                        callback(values);
                    }
                }
                other => trace!("Ignoring {:?} frame for action goal", other),
            }
        });

        let call = OutgoingCall::SendActionGoal {
            id: None,
            action: self.options.name.clone(),
            action_type: self.options.action_type.clone(),
            args: goal.into().into_value(),
            feedback: true,
        };
        let id = self
            .session
            .issue_call(call, Some(listener))
            .await
            .map_err(map_internal_to_api_error)?;
        debug!("Sent goal {} to action {}", id, self.options.name);
        Ok(id)
    }

    /// Asks the server to cancel the goal sent with call id `goal_id`.
    pub fn cancel_goal(&self, goal_id: impl Into<String>) {
        self.session.call_on_connection(OutgoingCall::CancelActionGoal {
            id: goal_id.into(),
            action: self.options.name.clone(),
        });
    }
}
