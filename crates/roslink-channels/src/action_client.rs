//! actionlib client over the `goal`/`cancel`/`status`/`feedback`/`result`
//! topics of one action server.

use crate::error::mailbox_to_api_error;
use crate::topic::Topic;
use actix::prelude::*;
use log::{debug, trace, warn};
use roslink_core::listeners::{Callback, ListenerId, Listeners};
use roslink_interfaces::{
    ActionClientEvent, ActionClientOptions, ApiError, GoalEvent, GoalId, GoalState, GoalStatus,
    Message as RosMessage, TopicOptions,
};
use roslink_protocol_handler::Session;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What is known about one goal so far.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalSnapshot {
    pub id: String,
    pub status: Option<GoalStatus>,
    pub feedback: Option<Value>,
    pub result: Option<Value>,
    /// Set once a result or the timeout arrived. No events follow.
    pub finished: bool,
    pub timed_out: bool,
}

impl GoalSnapshot {
    fn new(id: String) -> Self {
        Self {
            id,
            status: None,
            feedback: None,
            result: None,
            finished: false,
            timed_out: false,
        }
    }

    pub fn state(&self) -> Option<GoalState> {
        if self.timed_out {
            return Some(GoalState::TimedOut);
        }
        self.status
            .as_ref()
            .and_then(GoalStatus::code)
            .map(GoalState::from)
    }
}

/// Generates a goal id of the form `goal_<random>_<unix millis>`.
pub fn new_goal_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("goal_{}_{}", rand::random::<u64>(), millis)
}

/// Wraps `goal` in the actionlib goal envelope.
pub fn goal_envelope(goal_id: &str, goal: Value) -> Value {
    json!({
        "goal_id": GoalId::new(goal_id),
        "goal": goal,
    })
}

// ================= Messages =================

#[derive(Message)]
#[rtype(result = "()")]
struct Listen {
    id: ListenerId,
    callback: Callback<ActionClientEvent>,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct Unlisten(ListenerId);

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct CancelAll;

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct RegisterGoal(String);

#[derive(Message)]
#[rtype(result = "()")]
struct GoalListen {
    goal_id: String,
    id: ListenerId,
    callback: Callback<GoalEvent>,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct GoalUnlisten {
    goal_id: String,
    id: ListenerId,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct SendGoal {
    goal_id: String,
    envelope: Value,
    timeout: Option<Duration>,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct CancelGoal(String);

#[derive(Debug, Message)]
#[rtype(result = "Option<GoalSnapshot>")]
struct GetSnapshot(String);

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct ForgetGoal(String);

/// A message from one of the subscribed server topics.
#[derive(Debug, Message)]
#[rtype(result = "()")]
enum ServerMessage {
    Status(Value),
    Feedback(Value),
    Result(Value),
}

// ================= Action Client Actor =================

struct GoalEntry {
    listeners: Listeners<GoalEvent>,
    snapshot: GoalSnapshot,
    timeout: Option<SpawnHandle>,
}

pub struct ActionClientActor {
    options: ActionClientOptions,
    goal_topic: Topic,
    cancel_topic: Topic,
    /// Held so the subscriptions live as long as the client.
    _server_topics: Vec<Topic>,
    listeners: Listeners<ActionClientEvent>,
    goals: HashMap<String, GoalEntry>,
    status_received: bool,
}

impl ActionClientActor {
    fn create_in(session: &Session, options: ActionClientOptions, ctx: &mut Context<Self>) -> Self {
        let server = options.server_name.trim_end_matches('/').to_string();
        let action = options.action_name.clone();
        let topic = |suffix: &str, message_type: String| {
            Topic::new(session, TopicOptions::new(format!("{}/{}", server, suffix), message_type))
        };

        let goal_topic = topic("goal", format!("{}Goal", action));
        let cancel_topic = topic("cancel", "actionlib_msgs/GoalID".to_string());
        goal_topic.advertise();
        cancel_topic.advertise();

        let mut server_topics = Vec::new();
        let mut follow = |enabled: bool, topic: Topic, wrap: fn(Value) -> ServerMessage| {
            if !enabled {
                return;
            }
            let weak = ctx.address().downgrade();
            topic.subscribe(move |message: &RosMessage| {
                if let Some(addr) = weak.upgrade() {
                    addr.do_send(wrap(message.as_value().clone()));
                }
            });
            server_topics.push(topic);
        };
        follow(
            !options.omit_status,
            topic("status", "actionlib_msgs/GoalStatusArray".to_string()),
            ServerMessage::Status,
        );
        follow(
            !options.omit_feedback,
            topic("feedback", format!("{}Feedback", action)),
            ServerMessage::Feedback,
        );
        follow(
            !options.omit_result,
            topic("result", format!("{}Result", action)),
            ServerMessage::Result,
        );

        Self {
            options,
            goal_topic,
            cancel_topic,
            _server_topics: server_topics,
            listeners: Listeners::new(),
            goals: HashMap::new(),
            status_received: false,
        }
    }

    /// Delivers `event` to the listeners of goal `id`, unless it has finished.
    fn emit_goal(&mut self, id: &str, event: GoalEvent) {
        if let Some(entry) = self.goals.get_mut(id) {
            if entry.snapshot.finished {
                trace!("Goal {} finished; dropping {:?}", id, event);
                return;
            }
            entry.listeners.emit(&event);
        }
    }

    fn goal_status(&mut self, status: GoalStatus, ctx: &mut Context<Self>) {
        let id = status.goal_id.id.clone();
        let Some(entry) = self.goals.get_mut(&id) else {
            return;
        };
        if entry.snapshot.finished {
            return;
        }
        if let Some(handle) = entry.timeout.take() {
            ctx.cancel_future(handle);
        }
        entry.snapshot.status = Some(status.clone());
        self.emit_goal(&id, GoalEvent::Status(status));
    }

    fn goal_timed_out(&mut self, id: &str) {
        let Some(entry) = self.goals.get_mut(id) else {
            return;
        };
        entry.timeout = None;
        if entry.snapshot.finished || entry.snapshot.status.is_some() {
            return;
        }
        debug!("Goal {} timed out without a status", id);
        entry.listeners.emit(&GoalEvent::Timeout);
        entry.snapshot.timed_out = true;
        entry.snapshot.finished = true;
    }

    fn on_status(&mut self, message: Value, ctx: &mut Context<Self>) {
        self.status_received = true;
        let list: Vec<GoalStatus> = message
            .get("status_list")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        self.listeners.emit(&ActionClientEvent::Status(list.clone()));
        for status in list {
            self.goal_status(status, ctx);
        }
    }

    /// Handles a feedback or result message. Returns the goal it belongs to.
    fn on_goal_message(&mut self, message: &Value, ctx: &mut Context<Self>) -> Option<String> {
        let parsed = message
            .get("status")
            .cloned()
            .map(serde_json::from_value::<GoalStatus>);
        let status = match parsed {
            Some(Ok(status)) => status,
            _ => {
                warn!(
                    "Message from action server {} has no goal status",
                    self.options.server_name
                );
                return None;
            }
        };
        let id = status.goal_id.id.clone();
        self.goal_status(status, ctx);
        self.goals.contains_key(&id).then_some(id)
    }

    fn on_feedback(&mut self, message: Value, ctx: &mut Context<Self>) {
        let feedback = message.get("feedback").cloned().unwrap_or(Value::Null);
        self.listeners.emit(&ActionClientEvent::Feedback(feedback.clone()));
        if let Some(id) = self.on_goal_message(&message, ctx) {
            if let Some(entry) = self.goals.get_mut(&id) {
                if !entry.snapshot.finished {
                    entry.snapshot.feedback = Some(feedback.clone());
                }
            }
            self.emit_goal(&id, GoalEvent::Feedback(feedback));
        }
    }

    fn on_result(&mut self, message: Value, ctx: &mut Context<Self>) {
        let result = message.get("result").cloned().unwrap_or(Value::Null);
        self.listeners.emit(&ActionClientEvent::Result(result.clone()));
        let Some(id) = self.on_goal_message(&message, ctx) else {
            return;
        };
        self.emit_goal(&id, GoalEvent::Result(result.clone()));
        if let Some(entry) = self.goals.get_mut(&id) {
            if !entry.snapshot.finished {
                debug!("Goal {} finished", id);
                entry.snapshot.result = Some(result);
                entry.snapshot.finished = true;
            }
        }
    }
}

impl Actor for ActionClientActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        debug!("ActionClientActor started for {}", self.options.server_name);
        if let Some(timeout) = self.options.timeout {
            ctx.run_later(timeout, |act, _ctx| {
                if !act.status_received {
                    debug!(
                        "No status from {} within {:?}",
                        act.options.server_name, act.options.timeout
                    );
                    act.listeners.emit(&ActionClientEvent::Timeout);
                }
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Context<Self>) {
        debug!("ActionClientActor stopped for {}", self.options.server_name);
    }
}

// ================= Handlers =================

impl Handler<Listen> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: Listen, _ctx: &mut Context<Self>) {
        self.listeners.add(msg.id, msg.callback);
    }
}

impl Handler<Unlisten> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: Unlisten, _ctx: &mut Context<Self>) {
        self.listeners.remove(msg.0);
    }
}

impl Handler<CancelAll> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, _msg: CancelAll, _ctx: &mut Context<Self>) {
        debug!("Cancelling all goals on {}", self.options.server_name);
        self.cancel_topic.publish(json!({}));
    }
}

impl Handler<RegisterGoal> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: RegisterGoal, _ctx: &mut Context<Self>) {
        self.goals.entry(msg.0.clone()).or_insert_with(|| GoalEntry {
            listeners: Listeners::new(),
            snapshot: GoalSnapshot::new(msg.0),
            timeout: None,
        });
    }
}

impl Handler<GoalListen> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: GoalListen, _ctx: &mut Context<Self>) {
        if let Some(entry) = self.goals.get_mut(&msg.goal_id) {
            entry.listeners.add(msg.id, msg.callback);
        }
    }
}

impl Handler<GoalUnlisten> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: GoalUnlisten, _ctx: &mut Context<Self>) {
        if let Some(entry) = self.goals.get_mut(&msg.goal_id) {
            entry.listeners.remove(msg.id);
        }
    }
}

impl Handler<SendGoal> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: SendGoal, ctx: &mut Context<Self>) {
        let Some(entry) = self.goals.get_mut(&msg.goal_id) else {
            warn!("Send of unknown goal {}", msg.goal_id);
            return;
        };
        if let Some(timeout) = msg.timeout {
            if let Some(previous) = entry.timeout.take() {
                ctx.cancel_future(previous);
            }
            let id = msg.goal_id.clone();
            entry.timeout = Some(ctx.run_later(timeout, move |act, _ctx| act.goal_timed_out(&id)));
        }
        debug!("Sending goal {} to {}", msg.goal_id, self.options.server_name);
        self.goal_topic.publish(msg.envelope);
    }
}

impl Handler<CancelGoal> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: CancelGoal, _ctx: &mut Context<Self>) {
        debug!("Cancelling goal {}", msg.0);
        self.cancel_topic.publish(json!({ "id": msg.0 }));
    }
}

impl Handler<GetSnapshot> for ActionClientActor {
    type Result = MessageResult<GetSnapshot>;

    fn handle(&mut self, msg: GetSnapshot, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.goals.get(&msg.0).map(|entry| entry.snapshot.clone()))
    }
}

impl Handler<ForgetGoal> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: ForgetGoal, ctx: &mut Context<Self>) {
        if let Some(entry) = self.goals.remove(&msg.0) {
            if let Some(handle) = entry.timeout {
                ctx.cancel_future(handle);
            }
        }
    }
}

impl Handler<ServerMessage> for ActionClientActor {
    type Result = ();

    fn handle(&mut self, msg: ServerMessage, ctx: &mut Context<Self>) {
        match msg {
            ServerMessage::Status(message) => self.on_status(message, ctx),
            ServerMessage::Feedback(message) => self.on_feedback(message, ctx),
            ServerMessage::Result(message) => self.on_result(message, ctx),
        }
    }
}

// ================= Handles =================

/// Handle to an actionlib client.
///
/// The client and its topics stay alive while any `ActionClient` clone or
/// [`Goal`] exists.
#[derive(Clone)]
pub struct ActionClient {
    addr: Addr<ActionClientActor>,
    server_name: String,
    action_name: String,
}

impl ActionClient {
    pub fn new(session: &Session, options: ActionClientOptions) -> Self {
        let server_name = options.server_name.clone();
        let action_name = options.action_name.clone();
        let session = session.clone();
        let addr = ActionClientActor::create(move |ctx| {
            ActionClientActor::create_in(&session, options, ctx)
        });
        Self {
            addr,
            server_name,
            action_name,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Registers `callback` for status arrays, feedback and results of every
    /// goal, and for the client timeout.
    pub fn on<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&ActionClientEvent) + Send + 'static,
    {
        let id = ListenerId::next();
        self.addr.do_send(Listen {
            id,
            callback: Box::new(callback),
        });
        id
    }

    pub fn off(&self, id: ListenerId) {
        self.addr.do_send(Unlisten(id));
    }

    /// Cancels every goal on the server.
    pub fn cancel(&self) {
        self.addr.do_send(CancelAll);
    }

    /// Creates a goal with a fresh id. Nothing is sent until [`Goal::send`].
    pub fn goal(&self, goal: impl Into<RosMessage>) -> Goal {
        let id = new_goal_id();
        self.addr.do_send(RegisterGoal(id.clone()));
        Goal {
            addr: self.addr.clone(),
            envelope: goal_envelope(&id, goal.into().into_value()),
            id,
        }
    }
}

impl std::fmt::Debug for ActionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionClient")
            .field("server_name", &self.server_name)
            .field("action_name", &self.action_name)
            .finish()
    }
}

/// One goal of an [`ActionClient`]. Dropping it forgets the goal locally.
pub struct Goal {
    addr: Addr<ActionClientActor>,
    id: String,
    envelope: Value,
}

impl Goal {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The goal message as published, with its `goal_id`.
    pub fn envelope(&self) -> &Value {
        &self.envelope
    }

    pub fn on<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&GoalEvent) + Send + 'static,
    {
        let id = ListenerId::next();
        self.addr.do_send(GoalListen {
            goal_id: self.id.clone(),
            id,
            callback: Box::new(callback),
        });
        id
    }

    pub fn off(&self, id: ListenerId) {
        self.addr.do_send(GoalUnlisten {
            goal_id: self.id.clone(),
            id,
        });
    }

    /// Publishes the goal. With `timeout`, a [`GoalEvent::Timeout`] fires if
    /// no status for this goal arrives in time.
    pub fn send(&self, timeout: Option<Duration>) {
        self.addr.do_send(SendGoal {
            goal_id: self.id.clone(),
            envelope: self.envelope.clone(),
            timeout,
        });
    }

    pub fn cancel(&self) {
        self.addr.do_send(CancelGoal(self.id.clone()));
    }

    pub async fn snapshot(&self) -> Result<GoalSnapshot, ApiError> {
        self.addr
            .send(GetSnapshot(self.id.clone()))
            .await
            .map_err(|e| mailbox_to_api_error("querying goal", e))?
            .ok_or_else(|| ApiError::InternalError(format!("goal {} is not registered", self.id)))
    }
}

impl Drop for Goal {
    fn drop(&mut self) {
        self.addr.do_send(ForgetGoal(self.id.clone()));
    }
}

impl std::fmt::Debug for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Goal").field("id", &self.id).finish()
    }
}
