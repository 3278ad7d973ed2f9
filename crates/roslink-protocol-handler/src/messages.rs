//! Outgoing rosbridge call shapes and the messages exchanged with the session actor.

use actix::prelude::*;
use futures_channel::oneshot;
use roslink_core::error::TransportError;
use roslink_core::listeners::{Callback, ListenerId};
use roslink_interfaces::{AuthParams, SessionEvent};
use roslink_transport::{ConnectParams, Transport};
use serde::Serialize;
use serde_json::Value;

/// Every operation the client can send to a rosbridge server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutgoingCall {
    Subscribe {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(rename = "type")]
        message_type: String,
        topic: String,
        compression: String,
        throttle_rate: u32,
        queue_length: u32,
    },
    Unsubscribe {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
    },
    Advertise {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(rename = "type")]
        message_type: String,
        topic: String,
        latch: bool,
        queue_size: u32,
    },
    Unadvertise {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
    },
    Publish {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
        msg: Value,
        latch: bool,
    },
    CallService {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        service: String,
        args: Value,
    },
    AdvertiseService {
        #[serde(rename = "type")]
        service_type: String,
        service: String,
    },
    UnadvertiseService {
        service: String,
    },
    ServiceResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        service: String,
        values: Value,
        result: bool,
    },
    SendActionGoal {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        action: String,
        action_type: String,
        args: Value,
        feedback: bool,
    },
    CancelActionGoal {
        id: String,
        action: String,
    },
    Auth(AuthParams),
    SetLevel {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        level: String,
    },
}

impl OutgoingCall {
    /// The `op` field as sent on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            OutgoingCall::Subscribe { .. } => "subscribe",
            OutgoingCall::Unsubscribe { .. } => "unsubscribe",
            OutgoingCall::Advertise { .. } => "advertise",
            OutgoingCall::Unadvertise { .. } => "unadvertise",
            OutgoingCall::Publish { .. } => "publish",
            OutgoingCall::CallService { .. } => "call_service",
            OutgoingCall::AdvertiseService { .. } => "advertise_service",
            OutgoingCall::UnadvertiseService { .. } => "unadvertise_service",
            OutgoingCall::ServiceResponse { .. } => "service_response",
            OutgoingCall::SendActionGoal { .. } => "send_action_goal",
            OutgoingCall::CancelActionGoal { .. } => "cancel_action_goal",
            OutgoingCall::Auth(_) => "auth",
            OutgoingCall::SetLevel { .. } => "set_level",
        }
    }

    /// The topic, service or action the call addresses.
    pub fn resource(&self) -> &str {
        match self {
            OutgoingCall::Subscribe { topic, .. }
            | OutgoingCall::Unsubscribe { topic, .. }
            | OutgoingCall::Advertise { topic, .. }
            | OutgoingCall::Unadvertise { topic, .. }
            | OutgoingCall::Publish { topic, .. } => topic,
            OutgoingCall::CallService { service, .. }
            | OutgoingCall::AdvertiseService { service, .. }
            | OutgoingCall::UnadvertiseService { service }
            | OutgoingCall::ServiceResponse { service, .. } => service,
            OutgoingCall::SendActionGoal { action, .. }
            | OutgoingCall::CancelActionGoal { action, .. } => action,
            OutgoingCall::Auth(_) | OutgoingCall::SetLevel { .. } => "",
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            OutgoingCall::Subscribe { id, .. }
            | OutgoingCall::Unsubscribe { id, .. }
            | OutgoingCall::Advertise { id, .. }
            | OutgoingCall::Unadvertise { id, .. }
            | OutgoingCall::Publish { id, .. }
            | OutgoingCall::CallService { id, .. }
            | OutgoingCall::ServiceResponse { id, .. }
            | OutgoingCall::SendActionGoal { id, .. }
            | OutgoingCall::SetLevel { id, .. } => id.as_deref(),
            OutgoingCall::CancelActionGoal { id, .. } => Some(id),
            OutgoingCall::AdvertiseService { .. }
            | OutgoingCall::UnadvertiseService { .. }
            | OutgoingCall::Auth(_) => None,
        }
    }

    /// Stores a call id. Returns `false` for operations that carry none.
    pub fn set_id(&mut self, call_id: String) -> bool {
        match self {
            OutgoingCall::Subscribe { id, .. }
            | OutgoingCall::Unsubscribe { id, .. }
            | OutgoingCall::Advertise { id, .. }
            | OutgoingCall::Unadvertise { id, .. }
            | OutgoingCall::Publish { id, .. }
            | OutgoingCall::CallService { id, .. }
            | OutgoingCall::ServiceResponse { id, .. }
            | OutgoingCall::SendActionGoal { id, .. }
            | OutgoingCall::SetLevel { id, .. } => {
                *id = Some(call_id);
                true
            }
            OutgoingCall::CancelActionGoal { id, .. } => {
                *id = call_id;
                true
            }
            OutgoingCall::AdvertiseService { .. }
            | OutgoingCall::UnadvertiseService { .. }
            | OutgoingCall::Auth(_) => false,
        }
    }
}

/// Key under which inbound frames are routed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameKey {
    /// `publish` frames, by topic name.
    Topic(String),
    /// Inbound `call_service` requests, by service name.
    Service(String),
    /// Responses, action feedback and action results, by call id.
    Call(String),
}

impl FrameKey {
    pub fn topic(name: impl Into<String>) -> Self {
        FrameKey::Topic(name.into())
    }

    pub fn service(name: impl Into<String>) -> Self {
        FrameKey::Service(name.into())
    }

    pub fn call(id: impl Into<String>) -> Self {
        FrameKey::Call(id.into())
    }
}

/// A callback receiving whole inbound frames.
pub struct FrameListener {
    pub id: ListenerId,
    pub once: bool,
    pub callback: Callback<Value>,
}

impl FrameListener {
    pub fn repeating<F>(callback: F) -> Self
    where
        F: FnMut(&Value) + Send + 'static,
    {
        Self {
            id: ListenerId::next(),
            once: false,
            callback: Box::new(callback),
        }
    }

    pub fn once<F>(callback: F) -> Self
    where
        F: FnMut(&Value) + Send + 'static,
    {
        Self {
            id: ListenerId::next(),
            once: true,
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for FrameListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameListener")
            .field("id", &self.id)
            .field("once", &self.once)
            .finish()
    }
}

// --- Session actor messages ---

/// Opens a connection to the address in the parameters.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Connect(pub ConnectParams);

/// Opens a connection over an already constructed transport.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ConnectTransport(pub Box<dyn Transport>);

/// Closes the current connection, if any.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Close;

/// Sends a call now, or queues it until the next `connection` event.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct CallOnConnection(pub OutgoingCall);

/// Assigns a fresh call id, registers `reply` under it, then sends the call
/// through [`CallOnConnection`]. The id is reported on `respond_to`.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct IssueCall {
    pub call: OutgoingCall,
    pub reply: Option<FrameListener>,
    pub respond_to: Option<oneshot::Sender<String>>,
}

/// Allocates `<operation>:<resource>:<counter>`.
#[derive(Message, Debug)]
#[rtype(result = "String")]
pub struct NextCallId {
    pub operation: String,
    pub resource: String,
}

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct AddFrameListener {
    pub key: FrameKey,
    pub listener: FrameListener,
}

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct RemoveFrameListener {
    pub key: FrameKey,
    pub id: ListenerId,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct AddEventListener {
    pub id: ListenerId,
    pub once: bool,
    pub callback: Callback<SessionEvent>,
}

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct RemoveEventListener(pub ListenerId);

/// Broadcasts a `warning` event.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct EmitWarning(pub String);

#[derive(Message, Debug)]
#[rtype(result = "bool")]
pub struct IsConnected;

/// Resolved on the next `connection` event or failed connection attempt.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct WhenConnected(pub oneshot::Sender<Result<(), TransportError>>);
