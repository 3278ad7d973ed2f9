//! Topic channel: publish/subscribe on one named, typed topic.

use crate::error::mailbox_to_api_error;
use actix::prelude::*;
use log::{debug, trace, warn};
use roslink_core::error::InternalError;
use roslink_core::listeners::{Callback, ListenerId, Listeners};
use roslink_interfaces::{
    ApiError, Message as RosMessage, SUPPORTED_COMPRESSIONS, SessionEvent, TopicOptions,
};
use roslink_protocol_handler::{FrameKey, FrameListener, OutgoingCall, Session};
use serde_json::Value;

// ================= Messages =================

#[derive(Message)]
#[rtype(result = "()")]
struct Subscribe {
    id: ListenerId,
    callback: Callback<RosMessage>,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct Unsubscribe(Option<ListenerId>);

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct Advertise;

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct Unadvertise;

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct Publish(RosMessage);

#[derive(Debug, Message)]
#[rtype(result = "TopicStatus")]
struct GetStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TopicStatus {
    subscribed: bool,
    advertised: bool,
}

/// A `msg` payload routed to this topic by the session.
#[derive(Debug, Message)]
#[rtype(result = "()")]
struct Incoming(Value);

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct SessionNotice(SessionEvent);

// ================= Topic Actor =================

pub struct TopicActor {
    session: Session,
    options: TopicOptions,
    throttle_rate: u32,
    listeners: Listeners<RosMessage>,
    /// The subscribe call as sent, with its call id. `Some` while subscribed.
    subscribe_call: Option<OutgoingCall>,
    /// The advertise call as sent, with its call id. `Some` while advertised.
    advertise_call: Option<OutgoingCall>,
    frame_listener: Option<ListenerId>,
    event_listener: Option<ListenerId>,
    waiting_for_reconnect: bool,
}

impl TopicActor {
    fn new(session: Session, options: TopicOptions, throttle_rate: u32) -> Self {
        Self {
            session,
            options,
            throttle_rate,
            listeners: Listeners::new(),
            subscribe_call: None,
            advertise_call: None,
            frame_listener: None,
            event_listener: None,
            waiting_for_reconnect: false,
        }
    }

    fn topic_key(&self) -> FrameKey {
        FrameKey::topic(self.options.name.clone())
    }

    fn make_subscribe(&self) -> OutgoingCall {
        OutgoingCall::Subscribe {
            id: None,
            message_type: self.options.message_type.clone(),
            topic: self.options.name.clone(),
            compression: self.options.compression.clone(),
            throttle_rate: self.throttle_rate,
            queue_length: self.options.queue_length,
        }
    }

    fn make_advertise(&self) -> OutgoingCall {
        OutgoingCall::Advertise {
            id: None,
            message_type: self.options.message_type.clone(),
            topic: self.options.name.clone(),
            latch: self.options.latch,
            queue_size: self.options.queue_size,
        }
    }

    /// Issues `call` with a fresh call id and returns the call as sent.
    async fn issue(session: Session, mut call: OutgoingCall) -> Result<OutgoingCall, InternalError> {
        let id = session.issue_call(call.clone(), None).await?;
        call.set_id(id);
        Ok(call)
    }

    fn drop_wire_listener(&mut self) {
        if let Some(id) = self.frame_listener.take() {
            self.session.off_frame(self.topic_key(), id);
        }
    }

    fn send_unsubscribe(&mut self) {
        let Some(call) = self.subscribe_call.take() else {
            return;
        };
        self.drop_wire_listener();
        debug!("Unsubscribing from {}", self.options.name);
        self.session.call_on_connection(OutgoingCall::Unsubscribe {
            id: call.id().map(str::to_string),
            topic: self.options.name.clone(),
        });
    }

    fn send_unadvertise(&mut self) {
        let Some(call) = self.advertise_call.take() else {
            return;
        };
        debug!("Unadvertising {}", self.options.name);
        self.session.call_on_connection(OutgoingCall::Unadvertise {
            id: call.id().map(str::to_string),
            topic: self.options.name.clone(),
        });
    }

    fn on_close(&mut self) {
        if self.options.reconnect_on_close {
            if self.waiting_for_reconnect {
                trace!("{} already waiting for reconnect", self.options.name);
                return;
            }
            let calls: Vec<OutgoingCall> = self
                .subscribe_call
                .iter()
                .chain(self.advertise_call.iter())
                .cloned()
                .collect();
            if calls.is_empty() {
                return;
            }
            self.waiting_for_reconnect = true;
            debug!("Re-issuing {} calls for {} on reconnect", calls.len(), self.options.name);
            for call in calls {
                self.session.call_on_connection(call);
            }
        } else {
            debug!("Connection closed; {} forgets its registrations", self.options.name);
            self.drop_wire_listener();
            self.subscribe_call = None;
            self.advertise_call = None;
            self.listeners.clear();
        }
    }
}

impl Actor for TopicActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        debug!("TopicActor started for {}", self.options.name);
        let weak = ctx.address().downgrade();
        self.event_listener = Some(self.session.on_event(move |event| {
            if matches!(event, SessionEvent::Close | SessionEvent::Connection) {
                if let Some(addr) = weak.upgrade() {
                    addr.do_send(SessionNotice(event.clone()));
                }
            }
        }));
    }

    fn stopping(&mut self, _ctx: &mut Context<Self>) -> Running {
        debug!("TopicActor stopping for {}", self.options.name);
        self.send_unsubscribe();
        self.send_unadvertise();
        if let Some(id) = self.event_listener.take() {
            self.session.off_event(id);
        }
        Running::Stop
    }
}

// ================= Handlers =================

impl Handler<Subscribe> for TopicActor {
    type Result = AtomicResponse<Self, ()>;

    fn handle(&mut self, msg: Subscribe, ctx: &mut Context<Self>) -> Self::Result {
        self.listeners.add(msg.id, msg.callback);
        if self.subscribe_call.is_some() {
            return AtomicResponse::new(Box::pin(actix::fut::ready(())));
        }

        let weak = ctx.address().downgrade();
        let listener = FrameListener::repeating(move |frame| {
            if let Some(addr) = weak.upgrade() {
                addr.do_send(Incoming(frame.get("msg").cloned().unwrap_or(Value::Null)));
            }
        });
        self.frame_listener = Some(self.session.add_frame_listener(self.topic_key(), listener));

        debug!("Subscribing to {}", self.options.name);
        let fut = Self::issue(self.session.clone(), self.make_subscribe());
        AtomicResponse::new(Box::pin(fut.into_actor(self).map(|result, act, _ctx| {
            match result {
                Ok(call) => act.subscribe_call = Some(call),
                Err(e) => {
                    warn!("Subscribe to {} failed: {}", act.options.name, e);
                    act.drop_wire_listener();
                }
            }
        })))
    }
}

impl Handler<Unsubscribe> for TopicActor {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Context<Self>) {
        match msg.0 {
            Some(id) => {
                self.listeners.remove(id);
                if !self.listeners.is_empty() {
                    return;
                }
            }
            None => self.listeners.clear(),
        }
        self.send_unsubscribe();
    }
}

impl Handler<Advertise> for TopicActor {
    type Result = AtomicResponse<Self, ()>;

    fn handle(&mut self, _msg: Advertise, _ctx: &mut Context<Self>) -> Self::Result {
        if self.advertise_call.is_some() {
            return AtomicResponse::new(Box::pin(actix::fut::ready(())));
        }
        debug!("Advertising {}", self.options.name);
        let fut = Self::issue(self.session.clone(), self.make_advertise());
        AtomicResponse::new(Box::pin(fut.into_actor(self).map(|result, act, _ctx| {
            match result {
                Ok(call) => act.advertise_call = Some(call),
                Err(e) => warn!("Advertise of {} failed: {}", act.options.name, e),
            }
        })))
    }
}

impl Handler<Unadvertise> for TopicActor {
    type Result = ();

    fn handle(&mut self, _msg: Unadvertise, _ctx: &mut Context<Self>) {
        self.send_unadvertise();
    }
}

impl Handler<Publish> for TopicActor {
    type Result = AtomicResponse<Self, ()>;

    fn handle(&mut self, msg: Publish, _ctx: &mut Context<Self>) -> Self::Result {
        let advertise = self.advertise_call.is_none().then(|| self.make_advertise());
        let publish = OutgoingCall::Publish {
            id: None,
            topic: self.options.name.clone(),
            msg: msg.0.into_value(),
            latch: self.options.latch,
        };
        let session = self.session.clone();

        let fut = async move {
            let advertised = match advertise {
                Some(call) => Some(Self::issue(session.clone(), call).await),
                None => None,
            };
            session.issue(publish, None);
            advertised
        };
        AtomicResponse::new(Box::pin(fut.into_actor(self).map(|advertised, act, _ctx| {
            match advertised {
                Some(Ok(call)) => act.advertise_call = Some(call),
                Some(Err(e)) => warn!("Advertise of {} failed: {}", act.options.name, e),
                None => {}
            }
        })))
    }
}

impl Handler<Incoming> for TopicActor {
    type Result = ();

    fn handle(&mut self, msg: Incoming, _ctx: &mut Context<Self>) {
        trace!("{} message -> {} listeners", self.options.name, self.listeners.len());
        self.listeners.emit(&RosMessage::new(msg.0));
    }
}

impl Handler<SessionNotice> for TopicActor {
    type Result = ();

    fn handle(&mut self, msg: SessionNotice, _ctx: &mut Context<Self>) {
        match msg.0 {
            SessionEvent::Close => self.on_close(),
            SessionEvent::Connection => self.waiting_for_reconnect = false,
            _ => {}
        }
    }
}

impl Handler<GetStatus> for TopicActor {
    type Result = MessageResult<GetStatus>;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(TopicStatus {
            subscribed: self.subscribe_call.is_some(),
            advertised: self.advertise_call.is_some(),
        })
    }
}

// ================= Handle =================

/// Handle to a topic channel.
///
/// Clones share one channel. When the last clone is dropped the channel
/// unsubscribes and unadvertises.
#[derive(Clone)]
pub struct Topic {
    addr: Addr<TopicActor>,
    name: String,
    message_type: String,
}

impl Topic {
    /// Creates the channel. An unsupported compression falls back to `"none"`
    /// and a negative throttle rate to 0, each with a `warning` event.
    pub fn new(session: &Session, mut options: TopicOptions) -> Self {
        if !SUPPORTED_COMPRESSIONS.contains(&options.compression.as_str()) {
            let message = format!(
                "Compression '{}' for topic {} is not supported; no compression will be used",
                options.compression, options.name
            );
            warn!("{}", message);
            session.emit_warning(message);
            options.compression = "none".to_string();
        }
        if options.throttle_rate < 0 {
            let message = format!(
                "Throttle rate {} for topic {} is negative; using 0",
                options.throttle_rate, options.name
            );
            warn!("{}", message);
            session.emit_warning(message);
            options.throttle_rate = 0;
        }
        let throttle_rate = u32::try_from(options.throttle_rate).unwrap_or(u32::MAX);

        let name = options.name.clone();
        let message_type = options.message_type.clone();
        let addr = TopicActor::new(session.clone(), options, throttle_rate).start();
        Self {
            addr,
            name,
            message_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Registers `callback` for messages on this topic. The first registration
    /// sends `subscribe`.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&RosMessage) + Send + 'static,
    {
        let id = ListenerId::next();
        self.addr.do_send(Subscribe {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes one listener, or all of them with `None`. `unsubscribe` is sent
    /// once no listener is left.
    pub fn unsubscribe(&self, listener: Option<ListenerId>) {
        self.addr.do_send(Unsubscribe(listener));
    }

    pub fn advertise(&self) {
        self.addr.do_send(Advertise);
    }

    pub fn unadvertise(&self) {
        self.addr.do_send(Unadvertise);
    }

    /// Publishes `message`, advertising the topic first if needed.
    pub fn publish(&self, message: impl Into<RosMessage>) {
        self.addr.do_send(Publish(message.into()));
    }

    pub async fn is_subscribed(&self) -> Result<bool, ApiError> {
        self.status().await.map(|status| status.subscribed)
    }

    pub async fn is_advertised(&self) -> Result<bool, ApiError> {
        self.status().await.map(|status| status.advertised)
    }

    async fn status(&self) -> Result<TopicStatus, ApiError> {
        self.addr
            .send(GetStatus)
            .await
            .map_err(|e| mailbox_to_api_error("querying topic", e))
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("message_type", &self.message_type)
            .finish()
    }
}
