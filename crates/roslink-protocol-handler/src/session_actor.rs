//! The SessionActor owns one logical rosbridge connection: the transport
//! lifecycle, the call id counter, the connect-then-flush queue and the
//! routing of inbound frames to listeners.

use crate::codec::{DecodedFrame, DecompressJob, FrameCodec};
use crate::messages::{
    AddEventListener, AddFrameListener, CallOnConnection, Close, Connect, ConnectTransport,
    EmitWarning, FrameKey, FrameListener, IsConnected, IssueCall, NextCallId, OutgoingCall,
    RemoveEventListener, RemoveFrameListener, WhenConnected,
};
use actix::prelude::*;
use futures_channel::oneshot;
use log::{debug, error, info, trace, warn};
use roslink_core::config::SessionConfig;
use roslink_core::error::{ProtocolError, TransportError};
use roslink_core::listeners::Listeners;
use roslink_interfaces::SessionEvent;
use roslink_transport::{
    ConnectionActor, ConnectionState, ConnectionStatusUpdate, Disconnect, IncomingMessage,
    SendMessage, TransportSource, WireMessage,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// An inbound frame waiting for its turn to be dispatched.
enum Slot {
    Decoding,
    Ready(Value),
    Dropped,
}

pub struct SessionActor {
    config: SessionConfig,
    codec: FrameCodec,
    state: SessionState,
    connection: Option<Addr<ConnectionActor>>,
    closing: bool,
    pending_connect: Option<TransportSource>,
    call_counter: u64,
    queued: VecDeque<OutgoingCall>,
    frame_listeners: HashMap<FrameKey, Listeners<Value>>,
    event_listeners: Listeners<SessionEvent>,
    waiters: Vec<oneshot::Sender<Result<(), TransportError>>>,
    // Frames in arrival order; `inbound_head` is the sequence number of the front slot.
    inbound: VecDeque<Slot>,
    inbound_head: u64,
}

impl SessionActor {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_codec(config, FrameCodec::default())
    }

    pub fn with_codec(config: SessionConfig, codec: FrameCodec) -> Self {
        Self {
            config,
            codec,
            state: SessionState::Disconnected,
            connection: None,
            closing: false,
            pending_connect: None,
            call_counter: 0,
            queued: VecDeque::new(),
            frame_listeners: HashMap::new(),
            event_listeners: Listeners::new(),
            waiters: Vec::new(),
            inbound: VecDeque::new(),
            inbound_head: 0,
        }
    }

    fn start_connection(&mut self, source: TransportSource, ctx: &mut Context<Self>) {
        if self.connection.is_some() {
            if self.closing {
                debug!("Previous connection still closing; deferring connect.");
                self.pending_connect = Some(source);
            } else {
                warn!("Session is already connected or connecting; ignoring connect.");
            }
            return;
        }
        let addr = ctx.address();
        let connection = ConnectionActor::from_source(
            source,
            addr.clone().recipient(),
            addr.recipient(),
        )
        .start();
        self.state = SessionState::Connecting;
        self.connection = Some(connection);
    }

    fn next_call_id(&mut self, operation: &str, resource: &str) -> String {
        self.call_counter += 1;
        format!("{}:{}:{}", operation, resource, self.call_counter)
    }

    fn emit_event(&mut self, event: SessionEvent) {
        trace!("Session event {:?} -> {} listeners", event, self.event_listeners.len());
        self.event_listeners.emit(&event);
    }

    fn warn_listeners(&mut self, message: String) {
        warn!("{}", message);
        self.emit_event(SessionEvent::Warning(message));
    }

    fn call_on_connection(&mut self, call: OutgoingCall, ctx: &mut Context<Self>) {
        if self.state == SessionState::Connected {
            self.send_now(call, ctx);
        } else {
            self.enqueue(call);
        }
    }

    fn enqueue(&mut self, call: OutgoingCall) {
        trace!("Queueing {} until connected", call.op());
        self.queued.push_back(call);
        if self.queued.len() > self.config.max_queued_calls {
            if let Some(dropped) = self.queued.pop_front() {
                self.warn_listeners(format!(
                    "Connect queue is full ({} calls); dropped queued {} for '{}'",
                    self.config.max_queued_calls,
                    dropped.op(),
                    dropped.resource()
                ));
            }
        }
    }

    fn send_now(&mut self, call: OutgoingCall, ctx: &mut Context<Self>) {
        let text = match self.codec.encode(&call) {
            Ok(text) => text,
            Err(e) => {
                self.warn_listeners(format!("Failed to encode {}: {}", call.op(), e));
                return;
            }
        };
        let Some(connection) = self.connection.clone() else {
            error!("No connection for {} although connected", call.op());
            self.enqueue(call);
            return;
        };

        trace!("Sending: {}", text);
        let delivery = connection.send(SendMessage(WireMessage::Text(text)));
        ctx.spawn(delivery.into_actor(self).map(move |result, act, ctx| {
            let reason = match result {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            act.warn_listeners(format!(
                "Could not send {} for '{}' ({}); queued for the next connection",
                call.op(),
                call.resource(),
                reason
            ));
            act.enqueue(call);
            // A newer connection may already be up and flushed.
            if act.connection.as_ref() != Some(&connection) {
                act.flush_queue(ctx);
            }
        }));
    }

    fn flush_queue(&mut self, ctx: &mut Context<Self>) {
        if !self.queued.is_empty() {
            debug!("Flushing {} queued calls", self.queued.len());
        }
        while self.state == SessionState::Connected {
            let Some(call) = self.queued.pop_front() else {
                break;
            };
            self.send_now(call, ctx);
        }
    }

    fn resolve_waiters(&mut self, result: Result<(), TransportError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    fn handle_connection_state(&mut self, state: ConnectionState, ctx: &mut Context<Self>) {
        match state {
            ConnectionState::Idle => {}
            ConnectionState::Connecting => self.state = SessionState::Connecting,
            ConnectionState::Connected => {
                info!("Session connected.");
                self.state = SessionState::Connected;
                self.emit_event(SessionEvent::Connection);
                self.resolve_waiters(Ok(()));
                self.flush_queue(ctx);
            }
            // The closing connection accepts no more frames; hold calls for the next one.
            ConnectionState::Disconnecting => self.state = SessionState::Disconnected,
            ConnectionState::Disconnected(err) => {
                info!("Session connection closed.");
                self.state = SessionState::Disconnected;
                if let Some(err) = err {
                    self.emit_event(SessionEvent::Error(err.to_string()));
                }
                self.emit_event(SessionEvent::Close);
                self.connection_over(ctx);
            }
            ConnectionState::FailedToStart(err) => {
                self.state = SessionState::Disconnected;
                if err != TransportError::Cancelled {
                    error!("Session failed to connect: {}", err);
                    self.emit_event(SessionEvent::Error(err.to_string()));
                }
                self.resolve_waiters(Err(err));
                self.connection_over(ctx);
            }
        }
    }

    fn connection_over(&mut self, ctx: &mut Context<Self>) {
        self.connection = None;
        self.closing = false;
        if let Some(source) = self.pending_connect.take() {
            self.start_connection(source, ctx);
        }
    }

    // --- Inbound path ---

    fn accept_frame(&mut self, message: WireMessage, ctx: &mut Context<Self>) {
        match self.codec.decode(message) {
            Ok(DecodedFrame::Ready(frame)) => {
                if self.config.preserve_frame_order && !self.inbound.is_empty() {
                    self.inbound.push_back(Slot::Ready(frame));
                } else {
                    self.dispatch(frame);
                }
            }
            Ok(DecodedFrame::Deferred(job)) => {
                if self.config.preserve_frame_order {
                    let seq = self.inbound_head + self.inbound.len() as u64;
                    self.inbound.push_back(Slot::Decoding);
                    self.spawn_decompression(job, Some(seq), ctx);
                } else {
                    self.spawn_decompression(job, None, ctx);
                }
            }
            Err(e) => self.warn_listeners(format!("Dropping undecodable frame: {}", e)),
        }
    }

    fn spawn_decompression(&mut self, job: DecompressJob, seq: Option<u64>, ctx: &mut Context<Self>) {
        let codec = job.codec().to_string();
        let task = tokio::task::spawn_blocking(move || job.run());
        let fut = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ProtocolError::Decompression {
                    codec,
                    reason: e.to_string(),
                }),
            }
        };
        ctx.spawn(fut.into_actor(self).map(move |result, act, _ctx| {
            act.decompression_done(seq, result);
        }));
    }

    fn decompression_done(&mut self, seq: Option<u64>, result: Result<Value, ProtocolError>) {
        let slot = match result {
            Ok(frame) => Slot::Ready(frame),
            Err(e) => {
                self.warn_listeners(format!("Dropping frame: {}", e));
                Slot::Dropped
            }
        };

        let Some(seq) = seq else {
            if let Slot::Ready(frame) = slot {
                self.dispatch(frame);
            }
            return;
        };

        match seq
            .checked_sub(self.inbound_head)
            .and_then(|index| self.inbound.get_mut(index as usize))
        {
            Some(entry) => *entry = slot,
            None => {
                warn!("Decompressed frame #{} has no slot", seq);
                return;
            }
        }

        while matches!(self.inbound.front(), Some(Slot::Ready(_) | Slot::Dropped)) {
            let front = self.inbound.pop_front();
            self.inbound_head += 1;
            if let Some(Slot::Ready(frame)) = front {
                self.dispatch(frame);
            }
        }
    }

    fn add_frame_listener(&mut self, key: FrameKey, listener: FrameListener) {
        let listeners = self.frame_listeners.entry(key).or_default();
        if listener.once {
            listeners.add_once(listener.id, listener.callback);
        } else {
            listeners.add(listener.id, listener.callback);
        }
    }

    fn emit_frame(&mut self, key: &FrameKey, frame: &Value, terminal: bool) -> usize {
        let delivered = match self.frame_listeners.get_mut(key) {
            Some(listeners) => listeners.emit(frame),
            None => 0,
        };
        let empty = self
            .frame_listeners
            .get(key)
            .is_some_and(|listeners| listeners.is_empty());
        if terminal || empty {
            self.frame_listeners.remove(key);
        }
        delivered
    }

    fn dispatch(&mut self, frame: Value) {
        let op = frame.get("op").and_then(Value::as_str).unwrap_or_default();
        trace!("Dispatching inbound '{}' frame", op);

        let (key, field, terminal) = match op {
            "publish" => (frame.get("topic"), "topic", false),
            "service_response" | "action_result" => (frame.get("id"), "id", true),
            "action_feedback" => (frame.get("id"), "id", false),
            "call_service" => (frame.get("service"), "service", false),
            "status" => {
                log_status(&frame);
                return;
            }
            other => {
                debug!("Ignoring frame with unhandled op '{}'", other);
                return;
            }
        };

        let Some(name) = key.and_then(Value::as_str) else {
            let message = ProtocolError::MissingField {
                op: op.to_string(),
                field,
            };
            self.warn_listeners(format!("Dropping frame: {}", message));
            return;
        };

        let key = match field {
            "topic" => FrameKey::topic(name),
            "service" => FrameKey::service(name),
            _ => FrameKey::call(name),
        };
        let delivered = self.emit_frame(&key, &frame, terminal);
        if delivered == 0 {
            trace!("No listeners for {:?}", key);
        }
    }
}

fn log_status(frame: &Value) {
    let level = frame.get("level").and_then(Value::as_str).unwrap_or("info");
    let msg = frame.get("msg").and_then(Value::as_str).unwrap_or_default();
    let id = frame.get("id").and_then(Value::as_str);
    match (level, id) {
        ("error", Some(id)) => error!("rosbridge [{}]: {}", id, msg),
        ("error", None) => error!("rosbridge: {}", msg),
        ("warning", Some(id)) => warn!("rosbridge [{}]: {}", id, msg),
        ("warning", None) => warn!("rosbridge: {}", msg),
        (_, Some(id)) => info!("rosbridge [{}]: {}", id, msg),
        (_, None) => info!("rosbridge: {}", msg),
    }
}

impl Actor for SessionActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        info!("SessionActor started.");
    }

    fn stopping(&mut self, _ctx: &mut Context<Self>) -> Running {
        info!("SessionActor stopping.");
        if let Some(connection) = self.connection.take() {
            connection.do_send(Disconnect);
        }
        self.resolve_waiters(Err(TransportError::Cancelled));
        self.frame_listeners.clear();
        self.event_listeners.clear();
        Running::Stop
    }
}

impl Handler<Connect> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: Connect, ctx: &mut Context<Self>) {
        info!("Connecting session to {}", msg.0.address);
        self.start_connection(TransportSource::Params(msg.0), ctx);
    }
}

impl Handler<ConnectTransport> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: ConnectTransport, ctx: &mut Context<Self>) {
        self.start_connection(TransportSource::Ready(msg.0), ctx);
    }
}

impl Handler<Close> for SessionActor {
    type Result = ();

    fn handle(&mut self, _msg: Close, _ctx: &mut Context<Self>) {
        self.pending_connect = None;
        match &self.connection {
            Some(connection) if !self.closing => {
                info!("Closing session.");
                self.closing = true;
                self.state = SessionState::Disconnected;
                connection.do_send(Disconnect);
            }
            _ => trace!("Close ignored; no open connection."),
        }
    }
}

impl Handler<ConnectionStatusUpdate> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: ConnectionStatusUpdate, ctx: &mut Context<Self>) {
        debug!("SessionActor received ConnectionStatusUpdate: {:?}", msg.0);
        self.handle_connection_state(msg.0, ctx);
    }
}

impl Handler<IncomingMessage> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: IncomingMessage, ctx: &mut Context<Self>) {
        self.accept_frame(msg.0, ctx);
    }
}

impl Handler<CallOnConnection> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: CallOnConnection, ctx: &mut Context<Self>) {
        self.call_on_connection(msg.0, ctx);
    }
}

impl Handler<IssueCall> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: IssueCall, ctx: &mut Context<Self>) {
        let IssueCall {
            mut call,
            reply,
            respond_to,
        } = msg;
        let id = self.next_call_id(call.op(), call.resource());
        if call.set_id(id.clone()) {
            if let Some(listener) = reply {
                self.add_frame_listener(FrameKey::call(id.clone()), listener);
            }
        } else if reply.is_some() {
            warn!("{} carries no id; its reply listener is ignored", call.op());
        }
        self.call_on_connection(call, ctx);
        if let Some(tx) = respond_to {
            let _ = tx.send(id);
        }
    }
}

impl Handler<NextCallId> for SessionActor {
    type Result = MessageResult<NextCallId>;

    fn handle(&mut self, msg: NextCallId, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.next_call_id(&msg.operation, &msg.resource))
    }
}

impl Handler<AddFrameListener> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: AddFrameListener, _ctx: &mut Context<Self>) {
        trace!("Adding frame listener {} for {:?}", msg.listener.id, msg.key);
        self.add_frame_listener(msg.key, msg.listener);
    }
}

impl Handler<RemoveFrameListener> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: RemoveFrameListener, _ctx: &mut Context<Self>) {
        if let Some(listeners) = self.frame_listeners.get_mut(&msg.key) {
            listeners.remove(msg.id);
            if listeners.is_empty() {
                self.frame_listeners.remove(&msg.key);
            }
        }
    }
}

impl Handler<AddEventListener> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: AddEventListener, _ctx: &mut Context<Self>) {
        if msg.once {
            self.event_listeners.add_once(msg.id, msg.callback);
        } else {
            self.event_listeners.add(msg.id, msg.callback);
        }
    }
}

impl Handler<RemoveEventListener> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: RemoveEventListener, _ctx: &mut Context<Self>) {
        self.event_listeners.remove(msg.0);
    }
}

impl Handler<EmitWarning> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: EmitWarning, _ctx: &mut Context<Self>) {
        self.emit_event(SessionEvent::Warning(msg.0));
    }
}

impl Handler<IsConnected> for SessionActor {
    type Result = bool;

    fn handle(&mut self, _msg: IsConnected, _ctx: &mut Context<Self>) -> bool {
        self.state == SessionState::Connected
    }
}

impl Handler<WhenConnected> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: WhenConnected, _ctx: &mut Context<Self>) {
        if self.state == SessionState::Connected {
            let _ = msg.0.send(Ok(()));
        } else {
            self.waiters.push(msg.0);
        }
    }
}
