//! Cloneable handle to a [`SessionActor`].

use crate::codec::FrameCodec;
use crate::messages::{
    AddEventListener, AddFrameListener, CallOnConnection, Close, Connect, ConnectTransport,
    EmitWarning, FrameKey, FrameListener, IsConnected, IssueCall, NextCallId, OutgoingCall,
    RemoveEventListener, RemoveFrameListener, WhenConnected,
};
use crate::session_actor::SessionActor;
use actix::prelude::*;
use futures_channel::oneshot;
use roslink_core::config::SessionConfig;
use roslink_core::error::InternalError;
use roslink_core::listeners::ListenerId;
use roslink_interfaces::{AuthParams, SessionEvent};
use roslink_transport::{ConnectParams, Transport};
use serde_json::Value;

/// One logical connection to a rosbridge server.
///
/// All clones talk to the same session. Operations are delivered to the
/// session in the order they are made from one handle. The session stops and
/// closes its connection when the last handle is dropped.
///
/// Must be created inside a running actix system.
#[derive(Clone)]
pub struct Session {
    addr: Addr<SessionActor>,
}

fn mailbox_error(e: MailboxError) -> InternalError {
    InternalError::Actor(format!("SessionActor mailbox error: {}", e))
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            addr: SessionActor::new(config).start(),
        }
    }

    pub fn with_codec(config: SessionConfig, codec: FrameCodec) -> Self {
        Self {
            addr: SessionActor::with_codec(config, codec).start(),
        }
    }

    pub fn connect(&self, params: ConnectParams) {
        self.addr.do_send(Connect(params));
    }

    /// Connects over a caller supplied transport, such as one end of a
    /// [`roslink_transport::memory_pair`].
    pub fn connect_transport<T: Transport + 'static>(&self, transport: T) {
        self.addr.do_send(ConnectTransport(Box::new(transport)));
    }

    /// Closes the connection. Does nothing when already closed.
    pub fn close(&self) {
        self.addr.do_send(Close);
    }

    /// Sends `call` now, or once the session connects.
    pub fn call_on_connection(&self, call: OutgoingCall) {
        self.addr.do_send(CallOnConnection(call));
    }

    /// Gives `call` a fresh call id, registers `reply` under that id and sends it.
    pub fn issue(&self, call: OutgoingCall, reply: Option<FrameListener>) {
        self.addr.do_send(IssueCall {
            call,
            reply,
            respond_to: None,
        });
    }

    /// Like [`Session::issue`], returning the assigned call id.
    pub async fn issue_call(
        &self,
        call: OutgoingCall,
        reply: Option<FrameListener>,
    ) -> Result<String, InternalError> {
        let (tx, rx) = oneshot::channel();
        self.addr.do_send(IssueCall {
            call,
            reply,
            respond_to: Some(tx),
        });
        rx.await
            .map_err(|_| InternalError::Actor("session stopped before assigning an id".into()))
    }

    pub async fn next_call_id(
        &self,
        operation: impl Into<String>,
        resource: impl Into<String>,
    ) -> Result<String, InternalError> {
        self.addr
            .send(NextCallId {
                operation: operation.into(),
                resource: resource.into(),
            })
            .await
            .map_err(mailbox_error)
    }

    pub fn add_frame_listener(&self, key: FrameKey, listener: FrameListener) -> ListenerId {
        let id = listener.id;
        self.addr.do_send(AddFrameListener { key, listener });
        id
    }

    pub fn on_frame<F>(&self, key: FrameKey, callback: F) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.add_frame_listener(key, FrameListener::repeating(callback))
    }

    pub fn once_frame<F>(&self, key: FrameKey, callback: F) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.add_frame_listener(key, FrameListener::once(callback))
    }

    pub fn off_frame(&self, key: FrameKey, id: ListenerId) {
        self.addr.do_send(RemoveFrameListener { key, id });
    }

    pub fn on_event<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        let id = ListenerId::next();
        self.addr.do_send(AddEventListener {
            id,
            once: false,
            callback: Box::new(callback),
        });
        id
    }

    pub fn once_event<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        let id = ListenerId::next();
        self.addr.do_send(AddEventListener {
            id,
            once: true,
            callback: Box::new(callback),
        });
        id
    }

    pub fn off_event(&self, id: ListenerId) {
        self.addr.do_send(RemoveEventListener(id));
    }

    /// Broadcasts a `warning` event to the session's listeners.
    pub fn emit_warning(&self, message: impl Into<String>) {
        self.addr.do_send(EmitWarning(message.into()));
    }

    pub async fn is_connected(&self) -> Result<bool, InternalError> {
        self.addr.send(IsConnected).await.map_err(mailbox_error)
    }

    /// Resolves once the session is connected, or with the error of the next
    /// failed connection attempt.
    pub async fn wait_for_connection(&self) -> Result<(), InternalError> {
        let (tx, rx) = oneshot::channel();
        self.addr.do_send(WhenConnected(tx));
        match rx.await {
            Ok(result) => result.map_err(InternalError::from),
            Err(_) => Err(InternalError::Actor("session stopped".into())),
        }
    }

    /// Sends an `auth` operation.
    pub fn authenticate(&self, params: AuthParams) {
        self.call_on_connection(OutgoingCall::Auth(params));
    }

    /// Sets the level of `status` messages the server sends, optionally for
    /// the operation with call id `id` only.
    pub fn set_status_level(&self, level: impl Into<String>, id: Option<String>) {
        self.call_on_connection(OutgoingCall::SetLevel {
            id,
            level: level.into(),
        });
    }

    /// Whether the session actor is still running.
    pub fn is_alive(&self) -> bool {
        self.addr.connected()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}
