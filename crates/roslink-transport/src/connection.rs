use crate::error::TransportError;
use crate::factory::create_transport;
use crate::traits::Transport;
use crate::types::{ConnectParams, WireMessage};
use actix::WeakRecipient;
use actix::prelude::*;
use log::{debug, error, info, trace, warn};
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// What a [`ConnectionActor`] connects with.
pub enum TransportSource {
    /// Build a transport from the address in the parameters.
    Params(ConnectParams),
    /// Use an already constructed transport.
    Ready(Box<dyn Transport>),
}

/// Actor responsible for managing a single underlying transport connection.
///
/// It connects on start, runs the combined read/write loop, forwards every
/// received frame to its message handler and reports lifecycle changes to its
/// supervisor. Each attempt ends in exactly one of `Connected` or
/// `FailedToStart`; an established connection ends in exactly one
/// `Disconnected`. The actor stops once the connection is over.
///
/// Both recipients are held weakly, so the connection never keeps its owner
/// alive. When the message handler goes away the connection closes.
pub struct ConnectionActor {
    source: Option<TransportSource>,
    label: String,
    connect_timeout: Duration,
    state: ConnectionState,
    message_handler: WeakRecipient<IncomingMessage>,
    // Channel for sending outgoing messages to the write task
    outgoing_tx: Option<mpsc::UnboundedSender<WireMessage>>,
    supervisor: WeakRecipient<ConnectionStatusUpdate>,
    connection_task: Option<SpawnHandle>,
}

impl ConnectionActor {
    pub fn new(
        params: ConnectParams,
        message_handler: Recipient<IncomingMessage>,
        supervisor: Recipient<ConnectionStatusUpdate>,
    ) -> Self {
        Self::from_source(TransportSource::Params(params), message_handler, supervisor)
    }

    pub fn with_transport(
        transport: Box<dyn Transport>,
        message_handler: Recipient<IncomingMessage>,
        supervisor: Recipient<ConnectionStatusUpdate>,
    ) -> Self {
        Self::from_source(TransportSource::Ready(transport), message_handler, supervisor)
    }

    pub fn from_source(
        source: TransportSource,
        message_handler: Recipient<IncomingMessage>,
        supervisor: Recipient<ConnectionStatusUpdate>,
    ) -> Self {
        let (label, connect_timeout) = match &source {
            TransportSource::Params(params) => {
                (params.address.to_string(), params.connection_timeout)
            }
            TransportSource::Ready(_) => {
                ("<provided transport>".to_string(), DEFAULT_CONNECT_TIMEOUT)
            }
        };
        ConnectionActor {
            source: Some(source),
            label,
            connect_timeout,
            state: ConnectionState::Idle,
            message_handler: message_handler.downgrade(),
            outgoing_tx: None,
            supervisor: supervisor.downgrade(),
            connection_task: None,
        }
    }

    fn start_connection_task(&mut self, ctx: &mut Context<Self>) {
        let Some(source) = self.source.take() else {
            warn!("Connection to {} was already attempted.", self.label);
            return;
        };

        self.state = ConnectionState::Connecting;
        info!("ConnectionActor state -> Connecting ({})", self.label);
        self.notify_supervisor(self.state.clone());

        let transport = match source {
            TransportSource::Params(params) => create_transport(&params),
            TransportSource::Ready(transport) => Ok(transport),
        };

        let addr = ctx.address();
        let message_handler = self.message_handler.clone();
        let connect_timeout = self.connect_timeout;

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<WireMessage>();
        self.outgoing_tx = Some(outgoing_tx);

        let connection_fut = async move {
            let mut transport = match transport {
                Ok(transport) => transport,
                Err(e) => {
                    error!("Failed to create transport: {}", e);
                    addr.do_send(TransportEvent::FailedToStart(e));
                    return;
                }
            };

            match tokio::time::timeout(connect_timeout, transport.connect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Transport connect error: {}", e);
                    addr.do_send(TransportEvent::FailedToStart(e));
                    return;
                }
                Err(_) => {
                    error!("Transport connection timed out after {:?}", connect_timeout);
                    addr.do_send(TransportEvent::FailedToStart(TransportError::Timeout));
                    return;
                }
            }

            info!("Transport connected.");
            addr.do_send(TransportEvent::Connected);

            let outcome = loop {
                tokio::select! {
                    biased;

                    maybe_outgoing = outgoing_rx.recv() => {
                        match maybe_outgoing {
                            Some(message) => {
                                trace!("Sending frame ({} bytes)", message.len());
                                if let Err(e) = transport.send(message).await {
                                    error!("Transport send error: {}. Disconnecting.", e);
                                    break Some(e);
                                }
                            }
                            None => {
                                info!("Outgoing channel closed, ending connection loop.");
                                break None;
                            }
                        }
                    },

                    received = transport.receive() => {
                        match received {
                            Some(Ok(message)) => {
                                trace!("Received frame ({} bytes)", message.len());
                                match message_handler.upgrade() {
                                    Some(handler) => handler.do_send(IncomingMessage(message)),
                                    None => {
                                        info!("Message handler is gone, ending connection loop.");
                                        break None;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                error!("Transport receive error: {}. Disconnecting.", e);
                                break Some(e);
                            }
                            None => {
                                info!("Transport connection closed by remote.");
                                break None;
                            }
                        }
                    }
                }
            };

            if let Err(e) = transport.disconnect().await {
                warn!("Error during transport disconnect after loop exit: {}", e);
            }
            addr.do_send(TransportEvent::Disconnected(outcome));
        };

        self.connection_task = Some(ctx.spawn(connection_fut.into_actor(self)));
    }

    fn notify_supervisor(&self, state: ConnectionState) {
        match self.supervisor.upgrade() {
            Some(supervisor) => supervisor.do_send(ConnectionStatusUpdate(state)),
            None => trace!("No supervisor left for {:?}", state),
        }
    }
}

/// Lifecycle state of the connection managed by `ConnectionActor`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    /// `Some(err)` when the connection broke, `None` for a graceful close.
    Disconnected(Option<TransportError>),
    /// The attempt never produced a connection.
    FailedToStart(TransportError),
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected(_) | ConnectionState::FailedToStart(_)
        )
    }
}

// --- Actor Messages ---

/// Sends one frame out over the connection.
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), TransportError>")]
pub struct SendMessage(pub WireMessage);

/// A frame received from the transport.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct IncomingMessage(pub WireMessage);

/// Asks the actor to close the connection. Harmless when already closed.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Disconnect;

/// Reported to the supervisor on every state change.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct ConnectionStatusUpdate(pub ConnectionState);

#[derive(Message)]
#[rtype(result = "()")]
enum TransportEvent {
    Connected,
    Disconnected(Option<TransportError>),
    FailedToStart(TransportError),
}

// --- Actor Implementation ---

impl Actor for ConnectionActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("ConnectionActor starting for {}", self.label);
        // Senders await `SendMessage` replies; a bounded mailbox could reorder them.
        ctx.set_mailbox_capacity(usize::MAX);
        self.start_connection_task(ctx);
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        debug!("ConnectionActor stopping ({}).", self.label);
        self.outgoing_tx = None;

        let final_state = match self.state {
            ConnectionState::Disconnected(_) | ConnectionState::FailedToStart(_) => None,
            ConnectionState::Idle | ConnectionState::Connecting => {
                Some(ConnectionState::FailedToStart(TransportError::Cancelled))
            }
            ConnectionState::Connected | ConnectionState::Disconnecting => {
                Some(ConnectionState::Disconnected(None))
            }
        };
        if let Some(state) = final_state {
            self.state = state.clone();
            self.notify_supervisor(state);
        }
        Running::Stop
    }
}

// --- Message Handlers ---

impl Handler<TransportEvent> for ConnectionActor {
    type Result = ();

    fn handle(&mut self, msg: TransportEvent, ctx: &mut Context<Self>) {
        let new_state = match msg {
            TransportEvent::Connected => ConnectionState::Connected,
            TransportEvent::Disconnected(err) => ConnectionState::Disconnected(err),
            TransportEvent::FailedToStart(err) => ConnectionState::FailedToStart(err),
        };

        if self.state.is_terminal() {
            trace!("Ignoring {:?} after terminal state {:?}", new_state, self.state);
            return;
        }

        info!("Connection state {:?} -> {:?}", self.state, new_state);
        self.state = new_state.clone();
        self.notify_supervisor(new_state);

        if self.state.is_terminal() {
            self.outgoing_tx = None;
            self.connection_task = None;
            ctx.stop();
        }
    }
}

impl Handler<Disconnect> for ConnectionActor {
    type Result = ();

    fn handle(&mut self, _msg: Disconnect, ctx: &mut Context<Self>) {
        match self.state {
            ConnectionState::Connected => {
                info!("Closing connection to {}", self.label);
                self.state = ConnectionState::Disconnecting;
                self.notify_supervisor(ConnectionState::Disconnecting);
                // Dropping the sender ends the read/write loop.
                self.outgoing_tx = None;
            }
            ConnectionState::Idle | ConnectionState::Connecting => {
                info!("Abandoning connection attempt to {}", self.label);
                if let Some(handle) = self.connection_task.take() {
                    ctx.cancel_future(handle);
                }
                ctx.stop();
            }
            _ => trace!("Disconnect ignored in state {:?}", self.state),
        }
    }
}

impl Handler<SendMessage> for ConnectionActor {
    type Result = Result<(), TransportError>;

    fn handle(&mut self, msg: SendMessage, _ctx: &mut Context<Self>) -> Self::Result {
        if self.state != ConnectionState::Connected {
            warn!(
                "Attempted to send while not connected (state: {:?})",
                self.state
            );
            return Err(TransportError::NotConnected(format!(
                "Current state: {:?}",
                self.state
            )));
        }
        match &self.outgoing_tx {
            Some(tx) => tx.send(msg.0).map_err(|e| {
                error!("Outgoing channel send error: {}", e);
                TransportError::SendFailed("connection loop has ended".into())
            }),
            None => Err(TransportError::NotConnected("outgoing channel missing".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::memory_pair;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        states: Vec<ConnectionState>,
        frames: Vec<WireMessage>,
    }

    struct Recorder(Arc<Mutex<Recorded>>);

    impl Actor for Recorder {
        type Context = Context<Self>;
    }

    impl Handler<ConnectionStatusUpdate> for Recorder {
        type Result = ();
        fn handle(&mut self, msg: ConnectionStatusUpdate, _ctx: &mut Context<Self>) {
            self.0.lock().unwrap().states.push(msg.0);
        }
    }

    impl Handler<IncomingMessage> for Recorder {
        type Result = ();
        fn handle(&mut self, msg: IncomingMessage, _ctx: &mut Context<Self>) {
            self.0.lock().unwrap().frames.push(msg.0);
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[actix_rt::test]
    async fn forwards_frames_and_reports_lifecycle() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let recorder = Recorder(recorded.clone()).start();
        let (transport, mut peer) = memory_pair();

        let conn = ConnectionActor::with_transport(
            Box::new(transport),
            recorder.clone().recipient(),
            recorder.clone().recipient(),
        )
        .start();
        settle().await;

        conn.send(SendMessage(WireMessage::from("{\"op\":\"x\"}")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(peer.next_outgoing().await, Some(WireMessage::from("{\"op\":\"x\"}")));

        peer.send_text("{\"op\":\"y\"}");
        settle().await;
        peer.close();
        settle().await;

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.frames, vec![WireMessage::from("{\"op\":\"y\"}")]);
        assert_eq!(
            recorded.states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected(None),
            ]
        );
    }

    #[actix_rt::test]
    async fn failed_attempt_reports_failure_only() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let recorder = Recorder(recorded.clone()).start();
        let (transport, _peer) = memory_pair();
        let transport = transport.refusing(TransportError::ConnectionFailed("refused".into()));

        ConnectionActor::with_transport(
            Box::new(transport),
            recorder.clone().recipient(),
            recorder.clone().recipient(),
        )
        .start();
        settle().await;

        let states = recorded.lock().unwrap().states.clone();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::FailedToStart(TransportError::ConnectionFailed("refused".into())),
            ]
        );
    }

    #[actix_rt::test]
    async fn disconnect_closes_once() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let recorder = Recorder(recorded.clone()).start();
        let (transport, _peer) = memory_pair();

        let conn = ConnectionActor::with_transport(
            Box::new(transport),
            recorder.clone().recipient(),
            recorder.clone().recipient(),
        )
        .start();
        settle().await;
        conn.do_send(Disconnect);
        conn.do_send(Disconnect);
        settle().await;

        let states = recorded.lock().unwrap().states.clone();
        let closes = states
            .iter()
            .filter(|s| matches!(s, ConnectionState::Disconnected(_)))
            .count();
        assert_eq!(closes, 1);
        assert_eq!(states.last(), Some(&ConnectionState::Disconnected(None)));
    }

    #[actix_rt::test]
    async fn connection_ends_when_its_handler_is_gone() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let recorder = Recorder(recorded.clone()).start();
        let (transport, mut peer) = memory_pair();

        let _conn = ConnectionActor::with_transport(
            Box::new(transport),
            recorder.clone().recipient(),
            recorder.clone().recipient(),
        )
        .start();
        settle().await;
        drop(recorder);
        settle().await;

        peer.send_text("{\"op\":\"y\"}");
        let ended = tokio::time::timeout(Duration::from_millis(300), peer.next_outgoing()).await;
        assert!(matches!(ended, Ok(None)));
        assert!(recorded.lock().unwrap().frames.is_empty());
    }
}
