//! Service channel: call a remote service, or serve one.

use crate::error::mailbox_to_api_error;
use actix::prelude::*;
use futures_channel::oneshot;
use log::{debug, trace, warn};
use roslink_core::listeners::ListenerId;
use roslink_interfaces::{ApiError, ServiceOptions, ServiceRequest, ServiceResponse};
use roslink_protocol_handler::{FrameKey, FrameListener, OutgoingCall, Session};
use serde_json::Value;
use std::time::Duration;

/// Outcome of one call: the response, or the failure payload when the
/// remote side answered with `result: false`.
pub type CallOutcome = Result<ServiceResponse, Value>;

type Reply = Box<dyn FnOnce(CallOutcome) + Send + 'static>;

/// Serves one request. Fill in the response and return `true` for success.
pub type ServiceHandler = Box<dyn FnMut(&ServiceRequest, &mut ServiceResponse) -> bool + Send + 'static>;

/// Identifies the local registration of one in-flight call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub call_id: String,
    listener: ListenerId,
}

// ================= Messages =================

#[derive(Message)]
#[rtype(result = "Option<PendingCall>")]
struct CallService {
    request: ServiceRequest,
    reply: Reply,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct ForgetCall(PendingCall);

#[derive(Message)]
#[rtype(result = "()")]
struct AdvertiseService(ServiceHandler);

#[derive(Debug, Message)]
#[rtype(result = "()")]
struct UnadvertiseService;

#[derive(Debug, Message)]
#[rtype(result = "bool")]
struct IsAdvertised;

/// An inbound `call_service` frame addressed to this service.
#[derive(Debug, Message)]
#[rtype(result = "()")]
struct IncomingRequest(Value);

// ================= Service Actor =================

pub struct ServiceActor {
    session: Session,
    options: ServiceOptions,
    handler: Option<ServiceHandler>,
    request_listener: Option<ListenerId>,
}

impl ServiceActor {
    fn new(session: Session, options: ServiceOptions) -> Self {
        Self {
            session,
            options,
            handler: None,
            request_listener: None,
        }
    }

    fn is_advertised(&self) -> bool {
        self.handler.is_some()
    }

    fn unadvertise(&mut self) {
        if self.handler.take().is_none() {
            return;
        }
        if let Some(id) = self.request_listener.take() {
            self.session
                .off_frame(FrameKey::service(self.options.name.clone()), id);
        }
        debug!("Unadvertising service {}", self.options.name);
        self.session
            .call_on_connection(OutgoingCall::UnadvertiseService {
                service: self.options.name.clone(),
            });
    }
}

/// Splits a `service_response` frame into the call outcome.
fn outcome(frame: &Value) -> CallOutcome {
    let values = frame.get("values").cloned().unwrap_or(Value::Null);
    match frame.get("result").and_then(Value::as_bool) {
        Some(false) => Err(values),
        _ => Ok(ServiceResponse::new(values)),
    }
}

impl Actor for ServiceActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("ServiceActor started for {}", self.options.name);
    }

    fn stopping(&mut self, _ctx: &mut Context<Self>) -> Running {
        debug!("ServiceActor stopping for {}", self.options.name);
        self.unadvertise();
        Running::Stop
    }
}

// ================= Handlers =================

impl Handler<CallService> for ServiceActor {
    type Result = AtomicResponse<Self, Option<PendingCall>>;

    fn handle(&mut self, msg: CallService, _ctx: &mut Context<Self>) -> Self::Result {
        if self.is_advertised() {
            debug!(
                "Service {} is advertised by this channel; call ignored",
                self.options.name
            );
            return AtomicResponse::new(Box::pin(actix::fut::ready(None)));
        }

        let mut reply = Some(msg.reply);
        let listener = FrameListener::once(move |frame| {
            if let Some(reply) = reply.take() {
                reply(outcome(frame));
            }
        });
        let listener_id = listener.id;
        let call = OutgoingCall::CallService {
            id: None,
            service: self.options.name.clone(),
            args: msg.request.into_value(),
        };
        let session = self.session.clone();
        let fut = async move { session.issue_call(call, Some(listener)).await };

        AtomicResponse::new(Box::pin(fut.into_actor(self).map(move |result, act, _ctx| {
            match result {
                Ok(call_id) => {
                    trace!("Issued {}", call_id);
                    Some(PendingCall {
                        call_id,
                        listener: listener_id,
                    })
                }
                Err(e) => {
                    warn!("Call to {} was not issued: {}", act.options.name, e);
                    None
                }
            }
        })))
    }
}

impl Handler<ForgetCall> for ServiceActor {
    type Result = ();

    fn handle(&mut self, msg: ForgetCall, _ctx: &mut Context<Self>) {
        self.session
            .off_frame(FrameKey::call(msg.0.call_id), msg.0.listener);
    }
}

impl Handler<AdvertiseService> for ServiceActor {
    type Result = ();

    fn handle(&mut self, msg: AdvertiseService, ctx: &mut Context<Self>) {
        if self.is_advertised() {
            debug!("Service {} already advertised", self.options.name);
            return;
        }
        self.handler = Some(msg.0);

        let weak = ctx.address().downgrade();
        self.request_listener = Some(self.session.on_frame(
            FrameKey::service(self.options.name.clone()),
            move |frame| {
                if let Some(addr) = weak.upgrade() {
                    addr.do_send(IncomingRequest(frame.clone()));
                }
            },
        ));

        debug!("Advertising service {}", self.options.name);
        self.session
            .call_on_connection(OutgoingCall::AdvertiseService {
                service_type: self.options.service_type.clone(),
                service: self.options.name.clone(),
            });
    }
}

impl Handler<UnadvertiseService> for ServiceActor {
    type Result = ();

    fn handle(&mut self, _msg: UnadvertiseService, _ctx: &mut Context<Self>) {
        self.unadvertise();
    }
}

impl Handler<IsAdvertised> for ServiceActor {
    type Result = bool;

    fn handle(&mut self, _msg: IsAdvertised, _ctx: &mut Context<Self>) -> bool {
        self.is_advertised()
    }
}

impl Handler<IncomingRequest> for ServiceActor {
    type Result = ();

    fn handle(&mut self, msg: IncomingRequest, _ctx: &mut Context<Self>) {
        let Some(handler) = self.handler.as_mut() else {
            trace!("Request for {} after unadvertise; ignored", self.options.name);
            return;
        };
        let frame = msg.0;
        let request = ServiceRequest::new(frame.get("args").cloned().unwrap_or(Value::Null));
        let mut response = ServiceResponse::default();
        let result = handler(&request, &mut response);

        self.session.call_on_connection(OutgoingCall::ServiceResponse {
            id: frame.get("id").and_then(Value::as_str).map(str::to_string),
            service: self.options.name.clone(),
            values: response.into_value(),
            result,
        });
    }
}

// ================= Handle =================

/// Handle to a service channel.
///
/// A channel is either a client or, after [`Service::advertise`], a server.
/// Calls made while it is advertised are ignored.
#[derive(Clone)]
pub struct Service {
    addr: Addr<ServiceActor>,
    name: String,
    service_type: String,
}

impl Service {
    pub fn new(session: &Session, options: ServiceOptions) -> Self {
        let name = options.name.clone();
        let service_type = options.service_type.clone();
        let addr = ServiceActor::new(session.clone(), options).start();
        Self {
            addr,
            name,
            service_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Calls the service. `on_success` receives the response; `on_failure`
    /// receives the failure payload when the remote side reports `result: false`.
    pub fn call_service<S, F>(&self, request: impl Into<ServiceRequest>, on_success: S, on_failure: F)
    where
        S: FnOnce(ServiceResponse) + Send + 'static,
        F: FnOnce(Value) + Send + 'static,
    {
        self.addr.do_send(CallService {
            request: request.into(),
            reply: Box::new(move |outcome| match outcome {
                Ok(response) => on_success(response),
                Err(values) => on_failure(values),
            }),
        });
    }

    /// Calls the service and waits for the response.
    pub async fn call(&self, request: impl Into<ServiceRequest>) -> Result<ServiceResponse, ApiError> {
        let (_pending, rx) = self.start_call(request.into()).await?;
        Self::finish(rx).await
    }

    /// Like [`Service::call`], giving up locally after `timeout`. The request
    /// itself is not withdrawn; a late response is discarded.
    pub async fn call_with_timeout(
        &self,
        request: impl Into<ServiceRequest>,
        timeout: Duration,
    ) -> Result<ServiceResponse, ApiError> {
        let (pending, rx) = self.start_call(request.into()).await?;
        match tokio::time::timeout(timeout, Self::finish(rx)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Call {} timed out after {:?}", pending.call_id, timeout);
                self.addr.do_send(ForgetCall(pending));
                Err(ApiError::Timeout)
            }
        }
    }

    async fn start_call(
        &self,
        request: ServiceRequest,
    ) -> Result<(PendingCall, oneshot::Receiver<CallOutcome>), ApiError> {
        let (tx, rx) = oneshot::channel();
        let pending = self
            .addr
            .send(CallService {
                request,
                reply: Box::new(move |outcome| {
                    let _ = tx.send(outcome);
                }),
            })
            .await
            .map_err(|e| mailbox_to_api_error("calling service", e))?;
        match pending {
            Some(pending) => Ok((pending, rx)),
            None => Err(ApiError::CallDropped(
                "service channel is advertised or the session has stopped".into(),
            )),
        }
    }

    async fn finish(rx: oneshot::Receiver<CallOutcome>) -> Result<ServiceResponse, ApiError> {
        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(values)) => Err(ApiError::ServiceFailed(values)),
            Err(_) => Err(ApiError::CallDropped("session dropped the call".into())),
        }
    }

    /// Serves requests with `handler` until [`Service::unadvertise`].
    pub fn advertise<H>(&self, handler: H)
    where
        H: FnMut(&ServiceRequest, &mut ServiceResponse) -> bool + Send + 'static,
    {
        self.addr.do_send(AdvertiseService(Box::new(handler)));
    }

    pub fn unadvertise(&self) {
        self.addr.do_send(UnadvertiseService);
    }

    pub async fn is_advertised(&self) -> Result<bool, ApiError> {
        self.addr
            .send(IsAdvertised)
            .await
            .map_err(|e| mailbox_to_api_error("querying service", e))
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("service_type", &self.service_type)
            .finish()
    }
}
