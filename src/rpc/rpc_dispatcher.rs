use super::call_context::ConnectionLink;
use crate::constants::SERVICE_NOT_FOUND;
use super::{CallContext, CallRegistry, MethodRegistry, UserData};
use crate::error::{DispatchError, InvokeError, MethodError, SendError};
use crate::transport::RpcTransport;
use crate::wire::{
    CallId, FrameKind, MessagePackCodec, Payload, Request, Response, StatusCode, WireCodec,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// An untyped handler failure, reported after the client was answered with
/// `INTERNAL`.
#[derive(Debug)]
pub struct CallFailure {
    pub id: CallId,
    pub method: String,
    pub error: InvokeError,
}

pub type CallFailureHook = Arc<dyn Fn(CallFailure) + Send + Sync>;

/// Per-connection dispatcher settings.
#[derive(Clone)]
pub struct DispatcherOptions {
    codec: Arc<dyn WireCodec>,
    call_timeout: Option<Duration>,
    user_data: Option<UserData>,
    on_call_failure: CallFailureHook,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            codec: Arc::new(MessagePackCodec::new()),
            call_timeout: None,
            user_data: None,
            on_call_failure: Arc::new(log_call_failure),
        }
    }
}

impl DispatcherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: impl WireCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Cancels every call automatically once it has run for `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_user_data(mut self, user_data: UserData) -> Self {
        self.user_data = Some(user_data);
        self
    }

    /// Replaces the default hook, which logs the failure.
    pub fn on_call_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(CallFailure) + Send + Sync + 'static,
    {
        self.on_call_failure = Arc::new(hook);
        self
    }
}

impl fmt::Debug for DispatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherOptions")
            .field("call_timeout", &self.call_timeout)
            .field("has_user_data", &self.user_data.is_some())
            .finish()
    }
}

fn log_call_failure(failure: CallFailure) {
    tracing::error!(
        "Call {} with id {} failed: {}",
        failure.method,
        failure.id,
        failure.error
    );
}

/// Routes the inbound frames of one connection to its calls.
///
/// Frames must be fed in arrival order. Each admitted call runs on its own
/// Tokio task; stream data and stream ends are pushed into the call before
/// `dispatch` returns, so per-call ordering follows arrival order.
pub struct RpcDispatcher {
    methods: Arc<MethodRegistry>,
    calls: CallRegistry,
    link: ConnectionLink,
    call_timeout: Option<Duration>,
    on_call_failure: CallFailureHook,
    live: AtomicBool,
}

impl RpcDispatcher {
    pub fn new(methods: Arc<MethodRegistry>, transport: Arc<dyn RpcTransport>) -> Self {
        Self::with_options(methods, transport, DispatcherOptions::default())
    }

    pub fn with_options(
        methods: Arc<MethodRegistry>,
        transport: Arc<dyn RpcTransport>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            methods,
            calls: CallRegistry::default(),
            link: ConnectionLink {
                transport,
                codec: options.codec,
                user_data: options.user_data,
            },
            call_timeout: options.call_timeout,
            on_call_failure: options.on_call_failure,
            live: AtomicBool::new(true),
        }
    }

    pub fn calls(&self) -> &CallRegistry {
        &self.calls
    }

    /// `false` once [`on_close`](Self::on_close) ran.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Decodes and dispatches one binary message.
    ///
    /// A [`DispatchError::Protocol`] means the peer broke the protocol and
    /// the connection should be closed.
    pub async fn on_message(&self, bytes: &[u8]) -> Result<(), DispatchError> {
        let request = self.link.codec.decode_request(bytes)?;
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, request: Request) -> Result<(), DispatchError> {
        if !self.is_live() {
            tracing::debug!(
                "Ignoring frame for call {} after the connection closed",
                request.id
            );
            return Ok(());
        }

        if request.kind == FrameKind::Abort {
            if self.calls.abort(request.id).await {
                tracing::debug!("Call {} with id {} aborted", request.method, request.id);
            }
            return Ok(());
        }

        let Some(descriptor) = self.methods.get(&request.method).cloned() else {
            tracing::debug!("No method {} registered", request.method);
            return self
                .reject(&request, MethodError::new(StatusCode::NotFound, SERVICE_NOT_FOUND))
                .await;
        };

        if let Some(context) = self.calls.get(request.id) {
            return self.route_to_live_call(context, request).await;
        }

        let Request {
            id,
            method,
            kind,
            mut payload,
            meta,
        } = request;

        let shape = descriptor.shape();
        let context = CallContext::new(
            id,
            descriptor.full_name(),
            shape,
            meta.unwrap_or_default(),
            self.link.clone(),
            self.call_timeout,
        );

        if shape.accepts_client_stream() {
            if let Some(first) = payload.take().filter(|value| !value.is_nil()) {
                context.receive(first);
            }
        }

        self.calls.insert(context.clone());
        tracing::trace!("Admitted {} call {} with id {}", shape, method, id);

        let calls = self.calls.clone();
        let on_call_failure = self.on_call_failure.clone();
        tokio::spawn(async move {
            let result = descriptor.invoke(kind, payload, context.clone()).await;
            calls.remove_call(&context);
            if let Err(error) = result {
                on_call_failure(CallFailure { id, method, error });
            }
        });

        Ok(())
    }

    async fn route_to_live_call(
        &self,
        context: CallContext,
        request: Request,
    ) -> Result<(), DispatchError> {
        let accepts_stream = context.shape().accepts_client_stream();
        match request.kind {
            FrameKind::StreamClient if accepts_stream => {
                context.receive(request.payload.unwrap_or(Payload::Nil));
                Ok(())
            }
            FrameKind::StreamEnd if accepts_stream => {
                context.finish_client_stream();
                self.calls.remove_call(&context);
                Ok(())
            }
            FrameKind::StreamEnd => {
                let message = format!("Method {} is not input stream", request.method);
                self.reject(&request, MethodError::new(StatusCode::Unimplemented, message))
                    .await
            }
            _ => {
                let message = format!("Request {} in processing", request.id);
                self.reject(&request, MethodError::new(StatusCode::AlreadyExists, message))
                    .await
            }
        }
    }

    /// Answers a frame that cannot be routed to a call. The live call with
    /// the same id, if any, is left untouched.
    async fn reject(&self, request: &Request, error: MethodError) -> Result<(), DispatchError> {
        tracing::debug!("Rejecting frame for call {}: {}", request.id, error);
        let frame = Response::new(request.id, &request.method, FrameKind::Abort)
            .with_status(error.status)
            .with_error(error.message);
        let bytes = self
            .link
            .codec
            .encode_response(frame)
            .map_err(SendError::from)?;
        self.link
            .transport
            .send(bytes)
            .await
            .map_err(SendError::from)?;
        Ok(())
    }

    /// Marks the connection dead and cancels every live call. Runs once;
    /// later calls return immediately.
    pub async fn on_close(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.calls.close_all().await;
        if cancelled > 0 {
            tracing::debug!("Connection closed with {} live calls cancelled", cancelled);
        }
    }
}

impl fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("methods", &self.methods.len())
            .field("calls", &self.calls)
            .field("live", &self.is_live())
            .finish()
    }
}
