use super::{CallContext, CallShape, ClientStreamReader, ServerStreamWriter};
use crate::constants::{INTERNAL_ERROR_MESSAGE, METHOD_NAME_SEPARATOR};
use crate::error::{BoxError, CodecError, HandlerResult, InvokeError, MethodError};
use crate::wire::{FrameKind, Payload, Response, StatusCode};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub type UnaryFn = Arc<
    dyn Fn(Option<Payload>, CallContext) -> BoxFuture<'static, HandlerResult<Option<Payload>>>
        + Send
        + Sync,
>;

pub type ClientStreamingFn = Arc<
    dyn Fn(ClientStreamReader, CallContext) -> BoxFuture<'static, HandlerResult<Option<Payload>>>
        + Send
        + Sync,
>;

pub type ServerStreamingFn = Arc<
    dyn Fn(Option<Payload>, ServerStreamWriter, CallContext) -> BoxFuture<'static, HandlerResult<()>>
        + Send
        + Sync,
>;

pub type DuplexStreamingFn = Arc<
    dyn Fn(ClientStreamReader, ServerStreamWriter, CallContext) -> BoxFuture<'static, HandlerResult<()>>
        + Send
        + Sync,
>;

/// A handler erased to wire payloads, tagged with its call shape.
#[derive(Clone)]
pub enum MethodHandler {
    Unary(UnaryFn),
    ClientStreaming(ClientStreamingFn),
    ServerStreaming(ServerStreamingFn),
    DuplexStreaming(DuplexStreamingFn),
}

impl MethodHandler {
    pub fn shape(&self) -> CallShape {
        match self {
            MethodHandler::Unary(_) => CallShape::Unary,
            MethodHandler::ClientStreaming(_) => CallShape::ClientStreaming,
            MethodHandler::ServerStreaming(_) => CallShape::ServerStreaming,
            MethodHandler::DuplexStreaming(_) => CallShape::DuplexStreaming,
        }
    }
}

/// A registered method: its names plus the handler that serves it.
///
/// Immutable once built.
#[derive(Clone)]
pub struct MethodDescriptor {
    service: String,
    method: String,
    full_name: String,
    handler: MethodHandler,
}

impl MethodDescriptor {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        handler: MethodHandler,
    ) -> Self {
        let service = service.into();
        let method = method.into();
        let full_name = format!("{service}{METHOD_NAME_SEPARATOR}{method}");
        Self {
            service,
            method,
            full_name,
            handler,
        }
    }

    /// `handler(request, context)` answering with one response.
    pub fn unary<Req, Res, F, Fut>(
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: UnaryFn = Arc::new(move |payload: Option<Payload>, context: CallContext| {
            let handler = handler.clone();
            async move {
                let request = decode_request::<Req>(payload)?;
                let response = handler(request, context).await?;
                encode_response(response)
            }
            .boxed()
        });
        Self::new(service, method, MethodHandler::Unary(erased))
    }

    /// `handler(reader, context)` consuming the client's stream and answering
    /// with one response.
    pub fn client_streaming<Req, Res, F, Fut>(
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(ClientStreamReader<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ClientStreamingFn =
            Arc::new(move |reader: ClientStreamReader, context: CallContext| {
                let handler = handler.clone();
                async move {
                    let response = handler(reader.cast::<Req>(), context).await?;
                    encode_response(response)
                }
                .boxed()
            });
        Self::new(service, method, MethodHandler::ClientStreaming(erased))
    }

    /// `handler(request, writer, context)` streaming any number of messages
    /// back. Only the status travels in the terminal frame.
    pub fn server_streaming<Req, Res, F, Fut>(
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Req, ServerStreamWriter<Res>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ServerStreamingFn = Arc::new(
            move |payload: Option<Payload>, writer: ServerStreamWriter, context: CallContext| {
                let handler = handler.clone();
                async move {
                    let request = decode_request::<Req>(payload)?;
                    handler(request, writer.cast::<Res>(), context).await
                }
                .boxed()
            },
        );
        Self::new(service, method, MethodHandler::ServerStreaming(erased))
    }

    /// `handler(reader, writer, context)` with streams in both directions.
    pub fn duplex_streaming<Req, Res, F, Fut>(
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(ClientStreamReader<Req>, ServerStreamWriter<Res>, CallContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: DuplexStreamingFn = Arc::new(
            move |reader: ClientStreamReader, writer: ServerStreamWriter, context: CallContext| {
                handler(reader.cast::<Req>(), writer.cast::<Res>(), context).boxed()
            },
        );
        Self::new(service, method, MethodHandler::DuplexStreaming(erased))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// `Service.Method`, the registry key.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn shape(&self) -> CallShape {
        self.handler.shape()
    }

    pub fn handler(&self) -> &MethodHandler {
        &self.handler
    }

    /// Runs one call to completion and sends its terminal frame.
    ///
    /// A frame kind that does not open this method's shape ends the call with
    /// `UNIMPLEMENTED` before the handler runs. Typed handler errors become
    /// the terminal status; anything else is answered with `INTERNAL` and
    /// returned so the caller can report it.
    pub(crate) async fn invoke(
        &self,
        kind: FrameKind,
        payload: Option<Payload>,
        context: CallContext,
    ) -> Result<(), InvokeError> {
        let shape = self.shape();
        if kind != shape.opening_frame() {
            let mismatch = MethodError::new(
                StatusCode::Unimplemented,
                format!("Method {} is {}", self.full_name, shape.describe()),
            );
            let frame = self.terminal_frame(&context, None, Some(mismatch));
            return context.send(frame).await.map_err(InvokeError::from);
        }

        let run = match &self.handler {
            MethodHandler::Unary(handler) => handler(payload, context.clone()),
            MethodHandler::ClientStreaming(handler) => {
                handler(context.client_stream_reader(), context.clone())
            }
            MethodHandler::ServerStreaming(handler) => handler(
                payload,
                context.server_stream_writer(),
                context.clone(),
            )
            .map(|result| result.map(|()| None))
            .boxed(),
            MethodHandler::DuplexStreaming(handler) => handler(
                context.client_stream_reader(),
                context.server_stream_writer(),
                context.clone(),
            )
            .map(|result| result.map(|()| None))
            .boxed(),
        };

        let outcome = AssertUnwindSafe(run).catch_unwind().await;

        let (frame, escalation) = match outcome {
            Ok(Ok(value)) => (self.terminal_frame(&context, value, None), None),
            Ok(Err(err)) => match err.downcast::<MethodError>() {
                Ok(typed) => (self.terminal_frame(&context, None, Some(*typed)), None),
                Err(untyped) => (
                    self.terminal_frame(&context, None, Some(internal_error())),
                    Some(InvokeError::Handler(untyped)),
                ),
            },
            Err(panic) => (
                self.terminal_frame(&context, None, Some(internal_error())),
                Some(InvokeError::Panicked(panic_message(panic.as_ref()))),
            ),
        };

        let sent = context.send(frame).await;

        match escalation {
            Some(error) => {
                if let Err(send_error) = sent {
                    tracing::warn!(
                        "Failed to send terminal frame of {} with id {}: {}",
                        self.full_name,
                        context.id(),
                        send_error
                    );
                }
                Err(error)
            }
            None => sent.map_err(InvokeError::from),
        }
    }

    fn terminal_frame(
        &self,
        context: &CallContext,
        payload: Option<Payload>,
        error: Option<MethodError>,
    ) -> Response {
        let mut frame = Response::new(
            context.id(),
            &self.full_name,
            self.shape().terminal_frame(),
        );
        frame.meta = context.response_meta();

        match error {
            Some(error) => {
                // An error that claims OK defers to whatever the handler set.
                let status = if error.status.is_ok() {
                    context.status()
                } else {
                    error.status
                };
                frame.status = Some(status);
                frame.error = Some(error.message);
            }
            None => {
                frame.status = Some(context.status());
                frame.payload = payload;
            }
        }

        frame
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("full_name", &self.full_name)
            .field("shape", &self.shape())
            .finish()
    }
}

fn decode_request<Req>(payload: Option<Payload>) -> Result<Req, BoxError>
where
    Req: DeserializeOwned,
{
    rmpv::ext::from_value(payload.unwrap_or(Payload::Nil)).map_err(|err| {
        MethodError::new(
            StatusCode::InvalidArgument,
            format!("Invalid request payload: {err}"),
        )
        .into()
    })
}

fn encode_response<Res>(response: Res) -> HandlerResult<Option<Payload>>
where
    Res: Serialize,
{
    let value =
        rmpv::ext::to_value(response).map_err(|err| CodecError::Payload(err.to_string()))?;
    Ok((!value.is_nil()).then_some(value))
}

fn internal_error() -> MethodError {
    MethodError::new(StatusCode::Internal, INTERNAL_ERROR_MESSAGE)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
