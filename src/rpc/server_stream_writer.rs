use super::CallContext;
use crate::error::{CodecError, SendError};
use crate::wire::{FrameKind, Payload, Response};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Push side of a server-streaming or duplex call.
///
/// Each `write` becomes one `STREAM_SERVER` frame and resolves once the
/// transport accepted it. Writes are never queued or reordered here, and
/// `&mut self` keeps them strictly sequential.
pub struct ServerStreamWriter<T = Payload> {
    context: CallContext,
    _marker: PhantomData<fn(T)>,
}

impl ServerStreamWriter<Payload> {
    pub(crate) fn new(context: CallContext) -> Self {
        Self {
            context,
            _marker: PhantomData,
        }
    }
}

impl<T> ServerStreamWriter<T>
where
    T: Serialize,
{
    pub async fn write(&mut self, message: T) -> Result<(), SendError> {
        let payload = rmpv::ext::to_value(message)
            .map_err(|err| CodecError::Payload(err.to_string()))?;
        let frame = Response::new(
            self.context.id(),
            self.context.method(),
            FrameKind::StreamServer,
        )
        .with_payload(payload);
        self.context.send(frame).await
    }
}

impl<T> ServerStreamWriter<T> {
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn cast<U>(self) -> ServerStreamWriter<U> {
        ServerStreamWriter {
            context: self.context,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ServerStreamWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStreamWriter")
            .field("id", &self.context.id())
            .field("method", &self.context.method())
            .finish()
    }
}
