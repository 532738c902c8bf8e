use super::client_stream_reader::ClientStreamState;
use super::{CallShape, ClientStreamReader, ServerStreamWriter};
use crate::cancellation::{CancellationSource, CancellationToken};
use crate::error::{SendError, TransportError};
use crate::transport::RpcTransport;
use crate::wire::{CallId, Metadata, Payload, Response, StatusCode, WireCodec};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-supplied state attached to a connection when it is accepted.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Everything a call needs to reach its connection.
#[derive(Clone)]
pub(crate) struct ConnectionLink {
    pub(crate) transport: Arc<dyn RpcTransport>,
    pub(crate) codec: Arc<dyn WireCodec>,
    pub(crate) user_data: Option<UserData>,
}

struct CallContextInner {
    id: CallId,
    method: String,
    shape: CallShape,
    request_meta: Metadata,
    deadline: Option<Instant>,
    cancellation: CancellationSource,
    status: Mutex<StatusCode>,
    response_meta: Mutex<Option<Metadata>>,
    client_stream: Arc<ClientStreamState>,
    link: ConnectionLink,
}

/// State of one in-flight call, shared between the dispatcher and the
/// handler serving it.
///
/// Cloning is cheap; all clones refer to the same call.
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<CallContextInner>,
}

impl CallContext {
    pub(crate) fn new(
        id: CallId,
        method: impl Into<String>,
        shape: CallShape,
        request_meta: Metadata,
        link: ConnectionLink,
        call_timeout: Option<Duration>,
    ) -> Self {
        let (cancellation, deadline) = match call_timeout {
            // A timeout too large to represent as an instant never fires.
            Some(timeout) => match Instant::now().checked_add(timeout) {
                Some(deadline) => (CancellationSource::with_deadline(timeout), Some(deadline)),
                None => (CancellationSource::new(), None),
            },
            None => (CancellationSource::new(), None),
        };

        let client_stream = Arc::new(ClientStreamState::default());

        // Registered first so a pending `move_next` is released before any
        // handler callback runs.
        let stream = client_stream.clone();
        cancellation.token().register(move || stream.abort());

        Self {
            inner: Arc::new(CallContextInner {
                id,
                method: method.into(),
                shape,
                request_meta,
                deadline,
                cancellation,
                status: Mutex::new(StatusCode::Ok),
                response_meta: Mutex::new(None),
                client_stream,
                link,
            }),
        }
    }

    pub fn id(&self) -> CallId {
        self.inner.id
    }

    /// Fully qualified method name, `Service.Method`.
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn shape(&self) -> CallShape {
        self.inner.shape
    }

    pub fn request_meta(&self) -> &Metadata {
        &self.inner.request_meta
    }

    /// The instant after which the call is cancelled automatically, if the
    /// connection was configured with a call timeout.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation.token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancellation_requested()
    }

    /// Status reported in the terminal frame when the handler succeeds.
    pub fn status(&self) -> StatusCode {
        *self.inner.status.lock()
    }

    pub fn set_status(&self, status: StatusCode) {
        *self.inner.status.lock() = status;
    }

    pub fn response_meta(&self) -> Option<Metadata> {
        self.inner.response_meta.lock().clone()
    }

    pub fn set_response_meta(&self, meta: Metadata) {
        *self.inner.response_meta.lock() = Some(meta);
    }

    pub fn insert_response_meta(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .response_meta
            .lock()
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
    }

    /// Per-connection state attached at upgrade time, if it is a `T`.
    pub fn user_data<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.inner.link.user_data.clone()?.downcast::<T>().ok()
    }

    /// Encodes and sends one frame of this call.
    ///
    /// Once the call is cancelled every send, including the terminal frame,
    /// is dropped and reported as delivered.
    pub async fn send(&self, response: Response) -> Result<(), SendError> {
        if self.is_cancelled() {
            tracing::debug!("Cancelling call {} with id {}", self.method(), self.id());
            return Ok(());
        }

        let link = &self.inner.link;
        if !link.transport.is_live() {
            return Err(TransportError::ConnectionClosed.into());
        }

        let bytes = link.codec.encode_response(response)?;
        link.transport.send(bytes).await?;
        Ok(())
    }

    /// Closes the whole connection this call belongs to.
    pub async fn kill(&self) -> Result<(), TransportError> {
        let transport = &self.inner.link.transport;
        if !transport.is_live() {
            return Err(TransportError::ConnectionClosed);
        }
        tracing::info!(
            "Call {} with id {} is closing its connection",
            self.method(),
            self.id()
        );
        transport.close().await
    }

    /// Fires the call's cancellation and waits for every callback.
    pub(crate) async fn cancel(&self) {
        self.inner.cancellation.cancel().await;
    }

    pub(crate) fn receive(&self, item: Payload) {
        self.inner.client_stream.receive(item);
    }

    pub(crate) fn finish_client_stream(&self) {
        self.inner.client_stream.finish();
    }

    pub(crate) fn client_stream_reader(&self) -> ClientStreamReader {
        ClientStreamReader::new(self.clone(), self.inner.client_stream.clone())
    }

    pub(crate) fn server_stream_writer(&self) -> ServerStreamWriter {
        ServerStreamWriter::new(self.clone())
    }

    pub(crate) fn same_call(&self, other: &CallContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("shape", &self.inner.shape)
            .field("status", &self.status())
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}
