use crate::wire::StatusCode;

/// The error type handlers return. Anything that is not a [`MethodError`]
/// is treated as an unexpected failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult<T> = Result<T, BoxError>;

/// A call-level error carrying the status the client should see.
///
/// Returning this from a handler (directly or boxed through `?`) ends the
/// call with `status` and `message` in the terminal frame; the connection and
/// all other calls are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct MethodError {
    pub status: StatusCode,
    pub message: String,
}

impl MethodError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("failed to encode frame: {0}")]
    Encode(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u64),

    #[error("unexpected bytes after the end of the frame")]
    TrailingBytes,

    /// A typed payload could not be converted to or from the wire value.
    #[error("payload conversion failed: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection is not live")]
    ConnectionClosed,

    #[error("transport failure: {0}")]
    Io(String),
}

/// Failure to deliver one frame of a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("service {0} already exists")]
    DuplicateService(String),

    #[error("method {0} is already registered")]
    DuplicateMethod(String),

    #[error("service {0} doesn't exist")]
    ServiceNotFound(String),
}

/// Errors escaping a method invocation after its terminal frame was handled.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The handler failed with an error that carries no status. The client
    /// received `INTERNAL`; this is reported so the failure is not lost.
    #[error("handler failed: {0}")]
    Handler(BoxError),

    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The terminal frame could not be delivered.
    #[error("failed to send terminal frame: {0}")]
    Send(#[from] SendError),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The inbound frame could not be decoded. The connection must be closed;
    /// no per-call response is possible.
    #[error("protocol violation: {0}")]
    Protocol(#[from] CodecError),

    /// A rejection frame produced by the dispatcher could not be delivered.
    #[error("failed to send rejection: {0}")]
    Send(#[from] SendError),
}
