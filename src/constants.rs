/// WebSocket sub-protocol token a client must offer during the upgrade.
/// Connections that do not offer it are rejected before the handshake.
pub const SUBPROTOCOL: &str = "u-connect-web";

/// Message attached to the terminal frame of a call whose handler failed
/// with an error that does not carry a status.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Separator between service name and method name in a full method name.
pub const METHOD_NAME_SEPARATOR: char = '.';

/// The default number of outbound frames a connection may queue before
/// writers start waiting on the transport.
///
/// This counts frames, not bytes. A small value keeps memory bounded for slow
/// receivers; a larger one absorbs bursts from many concurrent calls.
pub const DEFAULT_OUTBOUND_BUFFER_SIZE: usize = 64;

/// Error text of the `NOT_FOUND` answer to a frame naming no registered method.
pub const SERVICE_NOT_FOUND: &str = "Service not found";
