//! Call multiplexing for RPC over a single persistent, message-oriented
//! connection.
//!
//! A client assigns every call an id; many calls (unary, client-streaming,
//! server-streaming and duplex-streaming) share one socket. The
//! [`rpc::RpcDispatcher`] routes each inbound frame to the call it belongs to,
//! drives the per-call state machine and propagates cancellation from client
//! aborts, connection loss and deadlines down into running handlers.
//!
//! The socket itself is abstracted behind [`transport::RpcTransport`]; the
//! frame encoding behind [`wire::WireCodec`].

pub mod cancellation;
pub mod constants;
pub mod error;
pub mod rpc;
pub mod transport;
pub mod wire;
