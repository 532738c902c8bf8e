use crate::error::TransportError;
use async_trait::async_trait;

/// A duplex, message-oriented connection as the dispatcher sees it.
///
/// Implementations must accept concurrent `send` calls from many call tasks
/// and deliver each message whole, in the order the sends complete.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Queues one binary message. Resolves once the transport has taken
    /// ownership of it, which may wait on backpressure.
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;

    fn is_live(&self) -> bool;

    /// Closes the whole connection. Inbound processing observes the close
    /// through the host's normal close path.
    async fn close(&self) -> Result<(), TransportError>;
}
