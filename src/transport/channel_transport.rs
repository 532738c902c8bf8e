use super::RpcTransport;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// An in-process transport backed by a bounded channel.
///
/// Every outbound message lands on the paired receiver. A full channel makes
/// senders wait, which is the only flow control writers get.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Vec<u8>>,
    live: Arc<AtomicBool>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            tx,
            live: Arc::new(AtomicBool::new(true)),
        };
        (transport, rx)
    }

    /// Marks the connection as gone without going through [`RpcTransport::close`].
    pub fn mark_closed(&self) {
        self.live.store(false, Ordering::Release);
    }
}

#[async_trait]
impl RpcTransport for ChannelTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_live() {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(bytes)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.live.swap(false, Ordering::AcqRel) {
            return Err(TransportError::ConnectionClosed);
        }
        tracing::debug!("In-memory transport closed");
        Ok(())
    }
}
