use async_trait::async_trait;
use axum::extract::ws::Message;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, mpsc};
use uconnect::error::TransportError;
use uconnect::transport::RpcTransport;

/// The outbound half of one WebSocket connection.
///
/// Frames go through a bounded queue drained by the connection's sender
/// task, so concurrent calls never write to the socket at the same time.
pub(crate) struct WsTransport {
    outbound: mpsc::Sender<Message>,
    live: AtomicBool,
    kill: Notify,
}

impl WsTransport {
    pub(crate) fn new(outbound: mpsc::Sender<Message>) -> Self {
        Self {
            outbound,
            live: AtomicBool::new(true),
            kill: Notify::new(),
        }
    }

    /// Resolves once a call asked for the connection to be closed.
    pub(crate) async fn killed(&self) {
        self.kill.notified().await;
    }

    pub(crate) fn mark_closed(&self) {
        self.live.store(false, Ordering::Release);
    }
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_live() {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(Message::Binary(Bytes::from(bytes)))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.live.swap(false, Ordering::AcqRel) {
            return Err(TransportError::ConnectionClosed);
        }
        self.kill.notify_one();
        Ok(())
    }
}
