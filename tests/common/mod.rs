#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uconnect::rpc::{DispatcherOptions, MethodRegistry, RpcDispatcher};
use uconnect::transport::ChannelTransport;
use uconnect::wire::{FrameKind, MessagePackCodec, Request, Response};

const FRAME_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_WINDOW: Duration = Duration::from_millis(150);

/// One simulated connection: a dispatcher wired to an in-memory transport.
pub struct Connection {
    pub dispatcher: RpcDispatcher,
    pub transport: ChannelTransport,
    outbound: mpsc::Receiver<Vec<u8>>,
    codec: MessagePackCodec,
}

impl Connection {
    pub fn new(registry: MethodRegistry) -> Self {
        Self::with_options(registry, DispatcherOptions::default())
    }

    pub fn with_options(registry: MethodRegistry, options: DispatcherOptions) -> Self {
        let (transport, outbound) = ChannelTransport::new(64);
        let dispatcher =
            RpcDispatcher::with_options(Arc::new(registry), Arc::new(transport.clone()), options);
        Self {
            dispatcher,
            transport,
            outbound,
            codec: MessagePackCodec::new(),
        }
    }

    /// Sends `request` through the codec, the way a socket would deliver it.
    pub async fn send(&self, request: Request) {
        let bytes = self
            .codec
            .encode_request(request)
            .expect("request should encode");
        self.dispatcher
            .on_message(&bytes)
            .await
            .expect("dispatch failed");
    }

    pub async fn next_frame(&mut self) -> Response {
        let bytes = timeout(FRAME_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport channel closed");
        self.codec
            .decode_response(&bytes)
            .expect("response should decode")
    }

    /// Next frame that is not a client stream credit.
    pub async fn next_answer(&mut self) -> Response {
        loop {
            let frame = self.next_frame().await;
            if frame.kind != FrameKind::StreamClient {
                return frame;
            }
        }
    }

    pub async fn assert_silent(&mut self) {
        if let Ok(Some(bytes)) = timeout(SILENCE_WINDOW, self.outbound.recv()).await {
            let frame = self.codec.decode_response(&bytes);
            panic!("expected no frame, got {frame:?}");
        }
    }

    /// Waits until the dispatcher dropped every call.
    pub async fn wait_until_idle(&self) {
        timeout(FRAME_TIMEOUT, async {
            while !self.dispatcher.calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("calls were not cleaned up");
    }
}
