//! Note: This `RpcServer` does not authenticate or authorize anyone by
//! itself. Every hub may install an upgrade hook to inspect the HTTP request
//! and reject it or attach per-connection state.

use crate::constants::{
    CLOSE_ABNORMAL, CLOSE_DRAIN_TIMEOUT, CLOSE_GOING_AWAY, CLOSE_INVALID_PAYLOAD,
    CLOSE_MESSAGE_TOO_BIG, CLOSE_NO_STATUS, CLOSE_NORMAL, CLOSE_UNSUPPORTED_DATA, DEFAULT_HOST,
    DEFAULT_PORT,
};
use crate::hub_options::{ConnectionInfo, HubOptions, UpgradeDecision, UpgradeRequest};
use crate::ws_transport::WsTransport;
use crate::{RpcHub, ServerError};
use axum::{
    Router,
    extract::ConnectInfo,
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, Uri, header::SEC_WEBSOCKET_PROTOCOL},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite;
use uconnect::constants::SUBPROTOCOL;
use uconnect::error::DispatchError;
use uconnect::rpc::{DispatcherOptions, MethodRegistry, RpcDispatcher, UserData};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What one hub's connections share.
struct HubState {
    options: HubOptions,
    registry: Arc<MethodRegistry>,
}

/// How and why a connection ended.
struct Closing {
    code: u16,
    reason: String,
    by_server: bool,
}

impl Closing {
    fn by_server(code: u16, reason: &str) -> Self {
        Self {
            code,
            reason: reason.to_owned(),
            by_server: true,
        }
    }

    fn by_client(code: u16, reason: String) -> Self {
        Self {
            code,
            reason,
            by_server: false,
        }
    }
}

/// Serves one or more hubs over WebSockets.
///
/// Hubs are added up front; `serve*` consumes the server, so the method
/// tables can no longer change once the listener is running.
#[derive(Debug, Default)]
pub struct RpcServer {
    config: ServerConfig,
    hubs: Vec<RpcHub>,
}

impl RpcServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            hubs: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn add_hub(&mut self, hub: RpcHub) -> Result<(), ServerError> {
        if !hub.path().starts_with('/') {
            return Err(ServerError::InvalidPath(hub.path().to_owned()));
        }
        if self.hubs.iter().any(|existing| existing.path() == hub.path()) {
            return Err(ServerError::DuplicatePath(hub.path().to_owned()));
        }
        self.hubs.push(hub);
        Ok(())
    }

    /// The Axum router with one WebSocket route per hub. Must be served with
    /// connect info (`into_make_service_with_connect_info::<SocketAddr>`).
    pub fn router(self) -> Router {
        let mut router = Router::new();

        for hub in self.hubs {
            let (options, registry) = hub.into_parts();
            tracing::debug!(
                "Mounting hub at {} with {} methods",
                options.path,
                registry.len()
            );
            let path = options.path.clone();
            let state = Arc::new(HubState {
                options,
                registry: Arc::new(registry),
            });
            router = router.route(
                &path,
                get(move |ws, connect_info, headers, uri| {
                    Self::ws_handler(ws, connect_info, headers, uri, state.clone())
                }),
            );
        }

        router
    }

    /// Binds to the configured host and port and serves until the listener
    /// fails.
    pub async fn serve(self) -> Result<SocketAddr, ServerError> {
        let listener = TcpListener::bind(self.config.address()).await?;
        self.serve_with_listener(listener).await
    }

    /// Serves on a pre-bound listener, e.g. one bound to port 0.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
    ) -> Result<SocketAddr, ServerError> {
        let address = listener.local_addr()?;
        let app = self.router();
        tracing::info!("Server running on {:?}", address);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(address)
    }

    /// Checks the sub-protocol, runs the upgrade hook and hands the accepted
    /// socket to [`handle_socket`](Self::handle_socket).
    async fn ws_handler(
        ws: WebSocketUpgrade,
        ConnectInfo(addr): ConnectInfo<SocketAddr>,
        headers: HeaderMap,
        uri: Uri,
        hub: Arc<HubState>,
    ) -> Response {
        if !offers_subprotocol(&headers) {
            tracing::warn!("Client {} did not offer sub-protocol {}", addr, SUBPROTOCOL);
            return (StatusCode::LOCKED, "Unsupported sub-protocol").into_response();
        }

        let user_data = match &hub.options.on_upgrade {
            Some(hook) => {
                let request = UpgradeRequest {
                    remote_addr: addr,
                    uri,
                    headers,
                };
                match hook(&request) {
                    UpgradeDecision::Accept(user_data) => user_data,
                    UpgradeDecision::Reject => {
                        tracing::info!("Upgrade from {} rejected", addr);
                        return StatusCode::FORBIDDEN.into_response();
                    }
                }
            }
            None => None,
        };

        tracing::info!("Client connected: {}", addr);
        ws.protocols([SUBPROTOCOL])
            .max_message_size(hub.options.max_payload_length)
            .on_upgrade(move |socket| Self::handle_socket(socket, addr, hub, user_data))
    }

    /// Runs one connection until it closes, then cancels its calls and
    /// reports the close.
    async fn handle_socket(
        socket: WebSocket,
        addr: SocketAddr,
        hub: Arc<HubState>,
        user_data: Option<UserData>,
    ) {
        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::channel::<Message>(hub.options.outbound_buffer.max(1));
        let transport = Arc::new(WsTransport::new(tx.clone()));

        let mut options = DispatcherOptions::new().on_call_failure(move |failure| {
            tracing::error!(
                "Call {} with id {} from {} failed: {}",
                failure.method,
                failure.id,
                addr,
                failure.error
            );
        });
        if let Some(call_timeout) = hub.options.call_timeout {
            options = options.with_call_timeout(call_timeout);
        }
        if let Some(user_data) = user_data.clone() {
            options = options.with_user_data(user_data);
        }
        let dispatcher =
            RpcDispatcher::with_options(hub.registry.clone(), transport.clone(), options);

        let sender = tokio::spawn(Self::sender_task(sink, rx));

        let closing =
            Self::receiver_loop(&hub.options, &dispatcher, &transport, stream, &tx, addr).await;
        transport.mark_closed();

        if closing.by_server {
            let frame = CloseFrame {
                code: closing.code,
                reason: closing.reason.clone().into(),
            };
            let queued = timeout(CLOSE_DRAIN_TIMEOUT, tx.send(Message::Close(Some(frame)))).await;
            if !matches!(queued, Ok(Ok(()))) {
                sender.abort();
            }
        } else {
            let _ = tx.try_send(Message::Close(None));
        }
        drop(tx);

        dispatcher.on_close().await;
        tracing::info!(
            "Terminated connection for {} with code {} {:?}",
            addr,
            closing.code,
            closing.reason
        );

        if let Some(on_close) = &hub.options.on_close {
            let info = ConnectionInfo {
                remote_addr: addr,
                path: hub.options.path.clone(),
                user_data,
            };
            on_close(info, closing.code, closing.reason);
        }
    }

    /// Forwards queued frames to the socket, in order, until the connection
    /// closes.
    async fn sender_task(
        mut sink: SplitSink<WebSocket, Message>,
        mut rx: mpsc::Receiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
    }

    /// Feeds inbound frames to the dispatcher while keeping the connection
    /// alive with pings, and decides how it ends.
    async fn receiver_loop(
        options: &HubOptions,
        dispatcher: &RpcDispatcher,
        transport: &WsTransport,
        mut receiver: SplitStream<WebSocket>,
        tx: &mpsc::Sender<Message>,
        addr: SocketAddr,
    ) -> Closing {
        let idle_timeout = options.idle_timeout();
        let pings = options.send_pings_automatically && !options.heartbeat_interval.is_zero();
        let lifetime_end = options
            .max_lifetime
            .and_then(|lifetime| Instant::now().checked_add(lifetime));
        let lifetime = tokio::time::sleep_until(lifetime_end.unwrap_or_else(Instant::now));
        tokio::pin!(lifetime);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(options.heartbeat_interval), if pings => {
                    if let Err(mpsc::error::TrySendError::Closed(_)) =
                        tx.try_send(Message::Ping(Default::default()))
                    {
                        tracing::info!("Client {} disconnected (failed to send ping).", addr);
                        return Closing::by_client(CLOSE_ABNORMAL, String::new());
                    }
                }

                _ = &mut lifetime, if lifetime_end.is_some() => {
                    tracing::info!("Connection {} reached its maximum lifetime.", addr);
                    return Closing::by_server(CLOSE_NORMAL, "Connection lifetime exceeded");
                }

                _ = transport.killed() => {
                    tracing::info!("Connection {} killed by a call.", addr);
                    return Closing::by_server(CLOSE_NORMAL, "Connection killed");
                }

                result = next_message(&mut receiver, idle_timeout) => {
                    match result {
                        Err(_) => {
                            tracing::warn!("Client {} timed out. Closing connection.", addr);
                            return Closing::by_server(CLOSE_GOING_AWAY, "Idle timeout");
                        }
                        Ok(Some(Ok(msg))) => match msg {
                            Message::Binary(bytes) => {
                                match dispatcher.on_message(&bytes).await {
                                    Ok(()) => {}
                                    Err(DispatchError::Protocol(err)) => {
                                        tracing::warn!("Invalid message from {}: {}", addr, err);
                                        return Closing::by_server(
                                            CLOSE_INVALID_PAYLOAD,
                                            "Invalid message",
                                        );
                                    }
                                    Err(err) => {
                                        tracing::warn!(
                                            "Error processing message from {}: {}",
                                            addr,
                                            err
                                        );
                                    }
                                }
                            }
                            Message::Text(_) => {
                                tracing::warn!("Client {} sent a text frame.", addr);
                                return Closing::by_server(
                                    CLOSE_UNSUPPORTED_DATA,
                                    "Binary frames only",
                                );
                            }
                            // Client responded to our ping, it's still alive.
                            Message::Pong(_) => {
                                tracing::trace!("Received pong from {}", addr);
                            }
                            Message::Ping(_) => {}
                            Message::Close(frame) => {
                                tracing::info!("Client {} initiated close.", addr);
                                return match frame {
                                    Some(frame) => Closing::by_client(
                                        frame.code,
                                        frame.reason.as_str().to_owned(),
                                    ),
                                    None => Closing::by_client(CLOSE_NO_STATUS, String::new()),
                                };
                            }
                        },
                        Ok(Some(Err(err))) if exceeds_message_size(&err) => {
                            tracing::warn!(
                                "Client {} sent a message over the {} bytes allowed.",
                                addr,
                                options.max_payload_length
                            );
                            return Closing::by_server(CLOSE_MESSAGE_TOO_BIG, "Message too big");
                        }
                        Ok(Some(Err(err))) => {
                            tracing::info!("Client {} disconnected with error: {}", addr, err);
                            return Closing::by_client(CLOSE_ABNORMAL, err.to_string());
                        }
                        Ok(None) => {
                            tracing::info!("Client {} disconnected.", addr);
                            return Closing::by_client(CLOSE_ABNORMAL, String::new());
                        }
                    }
                }
            }
        }
    }
}

fn offers_subprotocol(headers: &HeaderMap) -> bool {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == SUBPROTOCOL)
}

/// Whether the socket refused a message for exceeding the hub's payload
/// limit.
fn exceeds_message_size(err: &axum::Error) -> bool {
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<tungstenite::Error>())
        .is_some_and(|err| matches!(err, tungstenite::Error::Capacity(_)))
}

async fn next_message(
    receiver: &mut SplitStream<WebSocket>,
    idle_timeout: Option<std::time::Duration>,
) -> Result<Option<Result<Message, axum::Error>>, tokio::time::error::Elapsed> {
    match idle_timeout {
        Some(idle) => timeout(idle, receiver.next()).await,
        None => Ok(receiver.next().await),
    }
}
