use crate::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HUB_PATH, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_MAX_PAYLOAD_LENGTH,
};
use axum::http::{HeaderMap, Uri};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use uconnect::constants::DEFAULT_OUTBOUND_BUFFER_SIZE;
use uconnect::rpc::UserData;

/// What the upgrade hook gets to see of an incoming connection.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub remote_addr: SocketAddr,
    pub uri: Uri,
    pub headers: HeaderMap,
}

pub enum UpgradeDecision {
    /// Accept the connection, optionally attaching state every call on it
    /// can read through `CallContext::user_data`.
    Accept(Option<UserData>),
    /// Refuse with HTTP 403; no WebSocket handshake takes place.
    Reject,
}

impl UpgradeDecision {
    pub fn accept() -> Self {
        UpgradeDecision::Accept(None)
    }

    pub fn accept_with(user_data: UserData) -> Self {
        UpgradeDecision::Accept(Some(user_data))
    }

    pub fn reject() -> Self {
        UpgradeDecision::Reject
    }
}

impl fmt::Debug for UpgradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeDecision::Accept(data) => f
                .debug_struct("Accept")
                .field("has_user_data", &data.is_some())
                .finish(),
            UpgradeDecision::Reject => f.write_str("Reject"),
        }
    }
}

/// The connection a close hook is told about.
#[derive(Clone)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    pub path: String,
    pub user_data: Option<UserData>,
}

impl ConnectionInfo {
    pub fn user_data<T>(&self) -> Option<Arc<T>>
    where
        T: std::any::Any + Send + Sync,
    {
        self.user_data.clone()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("remote_addr", &self.remote_addr)
            .field("path", &self.path)
            .field("has_user_data", &self.user_data.is_some())
            .finish()
    }
}

pub type UpgradeHook = Arc<dyn Fn(&UpgradeRequest) -> UpgradeDecision + Send + Sync>;

/// Called once per connection with the close code and reason, after every
/// call on the connection was cancelled.
pub type CloseHook = Arc<dyn Fn(ConnectionInfo, u16, String) + Send + Sync>;

/// Settings of one hub and of every connection it accepts.
#[derive(Clone)]
pub struct HubOptions {
    pub path: String,
    pub max_payload_length: usize,
    /// `Duration::ZERO` disables the idle timeout.
    pub idle_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub send_pings_automatically: bool,
    /// Connections are closed once they have been open this long.
    pub max_lifetime: Option<Duration>,
    /// Outbound frames queued per connection before writers wait.
    pub outbound_buffer: usize,
    /// Deadline after which every call is cancelled.
    pub call_timeout: Option<Duration>,
    pub on_upgrade: Option<UpgradeHook>,
    pub on_close: Option<CloseHook>,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_HUB_PATH.to_owned(),
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            send_pings_automatically: true,
            max_lifetime: None,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER_SIZE,
            call_timeout: None,
            on_upgrade: None,
            on_close: None,
        }
    }
}

impl HubOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_max_payload_length(mut self, max: usize) -> Self {
        self.max_payload_length = max;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_pings(mut self, enabled: bool) -> Self {
        self.send_pings_automatically = enabled;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn with_outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn on_upgrade<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UpgradeRequest) -> UpgradeDecision + Send + Sync + 'static,
    {
        self.on_upgrade = Some(Arc::new(hook));
        self
    }

    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(ConnectionInfo, u16, String) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(hook));
        self
    }

    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        (!self.idle_timeout.is_zero()).then_some(self.idle_timeout)
    }
}

impl fmt::Debug for HubOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubOptions")
            .field("path", &self.path)
            .field("max_payload_length", &self.max_payload_length)
            .field("idle_timeout", &self.idle_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("send_pings_automatically", &self.send_pings_automatically)
            .field("max_lifetime", &self.max_lifetime)
            .field("outbound_buffer", &self.outbound_buffer)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
