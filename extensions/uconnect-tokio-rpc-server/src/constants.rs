use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HUB_PATH: &str = "/";

/// Largest inbound message a connection accepts.
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 16 * 1024;

/// Time without any inbound message (pongs included) before a connection is
/// dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// The interval at which the server pings idle clients.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long a server-initiated close waits for queued frames to drain.
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
pub const CLOSE_NO_STATUS: u16 = 1005;
pub const CLOSE_ABNORMAL: u16 = 1006;
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
pub const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;
