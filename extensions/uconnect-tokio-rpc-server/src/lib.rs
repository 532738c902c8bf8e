//! WebSocket host for `uconnect` hubs.
//!
//! Note: like the core crate, this server does no authentication or
//! authorization of its own. The upgrade hook of each hub is the place to
//! plug that in.

mod constants;
mod error;
mod hub_options;
mod rpc_hub;
mod rpc_server;
mod ws_transport;

pub mod utils;

pub use constants::*;
pub use error::ServerError;
pub use hub_options::{
    CloseHook, ConnectionInfo, HubOptions, UpgradeDecision, UpgradeHook, UpgradeRequest,
};
pub use rpc_hub::RpcHub;
pub use rpc_server::{RpcServer, ServerConfig};
