mod channel_transport;
mod rpc_transport;

pub use channel_transport::ChannelTransport;
pub use rpc_transport::RpcTransport;
