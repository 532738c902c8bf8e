use std::io::Result;
use std::net::IpAddr;
use tokio::net::TcpListener;

/// The local address a bound listener actually serves on.
pub fn tcp_listener_to_host_port(listener: &TcpListener) -> Result<(IpAddr, u16)> {
    let local = listener.local_addr()?;
    Ok((local.ip(), local.port()))
}
