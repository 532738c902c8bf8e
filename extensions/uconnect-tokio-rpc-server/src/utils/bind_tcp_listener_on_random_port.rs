use std::io::Result;
use tokio::net::TcpListener;

/// Binds a loopback listener on an OS-assigned port.
///
/// Returns the listener together with the port, so a server can be started
/// on it and clients pointed at it without a fixed port.
pub async fn bind_tcp_listener_on_random_port() -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}
