use example_uconnect_ws_app::{HelloOptions, hello_service};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uconnect_tokio_rpc_server::utils::tcp_listener_to_host_port;
use uconnect_tokio_rpc_server::{HubOptions, RpcHub, RpcServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let hub = RpcHub::new(HubOptions::new("/api/ws"))
        .with_service(hello_service(HelloOptions::default()))?;

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let (host, port) = tcp_listener_to_host_port(&listener)?;
    tracing::info!("HelloService listening on ws://{}:{}/api/ws", host, port);

    let mut server = RpcServer::new(ServerConfig::new(host.to_string(), port));
    server.add_hub(hub)?;
    server.serve_with_listener(listener).await?;

    Ok(())
}
