//! A `HelloService` exposing one method of every call shape.

use std::time::Duration;
use uconnect::rpc::{ClientStreamReader, ServerStreamWriter, ServiceDefinition};

pub const SERVICE_NAME: &str = "HelloService";

/// Timing knobs of the demo service.
#[derive(Debug, Clone, Copy)]
pub struct HelloOptions {
    /// How long `SayHello` takes before answering.
    pub reply_delay: Duration,
    /// Messages written by `SayHelloServerStream`.
    pub stream_len: usize,
    pub stream_interval: Duration,
}

impl Default for HelloOptions {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_secs(1),
            stream_len: 500_000,
            stream_interval: Duration::from_millis(10),
        }
    }
}

pub fn hello_service(options: HelloOptions) -> ServiceDefinition {
    ServiceDefinition::new(SERVICE_NAME)
        .unary("SayHello", move |name: String, context| async move {
            tracing::info!("Unary method call {}", name);
            let token = context.cancellation_token();
            tokio::select! {
                _ = tokio::time::sleep(options.reply_delay) => {}
                _ = token.cancelled() => {
                    tracing::info!("Unary method call aborted {}", name);
                    return Ok(None);
                }
            }
            Ok(Some(format!(
                "Hello {} after {}ms",
                name,
                options.reply_delay.as_millis()
            )))
        })
        .client_streaming(
            "SayHelloClientStream",
            |mut requests: ClientStreamReader<String>, context| async move {
                let mut result = String::new();
                while requests.move_next().await? {
                    if let Some(current) = requests.current() {
                        tracing::debug!("Client stream message {}", current);
                        result.push_str(current);
                    }
                }
                if context.is_cancelled() {
                    tracing::info!("Client stream method call aborted");
                    return Ok(None);
                }
                Ok(Some(result))
            },
        )
        .server_streaming(
            "SayHelloServerStream",
            move |request: String, mut responses: ServerStreamWriter<String>, context| async move {
                tracing::info!("Server stream method call {}", request);
                for i in 0..options.stream_len {
                    if context.is_cancelled() {
                        tracing::info!("Server stream method call aborted {}", request);
                        return Ok(());
                    }
                    responses.write(format!("{} {}", request, i)).await?;
                    tokio::time::sleep(options.stream_interval).await;
                }
                Ok(())
            },
        )
        .duplex_streaming(
            "SayHelloDuplexStream",
            |mut requests: ClientStreamReader<String>,
             mut responses: ServerStreamWriter<String>,
             context| async move {
                responses.write(" Hello ".to_owned()).await?;
                while let Some(name) = requests.next_message().await? {
                    if context.is_cancelled() {
                        tracing::info!("Duplex stream method call aborted");
                        return Ok(());
                    }
                    responses.write(format!("Hello {}", name)).await?;
                }
                Ok(())
            },
        )
}
