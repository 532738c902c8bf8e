use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uconnect::rpc::{ClientStreamReader, ServerStreamWriter, ServiceDefinition};
use uconnect::wire::{FrameKind, MessagePackCodec, Payload, Request, Response, StatusCode};
use uconnect_tokio_rpc_server::utils::{
    bind_tcp_listener_on_random_port, tcp_listener_to_host_port,
};
use uconnect_tokio_rpc_server::{HubOptions, RpcHub, RpcServer, ServerConfig, UpgradeDecision};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    name: String,
}

fn hello_service() -> ServiceDefinition {
    ServiceDefinition::new("HelloService")
        .unary("Echo", |text: String, _context| async move { Ok(text) })
        .unary("Greet", |greeting: Greeting, _context| async move {
            Ok(format!("Hello, {}!", greeting.name))
        })
        .unary("Whoami", |_: (), context| async move {
            Ok(context
                .user_data::<String>()
                .map(|user| user.as_str().to_owned()))
        })
        .unary("Kill", |_: (), context| async move {
            context.kill().await?;
            Ok(())
        })
        .client_streaming(
            "Sum",
            |mut reader: ClientStreamReader<u64>, _context| async move {
                let mut total = 0;
                while let Some(n) = reader.next_message().await? {
                    total += n;
                }
                Ok(total)
            },
        )
        .server_streaming(
            "Countdown",
            |from: u32, mut writer: ServerStreamWriter<u32>, _context| async move {
                for n in (0..from).rev() {
                    writer.write(n).await?;
                }
                Ok(())
            },
        )
}

async fn start(hub: RpcHub) -> u16 {
    let (listener, _) = bind_tcp_listener_on_random_port()
        .await
        .expect("listener should bind");
    let (host, port) =
        tcp_listener_to_host_port(&listener).expect("listener should have an address");
    let mut server = RpcServer::new(ServerConfig::new(host.to_string(), port));
    server.add_hub(hub).expect("hub should mount");
    tokio::spawn(server.serve_with_listener(listener));
    port
}

async fn connect(port: u16, path: &str) -> Result<Socket, WsError> {
    let mut request = format!("ws://127.0.0.1:{port}{path}")
        .into_client_request()
        .expect("request should build");
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static("u-connect-web"),
    );
    let (socket, response) = connect_async(request).await?;
    assert_eq!(
        response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok()),
        Some("u-connect-web")
    );
    Ok(socket)
}

async fn send(socket: &mut Socket, request: Request) {
    let bytes = MessagePackCodec::new()
        .encode_request(request)
        .expect("request should encode");
    socket
        .send(Message::Binary(bytes.into()))
        .await
        .expect("frame should send");
}

/// Next RPC frame, skipping pings and client stream credits.
async fn next_answer(socket: &mut Socket) -> Response {
    loop {
        let message = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Binary(bytes) = message {
            let response = MessagePackCodec::new()
                .decode_response(&bytes)
                .expect("response should decode");
            if response.kind != FrameKind::StreamClient {
                return response;
            }
        }
    }
}

/// Waits for the server's close frame and returns its code.
async fn close_code(socket: &mut Socket) -> Option<u16> {
    loop {
        match timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(frame))) => return frame.map(|frame| u16::from(frame.code)),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

#[tokio::test]
async fn connections_without_the_subprotocol_are_locked_out() {
    let hub = RpcHub::new(HubOptions::new("/rpc"))
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;

    let request = format!("ws://127.0.0.1:{port}/rpc")
        .into_client_request()
        .expect("request should build");
    match connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 423),
        other => panic!("expected HTTP 423, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn unary_and_typed_calls_roundtrip() {
    let hub = RpcHub::new(HubOptions::new("/rpc"))
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;
    let mut socket = connect(port, "/rpc").await.expect("should connect");

    send(
        &mut socket,
        Request::new(1, "HelloService.Echo", FrameKind::UnaryClient).with_payload("hi"),
    )
    .await;
    let echo = next_answer(&mut socket).await;
    assert_eq!(echo.id, 1);
    assert_eq!(echo.kind, FrameKind::UnaryClient);
    assert_eq!(echo.status, Some(StatusCode::Ok));
    assert_eq!(echo.payload, Some(Payload::from("hi")));

    let greeting = Payload::Map(vec![(Payload::from("name"), Payload::from("Ada"))]);
    send(
        &mut socket,
        Request::new(2, "HelloService.Greet", FrameKind::UnaryClient).with_payload(greeting),
    )
    .await;
    let greet = next_answer(&mut socket).await;
    assert_eq!(greet.payload, Some(Payload::from("Hello, Ada!")));

    send(
        &mut socket,
        Request::new(3, "HelloService.Nope", FrameKind::UnaryClient),
    )
    .await;
    let missing = next_answer(&mut socket).await;
    assert_eq!(missing.kind, FrameKind::Abort);
    assert_eq!(missing.status, Some(StatusCode::NotFound));
    assert_eq!(missing.error.as_deref(), Some("Service not found"));
}

#[tokio::test]
async fn streaming_calls_work_over_the_socket() {
    let hub = RpcHub::new(HubOptions::new("/rpc"))
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;
    let mut socket = connect(port, "/rpc").await.expect("should connect");

    send(
        &mut socket,
        Request::new(1, "HelloService.Countdown", FrameKind::StreamServer).with_payload(3u32),
    )
    .await;
    for expected in [2u64, 1, 0] {
        let frame = next_answer(&mut socket).await;
        assert_eq!(frame.kind, FrameKind::StreamServer);
        assert_eq!(frame.payload, Some(Payload::from(expected)));
    }
    let end = next_answer(&mut socket).await;
    assert_eq!(end.kind, FrameKind::StreamEnd);
    assert_eq!(end.status, Some(StatusCode::Ok));

    for n in [1u64, 2, 3] {
        send(
            &mut socket,
            Request::new(2, "HelloService.Sum", FrameKind::StreamClient).with_payload(n),
        )
        .await;
    }
    send(
        &mut socket,
        Request::new(2, "HelloService.Sum", FrameKind::StreamEnd),
    )
    .await;
    let sum = next_answer(&mut socket).await;
    assert_eq!(sum.kind, FrameKind::StreamEnd);
    assert_eq!(sum.payload, Some(Payload::from(6u64)));
}

#[tokio::test]
async fn upgrade_hook_can_reject_or_attach_user_data() {
    let options = HubOptions::new("/rpc").on_upgrade(|request| {
        match request
            .headers
            .get("x-user")
            .and_then(|value| value.to_str().ok())
        {
            Some(user) => UpgradeDecision::accept_with(Arc::new(user.to_owned())),
            None => UpgradeDecision::reject(),
        }
    });
    let hub = RpcHub::new(options)
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;

    match connect(port, "/rpc").await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 403),
        other => panic!("expected HTTP 403, got {:?}", other.map(|_| ())),
    }

    let mut request = format!("ws://127.0.0.1:{port}/rpc")
        .into_client_request()
        .expect("request should build");
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static("u-connect-web"),
    );
    request
        .headers_mut()
        .insert("x-user", HeaderValue::from_static("grace"));
    let (mut socket, _) = connect_async(request).await.expect("should connect");

    send(
        &mut socket,
        Request::new(1, "HelloService.Whoami", FrameKind::UnaryClient),
    )
    .await;
    let whoami = next_answer(&mut socket).await;
    assert_eq!(whoami.payload, Some(Payload::from("grace")));
}

#[tokio::test]
async fn invalid_frames_close_the_connection() {
    let hub = RpcHub::new(HubOptions::new("/rpc"))
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;

    let mut socket = connect(port, "/rpc").await.expect("should connect");
    socket
        .send(Message::Binary(vec![0xc1].into()))
        .await
        .expect("frame should send");
    assert_eq!(close_code(&mut socket).await, Some(1007));

    let mut socket = connect(port, "/rpc").await.expect("should connect");
    socket
        .send(Message::Text("hello".into()))
        .await
        .expect("frame should send");
    assert_eq!(close_code(&mut socket).await, Some(1003));
}

#[tokio::test]
async fn close_hook_reports_client_closes_and_kills() {
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let options = HubOptions::new("/rpc").on_close(move |info, code, reason| {
        let _ = closed_tx.send((info.path, code, reason));
    });
    let hub = RpcHub::new(options)
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;

    let mut socket = connect(port, "/rpc").await.expect("should connect");
    socket
        .close(Some(
            tokio_tungstenite::tungstenite::protocol::CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            },
        ))
        .await
        .expect("close should send");
    let (path, code, reason) = timeout(Duration::from_secs(2), closed_rx.recv())
        .await
        .expect("close hook should run")
        .expect("close hook should report");
    assert_eq!(path, "/rpc");
    assert_eq!(code, 1000);
    assert_eq!(reason, "bye");

    let mut socket = connect(port, "/rpc").await.expect("should connect");
    send(
        &mut socket,
        Request::new(1, "HelloService.Kill", FrameKind::UnaryClient),
    )
    .await;
    assert_eq!(close_code(&mut socket).await, Some(1000));
    let (_, code, reason) = timeout(Duration::from_secs(2), closed_rx.recv())
        .await
        .expect("close hook should run")
        .expect("close hook should report");
    assert_eq!(code, 1000);
    assert_eq!(reason, "Connection killed");
}

#[tokio::test]
async fn idle_connections_time_out() {
    let options = HubOptions::new("/rpc")
        .with_idle_timeout(Duration::from_millis(100))
        .with_pings(false);
    let hub = RpcHub::new(options)
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;

    let mut socket = connect(port, "/rpc").await.expect("should connect");
    assert_eq!(close_code(&mut socket).await, Some(1001));
}

#[tokio::test]
async fn oversized_messages_close_with_message_too_big() {
    let hub = RpcHub::new(HubOptions::new("/rpc").with_max_payload_length(64))
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;
    let mut socket = connect(port, "/rpc").await.expect("should connect");

    send(
        &mut socket,
        Request::new(1, "HelloService.Echo", FrameKind::UnaryClient).with_payload("small"),
    )
    .await;
    let echo = next_answer(&mut socket).await;
    assert_eq!(echo.payload, Some(Payload::from("small")));

    send(
        &mut socket,
        Request::new(2, "HelloService.Echo", FrameKind::UnaryClient)
            .with_payload("x".repeat(1024)),
    )
    .await;
    assert_eq!(close_code(&mut socket).await, Some(1009));
}

#[tokio::test]
async fn unbounded_lifetime_and_call_timeout_keep_serving() {
    let options = HubOptions::new("/rpc")
        .with_max_lifetime(Duration::MAX)
        .with_call_timeout(Duration::MAX);
    let hub = RpcHub::new(options)
        .with_service(hello_service())
        .expect("service should register");
    let port = start(hub).await;
    let mut socket = connect(port, "/rpc").await.expect("should connect");

    send(
        &mut socket,
        Request::new(1, "HelloService.Echo", FrameKind::UnaryClient).with_payload("still here"),
    )
    .await;
    let echo = next_answer(&mut socket).await;
    assert_eq!(echo.kind, FrameKind::UnaryClient);
    assert_eq!(echo.payload, Some(Payload::from("still here")));
}
