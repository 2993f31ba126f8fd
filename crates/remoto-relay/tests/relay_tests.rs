//! End-to-end tests for the relay over real WebSocket connections.

use base64::Engine;
use futures::{SinkExt, StreamExt};
use remoto_core::Config;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("remoto_relay=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Start a relay on an ephemeral port and return its address.
async fn start_server(config: Config) -> SocketAddr {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        remoto_relay::serve(listener, &config).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    addr
}

async fn connect(addr: SocketAddr, query: &str) -> Ws {
    let url = format!("ws://{}/?{}", addr, query);
    let (ws, _) = tokio::time::timeout(TIMEOUT, connect_async(url))
        .await
        .expect("timeout connecting")
        .expect("connect failed");
    ws
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next JSON frame, or `None` once the server closed the socket.
async fn recv_json(ws: &mut Ws) -> Option<Value> {
    loop {
        match tokio::time::timeout(TIMEOUT, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap())
            }
            Ok(Some(Ok(Message::Close(_)))) => return None,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(_))) => return None,
            Ok(None) => return None,
            Err(_) => panic!("Timeout waiting for WebSocket message"),
        }
    }
}

/// Next frame that is not a directory push.
async fn recv_non_list(ws: &mut Ws) -> Value {
    loop {
        let frame = recv_json(ws).await.expect("socket closed");
        if frame["type"] != "LIST" {
            return frame;
        }
    }
}

/// Read directory pushes until one matches `expected`.
async fn recv_list_until(ws: &mut Ws, expected: Value) {
    loop {
        let frame = recv_json(ws).await.expect("socket closed");
        assert_eq!(frame["type"], "LIST", "unexpected frame: {frame}");
        if frame["message"] == expected {
            return;
        }
    }
}

/// Assert nothing but (optionally) directory pushes arrives for a while.
async fn assert_no_data(ws: &mut Ws) {
    let deadline = tokio::time::Instant::now() + QUIET;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(frame["type"], "LIST", "unexpected frame: {frame}");
            }
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("socket ended unexpectedly: {other:?}"),
        }
    }
}

/// Assert no frame at all arrives for a while.
async fn assert_silent(ws: &mut Ws) {
    match tokio::time::timeout(QUIET, ws.next()).await {
        Err(_) => {}
        Ok(frame) => panic!("expected silence, got {frame:?}"),
    }
}

#[tokio::test]
async fn test_terminal_remote_scenario() {
    let addr = start_server(Config::default()).await;

    let mut terminal = connect(addr, "type=terminal&token=T1&label=L1").await;
    let mut remote = connect(addr, "type=remote").await;
    recv_list_until(&mut remote, json!([["L1", "T1"]])).await;

    send_json(&mut remote, json!({"type": "CONN", "message": "T1"})).await;
    send_json(&mut remote, json!({"type": "DATA", "message": "hi"})).await;
    assert_eq!(
        recv_json(&mut terminal).await,
        Some(json!({"type": "DATA", "message": "hi"}))
    );

    send_json(&mut terminal, json!({"type": "OUTPUT", "message": {"line": "$ ls"}})).await;
    assert_eq!(
        recv_non_list(&mut remote).await,
        json!({"type": "OUTPUT", "message": {"line": "$ ls"}})
    );

    terminal.close(None).await.unwrap();
    recv_list_until(&mut remote, json!([])).await;
}

#[tokio::test]
async fn test_directory_follows_registry_order() {
    let addr = start_server(Config::default()).await;

    let mut remote = connect(addr, "").await;
    recv_list_until(&mut remote, json!([])).await;

    let _a = connect(addr, "type=terminal&token=ta&label=alpha").await;
    recv_list_until(&mut remote, json!([["alpha", "ta"]])).await;

    let mut b = connect(addr, "type=terminal&token=tb&label=beta").await;
    recv_list_until(&mut remote, json!([["alpha", "ta"], ["beta", "tb"]])).await;

    b.close(None).await.unwrap();
    recv_list_until(&mut remote, json!([["alpha", "ta"]])).await;
}

#[tokio::test]
async fn test_ping_yields_single_pong_to_sender() {
    let addr = start_server(Config::default()).await;

    let mut terminal = connect(addr, "type=terminal&token=abc&label=box").await;
    let mut remote = connect(addr, "type=remote&token=abc").await;
    recv_list_until(&mut remote, json!([["box", "abc"]])).await;

    send_json(&mut remote, json!({"type": "PING", "message": "are you there"})).await;
    assert_eq!(
        recv_non_list(&mut remote).await,
        json!({"type": "PONG", "message": "PONG!"})
    );
    assert_no_data(&mut remote).await;
    assert_silent(&mut terminal).await;
}

#[tokio::test]
async fn test_data_routed_by_token_to_opposite_class_only() {
    let addr = start_server(Config::default()).await;

    let mut matching = connect(addr, "type=remote&token=abc").await;
    let mut other = connect(addr, "type=remote&token=xyz").await;
    recv_list_until(&mut other, json!([])).await;

    let mut sender = connect(addr, "type=terminal&token=abc&label=one").await;
    recv_list_until(&mut other, json!([["one", "abc"]])).await;
    let mut same_token_terminal = connect(addr, "type=terminal&token=abc&label=two").await;
    recv_list_until(&mut matching, json!([["one", "abc"], ["two", "abc"]])).await;
    recv_list_until(&mut other, json!([["one", "abc"], ["two", "abc"]])).await;

    let payload = json!({"type": "X", "message": [1, {"nested": true}, "three"]});
    send_json(&mut sender, payload.clone()).await;

    assert_eq!(recv_non_list(&mut matching).await, payload);
    assert_no_data(&mut other).await;
    assert_silent(&mut same_token_terminal).await;
}

#[tokio::test]
async fn test_incomplete_terminal_handshake_is_closed_and_never_listed() {
    let addr = start_server(Config::default()).await;

    let mut remote = connect(addr, "type=remote").await;
    recv_list_until(&mut remote, json!([])).await;

    let mut no_label = connect(addr, "type=terminal&token=T9").await;
    assert_eq!(recv_json(&mut no_label).await, None);

    let mut no_token = connect(addr, "type=terminal&label=L9").await;
    assert_eq!(recv_json(&mut no_token).await, None);

    // neither rejection triggers a directory push
    assert_silent(&mut remote).await;

    let mut late = connect(addr, "type=remote").await;
    recv_list_until(&mut late, json!([])).await;
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = start_server(Config::default()).await;

    let mut remote = connect(addr, "").await;
    recv_list_until(&mut remote, json!([])).await;

    remote.send(Message::text("{this is not json".to_string())).await.unwrap();
    remote.send(Message::text("[1,2,3]".to_string())).await.unwrap();
    send_json(&mut remote, json!({"type": "PING"})).await;

    assert_eq!(
        recv_json(&mut remote).await,
        Some(json!({"type": "PONG", "message": "PONG!"}))
    );
}

#[tokio::test]
async fn test_binary_frames_are_decoded_as_text() {
    let addr = start_server(Config::default()).await;

    let mut remote = connect(addr, "").await;
    recv_list_until(&mut remote, json!([])).await;

    let ping = json!({"type": "PING", "message": ""}).to_string();
    remote.send(Message::binary(ping.into_bytes())).await.unwrap();
    assert_eq!(
        recv_json(&mut remote).await,
        Some(json!({"type": "PONG", "message": "PONG!"}))
    );
}

#[tokio::test]
async fn test_non_utf8_binary_frame_is_dropped() {
    let addr = start_server(Config::default()).await;

    let mut remote = connect(addr, "").await;
    recv_list_until(&mut remote, json!([])).await;

    remote.send(Message::binary(vec![0xff, 0xfe])).await.unwrap();
    assert_silent(&mut remote).await;

    send_json(&mut remote, json!({"type": "PING"})).await;
    assert_eq!(
        recv_json(&mut remote).await,
        Some(json!({"type": "PONG", "message": "PONG!"}))
    );
}

#[tokio::test]
async fn test_unparseable_query_connects_as_remote() {
    let addr = start_server(Config::default()).await;

    let mut observer = connect(addr, "type=remote").await;
    recv_list_until(&mut observer, json!([])).await;

    // a repeated key cannot be decoded into handshake parameters
    let mut dup = connect(addr, "type=terminal&token=a&token=b&label=x").await;
    assert_eq!(
        recv_json(&mut dup).await,
        Some(json!({"type": "LIST", "message": []}))
    );
    recv_list_until(&mut observer, json!([])).await;

    send_json(&mut dup, json!({"type": "PING"})).await;
    assert_eq!(
        recv_json(&mut dup).await,
        Some(json!({"type": "PONG", "message": "PONG!"}))
    );
}

#[tokio::test]
async fn test_conn_retargets_remote() {
    let addr = start_server(Config::default()).await;

    let mut remote = connect(addr, "type=remote&token=one").await;
    let mut first = connect(addr, "type=terminal&token=one&label=first").await;
    recv_list_until(&mut remote, json!([["first", "one"]])).await;
    let mut second = connect(addr, "type=terminal&token=two&label=second").await;
    recv_list_until(&mut remote, json!([["first", "one"], ["second", "two"]])).await;

    send_json(&mut remote, json!({"type": "CONN", "message": "two"})).await;
    send_json(&mut remote, json!({"type": "KEY", "message": "q"})).await;

    assert_eq!(
        recv_json(&mut second).await,
        Some(json!({"type": "KEY", "message": "q"}))
    );
    assert_silent(&mut first).await;
}

#[tokio::test]
async fn test_basic_auth_gates_everything() {
    let config = Config {
        user: Some("admin".to_string()),
        password: Some("secret".to_string()),
        ..Default::default()
    };
    let addr = start_server(config).await;

    let url = format!("ws://{}/?type=remote", addr);
    match connect_async(url.as_str()).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        Err(e) => panic!("expected 401, got {e}"),
        Ok(_) => panic!("expected 401, connection was accepted"),
    }

    let mut request = url.as_str().into_client_request().unwrap();
    let token = base64::engine::general_purpose::STANDARD.encode("admin:secret");
    request
        .headers_mut()
        .insert(AUTHORIZATION, format!("Basic {token}").parse().unwrap());
    let (mut ws, _) = connect_async(request).await.unwrap();
    assert_eq!(
        recv_json(&mut ws).await,
        Some(json!({"type": "LIST", "message": []}))
    );

    let client = reqwest::Client::new();
    let health = format!("http://{}/health", addr);
    let response = client.get(&health).send().await.unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
        response.headers()["www-authenticate"],
        "Basic realm=\"Authorization Required\""
    );

    let response = client
        .get(&health)
        .basic_auth("admin", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(&health)
        .basic_auth("admin", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_static_files_and_health() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>remoto</h1>").unwrap();
    let config = Config {
        static_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let addr = start_server(config).await;

    let client = reqwest::Client::new();
    let body = client
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "<h1>remoto</h1>");

    let response = client
        .get(format!("http://{}/missing.js", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let body = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "OK");
}
