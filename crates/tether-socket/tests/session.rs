//! End-to-end session tests against an in-process WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tether_socket::{
    FrameKind, SocketConfig, SocketError, SocketIdentity, SocketMessage, SocketSession, SocketState,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

type ServerWs = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Accepted connections with the request URI each one used.
struct TestServer {
    url: String,
    accepted: mpsc::UnboundedReceiver<(String, ServerWs)>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, accepted) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut uri = String::new();
                    let callback =
                        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                            uri = req.uri().to_string();
                            Ok(resp)
                        };
                    let accepted = tokio_tungstenite::accept_hdr_async(stream, callback).await;
                    if let Ok(ws) = accepted {
                        let _ = tx.send((uri, ws));
                    }
                });
            }
        });
        Self {
            url: format!("ws://{addr}/ws"),
            accepted,
        }
    }

    async fn next_connection(&mut self) -> (String, ServerWs) {
        timeout(WAIT, self.accepted.recv())
            .await
            .expect("no connection in time")
            .expect("server stopped")
    }

    /// Accept a connection and consume its login frame.
    async fn next_logged_in(&mut self) -> ServerWs {
        let (_, mut ws) = self.next_connection().await;
        let login = next_json(&mut ws).await;
        assert_eq!(login["type"], "login");
        ws
    }

    async fn assert_no_connection(&mut self, within: Duration) {
        assert!(
            timeout(within, self.accepted.recv()).await.is_err(),
            "unexpected reconnect"
        );
    }
}

fn config(url: &str) -> SocketConfig {
    let mut config = SocketConfig::new(url, SocketIdentity::new("key", "42"));
    config.enable_heart_check = false;
    config.initial_reconnect_delay = Duration::from_millis(20);
    config.max_reconnect_delay = Duration::from_millis(100);
    config.max_reconnect_attempts = 5;
    config.connect_timeout = Some(Duration::from_secs(2));
    config
}

fn session(config: SocketConfig) -> (SocketSession, mpsc::UnboundedReceiver<SocketMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = SocketSession::builder(config)
        .on_message(move |msg| {
            let _ = tx.send(msg);
        })
        .build()
        .unwrap();
    (session, rx)
}

async fn next_text(ws: &mut ServerWs) -> String {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("no frame in time")
            .expect("stream ended")
            .expect("read failed");
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

async fn next_json(ws: &mut ServerWs) -> Value {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn wait_for_state(session: &SocketSession, want: SocketState) {
    let mut rx = session.state_receiver();
    let _ = timeout(WAIT, rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("state never became {want}"))
        .unwrap();
}

async fn wait_until_stopped(session: &SocketSession) {
    timeout(WAIT, async {
        while session.is_running() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task kept running");
}

// ─────────────────────────────────────────────────────────────────────────────
// Connect and login
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_sends_login_with_identity_in_url() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));

    session.connect().await.unwrap();
    let (uri, mut ws) = server.next_connection().await;

    assert!(uri.starts_with("/ws?clientKey=key&"), "{uri}");
    assert!(uri.contains("&memberId=42&"), "{uri}");
    let login = next_json(&mut ws).await;
    assert_eq!(login["type"], "login");
    assert_eq!(login["clientKey"], "key");
    assert_eq!(session.state(), SocketState::Connected);
    assert_eq!(session.snapshot().reconnect_attempts, 0);
}

#[tokio::test]
async fn connect_while_running_is_noop() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));

    session.connect().await.unwrap();
    session.connect().await.unwrap();
    let _ws = server.next_logged_in().await;
    server.assert_no_connection(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn build_requires_message_callback() {
    let result = SocketSession::builder(config("ws://127.0.0.1:1/ws")).build();
    assert_matches!(result, Err(SocketError::Config(_)));
}

#[tokio::test]
async fn state_callback_sees_transitions_in_order() {
    let mut server = TestServer::start().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let session = SocketSession::builder(config(&server.url))
        .on_message(|_| {})
        .on_state_change(move |state| sink.lock().push(state))
        .build()
        .unwrap();

    session.connect().await.unwrap();
    let _ws = server.next_logged_in().await;
    session.disconnect().await;

    assert_eq!(
        *seen.lock(),
        vec![
            SocketState::Connecting,
            SocketState::Connected,
            SocketState::Disconnecting,
            SocketState::Disconnected,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Close handling and reconnect
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn normal_close_does_not_reconnect() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));
    session.connect().await.unwrap();
    let mut ws = server.next_logged_in().await;

    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".to_string().into(),
    }))
    .await
    .unwrap();

    wait_for_state(&session, SocketState::Disconnected).await;
    server.assert_no_connection(Duration::from_millis(200)).await;
    wait_until_stopped(&session).await;
}

#[tokio::test]
async fn abnormal_close_reconnects() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));
    session.connect().await.unwrap();
    let mut ws = server.next_logged_in().await;

    ws.close(Some(CloseFrame {
        code: CloseCode::Away,
        reason: "restarting".to_string().into(),
    }))
    .await
    .unwrap();

    let _second = server.next_logged_in().await;
    wait_for_state(&session, SocketState::Connected).await;
}

#[tokio::test]
async fn dropped_connection_reconnects_and_resets_attempts() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));
    session.connect().await.unwrap();
    let ws = server.next_logged_in().await;

    drop(ws);

    let _second = server.next_logged_in().await;
    wait_for_state(&session, SocketState::Connected).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(snapshot.current_backoff_delay, Duration::from_millis(20));
}

#[tokio::test]
async fn unreachable_server_stops_after_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut cfg = config(&format!("ws://{addr}/ws"));
    cfg.max_reconnect_attempts = 3;
    cfg.initial_reconnect_delay = Duration::from_millis(10);
    cfg.max_reconnect_delay = Duration::from_millis(20);
    let (session, _messages) = session(cfg);

    assert_matches!(session.connect().await, Err(SocketError::WebSocket(_)));
    wait_until_stopped(&session).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.reconnect_attempts, 3);
    assert_eq!(snapshot.state, SocketState::Error);
    assert!(!session.send("hello"));
}

#[tokio::test]
async fn malformed_url_fails_once_without_reconnecting() {
    let (session, _messages) = session(config("ws://bad host/ws"));

    let err = session.connect().await.unwrap_err();
    assert_matches!(err, SocketError::WebSocket(_));
    assert!(!err.is_retryable());
    wait_until_stopped(&session).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(snapshot.state, SocketState::Error);
}

#[tokio::test]
async fn secure_url_attempts_tls_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let mut cfg = config(&format!("wss://{addr}/ws"));
    cfg.max_reconnect_attempts = 0;
    let (session, _messages) = session(cfg);

    let err = session.connect().await.unwrap_err();
    assert_matches!(&err, SocketError::WebSocket(e) if !matches!(**e, tungstenite::Error::Url(_)));
    assert!(err.is_retryable());
    wait_until_stopped(&session).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Heartbeat
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn silent_server_trips_heartbeat_and_reconnects() {
    let mut server = TestServer::start().await;
    let mut cfg = config(&server.url);
    cfg.enable_heart_check = true;
    cfg.heartbeat_interval = Duration::from_millis(100);
    cfg.heartbeat_timeout = Duration::from_millis(100);
    let (session, _messages) = session(cfg);

    session.connect().await.unwrap();
    assert!(session.snapshot().heartbeat_armed);
    let mut first = server.next_logged_in().await;

    let ping = next_json(&mut first).await;
    assert_eq!(ping["type"], "ping");

    let _second = server.next_logged_in().await;
    wait_for_state(&session, SocketState::Connected).await;
}

#[tokio::test]
async fn answered_heartbeat_keeps_connection() {
    let mut server = TestServer::start().await;
    let mut cfg = config(&server.url);
    cfg.enable_heart_check = true;
    cfg.heartbeat_interval = Duration::from_millis(50);
    cfg.heartbeat_timeout = Duration::from_millis(100);
    let (session, mut messages) = session(cfg);

    session.connect().await.unwrap();
    let mut ws = server.next_logged_in().await;

    for _ in 0..4 {
        let ping = next_json(&mut ws).await;
        assert_eq!(ping["type"], "ping");
        send_json(&mut ws, json!({"type": "pong"})).await;
    }

    server.assert_no_connection(Duration::from_millis(50)).await;
    assert_eq!(session.state(), SocketState::Connected);
    assert!(messages.try_recv().is_err(), "pong frames must not be delivered");
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn application_frames_are_delivered_and_reserved_ones_consumed() {
    let mut server = TestServer::start().await;
    let (session, mut messages) = session(config(&server.url));
    session.connect().await.unwrap();
    let mut ws = server.next_logged_in().await;

    send_json(&mut ws, json!({"type": "pong"})).await;
    send_json(&mut ws, json!({"TypeCode": "ping"})).await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");

    send_json(&mut ws, json!({"type": "order", "id": 1})).await;
    let delivered = timeout(WAIT, messages.recv()).await.unwrap().unwrap();
    assert_eq!(delivered.kind, FrameKind::Other("order".into()));
    assert_eq!(delivered.json.unwrap()["id"], 1);

    ws.send(Message::Text("plain text".to_string().into())).await.unwrap();
    let plain = timeout(WAIT, messages.recv()).await.unwrap().unwrap();
    assert_eq!(plain.kind, FrameKind::Untyped);
    assert_eq!(plain.text, "plain text");
}

#[tokio::test]
async fn panicking_callback_does_not_kill_session() {
    let mut server = TestServer::start().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = SocketSession::builder(config(&server.url))
        .on_message(move |msg: SocketMessage| {
            assert!(msg.text != "boom", "callback failure");
            let _ = tx.send(msg);
        })
        .build()
        .unwrap();
    session.connect().await.unwrap();
    let mut ws = server.next_logged_in().await;

    ws.send(Message::Text("boom".to_string().into())).await.unwrap();
    ws.send(Message::Text("after".to_string().into())).await.unwrap();

    let after = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(after.text, "after");
    assert_eq!(session.state(), SocketState::Connected);
}

#[tokio::test]
async fn send_passes_strings_and_encodes_values() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));

    assert!(!session.send("too early"));
    session.connect().await.unwrap();
    let mut ws = server.next_logged_in().await;

    assert!(session.send("hello"));
    assert!(session.send(&json!({"type": "subscribe", "topic": "alarms"})));

    assert_eq!(next_text(&mut ws).await, "hello");
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "subscribe", "topic": "alarms"})
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Disconnect and destroy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_closes_normally_and_allows_reconnect() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));
    session.connect().await.unwrap();
    let mut ws = server.next_logged_in().await;

    let server_side = async move {
        loop {
            match timeout(WAIT, ws.next()).await.unwrap() {
                Some(Ok(Message::Close(frame))) => return frame.map(|f| f.code),
                Some(Ok(_)) => {}
                other => panic!("unexpected {other:?}"),
            }
        }
    };
    let ((), code) = tokio::join!(session.disconnect(), server_side);

    assert_eq!(code, Some(CloseCode::Normal));
    assert_eq!(session.state(), SocketState::Disconnected);
    assert!(!session.is_running());
    server.assert_no_connection(Duration::from_millis(100)).await;

    session.connect().await.unwrap();
    let _again = server.next_logged_in().await;
}

#[tokio::test]
async fn destroy_is_final() {
    let mut server = TestServer::start().await;
    let (session, _messages) = session(config(&server.url));
    session.connect().await.unwrap();
    let _ws = server.next_logged_in().await;

    session.destroy().await;

    let snapshot = session.snapshot();
    assert!(snapshot.destroyed);
    assert_eq!(snapshot.state, SocketState::Disconnected);
    assert!(!session.send("late"));
    assert_matches!(session.connect().await, Err(SocketError::Destroyed));
    server.assert_no_connection(Duration::from_millis(100)).await;
}
