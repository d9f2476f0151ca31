//! Integration tests for the realtime WebSocket layer: admission, rosters,
//! presence broadcasts, direct-message fan-out and disconnect handling.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use presence_server::config::RealtimeConfig;
use presence_server::realtime::{DirectMessage, ServerEvent};
use presence_server::store::SqliteStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Helper: start the server on a random port and return its address.
async fn start_test_server(realtime: RealtimeConfig) -> SocketAddr {
    let db = presence_server::db::init_memory_db().expect("Failed to init DB");
    let store = Arc::new(SqliteStore::new(db));
    let state = presence_server::state::AppState::new(realtime, store.clone(), store);

    let app = presence_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

/// Read the next server event, skipping keepalive frames.
/// Returns None if nothing arrives within `wait`.
async fn read_event(read: &mut WsRead, wait: Duration) -> Option<ServerEvent> {
    loop {
        match tokio::time::timeout(wait, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("Invalid server event"));
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

async fn next_event(read: &mut WsRead) -> ServerEvent {
    read_event(read, Duration::from_secs(2))
        .await
        .expect("Expected a server event within timeout")
}

async fn expect_silence(read: &mut WsRead) {
    if let Some(event) = read_event(read, Duration::from_millis(300)).await {
        panic!("Expected no event, got: {:?}", event);
    }
}

/// Connect as `username` and wait for the roster, which proves the endpoint
/// has been registered.
async fn connect(addr: SocketAddr, username: &str) -> (WsWrite, WsRead, ServerEvent) {
    let ws_url = format!("ws://{}/ws?username={}", addr, username);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    let (write, mut read) = ws_stream.split();
    let roster = next_event(&mut read).await;
    (write, read, roster)
}

async fn send_private(write: &mut WsWrite, to: &str, content: &str) {
    let frame = json!({"event": "private message", "to": to, "content": content}).to_string();
    write
        .send(Message::Text(frame.into()))
        .await
        .expect("Failed to send frame");
}

/// Poll the presence endpoint until `username` has `endpoints` live connections.
async fn wait_for_endpoints(addr: SocketAddr, username: &str, endpoints: u64) -> serde_json::Value {
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/presence/{}", addr, username);
    for _ in 0..40 {
        let body: serde_json::Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        if body["endpoints"] == json!(endpoints) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never reached {} endpoints", username, endpoints);
}

fn roster(users: &[&str]) -> ServerEvent {
    ServerEvent::roster(users)
}

#[tokio::test]
async fn test_ws_roster_and_came_online_broadcast() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (_carol_w, mut carol_r, carol_roster) = connect(addr, "carol").await;
    assert_eq!(carol_roster, roster(&[]));

    let (_alice_w, mut alice_r, alice_roster) = connect(addr, "alice").await;
    assert_eq!(alice_roster, roster(&["carol"]));

    assert_eq!(
        next_event(&mut carol_r).await,
        ServerEvent::UserCameOnline {
            username: "alice".into()
        }
    );
    expect_silence(&mut carol_r).await;
    expect_silence(&mut alice_r).await;
}

#[tokio::test]
async fn test_ws_second_tab_is_not_announced() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (_carol_w, mut carol_r, _) = connect(addr, "carol").await;
    let (_a1_w, mut a1_r, _) = connect(addr, "alice").await;
    next_event(&mut carol_r).await;

    let (_a2_w, _a2_r, a2_roster) = connect(addr, "alice").await;
    assert_eq!(a2_roster, roster(&["alice", "carol"]));

    expect_silence(&mut carol_r).await;
    expect_silence(&mut a1_r).await;
}

#[tokio::test]
async fn test_ws_stays_online_until_last_tab_closes() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (mut a1_w, _a1_r, _) = connect(addr, "alice").await;
    let (mut a2_w, _a2_r, _) = connect(addr, "alice").await;
    let body = wait_for_endpoints(addr, "alice", 2).await;
    assert_eq!(body["online"], true);

    a1_w.send(Message::Close(None)).await.unwrap();
    let body = wait_for_endpoints(addr, "alice", 1).await;
    assert_eq!(body["online"], true);

    a2_w.send(Message::Close(None)).await.unwrap();
    let body = wait_for_endpoints(addr, "alice", 0).await;
    assert_eq!(body["online"], false);
}

#[tokio::test]
async fn test_ws_offline_broadcast_after_last_tab() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (_carol_w, mut carol_r, _) = connect(addr, "carol").await;
    let (mut a1_w, _a1_r, _) = connect(addr, "alice").await;
    let (mut a2_w, _a2_r, _) = connect(addr, "alice").await;
    next_event(&mut carol_r).await;

    a1_w.send(Message::Close(None)).await.unwrap();
    expect_silence(&mut carol_r).await;

    a2_w.send(Message::Close(None)).await.unwrap();
    assert_eq!(
        next_event(&mut carol_r).await,
        ServerEvent::UserWentOffline {
            username: "alice".into()
        }
    );
    expect_silence(&mut carol_r).await;
}

#[tokio::test]
async fn test_ws_offline_broadcast_can_be_disabled() {
    let addr = start_test_server(RealtimeConfig {
        announce_offline: false,
        ..RealtimeConfig::default()
    })
    .await;

    let (_carol_w, mut carol_r, _) = connect(addr, "carol").await;
    let (mut alice_w, _alice_r, _) = connect(addr, "alice").await;
    next_event(&mut carol_r).await;

    alice_w.send(Message::Close(None)).await.unwrap();
    wait_for_endpoints(addr, "alice", 0).await;
    expect_silence(&mut carol_r).await;
}

#[tokio::test]
async fn test_ws_direct_message_fans_out_to_sender_tabs_and_recipient() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (mut e1_w, mut e1_r, _) = connect(addr, "bob").await;
    let (_e2_w, mut e2_r, _) = connect(addr, "bob").await;
    let (_e3_w, mut e3_r, _) = connect(addr, "carol").await;
    let (_e4_w, mut e4_r, _) = connect(addr, "dave").await;
    for read in [&mut e1_r, &mut e2_r, &mut e3_r] {
        while read_event(read, Duration::from_millis(300)).await.is_some() {}
    }

    send_private(&mut e1_w, "carol", "hello").await;

    let expected = ServerEvent::DirectMessage(DirectMessage {
        content: "hello".into(),
        from: "bob".into(),
        to: "carol".into(),
    });
    assert_eq!(next_event(&mut e2_r).await, expected);
    assert_eq!(next_event(&mut e3_r).await, expected);
    expect_silence(&mut e1_r).await;
    expect_silence(&mut e4_r).await;
}

#[tokio::test]
async fn test_ws_message_to_offline_user_is_dropped_silently() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (mut alice_w, mut alice_r, _) = connect(addr, "alice").await;
    send_private(&mut alice_w, "nobody", "hello?").await;
    expect_silence(&mut alice_r).await;
}

#[tokio::test]
async fn test_ws_empty_message_is_refused() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (mut alice_w, mut alice_r, _) = connect(addr, "alice").await;
    let (_bob_w, mut bob_r, _) = connect(addr, "bob").await;
    next_event(&mut alice_r).await;

    send_private(&mut alice_w, "bob", "   ").await;

    match next_event(&mut alice_r).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("Expected error event, got: {:?}", other),
    }
    expect_silence(&mut bob_r).await;
}

#[tokio::test]
async fn test_ws_malformed_frame_gets_error_event() {
    let addr = start_test_server(RealtimeConfig::default()).await;

    let (mut alice_w, mut alice_r, _) = connect(addr, "alice").await;
    alice_w
        .send(Message::Text(r#"{"event":"dance"}"#.to_string().into()))
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut alice_r).await,
        ServerEvent::Error {
            code: 400,
            message: "Malformed event".into()
        }
    );
}

#[tokio::test]
async fn test_ws_missing_identity_is_refused() {
    let addr = start_test_server(RealtimeConfig::default()).await;
    let (_carol_w, mut carol_r, _) = connect(addr, "carol").await;

    for url in [format!("ws://{}/ws", addr), format!("ws://{}/ws?username=", addr)] {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("WebSocket should upgrade even without identity");
        let (_write, mut read) = ws_stream.split();

        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected close message within timeout");
        match msg {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(frame.code, CloseCode::from(4001), "Expected close code 4001");
            }
            other => panic!("Expected close frame, got: {:?}", other),
        }
    }

    expect_silence(&mut carol_r).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/api/presence", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["users"], json!(["carol"]));
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let addr = start_test_server(RealtimeConfig::default()).await;
    let (mut write, mut read, _) = connect(addr, "pinger").await;

    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected pong within timeout");
    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_ws_unresponsive_peer_is_dropped_after_pong_timeout() {
    let addr = start_test_server(RealtimeConfig {
        ping_interval_secs: 1,
        pong_timeout_secs: 1,
        ..RealtimeConfig::default()
    })
    .await;
    let (_watcher_w, mut watcher_r, _) = connect(addr, "watcher").await;
    // Never read again, so pings from the server go unanswered
    let (_ghost_w, _ghost_r, _) = connect(addr, "ghost").await;

    assert_eq!(
        next_event(&mut watcher_r).await,
        ServerEvent::UserCameOnline {
            username: "ghost".into()
        }
    );

    // The watcher keeps reading, so its own pings are answered
    let event = read_event(&mut watcher_r, Duration::from_secs(6))
        .await
        .expect("Expected the unresponsive peer to be dropped");
    assert_eq!(
        event,
        ServerEvent::UserWentOffline {
            username: "ghost".into()
        }
    );
    wait_for_endpoints(addr, "ghost", 0).await;
    wait_for_endpoints(addr, "watcher", 1).await;
}

#[tokio::test]
async fn test_ws_reconnect_after_disconnect() {
    let addr = start_test_server(RealtimeConfig::default()).await;
    let (_carol_w, mut carol_r, _) = connect(addr, "carol").await;

    {
        let (mut write, _read, _) = connect(addr, "alice").await;
        write.send(Message::Close(None)).await.expect("Failed to send close");
    }
    assert_eq!(
        next_event(&mut carol_r).await,
        ServerEvent::UserCameOnline {
            username: "alice".into()
        }
    );
    assert_eq!(
        next_event(&mut carol_r).await,
        ServerEvent::UserWentOffline {
            username: "alice".into()
        }
    );

    let (_write, _read, roster_again) = connect(addr, "alice").await;
    assert_eq!(roster_again, roster(&["carol"]));
    assert_eq!(
        next_event(&mut carol_r).await,
        ServerEvent::UserCameOnline {
            username: "alice".into()
        }
    );
}
