//! End-to-end tests: real listener, real WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use agora_api::auth::AppState;
use agora_db::Database;
use agora_gateway::SessionStore;
use agora_server::{build_router, build_state};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_test_server() -> (AppState, SocketAddr) {
    let db = Arc::new(Database::open_in_memory().expect("Failed to open DB"));
    let state = build_state(db, SessionStore::new());

    let app = build_router(state.clone(), true);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, addr)
}

async fn create_user(state: &AppState, first: &str) -> (Uuid, String) {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(id, &format!("{}@example.com", first), "unused", first, "Test", None)
        .unwrap();
    let session = state.sessions.create_session(id).await.unwrap();
    (id, session.token)
}

async fn connect(addr: SocketAddr, token: &str) -> Socket {
    let mut req = format!("ws://{}/gateway", addr).into_client_request().unwrap();
    req.headers_mut()
        .insert("Authorization", format!("Bearer {}", token).parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(req).await.expect("WS connect failed");

    // The connection is registered before its first reply is produced.
    send(&mut ws, json!({"type": "get_notifications"})).await;
    let ready = next_frame(&mut ws).await.expect("no reply to get_notifications");
    assert_eq!(ready["type"], "notifications");
    ws
}

async fn send(ws: &mut Socket, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next JSON text frame, or `None` if nothing arrives in time.
async fn next_frame(ws: &mut Socket) -> Option<Value> {
    loop {
        match tokio::time::timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn upgrade_without_valid_session_is_rejected() {
    let (_, addr) = start_test_server().await;

    let req = format!("ws://{}/gateway", addr).into_client_request().unwrap();
    let err = tokio_tungstenite::connect_async(req).await.unwrap_err();
    assert!(
        matches!(&err, tokio_tungstenite::tungstenite::Error::Http(resp) if resp.status().as_u16() == 401),
        "unexpected error: {err:?}"
    );

    let mut req = format!("ws://{}/gateway", addr).into_client_request().unwrap();
    req.headers_mut()
        .insert("Cookie", "session_id=not-a-session".parse().unwrap());
    assert!(tokio_tungstenite::connect_async(req).await.is_err());
}

#[tokio::test]
async fn private_message_is_acknowledged_and_pushed() {
    let (state, addr) = start_test_server().await;
    let (_, alice_token) = create_user(&state, "alice").await;
    let (bob, bob_token) = create_user(&state, "bob").await;

    let mut alice = connect(addr, &alice_token).await;
    let mut bob_ws = connect(addr, &bob_token).await;

    send(
        &mut alice,
        json!({"type": "send_private_message", "recipient_id": bob, "content": "hi bob"}),
    )
    .await;

    let ack = next_frame(&mut alice).await.expect("no ack");
    assert_eq!(ack["type"], "message_sent");
    assert_eq!(ack["content"]["content"], "hi bob");

    let push = next_frame(&mut bob_ws).await.expect("no live push");
    assert_eq!(push["type"], "private_message");
    assert_eq!(push["content"]["id"], ack["content"]["id"]);

    // The durable copy is there too
    send(&mut bob_ws, json!({"type": "get_notifications"})).await;
    let list = next_frame(&mut bob_ws).await.unwrap();
    assert_eq!(list["content"].as_array().unwrap().len(), 1);
    assert_eq!(list["content"][0]["kind"], "private_message");
}

#[tokio::test]
async fn unknown_frames_are_ignored_without_closing() {
    let (state, addr) = start_test_server().await;
    let (_, token) = create_user(&state, "carol").await;
    let mut ws = connect(addr, &token).await;

    send(&mut ws, json!({"type": "typing", "channel": "x"})).await;
    send(&mut ws, json!({"type": "mark_read", "notification_id": "not-a-uuid"})).await;
    assert!(next_frame(&mut ws).await.is_none());

    send(&mut ws, json!({"type": "get_notifications"})).await;
    let reply = next_frame(&mut ws).await.expect("connection should still serve requests");
    assert_eq!(reply["type"], "notifications");
}

#[tokio::test]
async fn newest_connection_receives_pushes() {
    let (state, addr) = start_test_server().await;
    let (_, alice_token) = create_user(&state, "alice").await;
    let (bob, bob_token) = create_user(&state, "bob").await;

    let mut alice = connect(addr, &alice_token).await;
    let mut bob_old = connect(addr, &bob_token).await;
    let mut bob_new = connect(addr, &bob_token).await;

    send(
        &mut alice,
        json!({"type": "send_private_message", "recipient_id": bob, "content": "which one?"}),
    )
    .await;
    assert_eq!(next_frame(&mut alice).await.unwrap()["type"], "message_sent");

    assert_eq!(next_frame(&mut bob_new).await.unwrap()["type"], "private_message");
    assert!(next_frame(&mut bob_old).await.is_none());

    // Closing the superseded socket must not unregister the live one
    bob_old.close(None).await.unwrap();
    drop(bob_old);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.fanout.registry().lookup(bob).await.is_some());
}

#[tokio::test]
async fn disconnect_unregisters_the_user() {
    let (state, addr) = start_test_server().await;
    let (dave, token) = create_user(&state, "dave").await;

    let mut ws = connect(addr, &token).await;
    assert!(state.fanout.registry().lookup(dave).await.is_some());

    ws.close(None).await.unwrap();
    drop(ws);

    let mut gone = false;
    for _ in 0..20 {
        if state.fanout.registry().lookup(dave).await.is_none() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(gone, "registry still holds a closed connection");
}
