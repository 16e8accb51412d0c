//! End-to-end tests over real sockets: the router is served on an ephemeral
//! port and clients connect with tokio-tungstenite.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use labrooms::AppState;
use labrooms::rooms::{GroupKind, Hub, ServerEvent, Snapshot};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve() -> (SocketAddr, Arc<Hub>) {
    let (hub, _) = common::recording_hub();
    let app = labrooms::router(AppState { hub: hub.clone() });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub)
}

async fn open(addr: SocketAddr, room: Option<&str>) -> Client {
    let url = match room {
        Some(room) => format!("ws://{addr}/ws?roomId={room}"),
        None => format!("ws://{addr}/ws"),
    };
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn emit(client: &mut Client, frame: Value) {
    client.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next hub event, skipping control frames.
async fn receive(client: &mut Client) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// Send a chat message through `client` and wait for its echo. Because a
/// connection's events are handled in order, everything it sent before has
/// been applied once the echo arrives.
async fn sync(client: &mut Client, room: &str, body: &str) -> ServerEvent {
    emit(
        client,
        json!({ "event": "join", "data": { "roomId": room, "user": { "name": "tester" } } }),
    )
    .await;
    emit(
        client,
        json!({
            "event": "sendMessage",
            "data": { "roomId": room, "message": { "author": "tester", "body": body } }
        }),
    )
    .await;
    receive(client).await
}

// ---------------------------------------------------------------------------
// Test: the join / save / clear walkthrough over sockets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_joiner_gets_snapshot_then_clear() {
    let (addr, _) = serve().await;

    let mut a = open(addr, Some("R1")).await;
    emit(&mut a, json!({ "event": "saveCanvasState", "data": "img1" })).await;
    assert!(matches!(sync(&mut a, "R1", "saved").await, ServerEvent::ReceiveMessage(_)));

    let mut b = open(addr, Some("R1")).await;
    assert_eq!(receive(&mut b).await, ServerEvent::CanvasState(Snapshot::new("img1")));

    emit(&mut a, json!({ "event": "clearCanvas" })).await;
    assert_eq!(receive(&mut b).await, ServerEvent::CanvasCleared);

    // C's first frame is its own chat echo, so no snapshot came before it.
    let mut c = open(addr, Some("R1")).await;
    let first = sync(&mut c, "R1-chat", "hello").await;
    let ServerEvent::ReceiveMessage(message) = first else {
        panic!("expected chat echo, got {first:?}");
    };
    assert_eq!(message.body, "hello");
}

// ---------------------------------------------------------------------------
// Test: drawing skips the sender
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drawing_is_relayed_to_others_only() {
    let (addr, _) = serve().await;
    let mut a = open(addr, Some("R1")).await;
    let mut b = open(addr, Some("R1")).await;
    // Make sure b is attached before a draws.
    sync(&mut b, "b-sync", "ready").await;

    let segment = json!({
        "x0": 1, "y0": 2, "x1": 3, "y1": 4,
        "color": "#ff0000", "lineWidth": 3, "userName": "ada", "isNewStroke": true
    });
    emit(&mut a, json!({ "event": "drawing", "data": segment })).await;

    let ServerEvent::Drawing(received) = receive(&mut b).await else {
        panic!("expected drawing");
    };
    assert_eq!(received.color, "#ff0000");
    assert_eq!(received.user_name.as_deref(), Some("ada"));

    // a's next frame is its own chat echo, not the drawing.
    assert!(matches!(sync(&mut a, "a-sync", "after").await, ServerEvent::ReceiveMessage(_)));
}

// ---------------------------------------------------------------------------
// Test: chat echoes to sender and peers with hub-assigned fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_is_echoed_with_filled_fields() {
    let (addr, _) = serve().await;
    let mut a = open(addr, None).await;
    let mut b = open(addr, None).await;

    let ServerEvent::ReceiveMessage(first) = sync(&mut a, "lobby", "first").await else {
        panic!("expected chat");
    };
    // a is in the lobby for sure, so it also sees b's greeting.
    sync(&mut b, "lobby", "hi").await;
    assert!(matches!(receive(&mut a).await, ServerEvent::ReceiveMessage(_)));

    emit(
        &mut a,
        json!({ "event": "sendMessage", "data": { "roomId": "lobby", "message": { "author": "ada", "body": "yo" } } }),
    )
    .await;

    let at_a = receive(&mut a).await;
    let at_b = receive(&mut b).await;
    assert_eq!(at_a, at_b);
    let ServerEvent::ReceiveMessage(message) = at_a else {
        panic!("expected chat");
    };
    assert_eq!(message.body, "yo");
    assert!(!message.id.is_empty());
    assert_eq!(message.kind, "message");
    assert_ne!(message.id, first.id);
}

// ---------------------------------------------------------------------------
// Test: malformed frames are skipped without dropping the socket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_is_skipped() {
    let (addr, _) = serve().await;
    let mut a = open(addr, Some("R1")).await;

    a.send(Message::Text("{not json".to_string().into())).await.unwrap();
    emit(&mut a, json!({ "event": "explode" })).await;

    assert!(matches!(sync(&mut a, "R1", "still here").await, ServerEvent::ReceiveMessage(_)));
}

// ---------------------------------------------------------------------------
// Test: an empty roomId joins no canvas
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_room_id_joins_no_canvas() {
    let (addr, hub) = serve().await;
    let mut a = open(addr, Some("")).await;
    let mut b = open(addr, Some("")).await;

    emit(&mut a, json!({ "event": "saveCanvasState", "data": "secret" })).await;
    sync(&mut a, "a-sync", "saved").await;

    // b's first frame is its own chat echo, not a's canvas.
    let first = sync(&mut b, "b-sync", "hello").await;
    assert!(matches!(first, ServerEvent::ReceiveMessage(_)));
    assert!(hub.members(&"".into(), GroupKind::Canvas).await.is_empty());
    assert_eq!(hub.snapshot(&"".into()).await, None);
}

// ---------------------------------------------------------------------------
// Test: closing the socket detaches the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn closed_socket_is_detached() {
    let (addr, hub) = serve().await;
    let mut a = open(addr, Some("R1")).await;
    sync(&mut a, "R1", "here").await;
    assert_eq!(hub.connection_count().await, 1);
    assert_eq!(hub.members(&"R1".into(), GroupKind::Canvas).await.len(), 1);

    a.close(None).await.unwrap();
    drop(a);

    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.connection_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection was not detached");
    assert!(hub.members(&"R1".into(), GroupKind::Canvas).await.is_empty());
    assert!(hub.members(&"R1".into(), GroupKind::Chat).await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: health check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let (hub, _) = common::recording_hub();
    let app = labrooms::router(AppState { hub });

    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}
