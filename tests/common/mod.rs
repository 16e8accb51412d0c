#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use labrooms::db::MessageStore;
use labrooms::error::PersistenceError;
use labrooms::rooms::{
    ChatMessage, ConnectionId, GroupKind, Hub, Outbound, OutboundReceiver, RoomId, ServerEvent,
};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// Store that forwards every write to a channel the test can wait on.
pub struct RecordingStore {
    written: mpsc::UnboundedSender<(RoomId, ChatMessage)>,
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn append_message(
        &self,
        room_id: &RoomId,
        message: &ChatMessage,
    ) -> Result<(), PersistenceError> {
        let _ = self.written.send((room_id.clone(), message.clone()));
        Ok(())
    }
}

/// Store whose every write fails.
pub struct FailingStore {
    pub attempts: Mutex<usize>,
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn append_message(&self, _: &RoomId, _: &ChatMessage) -> Result<(), PersistenceError> {
        *self.attempts.lock().await += 1;
        Err(PersistenceError::Database(sqlx::Error::PoolClosed))
    }
}

pub fn recording_hub() -> (Arc<Hub>, mpsc::UnboundedReceiver<(RoomId, ChatMessage)>) {
    let (written, rx) = mpsc::unbounded_channel();
    let (hub, _writer) = Hub::spawn(Arc::new(RecordingStore { written }));
    (hub, rx)
}

pub fn failing_hub() -> (Arc<Hub>, Arc<FailingStore>) {
    let store = Arc::new(FailingStore {
        attempts: Mutex::new(0),
    });
    let (hub, _writer) = Hub::spawn(store.clone());
    (hub, store)
}

pub struct TestConn {
    pub id: ConnectionId,
    pub rx: OutboundReceiver,
}

impl TestConn {
    /// Next queued outbound item. Panics if nothing arrives.
    pub async fn next(&mut self) -> Outbound {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for outbound")
            .expect("outbound channel closed")
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        match self.next().await {
            Outbound::Event(event) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    /// Hub operations queue synchronously, so an empty queue right after an
    /// operation returns means nothing was sent.
    pub fn assert_idle(&mut self) {
        if let Ok(item) = self.rx.try_recv() {
            panic!("expected no outbound, got {item:?}");
        }
    }
}

pub async fn connect(hub: &Hub) -> TestConn {
    let id = Uuid::new_v4();
    let rx = hub.connect(id).await;
    TestConn { id, rx }
}

pub async fn canvas_member(hub: &Hub, room: &str) -> TestConn {
    let conn = connect(hub).await;
    hub.attach_on_handshake(conn.id, Some(room.into()))
        .await
        .unwrap();
    conn
}

pub async fn chat_member(hub: &Hub, room: &str, name: &str) -> TestConn {
    let conn = connect(hub).await;
    hub.join_chat_group(conn.id, &room.into(), name.into())
        .await
        .unwrap();
    conn
}

pub async fn room_member(hub: &Hub, room: &str) -> TestConn {
    let conn = connect(hub).await;
    hub.attach(conn.id, &room.into(), &[GroupKind::Chat, GroupKind::Canvas])
        .await
        .unwrap();
    conn
}
