//! Durable chat history.
//!
//! The hub never waits on the store: enriched messages are queued to
//! [`MessagePersistence`], which writes them in order and logs failures.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::PersistenceError;
use crate::rooms::{ChatMessage, RoomId};

#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    async fn append_message(
        &self,
        room_id: &RoomId,
        message: &ChatMessage,
    ) -> Result<(), PersistenceError>;
}

#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                author TEXT NOT NULL,
                body TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                type TEXT NOT NULL,
                PRIMARY KEY (id, room_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Messages of one room in insertion order.
    pub async fn room_messages(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, PersistenceError> {
        let rows: Vec<(String, String, String, OffsetDateTime, String)> = sqlx::query_as(
            "SELECT id,author,body,timestamp,type FROM messages WHERE room_id=? ORDER BY rowid",
        )
        .bind(room_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, author, body, timestamp, kind)| ChatMessage {
                id,
                author,
                body,
                timestamp,
                kind,
            })
            .collect())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append_message(
        &self,
        room_id: &RoomId,
        message: &ChatMessage,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO messages (id,room_id,author,body,timestamp,type) values (?,?,?,?,?,?)",
        )
        .bind(&message.id)
        .bind(room_id.as_str())
        .bind(&message.author)
        .bind(&message.body)
        .bind(message.timestamp)
        .bind(&message.kind)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub room_id: RoomId,
    pub message: ChatMessage,
}

pub type PersistenceSender = mpsc::UnboundedSender<PendingMessage>;

/// Background writer for chat history.
pub struct MessagePersistence;

impl MessagePersistence {
    pub fn spawn(store: Arc<dyn MessageStore>) -> (PersistenceSender, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, tokio::spawn(Self::run(store, rx)))
    }

    /// Write every queued message until all senders are dropped. Failed
    /// writes are logged and not retried.
    pub async fn run(store: Arc<dyn MessageStore>, mut rx: mpsc::UnboundedReceiver<PendingMessage>) {
        while let Some(PendingMessage { room_id, message }) = rx.recv().await {
            if let Err(e) = store.append_message(&room_id, &message).await {
                tracing::error!(
                    error = %e,
                    room_id = %room_id,
                    message_id = %message.id,
                    "Failed to persist chat message"
                );
            }
        }
        tracing::info!("Persistence queue closed, writer shutting down");
    }
}
