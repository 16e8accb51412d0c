use thiserror::Error;

use crate::rooms::ConnectionId;

/// A connection-level failure. Never propagated past the connection that
/// produced it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The durable message store rejected a write.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to persist message: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The connection was never registered or has already been detached.
    #[error("connection {0} is not attached to the hub")]
    UnknownConnection(ConnectionId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}
