//! Real-time room hub: membership, canvas snapshots and event fan-out.

mod events;
mod gateway;
mod hub;
mod msg;
mod registry;
mod relay;
mod snapshot;
mod sweep;
mod ws;

use std::collections::BTreeSet;
use std::fmt;

use axum::{Router, routing::get};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;

pub use events::{ClientEvent, DrawSegment, Participant, ServerEvent};
pub use hub::{Hub, OUTBOUND_CAPACITY, Outbound, OutboundReceiver};
pub use msg::{ChatMessage, ChatMessageDraft, DEFAULT_MESSAGE_TYPE};
pub use registry::RoomRegistry;
pub use snapshot::{Snapshot, SnapshotStore};
pub use sweep::{start_heartbeat, start_snapshot_sweep};

pub type ConnectionId = Uuid;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::room_ws))
}

/// Opaque room identifier supplied by clients. Never validated by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    Chat,
    Canvas,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Chat => f.write_str("chat"),
            GroupKind::Canvas => f.write_str("canvas"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Membership {
    pub room: RoomId,
    pub group: GroupKind,
}

/// Lifecycle of a single connection, only ever moved by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Detached,
    Attached(BTreeSet<Membership>),
}

impl ConnectionState {
    /// Add a membership, returning `false` if it was already held.
    fn join(&mut self, membership: Membership) -> bool {
        match self {
            ConnectionState::Detached => {
                *self = ConnectionState::Attached(BTreeSet::from([membership]));
                true
            }
            ConnectionState::Attached(memberships) => memberships.insert(membership),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self, ConnectionState::Attached(_))
    }

    pub fn rooms(&self, group: GroupKind) -> Vec<RoomId> {
        match self {
            ConnectionState::Detached => Vec::new(),
            ConnectionState::Attached(memberships) => memberships
                .iter()
                .filter(|m| m.group == group)
                .map(|m| m.room.clone())
                .collect(),
        }
    }
}
