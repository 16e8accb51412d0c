use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;

use crate::db::{MessagePersistence, MessageStore, PersistenceSender};
use crate::error::HubError;

use super::{
    ConnectionId, ConnectionState, GroupKind, RoomId, RoomRegistry, ServerEvent, Snapshot,
    SnapshotStore,
};

/// Anything the hub asks a connection's writer task to put on the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    Ping,
    Close,
}

/// Items a connection may have queued but not yet written. A reader that
/// falls this far behind is dropped.
pub const OUTBOUND_CAPACITY: usize = 256;

pub type OutboundSender = mpsc::Sender<Outbound>;
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

pub(super) struct ConnectionEntry {
    pub(super) sender: OutboundSender,
    pub(super) state: ConnectionState,
    /// Cleared by every heartbeat, set again by any inbound frame.
    pub(super) alive: bool,
    pub(super) display_name: Option<String>,
    pub(super) connected_at: OffsetDateTime,
}

#[derive(Default)]
pub(super) struct HubState {
    pub(super) registry: RoomRegistry,
    pub(super) snapshots: SnapshotStore,
    pub(super) connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl HubState {
    pub(super) fn entry(&self, conn: ConnectionId) -> Result<&ConnectionEntry, HubError> {
        self.connections
            .get(&conn)
            .ok_or(HubError::UnknownConnection(conn))
    }

    /// Queue `event` to every member of the group except `exclude`.
    /// Connections whose writer has already gone away are skipped; those
    /// whose queue is full are detached.
    pub(super) fn fan_out(
        &mut self,
        room: &RoomId,
        group: GroupKind,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let mut delivered = 0;
        let mut backlogged = Vec::new();
        for member in self.registry.members(room, group) {
            if Some(member) == exclude {
                continue;
            }
            let Some(entry) = self.connections.get(&member) else {
                continue;
            };
            match entry.sender.try_send(Outbound::Event(event.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => backlogged.push(member),
                Err(TrySendError::Closed(_)) => {}
            }
        }

        for conn in backlogged {
            self.drop_backlogged(conn);
        }
        delivered
    }

    /// Forget a connection whose outbound queue is full. Dropping its sender
    /// ends the writer once the queue has drained.
    pub(super) fn drop_backlogged(&mut self, conn: ConnectionId) {
        if self.connections.remove(&conn).is_some() {
            self.registry.remove(conn);
            tracing::warn!(conn_id = %conn, "Detached connection with a full outbound queue");
        }
    }
}

/// The room hub.
///
/// All membership and snapshot state sits behind one lock. Every gateway and
/// relay operation takes it once and finishes its mutation and fan-out
/// before releasing it, so no handler ever observes another half-done.
pub struct Hub {
    pub(super) state: Mutex<HubState>,
    pub(super) persistence: PersistenceSender,
}

impl Hub {
    pub fn new(persistence: PersistenceSender) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            persistence,
        }
    }

    /// Create a hub together with its persistence writer. The writer exits
    /// once the hub is dropped and its queue is drained.
    pub fn spawn(store: Arc<dyn MessageStore>) -> (Arc<Self>, JoinHandle<()>) {
        let (persistence, handle) = MessagePersistence::spawn(store);
        (Arc::new(Self::new(persistence)), handle)
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().await
    }

    pub async fn snapshot(&self, room: &RoomId) -> Option<Snapshot> {
        self.lock().await.snapshots.get(room).cloned()
    }

    pub async fn members(&self, room: &RoomId, group: GroupKind) -> BTreeSet<ConnectionId> {
        self.lock().await.registry.members(room, group)
    }

    /// Unknown or detached connections report [`ConnectionState::Detached`].
    pub async fn connection_state(&self, conn: ConnectionId) -> ConnectionState {
        self.lock()
            .await
            .connections
            .get(&conn)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    pub async fn display_name(&self, conn: ConnectionId) -> Option<String> {
        self.lock()
            .await
            .connections
            .get(&conn)
            .and_then(|entry| entry.display_name.clone())
    }

    pub async fn connected_at(&self, conn: ConnectionId) -> Option<OffsetDateTime> {
        self.lock()
            .await
            .connections
            .get(&conn)
            .map(|entry| entry.connected_at)
    }

    pub async fn connection_count(&self) -> usize {
        self.lock().await.connections.len()
    }

    /// Close and detach every connection that stayed silent since the last
    /// check, then ping the rest. Returns the detached connections.
    pub async fn check_liveness(&self) -> Vec<ConnectionId> {
        let mut state = self.lock().await;
        let HubState {
            registry,
            connections,
            ..
        } = &mut *state;

        let stale: Vec<ConnectionId> = connections
            .iter()
            .filter(|(_, entry)| !entry.alive)
            .map(|(id, _)| *id)
            .collect();

        for conn in &stale {
            if let Some(entry) = connections.remove(conn) {
                let _ = entry.sender.try_send(Outbound::Close);
            }
            registry.remove(*conn);
            tracing::info!(conn_id = %conn, "Detached unresponsive connection");
        }

        for entry in connections.values_mut() {
            entry.alive = false;
            // A full queue already has frames on the way.
            let _ = entry.sender.try_send(Outbound::Ping);
        }

        stale
    }

    /// Drop the snapshot of every room that has had no members for `ttl`.
    pub async fn evict_vacant_snapshots(&self, ttl: Duration) -> Vec<RoomId> {
        let mut state = self.lock().await;
        let HubState {
            registry,
            snapshots,
            ..
        } = &mut *state;

        let expired = registry.drain_vacated(ttl);
        for room in &expired {
            if snapshots.clear(room).is_some() {
                tracing::debug!(room_id = %room, "Evicted canvas snapshot of vacant room");
            }
        }
        expired
    }

    /// Send Close to every connection and forget all membership.
    pub async fn shutdown_all(&self) {
        let mut state = self.lock().await;
        let HubState {
            registry,
            connections,
            ..
        } = &mut *state;

        let count = connections.len();
        for (conn, entry) in connections.drain() {
            let _ = entry.sender.try_send(Outbound::Close);
            registry.remove(conn);
        }
        tracing::info!(count, "Closed all room connections");
    }
}
