use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::HubError;

use super::hub::{ConnectionEntry, HubState};
use super::{
    ConnectionId, ConnectionState, GroupKind, Hub, Membership, OUTBOUND_CAPACITY, Outbound,
    OutboundReceiver, RoomId, ServerEvent,
};

impl Hub {
    /// Register a freshly upgraded connection in the `Detached` state and
    /// return the receiving end of its outbound queue.
    pub async fn connect(&self, conn: ConnectionId) -> OutboundReceiver {
        let (sender, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let entry = ConnectionEntry {
            sender,
            state: ConnectionState::Detached,
            alive: true,
            display_name: None,
            connected_at: OffsetDateTime::now_utc(),
        };
        self.lock().await.connections.insert(conn, entry);
        tracing::debug!(conn_id = %conn, "Connection registered");
        rx
    }

    /// Attach a connection to the given groups of a room. Unknown rooms
    /// are created on the fly.
    ///
    /// When the canvas group is newly joined and the room has a snapshot,
    /// the snapshot is queued before the lock is released, so it reaches
    /// the connection ahead of any drawing relayed afterwards.
    pub async fn attach(
        &self,
        conn: ConnectionId,
        room: &RoomId,
        groups: &[GroupKind],
    ) -> Result<(), HubError> {
        self.lock().await.attach(conn, room, groups)
    }

    /// Canvas membership comes from the `roomId` handshake parameter. An
    /// empty or blank id means no canvas.
    pub async fn attach_on_handshake(
        &self,
        conn: ConnectionId,
        room: Option<RoomId>,
    ) -> Result<(), HubError> {
        match room.filter(|room| !room.as_str().trim().is_empty()) {
            Some(room) => self.attach(conn, &room, &[GroupKind::Canvas]).await,
            None => Ok(()),
        }
    }

    /// Chat membership comes from an explicit `join` event. The display name
    /// is kept for presence only.
    pub async fn join_chat_group(
        &self,
        conn: ConnectionId,
        room: &RoomId,
        display_name: String,
    ) -> Result<(), HubError> {
        let mut state = self.lock().await;
        state.attach(conn, room, &[GroupKind::Chat])?;
        tracing::info!(conn_id = %conn, room_id = %room, user = %display_name, "Participant joined room");
        if let Some(entry) = state.connections.get_mut(&conn) {
            entry.display_name = Some(display_name);
        }
        Ok(())
    }

    /// Remove a connection from every group. Returns `false` if it was
    /// already gone.
    pub async fn detach(&self, conn: ConnectionId) -> bool {
        let mut state = self.lock().await;
        if state.connections.remove(&conn).is_none() {
            return false;
        }
        state.registry.remove(conn);
        tracing::debug!(conn_id = %conn, "Connection detached");
        true
    }

    /// Record that the connection is still sending.
    pub async fn touch(&self, conn: ConnectionId) {
        if let Some(entry) = self.lock().await.connections.get_mut(&conn) {
            entry.alive = true;
        }
    }
}

impl HubState {
    fn attach(
        &mut self,
        conn: ConnectionId,
        room: &RoomId,
        groups: &[GroupKind],
    ) -> Result<(), HubError> {
        let HubState {
            registry,
            snapshots,
            connections,
        } = &mut *self;

        let entry = connections
            .get_mut(&conn)
            .ok_or(HubError::UnknownConnection(conn))?;

        let mut backlogged = false;
        for &group in groups {
            let joined = entry.state.join(Membership {
                room: room.clone(),
                group,
            });
            if !joined {
                continue;
            }
            registry.add(room, group, conn);
            tracing::debug!(conn_id = %conn, room_id = %room, %group, "Joined group");

            if group == GroupKind::Canvas {
                if let Some(snapshot) = snapshots.get(room) {
                    let event = Outbound::Event(ServerEvent::CanvasState(snapshot.clone()));
                    if let Err(TrySendError::Full(_)) = entry.sender.try_send(event) {
                        backlogged = true;
                    }
                }
            }
        }

        if backlogged {
            self.drop_backlogged(conn);
        }
        Ok(())
    }
}
