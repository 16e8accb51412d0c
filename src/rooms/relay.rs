use time::OffsetDateTime;

use crate::db::PendingMessage;
use crate::error::HubError;

use super::{
    ChatMessage, ChatMessageDraft, ClientEvent, ConnectionId, DrawSegment, GroupKind, Hub, RoomId,
    ServerEvent, Snapshot,
};

impl Hub {
    /// Apply one inbound event. Events from a single connection must be fed
    /// in the order they arrived.
    pub async fn handle_event(&self, conn: ConnectionId, event: ClientEvent) -> Result<(), HubError> {
        match event {
            ClientEvent::Join { room_id, user } => {
                self.join_chat_group(conn, &room_id, user.name).await
            }
            ClientEvent::Drawing(segment) => self.relay_drawing(conn, segment).await.map(drop),
            ClientEvent::ClearCanvas => self.clear_canvas(conn).await.map(drop),
            ClientEvent::SaveCanvasState(snapshot) => self.save_canvas_state(conn, snapshot).await,
            ClientEvent::SendMessage { room_id, message } => {
                self.send_message(conn, room_id, message).await.map(drop)
            }
        }
    }

    /// Forward a segment to the rest of the sender's canvas group. The sender
    /// already drew it locally. Returns how many connections it reached.
    pub async fn relay_drawing(
        &self,
        conn: ConnectionId,
        segment: DrawSegment,
    ) -> Result<usize, HubError> {
        let mut state = self.lock().await;
        let rooms = state.entry(conn)?.state.rooms(GroupKind::Canvas);
        if rooms.is_empty() {
            tracing::debug!(conn_id = %conn, "Ignoring drawing from connection without a canvas");
            return Ok(0);
        }

        let event = ServerEvent::Drawing(segment);
        let mut delivered = 0;
        for room in &rooms {
            delivered += state.fan_out(room, GroupKind::Canvas, &event, Some(conn));
        }
        Ok(delivered)
    }

    /// Drop the room's snapshot and tell everyone else in the canvas group.
    pub async fn clear_canvas(&self, conn: ConnectionId) -> Result<usize, HubError> {
        let mut state = self.lock().await;
        let rooms = state.entry(conn)?.state.rooms(GroupKind::Canvas);
        if rooms.is_empty() {
            tracing::debug!(conn_id = %conn, "Ignoring clear from connection without a canvas");
            return Ok(0);
        }

        let mut delivered = 0;
        for room in &rooms {
            state.snapshots.clear(room);
            delivered += state.fan_out(room, GroupKind::Canvas, &ServerEvent::CanvasCleared, Some(conn));
            tracing::debug!(conn_id = %conn, room_id = %room, "Canvas cleared");
        }
        Ok(delivered)
    }

    /// Replace the room's snapshot. Nothing is broadcast; other members see
    /// it only when they next attach.
    pub async fn save_canvas_state(
        &self,
        conn: ConnectionId,
        snapshot: Snapshot,
    ) -> Result<(), HubError> {
        let mut state = self.lock().await;
        let rooms = state.entry(conn)?.state.rooms(GroupKind::Canvas);
        if rooms.is_empty() {
            tracing::debug!(conn_id = %conn, "Ignoring save from connection without a canvas");
            return Ok(());
        }

        for room in &rooms {
            state.snapshots.save(room, snapshot.clone());
        }
        Ok(())
    }

    /// Fill in the message, queue it for persistence and deliver it to the
    /// whole chat group, sender included, so everyone sees the same id and
    /// timestamp. Delivery never waits on the store.
    pub async fn send_message(
        &self,
        conn: ConnectionId,
        room_id: RoomId,
        draft: ChatMessageDraft,
    ) -> Result<ChatMessage, HubError> {
        let message = draft.enrich(OffsetDateTime::now_utc());

        let mut state = self.lock().await;
        state.entry(conn)?;

        let pending = PendingMessage {
            room_id: room_id.clone(),
            message: message.clone(),
        };
        if self.persistence.send(pending).is_err() {
            tracing::error!(room_id = %room_id, message_id = %message.id, "Persistence writer is gone, message not stored");
        }

        let delivered = state.fan_out(
            &room_id,
            GroupKind::Chat,
            &ServerEvent::ReceiveMessage(message.clone()),
            None,
        );
        tracing::debug!(conn_id = %conn, room_id = %room_id, message_id = %message.id, delivered, "Chat message relayed");
        Ok(message)
    }
}
