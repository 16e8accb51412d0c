//! Wire format of the room socket.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`;
//! events without a payload omit `data`.

use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatMessageDraft, RoomId, Snapshot};

/// One line segment of a stroke. Only ever relayed, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawSegment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: String,
    pub line_width: f64,
    /// Display name shown next to the stroke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Marks the first segment of a stroke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new_stroke: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Join {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        user: Participant,
    },
    Drawing(DrawSegment),
    ClearCanvas,
    SaveCanvasState(Snapshot),
    SendMessage {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        message: ChatMessageDraft,
    },
}

/// Events the hub delivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    CanvasState(Snapshot),
    Drawing(DrawSegment),
    CanvasCleared,
    ReceiveMessage(ChatMessage),
}
