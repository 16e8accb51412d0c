use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_MESSAGE_TYPE: &str = "message";

/// A chat message as sent by a client. `id`, `timestamp` and `type` may be
/// left out; the hub fills them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub author: String,
    pub body: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A field-complete chat message. This is the only form that is broadcast
/// or persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ChatMessageDraft {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            author: author.into(),
            body: body.into(),
            timestamp: None,
            kind: None,
        }
    }

    /// Fill every missing field. Blank ids and types count as missing.
    pub fn enrich(self, received_at: OffsetDateTime) -> ChatMessage {
        let ChatMessageDraft {
            id,
            author,
            body,
            timestamp,
            kind,
        } = self;

        ChatMessage {
            id: id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            author,
            body,
            timestamp: timestamp.unwrap_or(received_at),
            kind: kind
                .filter(|kind| !kind.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_owned()),
        }
    }
}
