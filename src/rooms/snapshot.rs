use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::RoomId;

/// Serialized image of a whole canvas, as sent by the client (a data URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Latest canvas snapshot per room. Saves overwrite wholesale; there is no
/// merge and no version check.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<RoomId, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room: &RoomId) -> Option<&Snapshot> {
        self.snapshots.get(room)
    }

    pub fn save(&mut self, room: &RoomId, snapshot: Snapshot) {
        self.snapshots.insert(room.clone(), snapshot);
    }

    pub fn clear(&mut self, room: &RoomId) -> Option<Snapshot> {
        self.snapshots.remove(room)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
