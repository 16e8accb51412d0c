use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;

use super::{ConnectionId, GroupKind, RoomId};

#[derive(Debug, Default)]
struct RoomGroups {
    chat: BTreeSet<ConnectionId>,
    canvas: BTreeSet<ConnectionId>,
    /// Set when the last member leaves, cleared when someone joins again.
    vacated_at: Option<Instant>,
}

impl RoomGroups {
    fn group(&self, group: GroupKind) -> &BTreeSet<ConnectionId> {
        match group {
            GroupKind::Chat => &self.chat,
            GroupKind::Canvas => &self.canvas,
        }
    }

    fn group_mut(&mut self, group: GroupKind) -> &mut BTreeSet<ConnectionId> {
        match group {
            GroupKind::Chat => &mut self.chat,
            GroupKind::Canvas => &mut self.canvas,
        }
    }

    fn is_empty(&self) -> bool {
        self.chat.is_empty() && self.canvas.is_empty()
    }
}

/// Live membership of every room, rebuilt from connections as they come and go.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomGroups>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the connection was already in that group.
    pub fn add(&mut self, room: &RoomId, group: GroupKind, conn: ConnectionId) -> bool {
        let groups = self.rooms.entry(room.clone()).or_default();
        groups.vacated_at = None;
        groups.group_mut(group).insert(conn)
    }

    pub fn members(&self, room: &RoomId, group: GroupKind) -> BTreeSet<ConnectionId> {
        self.rooms
            .get(room)
            .map(|groups| groups.group(group).clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, room: &RoomId, group: GroupKind, conn: ConnectionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|groups| groups.group(group).contains(&conn))
    }

    /// Remove the connection from every group of every room.
    pub fn remove(&mut self, conn: ConnectionId) {
        let now = Instant::now();
        for groups in self.rooms.values_mut() {
            let was_empty = groups.is_empty();
            groups.chat.remove(&conn);
            groups.canvas.remove(&conn);
            if !was_empty && groups.is_empty() {
                groups.vacated_at = Some(now);
            }
        }
    }

    pub fn vacated_since(&self, room: &RoomId) -> Option<Instant> {
        self.rooms.get(room).and_then(|groups| groups.vacated_at)
    }

    /// Forget every room that has been empty for at least `ttl`, returning
    /// their identifiers.
    pub fn drain_vacated(&mut self, ttl: Duration) -> Vec<RoomId> {
        let now = Instant::now();
        let expired: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, groups)| {
                groups
                    .vacated_at
                    .is_some_and(|at| now.duration_since(at) >= ttl)
            })
            .map(|(room, _)| room.clone())
            .collect();

        for room in &expired {
            self.rooms.remove(room);
        }
        expired
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
