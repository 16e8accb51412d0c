use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::Hub;

/// Spawn the heartbeat: every `period`, connections that sent nothing since
/// the previous tick are closed and the rest are pinged.
pub fn start_heartbeat(hub: Arc<Hub>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            let stale = hub.check_liveness().await;
            let count = hub.connection_count().await;
            tracing::debug!(count, dropped = stale.len(), "Room heartbeat");
        }
    })
}

/// Spawn the snapshot sweep: every `period`, rooms that have had no members
/// for at least `ttl` lose their canvas snapshot.
pub fn start_snapshot_sweep(hub: Arc<Hub>, period: Duration, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            let evicted = hub.evict_vacant_snapshots(ttl).await;
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "Evicted vacant rooms");
            }
        }
    })
}
