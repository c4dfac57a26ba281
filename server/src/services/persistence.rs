//! Persistence service: background flush for dirty rooms.
//!
//! DESIGN
//! ======
//! A background task flushes dirty rooms, then sleeps for the configured
//! interval before the next cycle. Room documents are snapshotted under the
//! lock and written lock-free, so websocket handling never blocks on
//! Postgres I/O.
//!
//! ERROR HANDLING
//! ==============
//! Dirty flags are cleared only after successful writes, and only if the room
//! revision did not move while the write was in flight. Repeated upserts are
//! acceptable; silent data loss is not. A snapshot of a room deleted
//! mid-sweep is discarded, never acked.

use std::time::Duration;

use grid::doc::Room;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::services::room::persist_room;
use crate::state::AppState;

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState, flush_interval_ms: u64) -> JoinHandle<()> {
    info!(flush_interval_ms, "room persistence flush configured");
    tokio::spawn(async move {
        loop {
            flush_all_dirty(&state).await;
            tokio::time::sleep(Duration::from_millis(flush_interval_ms)).await;
        }
    })
}

#[derive(Debug)]
struct DirtyRoom {
    code: String,
    room: Room,
    revision: u64,
}

async fn flush_all_dirty(state: &AppState) {
    // PHASE: SNAPSHOT DIRTY ROOMS
    // WHY: collect immutable clones under lock, then perform I/O lock-free.
    let batch = {
        let rooms = state.rooms.read().await;
        rooms
            .iter()
            .filter(|(_, rs)| rs.dirty)
            .map(|(code, rs)| DirtyRoom { code: code.clone(), room: rs.room.clone(), revision: rs.revision })
            .collect::<Vec<_>>()
    };

    // PHASE: FLUSH PER ROOM + ACK
    // WHY: if a flush fails the dirty flag stays for the next cycle.
    for dirty in batch {
        match persist_room(state, &dirty.room).await {
            Ok(true) => ack_flushed(state, &dirty.code, dirty.revision).await,
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, room_id = %dirty.code, revision = dirty.revision, "persistence flush failed");
            }
        }
    }
}

/// Clear the dirty flag for a flushed revision and evict the room if idle.
async fn ack_flushed(state: &AppState, code: &str, revision: u64) {
    let mut rooms = state.rooms.write().await;
    let Some(room_state) = rooms.get_mut(code) else {
        return;
    };
    // EDGE: keep dirty flag if the room changed again after the snapshot.
    if room_state.ack_flush(revision) && room_state.clients.is_empty() {
        rooms.remove(code);
        info!(room_id = %code, "evicted idle room after flush");
    }
}

#[cfg(test)]
pub(crate) async fn flush_all_dirty_for_tests(state: &AppState) {
    flush_all_dirty(state).await;
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
