//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the database pool and a map of live rooms keyed by room code.
//! Each live room carries its document, the connected clients, and a dirty
//! flag plus revision counter for debounced persistence.
//!
//! Deleted room codes are kept as tombstones. A flush snapshotted before a
//! delete may land after it; the tombstone lets that flush remove the row
//! again instead of bringing the room back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use frames::Frame;
use grid::doc::Room;
use sqlx::PgPool;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

// =============================================================================
// ROOM STATE
// =============================================================================

/// Per-room live state. Kept in memory while loaded.
/// Flushed to Postgres by the persistence task.
pub struct RoomState {
    pub room: Room,
    /// Connected clients: `client_id` -> sender for outgoing frames.
    pub clients: HashMap<Uuid, mpsc::Sender<Frame>>,
    /// Set on every mutation, cleared once a flush of the same revision lands.
    pub dirty: bool,
    /// Monotonic mutation counter.
    pub revision: u64,
}

impl RoomState {
    #[must_use]
    pub fn new(room: Room) -> Self {
        Self { room, clients: HashMap::new(), dirty: false, revision: 0 }
    }

    /// Record a mutation.
    pub fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    /// Clear the dirty flag if no mutation happened after `flushed_revision`.
    pub fn ack_flush(&mut self, flushed_revision: u64) -> bool {
        if self.revision == flushed_revision {
            self.dirty = false;
        }
        !self.dirty
    }

    /// Keep the room's participant count in step with the client map.
    pub fn sync_participants(&mut self) {
        self.room.participant_count = self.clients.len();
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub rooms: Arc<RwLock<HashMap<String, RoomState>>>,
    /// Codes deleted while this process runs. Never reused for new rooms.
    pub deleted: Arc<RwLock<HashSet<String>>>,
    /// Outbound queue depth for each websocket connection.
    pub client_channel_capacity: usize,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, client_channel_capacity: usize) -> Self {
        Self {
            pool,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            deleted: Arc::new(RwLock::new(HashSet::new())),
            client_channel_capacity,
        }
    }

    /// Whether `code` was deleted while this process runs.
    pub async fn is_deleted(&self, code: &str) -> bool {
        self.deleted.read().await.contains(code)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
