//! Types and algorithms that the server and every client must agree on.
//!
//! - `map`: static board topology (territories, borders, continents)
//! - `model`: game state, phases, session snapshots
//! - `rng` and `assignment`: the seeded, replayable initial distribution
//! - `protocol`: wire messages in both directions

pub mod assignment;
pub mod map;
pub mod model;
pub mod protocol;
pub mod rng;

pub use assignment::{apply_assignment, assign_territories, initial_armies, Assignment};
pub use map::{MapError, MapTopology, TerritoryId};
pub use model::{
    AttackReport, GameState, Lifecycle, PendingConquest, Phase, PlayerId, PlayerSummary,
    SessionSnapshot, SessionSummary, Territory,
};
pub use protocol::{ClientMessage, Resolution, ServerMessage, PROTOCOL_VERSION};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 6;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
