//! Game data model shared by the server and its clients.

use crate::map::{ContinentId, MapTopology, TerritoryId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PlayerId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    pub owner: Option<PlayerId>,
    pub armies: u32,
    pub neighbors: Vec<TerritoryId>,
    pub continent: ContinentId,
    /// Millisecond timestamp of the last change to owner or armies
    pub updated_at: u64,
}

impl Territory {
    pub fn is_owned_by(&self, player_id: &str) -> bool {
        self.owner.as_deref() == Some(player_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Startup,
    Reinforcement,
    Attack,
    Fortification,
    Victory,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Startup => "startup",
            Phase::Reinforcement => "reinforcement",
            Phase::Attack => "attack",
            Phase::Fortification => "fortification",
            Phase::Victory => "victory",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Victory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Waiting,
    Ready,
    InProgress,
    Finished,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Waiting => "waiting",
            Lifecycle::Ready => "ready",
            Lifecycle::InProgress => "in_progress",
            Lifecycle::Finished => "finished",
        }
    }

    pub fn is_pre_start(&self) -> bool {
        matches!(self, Lifecycle::Waiting | Lifecycle::Ready)
    }
}

/// Outstanding troop move after a defender was wiped out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConquest {
    pub from: TerritoryId,
    pub to: TerritoryId,
    pub committed: u32,
    pub min_transfer: u32,
    pub max_transfer: u32,
}

/// The authoritative state of one running game.
///
/// `timestamp` and `version` form the logical clock used by conflict
/// resolution; only the rules engine advances them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub territories: BTreeMap<TerritoryId, Territory>,
    pub active_players: Vec<PlayerId>,
    pub current_player_index: usize,
    pub phase: Phase,
    pub turn_number: u32,
    pub armies_to_deploy: BTreeMap<PlayerId, u32>,
    pub seed: u64,
    pub fortified_this_turn: bool,
    pub pending_conquest: Option<PendingConquest>,
    pub winner: Option<PlayerId>,
    pub timestamp: u64,
    pub version: u64,
}

impl GameState {
    /// Creates an unassigned board for the given map.
    pub fn new(map: &MapTopology, seed: u64, timestamp: u64) -> Self {
        let territories = map
            .territories()
            .map(|(id, def)| {
                (
                    id.clone(),
                    Territory {
                        id: id.clone(),
                        owner: None,
                        armies: 0,
                        neighbors: def.neighbors.clone(),
                        continent: def.continent.clone(),
                        updated_at: timestamp,
                    },
                )
            })
            .collect();

        Self {
            territories,
            active_players: Vec::new(),
            current_player_index: 0,
            phase: Phase::Startup,
            turn_number: 0,
            armies_to_deploy: BTreeMap::new(),
            seed,
            fortified_this_turn: false,
            pending_conquest: None,
            winner: None,
            timestamp,
            version: 0,
        }
    }

    pub fn current_player(&self) -> Option<&PlayerId> {
        self.active_players.get(self.current_player_index)
    }

    pub fn is_current_player(&self, player_id: &str) -> bool {
        self.current_player().map(|p| p == player_id).unwrap_or(false)
    }

    pub fn territory(&self, id: &str) -> Option<&Territory> {
        self.territories.get(id)
    }

    pub fn territories_owned_by<'a>(
        &'a self,
        player_id: &'a str,
    ) -> impl Iterator<Item = &'a Territory> + 'a {
        self.territories
            .values()
            .filter(move |t| t.is_owned_by(player_id))
    }

    pub fn territory_count(&self, player_id: &str) -> usize {
        self.territories_owned_by(player_id).count()
    }

    pub fn remaining_to_deploy(&self, player_id: &str) -> u32 {
        self.armies_to_deploy.get(player_id).copied().unwrap_or(0)
    }

    /// Sum of armies on the board plus armies waiting to be placed.
    pub fn total_armies(&self) -> u64 {
        let on_board: u64 = self.territories.values().map(|t| t.armies as u64).sum();
        let in_hand: u64 = self.armies_to_deploy.values().map(|a| *a as u64).sum();
        on_board + in_hand
    }

    pub fn is_active(&self, player_id: &str) -> bool {
        self.active_players.iter().any(|p| p == player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub ready: bool,
    pub connected: bool,
    pub eliminated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub code: String,
    pub host_id: PlayerId,
    pub max_players: usize,
    pub lifecycle: Lifecycle,
    pub players: Vec<PlayerSummary>,
    pub turn_number: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Row of the administrative session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub code: String,
    pub player_count: usize,
    pub lifecycle: Lifecycle,
    pub turn_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackReport {
    pub attacker: TerritoryId,
    pub defender: TerritoryId,
    pub attacker_dice: Vec<u8>,
    pub defender_dice: Vec<u8>,
    pub attacker_losses: u32,
    pub defender_losses: u32,
    pub conquered: bool,
}
