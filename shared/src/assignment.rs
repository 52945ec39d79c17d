//! Deterministic initial territory distribution.
//!
//! Given the same player order and seed, every machine computes the same
//! ownership map and the same starting army counts. The server uses this
//! to set up a game; clients and tooling can replay it for verification.

use crate::map::{MapTopology, TerritoryId};
use crate::model::{GameState, PlayerId};
use crate::rng::Lcg;
use crate::{MAX_PLAYERS, MIN_PLAYERS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("invalid player count {0}: a game needs between 2 and 6 players")]
    InvalidPlayerCount(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub owners: BTreeMap<TerritoryId, PlayerId>,
    pub armies_to_deploy: BTreeMap<PlayerId, u32>,
}

/// Starting army allowance per player for a given table size.
pub fn initial_armies(player_count: usize) -> Result<u32, AssignmentError> {
    match player_count {
        2 => Ok(40),
        3 => Ok(35),
        4 => Ok(30),
        5 => Ok(25),
        6 => Ok(20),
        n => Err(AssignmentError::InvalidPlayerCount(n)),
    }
}

/// Shuffles the territories with the seeded LCG and deals them round-robin.
pub fn assign_territories(
    map: &MapTopology,
    players: &[PlayerId],
    seed: u64,
) -> Result<Assignment, AssignmentError> {
    if players.len() < MIN_PLAYERS || players.len() > MAX_PLAYERS {
        return Err(AssignmentError::InvalidPlayerCount(players.len()));
    }
    let allowance = initial_armies(players.len())?;

    let mut ids: Vec<TerritoryId> = map.territory_ids().cloned().collect();
    let mut rng = Lcg::new(seed);
    rng.shuffle(&mut ids);

    let mut owners = BTreeMap::new();
    let mut counts: BTreeMap<PlayerId, u32> = players.iter().map(|p| (p.clone(), 0)).collect();

    for (i, territory) in ids.into_iter().enumerate() {
        let player = &players[i % players.len()];
        owners.insert(territory, player.clone());
        if let Some(count) = counts.get_mut(player) {
            *count += 1;
        }
    }

    let armies_to_deploy = counts
        .into_iter()
        .map(|(player, owned)| (player, allowance.saturating_sub(owned)))
        .collect();

    Ok(Assignment {
        owners,
        armies_to_deploy,
    })
}

/// Writes an assignment onto a fresh board: one army per territory.
pub fn apply_assignment(
    state: &mut GameState,
    players: &[PlayerId],
    assignment: &Assignment,
    timestamp: u64,
) {
    for (territory_id, owner) in &assignment.owners {
        if let Some(territory) = state.territories.get_mut(territory_id) {
            territory.owner = Some(owner.clone());
            territory.armies = 1;
            territory.updated_at = timestamp;
        }
    }
    state.active_players = players.to_vec();
    state.current_player_index = 0;
    state.armies_to_deploy = assignment.armies_to_deploy.clone();
    state.timestamp = timestamp;
}
