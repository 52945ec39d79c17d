//! Turn and phase state machine.
//!
//! ```text
//! startup ──(all armies placed)──▶ reinforcement ──▶ attack ──▶ fortification
//!                                        ▲                             │
//!                                        └──────(next player)──────────┘
//! any phase ──(one active player left)──▶ victory (terminal)
//! ```
//!
//! The turn counter starts at 1 when startup ends and is incremented each
//! time play wraps from the last active player back to the first.

use crate::config::RuleConfig;
use crate::error::{GameError, GameResult};
use shared::{GameState, MapTopology, Phase, PlayerId};

/// Who holds the turn after a transition that handed it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnStart {
    pub player_id: PlayerId,
    pub turn_number: u32,
}

/// Common precondition of every mutating action: the game is still running
/// and `actor` holds the turn.
pub fn ensure_turn(state: &GameState, actor: &str) -> GameResult<()> {
    if state.phase.is_terminal() {
        return Err(GameError::GameFinished);
    }
    if !state.is_current_player(actor) {
        return Err(GameError::NotPlayersTurn);
    }
    Ok(())
}

/// Advances the logical clock after a successful mutation.
pub fn stamp(state: &mut GameState, now: u64) -> u64 {
    let ts = now.max(state.timestamp + 1);
    state.timestamp = ts;
    state.version += 1;
    ts
}

/// Armies granted at the start of a turn: a floor of
/// `min_reinforcement`, a third of the territories held, plus the bonus of
/// every continent held outright.
pub fn reinforcement_amount(
    state: &GameState,
    map: &MapTopology,
    rules: &RuleConfig,
    player_id: &str,
) -> u32 {
    let owned = state.territory_count(player_id) as u32;
    let base = (owned / 3).max(rules.min_reinforcement);
    base + continent_bonus(state, map, player_id)
}

pub fn continent_bonus(state: &GameState, map: &MapTopology, player_id: &str) -> u32 {
    map.continents()
        .filter(|(_, continent)| {
            continent.territories.iter().all(|t| {
                state
                    .territory(t)
                    .map(|territory| territory.is_owned_by(player_id))
                    .unwrap_or(false)
            })
        })
        .map(|(_, continent)| continent.bonus)
        .sum()
}

/// Moves the game one phase forward on behalf of the current player.
///
/// Returns the new turn holder when the turn changed hands.
pub fn advance_phase(
    state: &mut GameState,
    map: &MapTopology,
    rules: &RuleConfig,
    actor: &str,
) -> GameResult<Option<TurnStart>> {
    match state.phase {
        Phase::Startup => Ok(Some(pass_startup_turn(state, map, rules))),
        Phase::Reinforcement => {
            let remaining = state.remaining_to_deploy(actor);
            if remaining > 0 {
                return Err(GameError::UndeployedArmies(remaining));
            }
            state.phase = Phase::Attack;
            Ok(None)
        }
        Phase::Attack => {
            state.phase = Phase::Fortification;
            Ok(None)
        }
        Phase::Fortification => Ok(Some(start_next_turn(state, map, rules))),
        Phase::Victory => Err(GameError::GameFinished),
    }
}

/// Startup placement rotates between players that still hold armies; once
/// everyone is done the first real turn begins.
fn pass_startup_turn(state: &mut GameState, map: &MapTopology, rules: &RuleConfig) -> TurnStart {
    let count = state.active_players.len();
    let next = (1..=count)
        .map(|offset| (state.current_player_index + offset) % count)
        .find(|&i| state.remaining_to_deploy(&state.active_players[i]) > 0);

    match next {
        Some(index) => {
            state.current_player_index = index;
            TurnStart {
                player_id: state.active_players[index].clone(),
                turn_number: state.turn_number,
            }
        }
        None => {
            state.turn_number = 1;
            state.current_player_index = 0;
            begin_reinforcement(state, map, rules)
        }
    }
}

fn start_next_turn(state: &mut GameState, map: &MapTopology, rules: &RuleConfig) -> TurnStart {
    let count = state.active_players.len().max(1);
    let next = (state.current_player_index + 1) % count;
    if next == 0 {
        state.turn_number += 1;
    }
    state.current_player_index = next;
    begin_reinforcement(state, map, rules)
}

fn begin_reinforcement(state: &mut GameState, map: &MapTopology, rules: &RuleConfig) -> TurnStart {
    state.phase = Phase::Reinforcement;
    state.fortified_this_turn = false;

    let player_id = state.active_players[state.current_player_index].clone();
    let grant = reinforcement_amount(state, map, rules, &player_id);
    *state.armies_to_deploy.entry(player_id.clone()).or_insert(0) += grant;

    TurnStart {
        player_id,
        turn_number: state.turn_number,
    }
}

/// Removes `player_id` from the rotation when it holds no territory.
///
/// Declares victory when a single active player remains. Returns true
/// when the player was eliminated.
pub fn eliminate_if_defeated(state: &mut GameState, player_id: &str) -> bool {
    if state.territory_count(player_id) > 0 {
        return false;
    }
    let Some(position) = state.active_players.iter().position(|p| p == player_id) else {
        return false;
    };

    state.active_players.remove(position);
    state.armies_to_deploy.remove(player_id);
    if position < state.current_player_index {
        state.current_player_index -= 1;
    }
    if state.current_player_index >= state.active_players.len() {
        state.current_player_index = 0;
    }

    if state.active_players.len() == 1 {
        state.phase = Phase::Victory;
        state.winner = state.active_players.first().cloned();
    }
    true
}
