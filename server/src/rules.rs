//! Game rules engine.
//!
//! Each action validates every precondition before touching the state, so
//! a rejected action leaves the `GameState` exactly as it was. The turn
//! check always runs first: an out-of-turn player gets "not your turn" and
//! never a rule-specific complaint.

use crate::config::RuleConfig;
use crate::dice::{compare_dice, DiceRoller, MAX_ATTACK_DICE, MAX_DEFENSE_DICE};
use crate::error::{GameError, GameResult};
use crate::turn::{self, TurnStart};
use log::debug;
use shared::{AttackReport, GameState, MapTopology, PendingConquest, Phase, PlayerId, TerritoryId};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameAction {
    Deploy {
        territory: TerritoryId,
        count: u32,
    },
    Attack {
        attacker: TerritoryId,
        defender: TerritoryId,
        committed_armies: u32,
    },
    CompleteConquest {
        transfer_count: u32,
    },
    Fortify {
        source: TerritoryId,
        target: TerritoryId,
        count: u32,
    },
    AdvancePhase,
}

/// Side effects of an accepted action that callers announce to the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub attack: Option<AttackReport>,
    pub turn_start: Option<TurnStart>,
    pub eliminated: Vec<PlayerId>,
    pub winner: Option<PlayerId>,
}

/// Ephemeral record of one declared attack; consumed when the battle
/// resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CombatInstance {
    attacker: TerritoryId,
    defender: TerritoryId,
    attacker_armies: u32,
    defender_armies: u32,
    committed: u32,
}

impl CombatInstance {
    fn defender_dice(&self) -> u32 {
        self.defender_armies.min(MAX_DEFENSE_DICE)
    }

    /// Legal bounds for armies moved into a conquered territory given the
    /// attacker's post-battle strength.
    fn into_pending(self, attacker_remaining: u32) -> PendingConquest {
        PendingConquest {
            from: self.attacker,
            to: self.defender,
            committed: self.committed,
            min_transfer: 1,
            max_transfer: attacker_remaining.saturating_sub(1),
        }
    }
}

pub struct RulesEngine<'a> {
    map: &'a MapTopology,
    config: &'a RuleConfig,
}

impl<'a> RulesEngine<'a> {
    pub fn new(map: &'a MapTopology, config: &'a RuleConfig) -> Self {
        Self { map, config }
    }

    /// Validates and applies one action for `actor`.
    pub fn apply(
        &self,
        state: &mut GameState,
        actor: &str,
        action: &GameAction,
        dice: &mut dyn DiceRoller,
        now: u64,
    ) -> GameResult<ActionOutcome> {
        turn::ensure_turn(state, actor)?;

        if let Some(pending) = &state.pending_conquest {
            if !matches!(action, GameAction::CompleteConquest { .. }) {
                return Err(GameError::ConquestPending(pending.to.clone()));
            }
        }

        let mut outcome = ActionOutcome::default();
        match action {
            GameAction::Deploy { territory, count } => {
                self.deploy(state, actor, territory, *count, now)?;
            }
            GameAction::Attack {
                attacker,
                defender,
                committed_armies,
            } => {
                outcome = self.attack(state, actor, attacker, defender, *committed_armies, dice, now)?;
            }
            GameAction::CompleteConquest { transfer_count } => {
                self.complete_conquest(state, *transfer_count, now)?;
            }
            GameAction::Fortify {
                source,
                target,
                count,
            } => {
                self.fortify(state, actor, source, target, *count, now)?;
            }
            GameAction::AdvancePhase => {
                outcome.turn_start = turn::advance_phase(state, self.map, self.config, actor)?;
                turn::stamp(state, now);
            }
        }

        debug!(
            "{} applied {:?}; phase {} turn {} v{}",
            actor,
            action,
            state.phase.as_str(),
            state.turn_number,
            state.version
        );
        Ok(outcome)
    }

    fn deploy(
        &self,
        state: &mut GameState,
        actor: &str,
        territory_id: &str,
        count: u32,
        now: u64,
    ) -> GameResult<()> {
        if !matches!(state.phase, Phase::Startup | Phase::Reinforcement) {
            return Err(GameError::WrongPhase(state.phase.as_str()));
        }
        owned_territory(state, actor, territory_id)?;
        if count < 1 {
            return Err(GameError::InvalidArmyCount(
                "deploy at least one army".to_string(),
            ));
        }
        let remaining = state.remaining_to_deploy(actor);
        if count > remaining {
            return Err(GameError::InsufficientArmies(format!(
                "{} requested, {} left to deploy",
                count, remaining
            )));
        }

        let ts = turn::stamp(state, now);
        if let Some(territory) = state.territories.get_mut(territory_id) {
            territory.armies += count;
            territory.updated_at = ts;
        }
        state.armies_to_deploy.insert(actor.to_string(), remaining - count);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn attack(
        &self,
        state: &mut GameState,
        actor: &str,
        attacker_id: &str,
        defender_id: &str,
        committed: u32,
        dice: &mut dyn DiceRoller,
        now: u64,
    ) -> GameResult<ActionOutcome> {
        if state.phase != Phase::Attack {
            return Err(GameError::WrongPhase(state.phase.as_str()));
        }
        let attacker_armies = owned_territory(state, actor, attacker_id)?.armies;
        let defender = state
            .territory(defender_id)
            .ok_or_else(|| GameError::TerritoryNotFound(defender_id.to_string()))?;
        if defender.is_owned_by(actor) {
            return Err(GameError::OwnTerritory(defender_id.to_string()));
        }
        if !self.map.are_adjacent(attacker_id, defender_id) {
            return Err(GameError::NotAdjacent(
                attacker_id.to_string(),
                defender_id.to_string(),
            ));
        }
        if attacker_armies < 2 {
            return Err(GameError::InsufficientArmies(format!(
                "{} needs at least 2 armies to attack",
                attacker_id
            )));
        }
        let max_commit = MAX_ATTACK_DICE.min(attacker_armies - 1);
        if committed < 1 || committed > max_commit {
            return Err(GameError::InvalidArmyCount(format!(
                "commit between 1 and {} armies",
                max_commit
            )));
        }

        let combat = CombatInstance {
            attacker: attacker_id.to_string(),
            defender: defender_id.to_string(),
            attacker_armies,
            defender_armies: defender.armies,
            committed,
        };
        let previous_owner = defender.owner.clone();

        let battle = compare_dice(
            dice.roll(combat.committed),
            dice.roll(combat.defender_dice()),
            self.config.defender_wins_ties,
        );

        let ts = turn::stamp(state, now);
        let attacker_remaining = combat.attacker_armies - battle.attacker_losses;
        let defender_remaining = combat.defender_armies.saturating_sub(battle.defender_losses);
        if let Some(territory) = state.territories.get_mut(attacker_id) {
            territory.armies = attacker_remaining;
            territory.updated_at = ts;
        }

        let conquered = defender_remaining == 0;
        if let Some(territory) = state.territories.get_mut(defender_id) {
            territory.armies = defender_remaining;
            territory.updated_at = ts;
            if conquered {
                territory.owner = Some(actor.to_string());
            }
        }

        let mut outcome = ActionOutcome {
            attack: Some(AttackReport {
                attacker: combat.attacker.clone(),
                defender: combat.defender.clone(),
                attacker_dice: battle.attacker_dice,
                defender_dice: battle.defender_dice,
                attacker_losses: battle.attacker_losses,
                defender_losses: battle.defender_losses,
                conquered,
            }),
            ..ActionOutcome::default()
        };

        if conquered {
            let pending = combat.into_pending(attacker_remaining);
            state.pending_conquest = Some(pending.clone());

            if let Some(loser) = previous_owner {
                if turn::eliminate_if_defeated(state, &loser) {
                    outcome.eliminated.push(loser);
                }
            }

            if state.phase == Phase::Victory {
                // The game is over; settle the move-in without waiting.
                let transfer = pending
                    .committed
                    .min(pending.max_transfer)
                    .max(pending.min_transfer);
                settle_conquest(state, &pending, transfer, ts);
                outcome.winner = state.winner.clone();
            }
        }

        Ok(outcome)
    }

    fn complete_conquest(&self, state: &mut GameState, transfer: u32, now: u64) -> GameResult<()> {
        let pending = state
            .pending_conquest
            .clone()
            .ok_or(GameError::NoPendingConquest)?;
        if transfer < pending.min_transfer || transfer > pending.max_transfer {
            return Err(GameError::InvalidArmyCount(format!(
                "move between {} and {} armies into {}",
                pending.min_transfer, pending.max_transfer, pending.to
            )));
        }

        let ts = turn::stamp(state, now);
        settle_conquest(state, &pending, transfer, ts);
        Ok(())
    }

    fn fortify(
        &self,
        state: &mut GameState,
        actor: &str,
        source_id: &str,
        target_id: &str,
        count: u32,
        now: u64,
    ) -> GameResult<()> {
        if state.phase != Phase::Fortification {
            return Err(GameError::WrongPhase(state.phase.as_str()));
        }
        if self.config.single_fortification && state.fortified_this_turn {
            return Err(GameError::AlreadyFortified);
        }
        if source_id == target_id {
            return Err(GameError::SameTerritory);
        }
        let source_armies = owned_territory(state, actor, source_id)?.armies;
        owned_territory(state, actor, target_id)?;
        if count < 1 {
            return Err(GameError::InvalidArmyCount(
                "move at least one army".to_string(),
            ));
        }
        if count >= source_armies {
            return Err(GameError::InsufficientArmies(format!(
                "{} has {} armies and must keep one behind",
                source_id, source_armies
            )));
        }
        if !connected_through_owned(state, actor, source_id, target_id) {
            return Err(GameError::NoConnectedPath(
                source_id.to_string(),
                target_id.to_string(),
            ));
        }

        let ts = turn::stamp(state, now);
        if let Some(source) = state.territories.get_mut(source_id) {
            source.armies -= count;
            source.updated_at = ts;
        }
        if let Some(target) = state.territories.get_mut(target_id) {
            target.armies += count;
            target.updated_at = ts;
        }
        state.fortified_this_turn = true;
        Ok(())
    }

    /// Ends the current player's turn without any deploy, attack or
    /// fortify. Used when a disconnected player sits on the turn.
    ///
    /// A pending conquest is settled with the minimum move. Undeployed
    /// armies are placed one at a time on the player's territories in id
    /// order, so the army total is unchanged.
    pub fn force_end_turn(&self, state: &mut GameState, now: u64) -> GameResult<ActionOutcome> {
        if state.phase.is_terminal() {
            return Err(GameError::GameFinished);
        }
        let actor = state.current_player().cloned().ok_or(GameError::NotPlayersTurn)?;

        let ts = turn::stamp(state, now);
        if let Some(pending) = state.pending_conquest.clone() {
            settle_conquest(state, &pending, pending.min_transfer, ts);
        }

        let mut outcome = ActionOutcome::default();
        // Startup may hand the first real turn straight back to the same
        // player, so keep going until someone else holds it.
        for _ in 0..8 {
            if !state.is_current_player(&actor) || state.phase.is_terminal() {
                break;
            }
            place_undeployed(state, &actor, ts);
            if let Some(next) = turn::advance_phase(state, self.map, self.config, &actor)? {
                outcome.turn_start = Some(next);
            }
        }
        Ok(outcome)
    }
}

fn owned_territory<'s>(
    state: &'s GameState,
    actor: &str,
    territory_id: &str,
) -> GameResult<&'s shared::Territory> {
    let territory = state
        .territory(territory_id)
        .ok_or_else(|| GameError::TerritoryNotFound(territory_id.to_string()))?;
    if !territory.is_owned_by(actor) {
        return Err(GameError::NotOwner(territory_id.to_string()));
    }
    Ok(territory)
}

fn place_undeployed(state: &mut GameState, player_id: &str, ts: u64) {
    let remaining = state.remaining_to_deploy(player_id);
    let owned: Vec<TerritoryId> = state
        .territories_owned_by(player_id)
        .map(|t| t.id.clone())
        .collect();
    if remaining == 0 || owned.is_empty() {
        return;
    }

    for id in owned.iter().cycle().take(remaining as usize) {
        if let Some(territory) = state.territories.get_mut(id) {
            territory.armies += 1;
            territory.updated_at = ts;
        }
    }
    state.armies_to_deploy.insert(player_id.to_string(), 0);
}

fn settle_conquest(state: &mut GameState, pending: &PendingConquest, transfer: u32, ts: u64) {
    if let Some(from) = state.territories.get_mut(&pending.from) {
        from.armies -= transfer;
        from.updated_at = ts;
    }
    if let Some(to) = state.territories.get_mut(&pending.to) {
        to.armies = transfer;
        to.updated_at = ts;
    }
    state.pending_conquest = None;
}

/// Breadth-first search over territories held by `owner`.
pub fn connected_through_owned(state: &GameState, owner: &str, from: &str, to: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(from);
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            return true;
        }
        let Some(territory) = state.territory(current) else {
            continue;
        };
        for neighbor in &territory.neighbors {
            let owned = state
                .territory(neighbor)
                .map(|t| t.is_owned_by(owner))
                .unwrap_or(false);
            if owned && visited.insert(neighbor.as_str()) {
                queue.push_back(neighbor.as_str());
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::ScriptedDice;

    /// Two-player board: `a` holds North America, `b` everything else.
    /// Every territory starts with 3 armies and the game is in `phase`.
    fn board(phase: Phase) -> (GameState, MapTopology) {
        let map = MapTopology::classic();
        let mut state = GameState::new(&map, 1, 0);
        for territory in state.territories.values_mut() {
            let owner = if territory.continent == "north_america" { "a" } else { "b" };
            territory.owner = Some(owner.to_string());
            territory.armies = 3;
        }
        state.active_players = vec!["a".into(), "b".into()];
        state.phase = phase;
        state.turn_number = 1;
        (state, map)
    }

    fn set(state: &mut GameState, id: &str, owner: &str, armies: u32) {
        let t = state.territories.get_mut(id).unwrap();
        t.owner = Some(owner.to_string());
        t.armies = armies;
    }

    fn attack(from: &str, to: &str, n: u32) -> GameAction {
        GameAction::Attack {
            attacker: from.into(),
            defender: to.into(),
            committed_armies: n,
        }
    }

    #[test]
    fn test_turn_checked_before_phase() {
        let (mut state, map) = board(Phase::Reinforcement);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::default();

        // b is out of turn and also in the wrong phase; the turn error wins.
        let result = engine.apply(&mut state, "b", &attack("peru", "central_america", 1), &mut dice, 1);
        assert_eq!(result, Err(GameError::NotPlayersTurn));
    }

    #[test]
    fn test_deploy() {
        let (mut state, map) = board(Phase::Reinforcement);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::default();
        state.armies_to_deploy.insert("a".into(), 5);
        let before = state.total_armies();

        let deploy = GameAction::Deploy {
            territory: "alaska".into(),
            count: 4,
        };
        engine.apply(&mut state, "a", &deploy, &mut dice, 10).unwrap();

        assert_eq!(state.territory("alaska").unwrap().armies, 7);
        assert_eq!(state.remaining_to_deploy("a"), 1);
        assert_eq!(state.total_armies(), before);
        assert_eq!(state.version, 1);
        assert_eq!(state.territory("alaska").unwrap().updated_at, state.timestamp);
    }

    #[test]
    fn test_deploy_rejections() {
        let (mut state, map) = board(Phase::Reinforcement);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::default();
        state.armies_to_deploy.insert("a".into(), 2);
        let snapshot = state.clone();

        let deploy = |territory: &str, count: u32| GameAction::Deploy {
            territory: territory.into(),
            count,
        };

        assert!(matches!(
            engine.apply(&mut state, "a", &deploy("peru", 1), &mut dice, 1),
            Err(GameError::NotOwner(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &deploy("atlantis", 1), &mut dice, 1),
            Err(GameError::TerritoryNotFound(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &deploy("alaska", 3), &mut dice, 1),
            Err(GameError::InsufficientArmies(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &deploy("alaska", 0), &mut dice, 1),
            Err(GameError::InvalidArmyCount(_))
        ));
        assert_eq!(state, snapshot);

        state.phase = Phase::Attack;
        assert_eq!(
            engine.apply(&mut state, "a", &deploy("alaska", 1), &mut dice, 1),
            Err(GameError::WrongPhase("attack"))
        );
    }

    #[test]
    fn test_attack_conquest_and_completion_bounds() {
        let (mut state, map) = board(Phase::Attack);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        set(&mut state, "alaska", "a", 3);
        set(&mut state, "kamchatka", "b", 1);
        let mut dice = ScriptedDice::new([6, 4, 3]);
        let before = state.total_armies();

        let outcome = engine
            .apply(&mut state, "a", &attack("alaska", "kamchatka", 2), &mut dice, 5)
            .unwrap();

        let report = outcome.attack.unwrap();
        assert_eq!(report.attacker_dice, vec![6, 4]);
        assert_eq!(report.defender_dice, vec![3]);
        assert_eq!(report.defender_losses, 1);
        assert_eq!(report.attacker_losses, 0);
        assert!(report.conquered);
        assert_eq!(state.territory("kamchatka").unwrap().owner.as_deref(), Some("a"));
        assert_eq!(state.total_armies(), before - 1);

        let pending = state.pending_conquest.clone().unwrap();
        assert_eq!((pending.min_transfer, pending.max_transfer), (1, 2));

        // Anything else must wait for the move-in.
        assert_eq!(
            engine.apply(&mut state, "a", &GameAction::AdvancePhase, &mut dice, 6),
            Err(GameError::ConquestPending("kamchatka".into()))
        );
        assert!(matches!(
            engine.apply(
                &mut state,
                "a",
                &GameAction::CompleteConquest { transfer_count: 3 },
                &mut dice,
                6
            ),
            Err(GameError::InvalidArmyCount(_))
        ));

        engine
            .apply(
                &mut state,
                "a",
                &GameAction::CompleteConquest { transfer_count: 1 },
                &mut dice,
                7,
            )
            .unwrap();
        assert_eq!(state.territory("alaska").unwrap().armies, 2);
        assert_eq!(state.territory("kamchatka").unwrap().armies, 1);
        assert!(state.pending_conquest.is_none());
        assert_eq!(state.total_armies(), before - 1);
    }

    #[test]
    fn test_complete_conquest_without_attack() {
        let (mut state, map) = board(Phase::Attack);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::default();

        assert_eq!(
            engine.apply(
                &mut state,
                "a",
                &GameAction::CompleteConquest { transfer_count: 1 },
                &mut dice,
                1
            ),
            Err(GameError::NoPendingConquest)
        );
    }

    #[test]
    fn test_attack_defender_holds_on_tie() {
        let (mut state, map) = board(Phase::Attack);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::new([5, 2, 5, 3]);

        let outcome = engine
            .apply(&mut state, "a", &attack("alaska", "kamchatka", 2), &mut dice, 1)
            .unwrap();

        let report = outcome.attack.unwrap();
        assert_eq!(report.attacker_losses, 2);
        assert_eq!(report.defender_losses, 0);
        assert_eq!(state.territory("alaska").unwrap().armies, 1);
        assert_eq!(state.territory("kamchatka").unwrap().armies, 3);
    }

    #[test]
    fn test_attack_rejections() {
        let (mut state, map) = board(Phase::Attack);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::default();
        set(&mut state, "ontario", "a", 1);

        assert!(matches!(
            engine.apply(&mut state, "a", &attack("peru", "brazil", 1), &mut dice, 1),
            Err(GameError::NotOwner(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &attack("alaska", "alberta", 1), &mut dice, 1),
            Err(GameError::OwnTerritory(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &attack("alaska", "peru", 1), &mut dice, 1),
            Err(GameError::NotAdjacent(_, _))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &attack("greenland", "iceland", 3), &mut dice, 1),
            Err(GameError::InvalidArmyCount(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &attack("greenland", "iceland", 0), &mut dice, 1),
            Err(GameError::InvalidArmyCount(_))
        ));

        // ontario has a single army
        set(&mut state, "greenland", "b", 3);
        assert!(matches!(
            engine.apply(&mut state, "a", &attack("ontario", "greenland", 1), &mut dice, 1),
            Err(GameError::InsufficientArmies(_))
        ));
        assert_eq!(state.version, 0);
    }

    #[test]
    fn test_conquest_eliminates_and_wins() {
        let (mut state, map) = board(Phase::Attack);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        for territory in state.territories.values_mut() {
            territory.owner = Some("a".into());
        }
        set(&mut state, "alaska", "a", 4);
        set(&mut state, "kamchatka", "b", 1);
        let mut dice = ScriptedDice::new([6, 5, 4, 1]);

        let outcome = engine
            .apply(&mut state, "a", &attack("alaska", "kamchatka", 3), &mut dice, 1)
            .unwrap();

        assert_eq!(outcome.eliminated, vec!["b".to_string()]);
        assert_eq!(outcome.winner.as_deref(), Some("a"));
        assert_eq!(state.phase, Phase::Victory);
        assert_eq!(state.active_players, vec!["a".to_string()]);
        assert!(state.pending_conquest.is_none());
        assert_eq!(state.territory("kamchatka").unwrap().armies, 3);
        assert_eq!(state.territory("alaska").unwrap().armies, 1);

        assert_eq!(
            engine.apply(&mut state, "a", &GameAction::AdvancePhase, &mut dice, 2),
            Err(GameError::GameFinished)
        );
    }

    #[test]
    fn test_fortify_and_round_trip() {
        let (mut state, map) = board(Phase::Fortification);
        let config = RuleConfig {
            single_fortification: false,
            ..RuleConfig::default()
        };
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::default();
        let fortify = |s: &str, t: &str, n: u32| GameAction::Fortify {
            source: s.into(),
            target: t.into(),
            count: n,
        };

        // alaska -> alberta -> western_united_states -> central_america
        engine
            .apply(&mut state, "a", &fortify("alaska", "central_america", 2), &mut dice, 1)
            .unwrap();
        assert_eq!(state.territory("alaska").unwrap().armies, 1);
        assert_eq!(state.territory("central_america").unwrap().armies, 5);

        engine
            .apply(&mut state, "a", &fortify("central_america", "alaska", 2), &mut dice, 2)
            .unwrap();
        assert_eq!(state.territory("alaska").unwrap().armies, 3);
        assert_eq!(state.territory("central_america").unwrap().armies, 3);
    }

    #[test]
    fn test_fortify_rejections() {
        let (mut state, map) = board(Phase::Fortification);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        let mut dice = ScriptedDice::default();
        let fortify = |s: &str, t: &str, n: u32| GameAction::Fortify {
            source: s.into(),
            target: t.into(),
            count: n,
        };
        // Give a an island in Australia, cut off from North America.
        set(&mut state, "eastern_australia", "a", 2);

        assert!(matches!(
            engine.apply(&mut state, "a", &fortify("alaska", "alaska", 1), &mut dice, 1),
            Err(GameError::SameTerritory)
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &fortify("alaska", "peru", 1), &mut dice, 1),
            Err(GameError::NotOwner(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &fortify("alaska", "ontario", 3), &mut dice, 1),
            Err(GameError::InsufficientArmies(_))
        ));
        assert!(matches!(
            engine.apply(&mut state, "a", &fortify("alaska", "eastern_australia", 1), &mut dice, 1),
            Err(GameError::NoConnectedPath(_, _))
        ));

        engine
            .apply(&mut state, "a", &fortify("alaska", "ontario", 1), &mut dice, 1)
            .unwrap();
        assert_eq!(
            engine.apply(&mut state, "a", &fortify("quebec", "ontario", 1), &mut dice, 2),
            Err(GameError::AlreadyFortified)
        );
    }

    #[test]
    fn test_bfs_ignores_enemy_bridges() {
        let (mut state, _) = board(Phase::Fortification);
        // Cut North America in half at alberta/ontario/northwest_territory.
        set(&mut state, "alberta", "b", 1);
        set(&mut state, "ontario", "b", 1);
        set(&mut state, "northwest_territory", "b", 1);

        assert!(!connected_through_owned(&state, "a", "alaska", "quebec"));
        assert!(connected_through_owned(&state, "a", "quebec", "central_america"));
    }

    #[test]
    fn test_force_end_turn_places_armies_and_passes() {
        let (mut state, map) = board(Phase::Reinforcement);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        state.armies_to_deploy.insert("a".into(), 4);
        let on_board = |s: &GameState| -> u32 { s.territories_owned_by("a").map(|t| t.armies).sum() };
        let before = on_board(&state);

        let outcome = engine.force_end_turn(&mut state, 1).unwrap();

        assert!(state.is_current_player("b"));
        assert_eq!(state.phase, Phase::Reinforcement);
        assert_eq!(state.remaining_to_deploy("a"), 0);
        assert_eq!(on_board(&state), before + 4);
        assert_eq!(outcome.turn_start.unwrap().player_id, "b");
    }

    #[test]
    fn test_force_end_turn_settles_conquest() {
        let (mut state, map) = board(Phase::Attack);
        let config = RuleConfig::default();
        let engine = RulesEngine::new(&map, &config);
        set(&mut state, "kamchatka", "a", 0);
        state.pending_conquest = Some(PendingConquest {
            from: "alaska".into(),
            to: "kamchatka".into(),
            committed: 2,
            min_transfer: 1,
            max_transfer: 2,
        });

        engine.force_end_turn(&mut state, 1).unwrap();

        assert_eq!(state.territory("kamchatka").unwrap().armies, 1);
        assert_eq!(state.territory("alaska").unwrap().armies, 2);
        assert!(state.is_current_player("b"));
    }
}
