//! Dice rolling and battle comparison.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

pub const DIE_FACES: u8 = 6;
pub const MAX_ATTACK_DICE: u32 = 3;
pub const MAX_DEFENSE_DICE: u32 = 2;

/// Source of die faces for combat.
pub trait DiceRoller: Send + Sync {
    /// Rolls `count` dice, each in `1..=6`, in roll order.
    fn roll(&mut self, count: u32) -> Vec<u8>;
}

/// Uniform dice backed by the standard RNG.
#[derive(Debug)]
pub struct RandomDice {
    rng: StdRng,
}

impl RandomDice {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDice {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceRoller for RandomDice {
    fn roll(&mut self, count: u32) -> Vec<u8> {
        (0..count)
            .map(|_| self.rng.gen_range(1..=DIE_FACES))
            .collect()
    }
}

/// Replays a fixed sequence of faces; used by tests and replays.
#[derive(Debug, Default)]
pub struct ScriptedDice {
    faces: VecDeque<u8>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u8>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
        }
    }

    pub fn push(&mut self, faces: impl IntoIterator<Item = u8>) {
        self.faces.extend(faces);
    }
}

impl DiceRoller for ScriptedDice {
    fn roll(&mut self, count: u32) -> Vec<u8> {
        // An exhausted script rolls ones rather than stalling the game.
        (0..count)
            .map(|_| self.faces.pop_front().unwrap_or(1))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleOutcome {
    pub attacker_dice: Vec<u8>,
    pub defender_dice: Vec<u8>,
    pub attacker_losses: u32,
    pub defender_losses: u32,
}

/// Sorts both hands descending and compares them pairwise.
///
/// The lower die of each pair costs its side one army. On equal faces the
/// defender wins when `defender_wins_ties` is set.
pub fn compare_dice(
    mut attacker_dice: Vec<u8>,
    mut defender_dice: Vec<u8>,
    defender_wins_ties: bool,
) -> BattleOutcome {
    attacker_dice.sort_unstable_by(|a, b| b.cmp(a));
    defender_dice.sort_unstable_by(|a, b| b.cmp(a));

    let mut attacker_losses = 0;
    let mut defender_losses = 0;

    for (a, d) in attacker_dice.iter().zip(defender_dice.iter()) {
        let attacker_wins = if defender_wins_ties { a > d } else { a >= d };
        if attacker_wins {
            defender_losses += 1;
        } else {
            attacker_losses += 1;
        }
    }

    BattleOutcome {
        attacker_dice,
        defender_dice,
        attacker_losses,
        defender_losses,
    }
}
