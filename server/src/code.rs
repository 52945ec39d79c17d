//! Human-shareable session codes.

use crate::error::{GameError, GameResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uppercase letters and digits without 0/O, 1/I/L.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;
pub const MAX_CODE_ATTEMPTS: usize = 100;

#[derive(Debug)]
pub struct CodeGenerator {
    rng: StdRng,
    alphabet: &'static [u8],
    length: usize,
    max_attempts: usize,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            alphabet: CODE_ALPHABET,
            length: CODE_LENGTH,
            max_attempts: MAX_CODE_ATTEMPTS,
        }
    }

    /// Shrinks the code space; lets tests reach exhaustion quickly.
    pub fn with_shape(mut self, alphabet: &'static [u8], length: usize, max_attempts: usize) -> Self {
        self.alphabet = alphabet;
        self.length = length;
        self.max_attempts = max_attempts;
        self
    }

    pub fn generate(&mut self) -> String {
        (0..self.length)
            .map(|_| {
                let index = self.rng.gen_range(0..self.alphabet.len());
                self.alphabet[index] as char
            })
            .collect()
    }

    /// Draws codes until `is_taken` rejects none, giving up after a
    /// bounded number of attempts.
    pub fn generate_unique<F>(&mut self, is_taken: F) -> GameResult<String>
    where
        F: Fn(&str) -> bool,
    {
        for _ in 0..self.max_attempts {
            let code = self.generate();
            if !is_taken(&code) {
                return Ok(code);
            }
        }
        Err(GameError::CodeSpaceExhausted(self.max_attempts))
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes user-typed codes: trims whitespace and uppercases.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
