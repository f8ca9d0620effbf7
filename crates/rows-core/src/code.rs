//! Room codes and their generator.
//!
//! Codes are [`CODE_LENGTH`] characters drawn from [`CODE_ALPHABET`], which
//! leaves out `I`, `O`, `0` and `1` so codes can be read aloud and typed.

use std::fmt;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Characters a generated code may contain.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Length of a generated code.
pub const CODE_LENGTH: usize = 6;
/// Longest user-supplied code accepted by [`RoomCode::parse`].
const MAX_INPUT_LENGTH: usize = 32;

/// Human-typeable room identifier, always upper case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalize user input into a code.
    ///
    /// Trims whitespace and upper-cases. Returns `None` for empty or
    /// oversized input.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_INPUT_LENGTH {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of fresh room codes.
///
/// Holds one generator seeded once at construction and shared behind a lock.
pub struct CodeGenerator {
    rng: Mutex<StdRng>,
}

impl CodeGenerator {
    /// Generator seeded from the OS.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic generator for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draw one code. May collide with a live room; see [`Self::generate_unique`].
    pub fn generate(&self) -> RoomCode {
        let mut rng = self.rng.lock();
        let code: String = (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect();
        RoomCode(code)
    }

    /// Draw codes until `taken` rejects none of them.
    pub fn generate_unique(&self, taken: impl Fn(&RoomCode) -> bool) -> RoomCode {
        loop {
            let code = self.generate();
            if !taken(&code) {
                return code;
            }
            tracing::debug!(room_code = %code, "room code collision, regenerating");
        }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
