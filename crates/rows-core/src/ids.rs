//! Client identity newtype.
//!
//! Every connection gets a [`ClientId`] (UUID v7, time-ordered). The bot
//! occupies a seat under the fixed [`ClientId::bot`] identity, which never
//! collides with a generated one.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity string of the synthetic bot player.
pub const BOT_IDENTITY: &str = "bot";

/// Stable identity of a player slot occupant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Create a new random ID (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The synthetic identity used for the bot seat.
    #[must_use]
    pub fn bot() -> Self {
        Self(BOT_IDENTITY.to_owned())
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the bot identity.
    pub fn is_bot(&self) -> bool {
        self.0 == BOT_IDENTITY
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
