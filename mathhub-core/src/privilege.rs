use std::fmt;

use serde::{Deserialize, Serialize};

/// Privilege level attached to an authenticated caller.
///
/// Higher levels unlock more operations; a route states the minimum level it
/// accepts and any caller at or above it is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivilegeLevel(pub u32);

impl PrivilegeLevel {
    /// Browsing, reading and answering quests.
    pub const READER: Self = Self(1);
    /// Publishing new quests.
    pub const PUBLISHER: Self = Self(100);

    /// Creates a `PrivilegeLevel` from a raw level.
    #[must_use]
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    /// Returns the raw level.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether a caller at this level may use a route requiring `required`.
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self >= required
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
