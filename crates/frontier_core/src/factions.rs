//! Faction identifiers and diplomatic relations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Unique identifier for factions (player slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactionId(pub u8);

impl FactionId {
    /// Create a new faction id.
    #[must_use]
    pub const fn new(slot: u8) -> Self {
        Self(slot)
    }
}

/// Alliance table between factions.
///
/// A faction is always friendly to itself. Alliances are symmetric and
/// stored as ordered pairs so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionRelations {
    alliances: BTreeSet<(FactionId, FactionId)>,
}

impl FactionRelations {
    /// Create an empty relation table (everyone hostile to everyone else).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: FactionId, b: FactionId) -> (FactionId, FactionId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Declare two factions allied.
    pub fn ally(&mut self, a: FactionId, b: FactionId) {
        if a != b {
            self.alliances.insert(Self::key(a, b));
        }
    }

    /// Break an alliance.
    pub fn break_alliance(&mut self, a: FactionId, b: FactionId) {
        self.alliances.remove(&Self::key(a, b));
    }

    /// Check whether two factions are friendly.
    #[must_use]
    pub fn is_friendly(&self, a: FactionId, b: FactionId) -> bool {
        a == b || self.alliances.contains(&Self::key(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faction_is_friendly_to_itself() {
        let relations = FactionRelations::new();
        assert!(relations.is_friendly(FactionId(1), FactionId(1)));
        assert!(!relations.is_friendly(FactionId(1), FactionId(2)));
    }

    #[test]
    fn test_alliances_are_symmetric() {
        let mut relations = FactionRelations::new();
        relations.ally(FactionId(3), FactionId(1));
        assert!(relations.is_friendly(FactionId(1), FactionId(3)));
        assert!(relations.is_friendly(FactionId(3), FactionId(1)));

        relations.break_alliance(FactionId(1), FactionId(3));
        assert!(!relations.is_friendly(FactionId(3), FactionId(1)));
    }
}
