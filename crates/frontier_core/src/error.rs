//! Error types for the formation and territory core.
//!
//! [`GameError`] covers configuration and bookkeeping failures. The
//! domain kinds ([`MovementError`], [`PlacementError`], [`TerritoryError`])
//! are small `Copy` enums returned for expected conditions; none of them
//! is ever raised as a panic.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for configuration and state errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the document that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Config parsed but failed validation.
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}

/// Outcome kinds of movement planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MovementError {
    /// A required reference (agent, target, formation type) is missing or unregistered.
    #[error("invalid or unregistered movement reference")]
    Invalid,

    /// The agent's movement is disabled or locked for player commands.
    #[error("movement is disabled for this agent")]
    Disabled,

    /// The formation search ended without a single valid candidate.
    #[error("no valid target position found")]
    TargetPositionNotFound,

    /// No navigable point exists around the candidate.
    #[error("target position is not navigable")]
    NavigationOccupied,

    /// The candidate overlaps an obstacle or another agent's reserved destination.
    #[error("target position is reserved by an obstacle")]
    ReservedByObstacle,

    /// The search left the playable map; stops the whole formation search.
    #[error("search left the playable map")]
    OutOfSearchBounds,
}

impl MovementError {
    /// Whether this error must abort the whole formation generation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::OutOfSearchBounds)
    }
}

/// Reasons a building placement attempt is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum PlacementError {
    /// Part of the footprint is not over permitted terrain.
    #[error("building is not fully on the map")]
    OffMap,

    /// The building is outside any usable territory, or inside a
    /// higher-precedence hostile territory.
    #[error("building is outside a valid border")]
    OutsideBorder,

    /// The footprint overlaps other entities.
    #[error("building overlaps {0} other entities")]
    Colliding(u32),

    /// The creation task has not been unlocked for the placing faction.
    #[error("building type is locked for this faction")]
    FactionLocked,

    /// The placing faction cannot pay for the creation task.
    #[error("missing resources for the creation task")]
    TaskMissingResourceRequirements,

    /// The placement attempt is no longer active.
    #[error("placement is no longer in progress")]
    NotPlacing,
}

/// Territory bookkeeping failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum TerritoryError {
    /// No border with this id exists.
    #[error("unknown border {0}")]
    UnknownBorder(u32),

    /// No tracked resource or building with this id exists.
    #[error("unknown entity {0}")]
    UnknownEntity(u64),

    /// The border is not active.
    #[error("border {0} is not active")]
    BorderNotActive(u32),

    /// Borders activate once; a disabled border is discarded.
    #[error("border {0} was already activated")]
    AlreadyActivated(u32),

    /// The entity is already tracked by the border.
    #[error("entity is already tracked by this border")]
    AlreadyTracked,

    /// The entity lies outside the border.
    #[error("entity is outside the border")]
    OutOfRange,

    /// The entity belongs to another faction.
    #[error("entity belongs to another faction")]
    FactionMismatch,

    /// The building is assigned to a different border.
    #[error("building is assigned to another border")]
    CenterMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_search_bounds_is_terminal() {
        assert!(MovementError::OutOfSearchBounds.is_terminal());
        assert!(!MovementError::ReservedByObstacle.is_terminal());
        assert!(!MovementError::NavigationOccupied.is_terminal());
    }

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = GameError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }
}
