//! Entity identifiers and position lookup.
//!
//! The planner never owns entities. It refers to them by [`EntityId`] and
//! reads their current position through [`PositionLookup`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::Vec3Fixed;

/// Unique identifier for entities.
pub type EntityId = u64;

/// Read access to the current position of entities.
pub trait PositionLookup {
    /// Current world position of `entity`, or `None` if it no longer exists.
    fn position(&self, entity: EntityId) -> Option<Vec3Fixed>;
}

/// Map-backed [`PositionLookup`], used by headless tools and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPositions {
    positions: BTreeMap<EntityId, Vec3Fixed>,
}

impl EntityPositions {
    /// Create an empty position table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move an entity.
    pub fn set(&mut self, entity: EntityId, position: Vec3Fixed) {
        self.positions.insert(entity, position);
    }

    /// Forget an entity.
    pub fn remove(&mut self, entity: EntityId) -> Option<Vec3Fixed> {
        self.positions.remove(&entity)
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no entity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl PositionLookup for EntityPositions {
    fn position(&self, entity: EntityId) -> Option<Vec3Fixed> {
        self.positions.get(&entity).copied()
    }
}
