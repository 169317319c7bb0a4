//! # Frontier Core
//!
//! Deterministic formation movement and territory logic.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Given the same inputs, every planner and every border produces the same
//! results on every machine, so the crate can run inside a lockstep
//! simulation or a replay.
//!
//! ## Crate Structure
//!
//! - [`formation`] - Formation types, handlers and the fallback dispatch loop
//! - [`movement`] - Single and group path-destination planning
//! - [`territory`] - Territory borders and their resource/building bookkeeping
//! - [`placement`] - Building placement validation
//! - [`events`] - Territory event bus
//! - [`spatial`] / [`terrain`] - Collaborator seams and grid implementations
//! - [`data`] - RON configuration
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod components;
pub mod data;
pub mod error;
pub mod events;
pub mod factions;
pub mod formation;
pub mod math;
pub mod movement;
pub mod placement;
pub mod spatial;
pub mod terrain;
pub mod territory;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::{EntityId, EntityPositions, PositionLookup};
    pub use crate::data::{MovementConfig, TerritoryConfig};
    pub use crate::error::{GameError, MovementError, PlacementError, Result, TerritoryError};
    pub use crate::events::{EventBus, EventTopic, TerritoryEvent};
    pub use crate::factions::{FactionId, FactionRelations};
    pub use crate::formation::{
        FormationEnv, FormationHandler, FormationRegistry, MovementFormationSelector,
        MovementFormationType, PathDestinationInput,
    };
    pub use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
    pub use crate::movement::{
        GroupPlan, MovementAgent, MovementComponent, MovementManager, MovementProfile,
        MovementSource, MovementSourceFlags, TargetData,
    };
    pub use crate::placement::{BuildingPlacementState, PlacementRules};
    pub use crate::spatial::{NavigationOracle, ReservationGrid, SpatialQuery};
    pub use crate::terrain::{AreaMask, TerrainAreaId, TerrainGrid, TerrainSampler};
    pub use crate::territory::{
        BorderConfig, BorderId, BuildingEntity, ResourceEntity, TerritoryBorder, TerritoryWorld,
    };
}
