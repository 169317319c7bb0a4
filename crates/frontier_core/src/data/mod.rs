//! Data structures for movement and territory configuration.
//!
//! Pure data types deserialized from RON documents, each with a
//! `validate()` pass that collects every problem instead of stopping at the
//! first one.
//!
//! **Note:** This module contains no file IO. Reading files from disk is
//! handled by `frontier_tools`.

mod border_data;
mod formation_data;

pub use border_data::{BorderData, CapacityLimitData, PlacementData, TerritoryConfig};
pub use formation_data::{
    FloatPropertyData, FormationHandlerData, FormationShape, FormationTypeData, IntPropertyData,
    MovementConfig,
};
