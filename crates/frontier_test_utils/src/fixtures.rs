//! Test fixtures and helpers.
//!
//! Pre-built planners, agents and territory worlds
//! for consistent testing.

use fixed::types::I32F32;
use frontier_core::components::EntityId;
use frontier_core::data::{MovementConfig, TerritoryConfig};
use frontier_core::factions::FactionId;
use frontier_core::formation::{FormationRegistry, MovementFormationSelector};
use frontier_core::math::Vec3Fixed;
use frontier_core::movement::{MovementAgent, MovementComponent, MovementManager};
use frontier_core::spatial::ReservationGrid;
use frontier_core::terrain::TerrainGrid;
use frontier_core::territory::{BorderConfig, BorderId, BuildingEntity, TerritoryWorld};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Ground-level point from integer coordinates.
#[must_use]
pub fn point(x: i32, z: i32) -> Vec3Fixed {
    Vec3Fixed::flat(fixed(x), fixed(z))
}

/// Formation setup shared by the integration tests.
///
/// - `circle`: rings with spacing 1
/// - `line`: rows of 3 with spacing 1, falling back to `circle`
/// - `wide`: rows of 4 with a separate lateral spacing, no fallback
pub const STANDARD_MOVEMENT_RON: &str = r#"
MovementConfig(
    formations: [
        (
            code: "circle",
            float_properties: [(name: "spacing", value: "1")],
        ),
        (
            code: "line",
            float_properties: [(name: "spacing", value: "1")],
            int_properties: [(name: "amount_per_row", value: 3)],
        ),
        (
            code: "wide",
            float_properties: [
                (name: "spacing", value: "1"),
                (name: "horizontal_spacing", value: "2"),
            ],
            int_properties: [(name: "amount_per_row", value: 4)],
        ),
    ],
    handlers: [
        (formation: "circle", shape: Circular, max_empty_attempts: 3),
        (formation: "line", shape: Row, max_empty_attempts: 2, fallback: Some("circle")),
        (formation: "wide", shape: Row, max_empty_attempts: 2),
    ],
)
"#;

/// Border table shared by the integration tests.
pub const STANDARD_TERRITORY_RON: &str = r#"
TerritoryConfig(
    borders: [
        (
            code: "town_hall",
            size: "10",
            limits: [(codes: ["farm", "orchard"], max_amount: 2)],
        ),
        (code: "outpost", size: "5"),
    ],
)
"#;

/// Parsed [`STANDARD_MOVEMENT_RON`].
///
/// # Panics
///
/// Panics if the built-in document stops parsing.
#[must_use]
pub fn standard_movement_config() -> MovementConfig {
    MovementConfig::from_ron(STANDARD_MOVEMENT_RON).expect("standard movement config")
}

/// Parsed [`STANDARD_TERRITORY_RON`].
///
/// # Panics
///
/// Panics if the built-in document stops parsing.
#[must_use]
pub fn standard_territory_config() -> TerritoryConfig {
    TerritoryConfig::from_ron(STANDARD_TERRITORY_RON).expect("standard territory config")
}

/// Registry built from [`STANDARD_MOVEMENT_RON`].
///
/// # Panics
///
/// Panics if the built-in document fails validation.
#[must_use]
pub fn standard_registry() -> FormationRegistry {
    standard_movement_config()
        .build_registry()
        .expect("standard registry")
}

/// Flat open terrain, 64x64 cells of size 1 centred on the origin.
#[must_use]
pub fn open_terrain() -> TerrainGrid {
    TerrainGrid::centered(64, fixed(1))
}

/// Planner over [`open_terrain`] with an empty reservation grid.
#[must_use]
pub fn open_manager() -> MovementManager {
    manager_on(open_terrain())
}

/// Planner over `terrain`, which doubles as the navigation oracle.
#[must_use]
pub fn manager_on(terrain: TerrainGrid) -> MovementManager {
    MovementManager::new(
        standard_registry(),
        Box::new(terrain.clone()),
        Box::new(terrain),
        ReservationGrid::centered(16, fixed(4)),
    )
}

/// Agent of radius 1 using `formation`.
#[must_use]
pub fn agent(id: EntityId, code: &str, position: Vec3Fixed, formation: &str) -> MovementAgent {
    MovementAgent::new(
        id,
        code,
        position,
        fixed(1),
        MovementComponent::new(MovementFormationSelector::new(formation)),
    )
}

/// `count` agents with ids from `first_id`, spread along x at depth `z`.
#[must_use]
pub fn agent_row(
    first_id: EntityId,
    count: u32,
    code: &str,
    z: i32,
    formation: &str,
) -> Vec<MovementAgent> {
    (0..count)
        .map(|i| {
            let x = i32::try_from(i).unwrap_or(i32::MAX);
            agent(first_id + EntityId::from(i), code, point(x, z), formation)
        })
        .collect()
}

/// World with one building per entry, each owning an active border.
///
/// Entries are `(building id, faction slot, position, border size)`;
/// borders activate in the given order.
///
/// # Panics
///
/// Panics if two entries share a building id.
#[must_use]
pub fn border_world(owners: &[(EntityId, u8, Vec3Fixed, i32)]) -> (TerritoryWorld, Vec<BorderId>) {
    let mut world = TerritoryWorld::new();
    let mut ids = Vec::with_capacity(owners.len());
    for &(building, faction, position, size) in owners {
        world
            .place_building(BuildingEntity::new(
                building,
                "town_hall",
                FactionId::new(faction),
                position,
            ))
            .expect("place owner");
        let border = world
            .activate_border(building, &BorderConfig::new(fixed(size)))
            .expect("activate border");
        ids.push(border);
    }
    (world, ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_configs_validate() {
        assert!(standard_movement_config().validate().is_empty());
        assert!(standard_territory_config().validate().is_empty());
        let registry = standard_registry();
        let formations: Vec<&str> = registry.formations().collect();
        assert_eq!(formations, vec!["circle", "line", "wide"]);
    }

    #[test]
    fn test_border_world_orders_borders() {
        let (world, ids) = border_world(&[(1, 0, point(0, 0), 5), (2, 1, point(20, 0), 5)]);
        assert_eq!(ids.len(), 2);
        let first = world.border(ids[0]).expect("first").sorting_order();
        let second = world.border(ids[1]).expect("second").sorting_order();
        assert!(first > second);
    }
}
