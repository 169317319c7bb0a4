//! Building placement validation.
//!
//! A placement is legal when the footprint sits on permitted terrain, the
//! building is inside a usable border of its faction (or outside borders
//! are allowed), no older hostile border claims the spot, nothing overlaps
//! the footprint, and the faction can start the creation task.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::error::PlacementError;
use crate::factions::FactionId;
use crate::math::{fixed_serde, Fixed, Vec2Fixed, Vec3Fixed};
use crate::territory::{BorderId, BuildingEntity, TerritoryWorld};
use crate::terrain::{AreaMask, TerrainSampler};

// ============================================================================
// Footprints
// ============================================================================

/// Axis-aligned rectangle on the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    /// Centre of the rectangle.
    pub center: Vec3Fixed,
    /// Half extents along x and z.
    pub half_extents: Vec2Fixed,
}

impl Footprint {
    /// Create a footprint.
    #[must_use]
    pub const fn new(center: Vec3Fixed, half_extents: Vec2Fixed) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    /// The four corners, at the centre's height.
    #[must_use]
    pub fn corners(&self) -> [Vec3Fixed; 4] {
        let (hx, hz) = (self.half_extents.x, self.half_extents.y);
        let c = self.center;
        [
            Vec3Fixed::new(c.x - hx, c.y, c.z - hz),
            Vec3Fixed::new(c.x + hx, c.y, c.z - hz),
            Vec3Fixed::new(c.x - hx, c.y, c.z + hz),
            Vec3Fixed::new(c.x + hx, c.y, c.z + hz),
        ]
    }

    /// Whether two footprints overlap. Touching edges do not count.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let dx = (self.center.x - other.center.x).abs();
        let dz = (self.center.z - other.center.z).abs();
        dx < self.half_extents.x + other.half_extents.x
            && dz < self.half_extents.y + other.half_extents.y
    }
}

/// Check that a footprint rests on permitted terrain.
///
/// Casts one ray down from above the centre and one from above each
/// corner; every ray must hit an allowed area within `max_distance`.
#[must_use]
pub fn is_building_on_map(
    terrain: &dyn TerrainSampler,
    center: Vec3Fixed,
    half_extents: Vec2Fixed,
    allowed_areas: AreaMask,
    ray_height: Fixed,
    max_distance: Fixed,
) -> bool {
    let footprint = Footprint::new(center, half_extents);
    std::iter::once(center)
        .chain(footprint.corners())
        .all(|point| {
            let origin = point.with_y(center.y + ray_height);
            terrain
                .raycast_down(origin, max_distance)
                .is_some_and(|hit| allowed_areas.contains(hit.area))
        })
}

// ============================================================================
// Border Precedence
// ============================================================================

impl TerritoryWorld {
    /// Check (and update) the border a building is placed in.
    ///
    /// Keeps the building's current border while it still contains the
    /// building and allows its code, otherwise picks the highest-ranked
    /// active border of the building's faction that does. Unless
    /// `allow_outside` is set, any active hostile border containing the
    /// position that ranks strictly above the building's own border rejects
    /// the placement; a building without a border ranks lowest.
    pub fn is_building_in_border(&self, building: &mut BuildingEntity, allow_outside: bool) -> bool {
        let position = building.position;
        let usable = |id: BorderId| {
            self.border(id).is_some_and(|border| {
                border.is_active()
                    && border.faction() == building.faction
                    && border.contains(position)
                    && border.is_building_allowed(&building.code)
            })
        };

        let mut in_range = building.center.is_some_and(usable);
        if !in_range {
            let mut candidates: Vec<_> = self
                .borders()
                .filter(|border| border.faction() == building.faction)
                .collect();
            candidates.sort_by(|a, b| b.sorting_order().cmp(&a.sorting_order()));
            let found = candidates
                .into_iter()
                .map(|border| border.id())
                .find(|&id| usable(id));
            building.center = found;
            in_range = found.is_some();
        }

        if !allow_outside {
            let own_order = building
                .center
                .and_then(|id| self.border(id))
                .map_or(i64::MIN, |border| border.sorting_order());
            let claimed = self.borders().any(|border| {
                border.is_active()
                    && Some(border.id()) != building.center
                    && !self.relations().is_friendly(border.faction(), building.faction)
                    && border.contains(position)
                    && border.sorting_order() > own_order
            });
            if claimed {
                return false;
            }
        }

        in_range || allow_outside
    }
}

// ============================================================================
// Placement State
// ============================================================================

/// Resource cost of a creation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// Resource code.
    pub resource: String,
    /// Amount needed.
    pub amount: u32,
}

/// The task that creates the building once placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationTask {
    /// Building code created by the task.
    pub code: String,
    /// Cost of starting the task.
    pub requirements: Vec<ResourceRequirement>,
}

impl CreationTask {
    /// Free task for `code`.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            requirements: Vec::new(),
        }
    }

    /// Add a resource cost.
    #[must_use]
    pub fn with_requirement(mut self, resource: impl Into<String>, amount: u32) -> Self {
        self.requirements.push(ResourceRequirement {
            resource: resource.into(),
            amount,
        });
        self
    }
}

/// Faction-side gate on creation tasks.
pub trait FactionLedger {
    /// Whether `faction` has unlocked `task`.
    fn is_task_unlocked(&self, faction: FactionId, task: &CreationTask) -> bool;

    /// Whether `faction` holds every requirement of `task`.
    fn has_resources(&self, faction: FactionId, task: &CreationTask) -> bool;
}

/// Map-backed [`FactionLedger`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionStockpile {
    stock: BTreeMap<(FactionId, String), u32>,
    locked: BTreeMap<FactionId, Vec<String>>,
}

impl FactionStockpile {
    /// Empty stockpile with every task unlocked.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the amount of a resource held by a faction.
    pub fn set(&mut self, faction: FactionId, resource: impl Into<String>, amount: u32) {
        self.stock.insert((faction, resource.into()), amount);
    }

    /// Amount of a resource held by a faction.
    #[must_use]
    pub fn amount(&self, faction: FactionId, resource: &str) -> u32 {
        self.stock
            .get(&(faction, resource.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Lock a building code for a faction.
    pub fn lock(&mut self, faction: FactionId, code: impl Into<String>) {
        self.locked.entry(faction).or_default().push(code.into());
    }
}

impl FactionLedger for FactionStockpile {
    fn is_task_unlocked(&self, faction: FactionId, task: &CreationTask) -> bool {
        self.locked
            .get(&faction)
            .map_or(true, |codes| !codes.contains(&task.code))
    }

    fn has_resources(&self, faction: FactionId, task: &CreationTask) -> bool {
        task.requirements
            .iter()
            .all(|req| self.amount(faction, &req.resource) >= req.amount)
    }
}

/// Terrain and border rules of a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRules {
    /// Terrain areas the footprint may rest on.
    pub allowed_areas: AreaMask,
    /// Height above the building the map rays start from.
    #[serde(with = "fixed_serde")]
    pub ray_height: Fixed,
    /// Maximum length of a map ray.
    #[serde(with = "fixed_serde")]
    pub max_ray_distance: Fixed,
    /// Accept positions outside every friendly border.
    pub allow_outside_border: bool,
}

impl Default for PlacementRules {
    fn default() -> Self {
        Self {
            allowed_areas: AreaMask::ALL,
            ray_height: Fixed::from_num(10),
            max_ray_distance: Fixed::from_num(20),
            allow_outside_border: false,
        }
    }
}

/// Phase of a placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementPhase {
    /// Following the cursor.
    Placing,
    /// Finalized into the world.
    Placed,
    /// Abandoned.
    Cancelled,
}

/// State of a single building placement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildingPlacementState {
    instance: BuildingEntity,
    creation_task: CreationTask,
    rules: PlacementRules,
    can_place: bool,
    overlap_count: u32,
    phase: PlacementPhase,
}

impl BuildingPlacementState {
    /// Start placing `instance` for `creation_task`.
    #[must_use]
    pub fn new(instance: BuildingEntity, creation_task: CreationTask, rules: PlacementRules) -> Self {
        Self {
            instance,
            creation_task,
            rules,
            can_place: false,
            overlap_count: 0,
            phase: PlacementPhase::Placing,
        }
    }

    /// The building being placed.
    #[must_use]
    pub fn instance(&self) -> &BuildingEntity {
        &self.instance
    }

    /// The task started on success.
    #[must_use]
    pub fn creation_task(&self) -> &CreationTask {
        &self.creation_task
    }

    /// Result of the last [`Self::update`].
    #[must_use]
    pub fn can_place(&self) -> bool {
        self.can_place
    }

    /// Entities overlapping the footprint at the last refresh.
    #[must_use]
    pub fn overlap_count(&self) -> u32 {
        self.overlap_count
    }

    /// Border the instance is currently assigned to.
    #[must_use]
    pub fn assigned_border(&self) -> Option<BorderId> {
        self.instance.center
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> PlacementPhase {
        self.phase
    }

    fn ensure_placing(&self) -> Result<(), PlacementError> {
        if self.phase == PlacementPhase::Placing {
            Ok(())
        } else {
            Err(PlacementError::NotPlacing)
        }
    }

    /// Move the instance.
    pub fn move_to(&mut self, position: Vec3Fixed) -> Result<(), PlacementError> {
        self.ensure_placing()?;
        self.instance.position = position;
        self.can_place = false;
        Ok(())
    }

    /// Recount the tracked buildings and resources overlapping the footprint.
    pub fn refresh_overlaps(&mut self, world: &TerritoryWorld) -> u32 {
        let footprint = Footprint::new(self.instance.position, self.instance.half_extents);
        let own_id = self.instance.id;
        let buildings = world
            .buildings()
            .filter(|b| b.alive && b.id != own_id)
            .filter(|b| footprint.overlaps(&Footprint::new(b.position, b.half_extents)))
            .count();
        let resources = world
            .resources()
            .filter(|r| r.alive)
            .filter(|r| footprint.overlaps(&Footprint::new(r.position, r.half_extents)))
            .count();
        self.overlap_count = u32::try_from(buildings + resources).unwrap_or(u32::MAX);
        self.overlap_count
    }

    /// Re-evaluate the map, border and overlap checks.
    pub fn update(&mut self, world: &TerritoryWorld, terrain: &dyn TerrainSampler) -> bool {
        if self.phase != PlacementPhase::Placing {
            self.can_place = false;
            return false;
        }
        self.refresh_overlaps(world);
        self.can_place = self.check_location(world, terrain).is_ok();
        self.can_place
    }

    fn check_location(
        &mut self,
        world: &TerritoryWorld,
        terrain: &dyn TerrainSampler,
    ) -> Result<(), PlacementError> {
        let rules = self.rules;
        if !is_building_on_map(
            terrain,
            self.instance.position,
            self.instance.half_extents,
            rules.allowed_areas,
            rules.ray_height,
            rules.max_ray_distance,
        ) {
            return Err(PlacementError::OffMap);
        }
        if !world.is_building_in_border(&mut self.instance, rules.allow_outside_border) {
            return Err(PlacementError::OutsideBorder);
        }
        if self.overlap_count > 0 {
            return Err(PlacementError::Colliding(self.overlap_count));
        }
        Ok(())
    }

    /// Validate everything and place the building into the world.
    ///
    /// # Errors
    ///
    /// The first failing check, or [`PlacementError::NotPlacing`] if the
    /// attempt already ended.
    pub fn finalize(
        &mut self,
        world: &mut TerritoryWorld,
        terrain: &dyn TerrainSampler,
        ledger: &dyn FactionLedger,
    ) -> Result<EntityId, PlacementError> {
        self.ensure_placing()?;
        self.refresh_overlaps(world);
        let checked = self.check_location(world, terrain);
        self.can_place = checked.is_ok();
        checked?;

        let faction = self.instance.faction;
        if !ledger.is_task_unlocked(faction, &self.creation_task) {
            return Err(PlacementError::FactionLocked);
        }
        if !ledger.has_resources(faction, &self.creation_task) {
            return Err(PlacementError::TaskMissingResourceRequirements);
        }

        let id = self.instance.id;
        if let Err(err) = world.place_building(self.instance.clone()) {
            tracing::error!(building = id, ?err, "Placed building id is already in use");
            return Err(PlacementError::NotPlacing);
        }
        self.phase = PlacementPhase::Placed;
        tracing::debug!(
            building = id,
            code = %self.instance.code,
            border = ?self.instance.center.map(|b| b.0),
            "Building placed"
        );
        Ok(id)
    }

    /// Abandon the attempt.
    pub fn cancel(&mut self) -> Result<(), PlacementError> {
        self.ensure_placing()?;
        self.phase = PlacementPhase::Cancelled;
        self.can_place = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{TerrainAreaId, TerrainGrid};
    use crate::territory::BorderConfig;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn point(x: i32, z: i32) -> Vec3Fixed {
        Vec3Fixed::flat(fixed(x), fixed(z))
    }

    fn half(n: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(n), fixed(n))
    }

    fn world_with_border(faction: u8, at: Vec3Fixed) -> (TerritoryWorld, BorderId) {
        let mut world = TerritoryWorld::new();
        world
            .place_building(BuildingEntity::new(100, "hq", FactionId(faction), at))
            .expect("place");
        let border = world
            .activate_border(100, &BorderConfig::new(fixed(10)))
            .expect("activate");
        (world, border)
    }

    #[test]
    fn test_footprint_overlap() {
        let a = Footprint::new(point(0, 0), half(1));
        assert!(a.overlaps(&Footprint::new(point(1, 1), half(1))));
        assert!(!a.overlaps(&Footprint::new(point(2, 0), half(1))));
    }

    #[test]
    fn test_on_map_requires_every_ray() {
        let mut terrain = TerrainGrid::centered(32, fixed(1));
        let center = point(0, 0);
        assert!(is_building_on_map(&terrain, center, half(2), AreaMask::ALL, fixed(5), fixed(10)));

        // Knock out the surface of the cell under one corner.
        let hole = Vec3Fixed::flat(Fixed::from_num(2.5), Fixed::from_num(2.5));
        terrain.edit_disc(hole, Fixed::from_num(0.25), |cell| cell.area = None);
        assert!(!is_building_on_map(&terrain, center, half(2), AreaMask::ALL, fixed(5), fixed(10)));
        assert!(is_building_on_map(&terrain, center, half(1), AreaMask::ALL, fixed(5), fixed(10)));
    }

    #[test]
    fn test_on_map_checks_area_and_distance() {
        let terrain = TerrainGrid::centered(32, fixed(1));
        let water = AreaMask::of(TerrainAreaId(3));
        assert!(!is_building_on_map(&terrain, point(0, 0), half(1), water, fixed(5), fixed(10)));
        assert!(!is_building_on_map(&terrain, point(0, 0), half(1), AreaMask::ALL, fixed(15), fixed(10)));
    }

    #[test]
    fn test_assigns_friendly_border() {
        let (world, border) = world_with_border(1, point(0, 0));
        let mut farm = BuildingEntity::new(1, "farm", FactionId(1), point(3, 0));
        assert!(world.is_building_in_border(&mut farm, false));
        assert_eq!(farm.center, Some(border));

        let mut far = BuildingEntity::new(2, "farm", FactionId(1), point(30, 0));
        assert!(!world.is_building_in_border(&mut far, false));
        assert!(world.is_building_in_border(&mut far, true));
        assert_eq!(far.center, None);
    }

    #[test]
    fn test_hostile_border_rejects_unassigned_building() {
        let (world, _) = world_with_border(2, point(0, 0));
        let mut outpost = BuildingEntity::new(1, "outpost", FactionId(1), point(3, 0));
        assert!(!world.is_building_in_border(&mut outpost, false));
        assert!(world.is_building_in_border(&mut outpost, true));
    }

    #[test]
    fn test_allied_border_does_not_reject() {
        let (mut world, _) = world_with_border(2, point(0, 0));
        world.relations_mut().ally(FactionId(1), FactionId(2));
        let mut outpost = BuildingEntity::new(1, "outpost", FactionId(1), point(3, 0));
        // Not in a border of its own, but not claimed by a hostile one either.
        assert!(!world.is_building_in_border(&mut outpost, false));
        assert!(world.is_building_in_border(&mut outpost, true));
    }

    #[test]
    fn test_placement_lifecycle() {
        let (mut world, border) = world_with_border(1, point(0, 0));
        let terrain = TerrainGrid::centered(64, fixed(1));
        let mut stock = FactionStockpile::new();
        stock.set(FactionId(1), "wood", 50);

        let mut placement = BuildingPlacementState::new(
            BuildingEntity::new(1, "farm", FactionId(1), point(0, 0)).with_half_extents(half(1)),
            CreationTask::new("farm").with_requirement("wood", 30),
            PlacementRules::default(),
        );

        // Overlaps the HQ.
        assert!(!placement.update(&world, &terrain));

        placement.move_to(point(5, 0)).expect("move");
        assert!(placement.update(&world, &terrain));
        assert_eq!(placement.assigned_border(), Some(border));

        assert_eq!(placement.finalize(&mut world, &terrain, &stock), Ok(1));
        assert_eq!(placement.phase(), PlacementPhase::Placed);
        assert!(world.border(border).is_some_and(|b| b.buildings().contains(&1)));
        assert_eq!(placement.cancel(), Err(PlacementError::NotPlacing));
    }

    #[test]
    fn test_finalize_reports_failures() {
        let (mut world, _) = world_with_border(1, point(0, 0));
        let terrain = TerrainGrid::centered(64, fixed(1));
        let mut stock = FactionStockpile::new();

        let mut placement = BuildingPlacementState::new(
            BuildingEntity::new(1, "farm", FactionId(1), point(5, 0)),
            CreationTask::new("farm").with_requirement("wood", 30),
            PlacementRules::default(),
        );
        assert_eq!(
            placement.finalize(&mut world, &terrain, &stock),
            Err(PlacementError::TaskMissingResourceRequirements)
        );

        stock.lock(FactionId(1), "farm");
        assert_eq!(
            placement.finalize(&mut world, &terrain, &stock),
            Err(PlacementError::FactionLocked)
        );

        placement.move_to(point(20, 0)).expect("move");
        assert_eq!(
            placement.finalize(&mut world, &terrain, &stock),
            Err(PlacementError::OutsideBorder)
        );

        placement.move_to(point(100, 0)).expect("move");
        assert_eq!(
            placement.finalize(&mut world, &terrain, &stock),
            Err(PlacementError::OffMap)
        );

        placement.cancel().expect("cancel");
        assert_eq!(placement.phase(), PlacementPhase::Cancelled);
        assert!(world.building(1).is_none());
    }
}
