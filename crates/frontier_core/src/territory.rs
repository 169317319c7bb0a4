//! Territory borders and the world that coordinates them.
//!
//! A border is a circle owned by one building. While active it tracks the
//! resources and friendly buildings inside it, and it enforces capacity
//! limits per building code. Overlapping borders are ranked by
//! [`TerritoryBorder::sorting_order`]: every activation takes the next
//! value of a strictly decreasing counter, so older borders rank higher.
//!
//! [`TerritoryWorld`] owns the borders, the tracked entities, the counter
//! and the [`EventBus`]. All mutation goes through it.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::error::{GameError, Result, TerritoryError};
use crate::events::{EventBus, EventTopic, TerritoryEvent};
use crate::factions::{FactionId, FactionRelations};
use crate::math::{fixed_serde, Fixed, Vec2Fixed, Vec3Fixed};

/// Sorting order handed to the first activated border.
pub const INITIAL_SORTING_ORDER: i64 = 0;

/// Topics an active border listens to.
const BORDER_TOPICS: [EventTopic; 5] = [
    EventTopic::ResourceSpawned,
    EventTopic::ResourceRemovedFromBorder,
    EventTopic::ResourceDestroyed,
    EventTopic::BuildingPlaced,
    EventTopic::BuildingDestroyed,
];

/// Identifier of a border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BorderId(pub u32);

/// Border lifecycle. A border exists from activation on; a disabled border
/// never becomes active again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorderState {
    /// Tracking members and subscribed to world events.
    Active,
    /// Emptied and unsubscribed for good.
    Disabled,
}

/// Cap on the number of tracked buildings of a set of codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimit {
    /// Building codes counted together.
    pub codes: BTreeSet<String>,
    /// Maximum number of tracked buildings with any of these codes.
    pub max_amount: u32,
}

impl CapacityLimit {
    /// Create a limit over `codes`.
    #[must_use]
    pub fn new<I, S>(codes: I, max_amount: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            max_amount,
        }
    }
}

/// Settings of a border, applied when it is activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderConfig {
    /// Border radius.
    #[serde(with = "fixed_serde")]
    pub size: Fixed,
    /// Capacity table.
    pub limits: Vec<CapacityLimit>,
}

impl BorderConfig {
    /// Border of radius `size` without capacity limits.
    #[must_use]
    pub fn new(size: Fixed) -> Self {
        Self {
            size,
            limits: Vec::new(),
        }
    }

    /// Add a capacity limit.
    #[must_use]
    pub fn with_limit(mut self, limit: CapacityLimit) -> Self {
        self.limits.push(limit);
        self
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A resource node tracked by the territory world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntity {
    /// Entity id.
    pub id: EntityId,
    /// Resource type code.
    pub code: String,
    /// World position.
    pub position: Vec3Fixed,
    /// Footprint half extents (x, z).
    pub half_extents: Vec2Fixed,
    /// Owning faction; `None` for free resources.
    pub faction: Option<FactionId>,
    /// The resource is itself a faction building and keeps its faction.
    pub keeps_faction: bool,
    /// Border currently tracking the resource.
    pub border: Option<BorderId>,
    /// Cleared when the resource is destroyed.
    pub alive: bool,
}

impl ResourceEntity {
    /// Free resource at `position`.
    #[must_use]
    pub fn new(id: EntityId, code: impl Into<String>, position: Vec3Fixed) -> Self {
        Self {
            id,
            code: code.into(),
            position,
            half_extents: Vec2Fixed::ZERO,
            faction: None,
            keeps_faction: false,
            border: None,
            alive: true,
        }
    }

    /// Resource that is a building of `faction` and never changes hands.
    #[must_use]
    pub fn owned_building(mut self, faction: FactionId) -> Self {
        self.faction = Some(faction);
        self.keeps_faction = true;
        self
    }

    /// Set the footprint.
    #[must_use]
    pub fn with_half_extents(mut self, half_extents: Vec2Fixed) -> Self {
        self.half_extents = half_extents;
        self
    }
}

/// A building tracked by the territory world, or a placement instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingEntity {
    /// Entity id.
    pub id: EntityId,
    /// Building type code.
    pub code: String,
    /// Owning faction.
    pub faction: FactionId,
    /// World position.
    pub position: Vec3Fixed,
    /// Footprint half extents (x, z).
    pub half_extents: Vec2Fixed,
    /// Border the building is assigned to.
    pub center: Option<BorderId>,
    /// Cleared when the building is destroyed.
    pub alive: bool,
}

impl BuildingEntity {
    /// Building without an assigned border.
    #[must_use]
    pub fn new(
        id: EntityId,
        code: impl Into<String>,
        faction: FactionId,
        position: Vec3Fixed,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            faction,
            position,
            half_extents: Vec2Fixed::ZERO,
            center: None,
            alive: true,
        }
    }

    /// Set the footprint.
    #[must_use]
    pub fn with_half_extents(mut self, half_extents: Vec2Fixed) -> Self {
        self.half_extents = half_extents;
        self
    }

    /// Assign a border up front.
    #[must_use]
    pub fn with_center(mut self, center: BorderId) -> Self {
        self.center = Some(center);
        self
    }
}

// ============================================================================
// Border
// ============================================================================

/// A circular territory owned by a building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryBorder {
    id: BorderId,
    owner: EntityId,
    faction: FactionId,
    center: Vec3Fixed,
    #[serde(with = "fixed_serde")]
    size: Fixed,
    sorting_order: i64,
    state: BorderState,
    resources: BTreeSet<EntityId>,
    buildings: BTreeSet<EntityId>,
    limits: Vec<CapacityLimit>,
    building_counts: BTreeMap<String, u32>,
}

impl TerritoryBorder {
    /// Border id.
    #[must_use]
    pub fn id(&self) -> BorderId {
        self.id
    }

    /// Owning building.
    #[must_use]
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Faction of the owning building.
    #[must_use]
    pub fn faction(&self) -> FactionId {
        self.faction
    }

    /// Border centre.
    #[must_use]
    pub fn center(&self) -> Vec3Fixed {
        self.center
    }

    /// Border radius.
    #[must_use]
    pub fn size(&self) -> Fixed {
        self.size
    }

    /// Precedence; higher wins. Older borders have higher values.
    #[must_use]
    pub fn sorting_order(&self) -> i64 {
        self.sorting_order
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> BorderState {
        self.state
    }

    /// Whether the border is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == BorderState::Active
    }

    /// Tracked resources.
    #[must_use]
    pub fn resources(&self) -> &BTreeSet<EntityId> {
        &self.resources
    }

    /// Tracked buildings.
    #[must_use]
    pub fn buildings(&self) -> &BTreeSet<EntityId> {
        &self.buildings
    }

    /// Tracked buildings with `code`.
    #[must_use]
    pub fn building_count(&self, code: &str) -> u32 {
        self.building_counts.get(code).copied().unwrap_or(0)
    }

    /// Whether `point` is within the border (horizontal distance, boundary included).
    #[must_use]
    pub fn contains(&self, point: Vec3Fixed) -> bool {
        self.center.horizontal_distance_squared(point) <= self.size * self.size
    }

    /// Whether one more building of `code` fits the capacity table.
    ///
    /// Codes absent from every limit are always allowed.
    #[must_use]
    pub fn is_building_allowed(&self, code: &str) -> bool {
        self.limits
            .iter()
            .filter(|limit| limit.codes.contains(code))
            .all(|limit| {
                let tracked: u32 = limit.codes.iter().map(|c| self.building_count(c)).sum();
                tracked < limit.max_amount
            })
    }
}

// ============================================================================
// World
// ============================================================================

/// Owner of all borders and the entities they track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryWorld {
    borders: BTreeMap<BorderId, TerritoryBorder>,
    resources: BTreeMap<EntityId, ResourceEntity>,
    buildings: BTreeMap<EntityId, BuildingEntity>,
    relations: FactionRelations,
    bus: EventBus,
    next_sorting_order: i64,
    next_border_id: u32,
}

impl Default for TerritoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TerritoryWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            borders: BTreeMap::new(),
            resources: BTreeMap::new(),
            buildings: BTreeMap::new(),
            relations: FactionRelations::new(),
            bus: EventBus::new(),
            next_sorting_order: INITIAL_SORTING_ORDER,
            next_border_id: 0,
        }
    }

    /// Look up a border.
    #[must_use]
    pub fn border(&self, id: BorderId) -> Option<&TerritoryBorder> {
        self.borders.get(&id)
    }

    /// All borders, by id.
    pub fn borders(&self) -> impl Iterator<Item = &TerritoryBorder> {
        self.borders.values()
    }

    /// Look up a resource.
    #[must_use]
    pub fn resource(&self, id: EntityId) -> Option<&ResourceEntity> {
        self.resources.get(&id)
    }

    /// All resources, by id.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceEntity> {
        self.resources.values()
    }

    /// Look up a building.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&BuildingEntity> {
        self.buildings.get(&id)
    }

    /// All buildings, by id.
    pub fn buildings(&self) -> impl Iterator<Item = &BuildingEntity> {
        self.buildings.values()
    }

    /// Faction relations.
    #[must_use]
    pub fn relations(&self) -> &FactionRelations {
        &self.relations
    }

    /// Mutable faction relations.
    pub fn relations_mut(&mut self) -> &mut FactionRelations {
        &mut self.relations
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Take every event raised since the last call.
    pub fn drain_events(&mut self) -> Vec<TerritoryEvent> {
        self.bus.drain_log()
    }

    /// Sorting order the next activated border will get.
    #[must_use]
    pub fn next_sorting_order(&self) -> i64 {
        self.next_sorting_order
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Activate a border owned by the building `owner`.
    ///
    /// The owner becomes the border's first building, free or same-faction
    /// resources inside it are absorbed, and the border subscribes to world
    /// events.
    pub fn activate_border(
        &mut self,
        owner: EntityId,
        config: &BorderConfig,
    ) -> std::result::Result<BorderId, TerritoryError> {
        let building = self
            .buildings
            .get(&owner)
            .filter(|b| b.alive)
            .ok_or(TerritoryError::UnknownEntity(owner))?;
        if let Some(existing) = self.borders.values().find(|b| b.owner == owner) {
            return Err(TerritoryError::AlreadyActivated(existing.id.0));
        }
        let (faction, center, previous) = (building.faction, building.position, building.center);

        if let Some(previous) = previous {
            // The owner moves into its own border.
            let _ = self.untrack_building(previous, owner);
        }

        let id = BorderId(self.next_border_id);
        self.next_border_id += 1;
        let sorting_order = self.next_sorting_order;
        self.next_sorting_order = self.next_sorting_order.saturating_sub(1);

        self.borders.insert(
            id,
            TerritoryBorder {
                id,
                owner,
                faction,
                center,
                size: config.size,
                sorting_order,
                state: BorderState::Active,
                resources: BTreeSet::new(),
                buildings: BTreeSet::new(),
                limits: config.limits.clone(),
                building_counts: BTreeMap::new(),
            },
        );
        if let Some(building) = self.buildings.get_mut(&owner) {
            building.center = Some(id);
        }
        self.track_building(id, owner)?;

        let candidates: Vec<EntityId> = self.resources.keys().copied().collect();
        for resource in candidates {
            let _ = self.track_resource(id, resource);
        }

        for topic in BORDER_TOPICS {
            self.bus.subscribe(topic, id);
        }
        self.bus.publish(TerritoryEvent::BorderActivated { border: id, owner });
        self.process_events();

        tracing::debug!(
            border = id.0,
            owner,
            faction = faction.0,
            sorting_order,
            "Border activated"
        );
        Ok(id)
    }

    /// Disable a border for good.
    ///
    /// The border unsubscribes first, then evicts its resources (raising
    /// [`TerritoryEvent::ResourceRemovedFromBorder`] so other borders can
    /// absorb them) and forgets its buildings.
    pub fn disable_border(&mut self, id: BorderId) -> std::result::Result<(), TerritoryError> {
        let border = self
            .borders
            .get_mut(&id)
            .ok_or(TerritoryError::UnknownBorder(id.0))?;
        if border.state != BorderState::Active {
            return Err(TerritoryError::BorderNotActive(id.0));
        }

        self.bus.unsubscribe_all(id);
        border.state = BorderState::Disabled;
        let resources = std::mem::take(&mut border.resources);
        let buildings = std::mem::take(&mut border.buildings);
        border.building_counts.clear();

        for resource in &resources {
            if let Some(entity) = self.resources.get_mut(resource) {
                entity.border = None;
                if entity.alive && !entity.keeps_faction {
                    entity.faction = None;
                }
            }
            self.bus.publish(TerritoryEvent::ResourceRemovedFromBorder {
                border: id,
                resource: *resource,
            });
        }
        for building in &buildings {
            if let Some(entity) = self.buildings.get_mut(building) {
                if entity.center == Some(id) {
                    entity.center = None;
                }
            }
        }

        self.bus.publish(TerritoryEvent::BorderDisabled { border: id });
        self.process_events();

        tracing::debug!(
            border = id.0,
            evicted_resources = resources.len(),
            released_buildings = buildings.len(),
            "Border disabled"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Have `border` track `resource`.
    pub fn add_resource_to_border(
        &mut self,
        border: BorderId,
        resource: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let result = self.track_resource(border, resource);
        self.process_events();
        result
    }

    /// Evict `resource` from `border`, freeing it.
    pub fn remove_resource_from_border(
        &mut self,
        border: BorderId,
        resource: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let result = self.untrack_resource(border, resource);
        self.process_events();
        result
    }

    /// Have `border` track `building`; the building must be assigned to it.
    pub fn add_building_to_border(
        &mut self,
        border: BorderId,
        building: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let result = self.track_building(border, building);
        self.process_events();
        result
    }

    /// Stop tracking `building` in `border`.
    pub fn remove_building_from_border(
        &mut self,
        border: BorderId,
        building: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let result = self.untrack_building(border, building);
        self.process_events();
        result
    }

    // ------------------------------------------------------------------------
    // World changes
    // ------------------------------------------------------------------------

    /// Add a resource to the world; active borders may absorb it.
    pub fn spawn_resource(
        &mut self,
        mut resource: ResourceEntity,
    ) -> std::result::Result<(), TerritoryError> {
        if self.resources.contains_key(&resource.id) {
            return Err(TerritoryError::AlreadyTracked);
        }
        let id = resource.id;
        resource.border = None;
        resource.alive = true;
        self.resources.insert(id, resource);
        self.bus.publish(TerritoryEvent::ResourceSpawned { resource: id });
        self.process_events();
        Ok(())
    }

    /// Destroy a resource.
    pub fn destroy_resource(&mut self, id: EntityId) -> std::result::Result<(), TerritoryError> {
        let resource = self
            .resources
            .get_mut(&id)
            .ok_or(TerritoryError::UnknownEntity(id))?;
        resource.alive = false;
        self.bus.publish(TerritoryEvent::ResourceDestroyed { resource: id });
        self.process_events();
        self.resources.remove(&id);
        Ok(())
    }

    /// Add a finished building; its assigned border starts tracking it.
    pub fn place_building(
        &mut self,
        mut building: BuildingEntity,
    ) -> std::result::Result<(), TerritoryError> {
        if self.buildings.contains_key(&building.id) {
            return Err(TerritoryError::AlreadyTracked);
        }
        let id = building.id;
        building.alive = true;
        self.buildings.insert(id, building);
        self.bus.publish(TerritoryEvent::BuildingPlaced { building: id });
        self.process_events();
        Ok(())
    }

    /// Destroy a building, disabling the border it owns.
    pub fn destroy_building(&mut self, id: EntityId) -> std::result::Result<(), TerritoryError> {
        if !self.buildings.contains_key(&id) {
            return Err(TerritoryError::UnknownEntity(id));
        }
        let owned: Vec<BorderId> = self
            .borders
            .values()
            .filter(|b| b.owner == id && b.is_active())
            .map(|b| b.id)
            .collect();
        for border in owned {
            self.disable_border(border)?;
        }

        if let Some(building) = self.buildings.get_mut(&id) {
            building.alive = false;
        }
        self.bus.publish(TerritoryEvent::BuildingDestroyed { building: id });
        self.process_events();
        self.buildings.remove(&id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Serialize the world with bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| {
            GameError::InvalidState(format!("Failed to serialize territory world: {e}"))
        })
    }

    /// Deserialize a world snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize territory world: {e}"))
        })
    }

    /// Hash of the border and membership state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.next_sorting_order.hash(&mut hasher);
        for border in self.borders.values() {
            border.id.hash(&mut hasher);
            border.owner.hash(&mut hasher);
            border.sorting_order.hash(&mut hasher);
            border.size.to_bits().hash(&mut hasher);
            border.resources.hash(&mut hasher);
            border.buildings.hash(&mut hasher);
        }
        for resource in self.resources.values() {
            resource.id.hash(&mut hasher);
            resource.faction.hash(&mut hasher);
            resource.border.hash(&mut hasher);
        }
        for building in self.buildings.values() {
            building.id.hash(&mut hasher);
            building.center.hash(&mut hasher);
            building.position.hash(&mut hasher);
        }
        hasher.finish()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn active_border(&self, id: BorderId) -> std::result::Result<&TerritoryBorder, TerritoryError> {
        let border = self
            .borders
            .get(&id)
            .ok_or(TerritoryError::UnknownBorder(id.0))?;
        if !border.is_active() {
            return Err(TerritoryError::BorderNotActive(id.0));
        }
        Ok(border)
    }

    fn track_resource(
        &mut self,
        border_id: BorderId,
        resource_id: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let border = self.active_border(border_id)?;
        let resource = self
            .resources
            .get(&resource_id)
            .filter(|r| r.alive)
            .ok_or(TerritoryError::UnknownEntity(resource_id))?;
        if resource.border.is_some() || border.resources.contains(&resource_id) {
            return Err(TerritoryError::AlreadyTracked);
        }
        if resource.faction.is_some_and(|f| f != border.faction) {
            return Err(TerritoryError::FactionMismatch);
        }
        if !border.contains(resource.position) {
            return Err(TerritoryError::OutOfRange);
        }
        let faction = border.faction;

        if let Some(border) = self.borders.get_mut(&border_id) {
            border.resources.insert(resource_id);
        }
        if let Some(resource) = self.resources.get_mut(&resource_id) {
            resource.border = Some(border_id);
            if !resource.keeps_faction {
                resource.faction = Some(faction);
            }
        }
        self.bus.publish(TerritoryEvent::ResourceAdded {
            border: border_id,
            resource: resource_id,
        });
        Ok(())
    }

    fn untrack_resource(
        &mut self,
        border_id: BorderId,
        resource_id: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let border = self
            .borders
            .get_mut(&border_id)
            .ok_or(TerritoryError::UnknownBorder(border_id.0))?;
        if !border.resources.remove(&resource_id) {
            return Err(TerritoryError::UnknownEntity(resource_id));
        }
        if let Some(resource) = self.resources.get_mut(&resource_id) {
            resource.border = None;
            if resource.alive && !resource.keeps_faction {
                resource.faction = None;
            }
        }
        self.bus.publish(TerritoryEvent::ResourceRemovedFromBorder {
            border: border_id,
            resource: resource_id,
        });
        Ok(())
    }

    fn track_building(
        &mut self,
        border_id: BorderId,
        building_id: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let border = self.active_border(border_id)?;
        let building = self
            .buildings
            .get(&building_id)
            .filter(|b| b.alive)
            .ok_or(TerritoryError::UnknownEntity(building_id))?;
        if building.center != Some(border_id) {
            return Err(TerritoryError::CenterMismatch);
        }
        if building.faction != border.faction {
            return Err(TerritoryError::FactionMismatch);
        }
        if border.buildings.contains(&building_id) {
            return Err(TerritoryError::AlreadyTracked);
        }
        let code = building.code.clone();

        if let Some(border) = self.borders.get_mut(&border_id) {
            border.buildings.insert(building_id);
            *border.building_counts.entry(code).or_insert(0) += 1;
        }
        self.bus.publish(TerritoryEvent::BuildingAdded {
            border: border_id,
            building: building_id,
        });
        Ok(())
    }

    fn untrack_building(
        &mut self,
        border_id: BorderId,
        building_id: EntityId,
    ) -> std::result::Result<(), TerritoryError> {
        let border = self
            .borders
            .get_mut(&border_id)
            .ok_or(TerritoryError::UnknownBorder(border_id.0))?;
        if !border.buildings.remove(&building_id) {
            return Err(TerritoryError::UnknownEntity(building_id));
        }
        if let Some(code) = self.buildings.get(&building_id).map(|b| b.code.as_str()) {
            if let Some(count) = border.building_counts.get_mut(code) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    border.building_counts.remove(code);
                }
            }
        }
        self.bus.publish(TerritoryEvent::BuildingRemoved {
            border: border_id,
            building: building_id,
        });
        Ok(())
    }

    fn tracks_resource(&self, border: BorderId, resource: EntityId) -> bool {
        self.borders
            .get(&border)
            .is_some_and(|b| b.resources.contains(&resource))
    }

    fn tracks_building(&self, border: BorderId, building: EntityId) -> bool {
        self.borders
            .get(&border)
            .is_some_and(|b| b.buildings.contains(&building))
    }

    /// Deliver queued events until the queue is empty.
    ///
    /// Reactions may publish further events; they are delivered in the
    /// same loop.
    fn process_events(&mut self) {
        while let Some(event) = self.bus.next_pending() {
            for border in self.bus.subscribers(event.topic()) {
                self.handle_event(border, event);
            }
        }
    }

    /// Border reaction to a world event. Rejections are expected and ignored.
    fn handle_event(&mut self, border: BorderId, event: TerritoryEvent) {
        match event {
            TerritoryEvent::ResourceSpawned { resource } => {
                let _ = self.track_resource(border, resource);
            }
            TerritoryEvent::ResourceRemovedFromBorder {
                border: from,
                resource,
            } if from != border => {
                let _ = self.track_resource(border, resource);
            }
            TerritoryEvent::ResourceDestroyed { resource } if self.tracks_resource(border, resource) => {
                let _ = self.untrack_resource(border, resource);
            }
            TerritoryEvent::BuildingPlaced { building } => {
                let assigned = self
                    .buildings
                    .get(&building)
                    .is_some_and(|b| b.center == Some(border));
                if assigned {
                    let _ = self.track_building(border, building);
                }
            }
            TerritoryEvent::BuildingDestroyed { building } if self.tracks_building(border, building) => {
                let _ = self.untrack_building(border, building);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn point(x: i32, z: i32) -> Vec3Fixed {
        Vec3Fixed::flat(fixed(x), fixed(z))
    }

    fn world_with_hq(faction: u8, id: EntityId, at: Vec3Fixed, size: i32) -> (TerritoryWorld, BorderId) {
        let mut world = TerritoryWorld::new();
        world
            .place_building(BuildingEntity::new(id, "hq", FactionId(faction), at))
            .expect("place hq");
        let border = world
            .activate_border(id, &BorderConfig::new(fixed(size)))
            .expect("activate");
        (world, border)
    }

    #[test]
    fn test_sorting_order_strictly_decreases() {
        let (mut world, first) = world_with_hq(1, 1, point(0, 0), 10);
        world
            .place_building(BuildingEntity::new(2, "hq", FactionId(2), point(50, 0)))
            .expect("place");
        let second = world
            .activate_border(2, &BorderConfig::new(fixed(10)))
            .expect("activate");

        let a = world.border(first).map(TerritoryBorder::sorting_order);
        let b = world.border(second).map(TerritoryBorder::sorting_order);
        assert_eq!(a, Some(INITIAL_SORTING_ORDER));
        assert!(a > b);
        assert_eq!(world.next_sorting_order(), INITIAL_SORTING_ORDER - 2);
    }

    #[test]
    fn test_owner_is_first_building() {
        let (world, border) = world_with_hq(1, 1, point(0, 0), 10);
        let border = world.border(border).expect("border");
        assert!(border.buildings().contains(&1));
        assert_eq!(border.building_count("hq"), 1);
        assert_eq!(world.building(1).and_then(|b| b.center), Some(border.id()));
    }

    #[test]
    fn test_activation_is_one_shot() {
        let (mut world, border) = world_with_hq(1, 1, point(0, 0), 10);
        assert_eq!(
            world.activate_border(1, &BorderConfig::new(fixed(10))),
            Err(TerritoryError::AlreadyActivated(border.0))
        );
        world.disable_border(border).expect("disable");
        assert_eq!(
            world.disable_border(border),
            Err(TerritoryError::BorderNotActive(border.0))
        );
        assert!(world.activate_border(1, &BorderConfig::new(fixed(10))).is_err());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let (world, border) = world_with_hq(1, 1, point(0, 0), 5);
        let border = world.border(border).expect("border");
        assert!(border.contains(point(3, 4)));
        assert!(!border.contains(point(4, 4)));
    }

    #[test]
    fn test_resources_absorbed_on_activation_and_spawn() {
        let mut world = TerritoryWorld::new();
        world
            .spawn_resource(ResourceEntity::new(10, "ore", point(2, 0)))
            .expect("spawn");
        world
            .spawn_resource(ResourceEntity::new(11, "ore", point(40, 0)))
            .expect("spawn");
        world
            .place_building(BuildingEntity::new(1, "hq", FactionId(1), point(0, 0)))
            .expect("place");
        let border = world
            .activate_border(1, &BorderConfig::new(fixed(10)))
            .expect("activate");

        assert_eq!(world.resource(10).and_then(|r| r.faction), Some(FactionId(1)));
        assert_eq!(world.resource(11).and_then(|r| r.faction), None);

        world
            .spawn_resource(ResourceEntity::new(12, "ore", point(-3, 3)))
            .expect("spawn");
        let tracked: Vec<EntityId> = world
            .border(border)
            .map(|b| b.resources().iter().copied().collect())
            .unwrap_or_default();
        assert_eq!(tracked, vec![10, 12]);
    }

    #[test]
    fn test_hostile_resource_is_not_absorbed() {
        let mut world = TerritoryWorld::new();
        world
            .spawn_resource(ResourceEntity::new(10, "depot", point(1, 0)).owned_building(FactionId(2)))
            .expect("spawn");
        world
            .place_building(BuildingEntity::new(1, "hq", FactionId(1), point(0, 0)))
            .expect("place");
        let border = world
            .activate_border(1, &BorderConfig::new(fixed(10)))
            .expect("activate");

        assert_eq!(
            world.add_resource_to_border(border, 10),
            Err(TerritoryError::FactionMismatch)
        );
    }

    #[test]
    fn test_destroyed_resource_leaves_border() {
        let (mut world, border) = world_with_hq(1, 1, point(0, 0), 10);
        world
            .spawn_resource(ResourceEntity::new(10, "ore", point(1, 1)))
            .expect("spawn");
        world.destroy_resource(10).expect("destroy");

        assert!(world.resource(10).is_none());
        assert!(world.border(border).is_some_and(|b| b.resources().is_empty()));
    }

    #[test]
    fn test_disable_hands_resources_to_overlapping_border() {
        let (mut world, first) = world_with_hq(1, 1, point(0, 0), 10);
        world
            .spawn_resource(ResourceEntity::new(10, "ore", point(4, 0)))
            .expect("spawn");
        world
            .place_building(BuildingEntity::new(2, "hq", FactionId(2), point(8, 0)))
            .expect("place");
        let second = world
            .activate_border(2, &BorderConfig::new(fixed(10)))
            .expect("activate");
        assert!(world.border(first).is_some_and(|b| b.resources().contains(&10)));

        world.drain_events();
        world.disable_border(first).expect("disable");

        assert!(world.border(second).is_some_and(|b| b.resources().contains(&10)));
        assert_eq!(world.resource(10).and_then(|r| r.faction), Some(FactionId(2)));
        assert_eq!(world.building(1).and_then(|b| b.center), None);
        assert!(!world.bus().is_subscribed(EventTopic::ResourceSpawned, first));

        assert_eq!(
            world.drain_events(),
            vec![
                TerritoryEvent::ResourceRemovedFromBorder {
                    border: first,
                    resource: 10
                },
                TerritoryEvent::BorderDisabled { border: first },
                TerritoryEvent::ResourceAdded {
                    border: second,
                    resource: 10
                },
            ]
        );
    }

    #[test]
    fn test_capacity_limits() {
        let mut world = TerritoryWorld::new();
        world
            .place_building(BuildingEntity::new(1, "hq", FactionId(1), point(0, 0)))
            .expect("place");
        let config = BorderConfig::new(fixed(20)).with_limit(CapacityLimit::new(["tower", "bunker"], 2));
        let border = world.activate_border(1, &config).expect("activate");

        let allowed = |world: &TerritoryWorld, code: &str| {
            world.border(border).is_some_and(|b| b.is_building_allowed(code))
        };
        assert!(allowed(&world, "tower"));

        world
            .place_building(BuildingEntity::new(2, "tower", FactionId(1), point(3, 0)).with_center(border))
            .expect("place");
        assert!(allowed(&world, "tower"));

        world
            .place_building(BuildingEntity::new(3, "bunker", FactionId(1), point(-3, 0)).with_center(border))
            .expect("place");
        assert!(!allowed(&world, "tower"));
        assert!(!allowed(&world, "bunker"));
        assert!(allowed(&world, "farm"));

        world.destroy_building(3).expect("destroy");
        assert!(allowed(&world, "bunker"));
    }

    #[test]
    fn test_destroying_owner_disables_border() {
        let (mut world, border) = world_with_hq(1, 1, point(0, 0), 10);
        world.destroy_building(1).expect("destroy");
        assert_eq!(world.border(border).map(TerritoryBorder::state), Some(BorderState::Disabled));
        assert!(world.building(1).is_none());
    }

    #[test]
    fn test_building_needs_matching_center() {
        let (mut world, border) = world_with_hq(1, 1, point(0, 0), 10);
        world
            .place_building(BuildingEntity::new(2, "farm", FactionId(1), point(2, 0)))
            .expect("place");
        assert_eq!(
            world.add_building_to_border(border, 2),
            Err(TerritoryError::CenterMismatch)
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (mut world, _) = world_with_hq(1, 1, point(0, 0), 10);
        world
            .spawn_resource(ResourceEntity::new(10, "ore", point(1, 1)))
            .expect("spawn");
        let bytes = world.serialize().expect("serialize");
        let restored = TerritoryWorld::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored, world);
        assert_eq!(restored.state_hash(), world.state_hash());
    }
}
