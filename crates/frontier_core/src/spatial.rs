//! Spatial queries: navigability and position reservations.
//!
//! A formation candidate is only accepted when it is inside the search
//! bounds, not reserved by an obstacle or another agent's destination
//! marker, and close to a navigable point. [`SpatialQuery`] composes the
//! two oracles behind those checks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::error::MovementError;
use crate::math::{fixed_serde, Fixed, Vec2Fixed, Vec3Fixed};
use crate::terrain::AreaMask;

/// Opaque "can this point be reached" oracle.
pub trait NavigationOracle {
    /// Nearest navigable point within `radius` of `center` on an area in
    /// `area_mask`, or `None` when there is none.
    fn try_find_navigable_point(
        &self,
        center: Vec3Fixed,
        radius: Fixed,
        area_mask: AreaMask,
    ) -> Option<Vec3Fixed>;
}

/// Index of reserved positions (obstacles and destination markers).
pub trait ReservationIndex {
    /// Whether `point` lies inside the searchable map region.
    fn in_search_bounds(&self, point: Vec3Fixed) -> bool;

    /// Whether a disc of `radius` at `point` overlaps an active reservation.
    fn is_position_reserved(
        &self,
        point: Vec3Fixed,
        radius: Fixed,
        area_mask: AreaMask,
        player_command: bool,
    ) -> bool;
}

/// Composition of the navigation oracle and the reservation index.
#[derive(Clone, Copy)]
pub struct SpatialQuery<'a> {
    /// Navigation oracle.
    pub navigation: &'a dyn NavigationOracle,
    /// Reservation index.
    pub reservations: &'a dyn ReservationIndex,
}

impl<'a> SpatialQuery<'a> {
    /// Create a query over the two oracles.
    #[must_use]
    pub fn new(navigation: &'a dyn NavigationOracle, reservations: &'a dyn ReservationIndex) -> Self {
        Self {
            navigation,
            reservations,
        }
    }

    /// Check whether an agent of `agent_radius` can stand at `point`.
    ///
    /// Returns the navigation-corrected point on success.
    pub fn is_position_clear(
        &self,
        point: Vec3Fixed,
        agent_radius: Fixed,
        nav_mask: AreaMask,
        terrain_mask: AreaMask,
        player_command: bool,
    ) -> Result<Vec3Fixed, MovementError> {
        if !self.reservations.in_search_bounds(point) {
            return Err(MovementError::OutOfSearchBounds);
        }

        if self
            .reservations
            .is_position_reserved(point, agent_radius, terrain_mask, player_command)
        {
            return Err(MovementError::ReservedByObstacle);
        }

        self.navigation
            .try_find_navigable_point(point, agent_radius, nav_mask)
            .ok_or(MovementError::NavigationOccupied)
    }
}

// ============================================================================
// Reservation Grid
// ============================================================================

/// Identifier of a reservation in a [`ReservationGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub u32);

/// What a reservation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationKind {
    /// A static or dynamic obstacle.
    Obstacle {
        /// Only blocks player-issued movement.
        player_command_only: bool,
    },
    /// The destination marker of a moving entity.
    TargetMarker(EntityId),
}

/// A circular reserved region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// What placed the reservation.
    pub kind: ReservationKind,
    /// Centre of the reserved disc.
    pub center: Vec3Fixed,
    /// Radius of the reserved disc.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Areas the reservation applies to.
    pub areas: AreaMask,
    /// Disabled reservations are ignored by queries.
    pub enabled: bool,
}

impl Reservation {
    fn blocks(&self, point: Vec3Fixed, radius: Fixed, areas: AreaMask, player_command: bool) -> bool {
        if !self.enabled || !self.areas.intersects(areas) {
            return false;
        }
        if let ReservationKind::Obstacle {
            player_command_only: true,
        } = self.kind
        {
            if !player_command {
                return false;
            }
        }
        let reach = self.radius + radius;
        self.center.horizontal_distance_squared(point) < reach * reach
    }
}

/// Bucketed spatial index of reservations over a bounded map.
///
/// Each reservation is listed in every bucket its bounding box touches.
/// Buckets hold ids in insertion order and queries deduplicate through a
/// sorted set, so results never depend on hash ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationGrid {
    /// Grid width in buckets (x axis).
    width: u32,
    /// Grid depth in buckets (z axis).
    depth: u32,
    /// World position of the lower corner (x, z).
    origin: Vec2Fixed,
    /// Bucket edge length in world units.
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
    /// Reservation ids per bucket, row-major.
    buckets: Vec<Vec<ReservationId>>,
    /// All reservations.
    reservations: BTreeMap<ReservationId, Reservation>,
    /// Marker reservation of each entity.
    markers: BTreeMap<EntityId, ReservationId>,
    /// Next id to hand out.
    next_id: u32,
}

impl ReservationGrid {
    /// Create an empty reservation grid.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `depth` is zero, or if `cell_size` is not positive.
    #[must_use]
    pub fn new(width: u32, depth: u32, cell_size: Fixed, origin: Vec2Fixed) -> Self {
        assert!(width > 0, "ReservationGrid width must be positive");
        assert!(depth > 0, "ReservationGrid depth must be positive");
        assert!(
            cell_size > Fixed::ZERO,
            "ReservationGrid cell_size must be positive"
        );

        Self {
            width,
            depth,
            origin,
            cell_size,
            buckets: vec![Vec::new(); (width as usize) * (depth as usize)],
            reservations: BTreeMap::new(),
            markers: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Create a square grid centred on the world origin.
    #[must_use]
    pub fn centered(cells_per_side: u32, cell_size: Fixed) -> Self {
        let half = Fixed::from_num(cells_per_side) * cell_size / Fixed::const_from_int(2);
        Self::new(
            cells_per_side,
            cells_per_side,
            cell_size,
            Vec2Fixed::new(-half, -half),
        )
    }

    /// Number of reservations (enabled or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    /// Whether the grid holds no reservations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    /// Look up a reservation.
    #[must_use]
    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    /// The destination marker of an entity, if any.
    #[must_use]
    pub fn marker(&self, entity: EntityId) -> Option<&Reservation> {
        self.markers
            .get(&entity)
            .and_then(|id| self.reservations.get(id))
    }

    /// Add an obstacle and return its id.
    pub fn add_obstacle(
        &mut self,
        center: Vec3Fixed,
        radius: Fixed,
        areas: AreaMask,
        player_command_only: bool,
    ) -> ReservationId {
        self.insert(Reservation {
            kind: ReservationKind::Obstacle {
                player_command_only,
            },
            center,
            radius,
            areas,
            enabled: true,
        })
    }

    /// Remove a reservation. Returns the removed entry.
    pub fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        let reservation = self.reservations.remove(&id)?;
        self.unindex(id, &reservation);
        if let ReservationKind::TargetMarker(entity) = reservation.kind {
            self.markers.remove(&entity);
        }
        Some(reservation)
    }

    /// Place (or move) the enabled destination marker of `entity`.
    pub fn place_marker(
        &mut self,
        entity: EntityId,
        center: Vec3Fixed,
        radius: Fixed,
        areas: AreaMask,
    ) -> ReservationId {
        if let Some(&id) = self.markers.get(&entity) {
            if let Some(old) = self.reservations.get(&id).copied() {
                self.unindex(id, &old);
            }
            let updated = Reservation {
                kind: ReservationKind::TargetMarker(entity),
                center,
                radius,
                areas,
                enabled: true,
            };
            self.reservations.insert(id, updated);
            self.index(id, &updated);
            return id;
        }

        let id = self.insert(Reservation {
            kind: ReservationKind::TargetMarker(entity),
            center,
            radius,
            areas,
            enabled: true,
        });
        self.markers.insert(entity, id);
        id
    }

    /// Enable or disable the marker of `entity`.
    ///
    /// Returns `false` if the entity has no marker.
    pub fn toggle_marker(&mut self, entity: EntityId, enabled: bool) -> bool {
        let Some(id) = self.markers.get(&entity) else {
            return false;
        };
        match self.reservations.get_mut(id) {
            Some(reservation) => {
                reservation.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Remove the marker of `entity`.
    pub fn remove_marker(&mut self, entity: EntityId) -> Option<Reservation> {
        let id = *self.markers.get(&entity)?;
        self.remove(id)
    }

    fn insert(&mut self, reservation: Reservation) -> ReservationId {
        let id = ReservationId(self.next_id);
        self.next_id += 1;
        self.reservations.insert(id, reservation);
        self.index(id, &reservation);
        id
    }

    fn index(&mut self, id: ReservationId, reservation: &Reservation) {
        for bucket in self.bucket_indices(reservation.center, reservation.radius) {
            self.buckets[bucket].push(id);
        }
    }

    fn unindex(&mut self, id: ReservationId, reservation: &Reservation) {
        for bucket in self.bucket_indices(reservation.center, reservation.radius) {
            self.buckets[bucket].retain(|other| *other != id);
        }
    }

    fn to_cell(&self, value: Fixed, origin: Fixed) -> i64 {
        ((value - origin) / self.cell_size).floor().to_num::<i64>()
    }

    /// Bucket indices overlapped by the bounding box of a disc.
    fn bucket_indices(&self, center: Vec3Fixed, radius: Fixed) -> Vec<usize> {
        let max_x = i64::from(self.width) - 1;
        let max_z = i64::from(self.depth) - 1;
        let min_cx = self.to_cell(center.x - radius, self.origin.x).clamp(0, max_x);
        let max_cx = self.to_cell(center.x + radius, self.origin.x).clamp(0, max_x);
        let min_cz = self.to_cell(center.z - radius, self.origin.y).clamp(0, max_z);
        let max_cz = self.to_cell(center.z + radius, self.origin.y).clamp(0, max_z);

        let mut indices = Vec::new();
        for z in min_cz..=max_cz {
            for x in min_cx..=max_cx {
                indices.push((z as usize) * (self.width as usize) + (x as usize));
            }
        }
        indices
    }
}

impl ReservationIndex for ReservationGrid {
    fn in_search_bounds(&self, point: Vec3Fixed) -> bool {
        let x = self.to_cell(point.x, self.origin.x);
        let z = self.to_cell(point.z, self.origin.y);
        x >= 0 && z >= 0 && x < i64::from(self.width) && z < i64::from(self.depth)
    }

    fn is_position_reserved(
        &self,
        point: Vec3Fixed,
        radius: Fixed,
        area_mask: AreaMask,
        player_command: bool,
    ) -> bool {
        let candidates: BTreeSet<ReservationId> = self
            .bucket_indices(point, radius)
            .into_iter()
            .flat_map(|bucket| self.buckets[bucket].iter().copied())
            .collect();

        candidates.into_iter().any(|id| {
            self.reservations
                .get(&id)
                .is_some_and(|r| r.blocks(point, radius, area_mask, player_command))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::TerrainAreaId;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn point(x: i32, z: i32) -> Vec3Fixed {
        Vec3Fixed::flat(fixed(x), fixed(z))
    }

    struct OpenNavigation;

    impl NavigationOracle for OpenNavigation {
        fn try_find_navigable_point(
            &self,
            center: Vec3Fixed,
            _radius: Fixed,
            _area_mask: AreaMask,
        ) -> Option<Vec3Fixed> {
            Some(center)
        }
    }

    struct NoNavigation;

    impl NavigationOracle for NoNavigation {
        fn try_find_navigable_point(
            &self,
            _center: Vec3Fixed,
            _radius: Fixed,
            _area_mask: AreaMask,
        ) -> Option<Vec3Fixed> {
            None
        }
    }

    #[test]
    fn test_search_bounds() {
        let grid = ReservationGrid::centered(20, fixed(2));
        assert!(grid.in_search_bounds(point(0, 0)));
        assert!(grid.in_search_bounds(point(-20, 19)));
        assert!(!grid.in_search_bounds(point(20, 0)));
        assert!(!grid.in_search_bounds(point(0, -21)));
    }

    #[test]
    fn test_obstacle_blocks_overlapping_discs() {
        let mut grid = ReservationGrid::centered(20, fixed(2));
        grid.add_obstacle(point(0, 0), fixed(2), AreaMask::ALL, false);

        assert!(grid.is_position_reserved(point(2, 0), fixed(1), AreaMask::ALL, false));
        // Touching discs do not overlap.
        assert!(!grid.is_position_reserved(point(3, 0), fixed(1), AreaMask::ALL, false));
        assert!(!grid.is_position_reserved(point(10, 10), fixed(1), AreaMask::ALL, false));
    }

    #[test]
    fn test_obstacle_area_mask() {
        let mut grid = ReservationGrid::centered(20, fixed(2));
        let water = AreaMask::of(TerrainAreaId(2));
        grid.add_obstacle(point(0, 0), fixed(2), water, false);

        let ground = AreaMask::of(TerrainAreaId(0));
        assert!(!grid.is_position_reserved(point(0, 0), fixed(1), ground, false));
        assert!(grid.is_position_reserved(point(0, 0), fixed(1), water, false));
    }

    #[test]
    fn test_player_command_only_obstacle() {
        let mut grid = ReservationGrid::centered(20, fixed(2));
        grid.add_obstacle(point(0, 0), fixed(2), AreaMask::ALL, true);

        assert!(!grid.is_position_reserved(point(0, 0), fixed(1), AreaMask::ALL, false));
        assert!(grid.is_position_reserved(point(0, 0), fixed(1), AreaMask::ALL, true));
    }

    #[test]
    fn test_markers_toggle_and_move() {
        let mut grid = ReservationGrid::centered(20, fixed(2));
        grid.place_marker(7, point(4, 4), fixed(1), AreaMask::ALL);
        assert!(grid.is_position_reserved(point(4, 4), fixed(1), AreaMask::ALL, false));

        assert!(grid.toggle_marker(7, false));
        assert!(!grid.is_position_reserved(point(4, 4), fixed(1), AreaMask::ALL, false));

        grid.place_marker(7, point(-6, -6), fixed(1), AreaMask::ALL);
        assert!(!grid.is_position_reserved(point(4, 4), fixed(1), AreaMask::ALL, false));
        assert!(grid.is_position_reserved(point(-6, -6), fixed(1), AreaMask::ALL, false));
        assert_eq!(grid.len(), 1);

        assert!(grid.remove_marker(7).is_some());
        assert!(grid.is_empty());
        assert!(!grid.toggle_marker(7, true));
    }

    #[test]
    fn test_removed_obstacle_no_longer_blocks() {
        let mut grid = ReservationGrid::centered(20, fixed(2));
        let id = grid.add_obstacle(point(1, 1), fixed(3), AreaMask::ALL, false);
        assert!(grid.remove(id).is_some());
        assert!(!grid.is_position_reserved(point(1, 1), fixed(1), AreaMask::ALL, false));
    }

    #[test]
    fn test_is_position_clear_error_kinds() {
        let mut grid = ReservationGrid::centered(20, fixed(2));
        grid.add_obstacle(point(0, 0), fixed(2), AreaMask::ALL, false);

        let open = SpatialQuery::new(&OpenNavigation, &grid);
        assert_eq!(
            open.is_position_clear(point(100, 0), fixed(1), AreaMask::ALL, AreaMask::ALL, false),
            Err(MovementError::OutOfSearchBounds)
        );
        assert_eq!(
            open.is_position_clear(point(0, 0), fixed(1), AreaMask::ALL, AreaMask::ALL, false),
            Err(MovementError::ReservedByObstacle)
        );
        assert_eq!(
            open.is_position_clear(point(8, 8), fixed(1), AreaMask::ALL, AreaMask::ALL, false),
            Ok(point(8, 8))
        );

        let closed = SpatialQuery::new(&NoNavigation, &grid);
        assert_eq!(
            closed.is_position_clear(point(8, 8), fixed(1), AreaMask::ALL, AreaMask::ALL, false),
            Err(MovementError::NavigationOccupied)
        );
    }
}
