//! Terrain sampling and the grid-backed terrain/navigation oracle.
//!
//! The formation handlers only see terrain through [`TerrainSampler`]
//! and navigation through [`NavigationOracle`]. [`TerrainGrid`] is the
//! deterministic implementation shipped with the core; engines with a
//! real navigation mesh provide their own.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed, Vec3Fixed};
use crate::movement::MovementProfile;
use crate::spatial::NavigationOracle;

// ============================================================================
// Terrain Areas
// ============================================================================

/// Identifier of a terrain area type (ground, water, cliff...).
///
/// Valid ids are `0..32` so they fit in an [`AreaMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerrainAreaId(pub u8);

/// Bit set of terrain/navigation area types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AreaMask(pub u32);

impl AreaMask {
    /// Mask matching every area.
    pub const ALL: Self = Self(u32::MAX);

    /// Mask matching no area.
    pub const NONE: Self = Self(0);

    /// Mask containing a single area.
    #[must_use]
    pub const fn of(area: TerrainAreaId) -> Self {
        if area.0 < 32 {
            Self(1 << area.0)
        } else {
            Self::NONE
        }
    }

    /// Combine two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check whether the mask contains an area.
    #[must_use]
    pub const fn contains(self, area: TerrainAreaId) -> bool {
        area.0 < 32 && (self.0 & (1 << area.0)) != 0
    }

    /// Check whether two masks share any area.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }
}

/// Result of a downward terrain ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainHit {
    /// Surface point hit by the ray.
    pub point: Vec3Fixed,
    /// Area type of the surface.
    pub area: TerrainAreaId,
}

/// Terrain height and area queries used by formation generation and placement.
pub trait TerrainSampler {
    /// Height at which an agent with `profile` stands at `point`.
    fn sample_height(&self, point: Vec3Fixed, profile: &MovementProfile) -> Fixed;

    /// Closest point to `point` whose area is in `allowed`.
    ///
    /// Returns `point` unchanged when it already lies on an allowed area, or
    /// when no allowed area exists at all.
    fn area_restricted_position(&self, point: Vec3Fixed, allowed: AreaMask) -> Vec3Fixed;

    /// Cast a ray straight down from `origin`.
    ///
    /// Returns the first surface within `max_distance`, if any.
    fn raycast_down(&self, origin: Vec3Fixed, max_distance: Fixed) -> Option<TerrainHit>;
}

// ============================================================================
// Terrain Grid
// ============================================================================

/// One cell of the terrain grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainCell {
    /// Surface area type; `None` for holes without any surface.
    pub area: Option<TerrainAreaId>,
    /// Surface height.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
    /// Whether agents can stand in this cell.
    pub walkable: bool,
}

impl Default for TerrainCell {
    fn default() -> Self {
        Self {
            area: Some(TerrainAreaId(0)),
            height: Fixed::ZERO,
            walkable: true,
        }
    }
}

/// Grid of terrain cells covering a rectangular map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainGrid {
    /// Grid width in cells (x axis).
    width: u32,
    /// Grid depth in cells (z axis).
    depth: u32,
    /// World position of the grid's lower corner (x, z).
    origin: Vec2Fixed,
    /// Cell data stored in row-major order.
    cells: Vec<TerrainCell>,
    /// Size of each cell in world units.
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
}

impl TerrainGrid {
    /// Create a new flat, fully walkable terrain grid on area 0.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `depth` is zero, or if `cell_size` is not positive.
    #[must_use]
    pub fn new(width: u32, depth: u32, cell_size: Fixed, origin: Vec2Fixed) -> Self {
        assert!(width > 0, "TerrainGrid width must be positive");
        assert!(depth > 0, "TerrainGrid depth must be positive");
        assert!(
            cell_size > Fixed::ZERO,
            "TerrainGrid cell_size must be positive"
        );

        let cell_count = (width as usize) * (depth as usize);
        Self {
            width,
            depth,
            origin,
            cells: vec![TerrainCell::default(); cell_count],
            cell_size,
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

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid depth in cells.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Cell size in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    #[inline]
    fn coords_to_index(&self, x: u32, z: u32) -> usize {
        (z as usize) * (self.width as usize) + (x as usize)
    }

    /// Check if coordinates are within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, x: u32, z: u32) -> bool {
        x < self.width && z < self.depth
    }

    /// Get the cell at grid coordinates.
    #[must_use]
    pub fn get_cell(&self, x: u32, z: u32) -> Option<TerrainCell> {
        if self.in_bounds(x, z) {
            Some(self.cells[self.coords_to_index(x, z)])
        } else {
            None
        }
    }

    /// Set the cell at grid coordinates.
    /// Returns `false` if out of bounds.
    pub fn set_cell(&mut self, x: u32, z: u32, cell: TerrainCell) -> bool {
        if self.in_bounds(x, z) {
            let index = self.coords_to_index(x, z);
            self.cells[index] = cell;
            true
        } else {
            false
        }
    }

    /// Apply `edit` to every cell whose centre lies within `radius` of `center`.
    pub fn edit_disc(&mut self, center: Vec3Fixed, radius: Fixed, edit: impl Fn(&mut TerrainCell)) {
        let radius_sq = radius * radius;
        for z in 0..self.depth {
            for x in 0..self.width {
                if self.cell_center(x, z).horizontal_distance_squared(center) <= radius_sq {
                    let index = self.coords_to_index(x, z);
                    edit(&mut self.cells[index]);
                }
            }
        }
    }

    /// Convert a world position to grid coordinates.
    ///
    /// Returns `None` if the position is outside the grid.
    #[must_use]
    pub fn world_to_grid(&self, pos: Vec3Fixed) -> Option<(u32, u32)> {
        let local_x = pos.x - self.origin.x;
        let local_z = pos.z - self.origin.y;
        if local_x < Fixed::ZERO || local_z < Fixed::ZERO {
            return None;
        }

        let x = (local_x / self.cell_size).to_num::<i64>();
        let z = (local_z / self.cell_size).to_num::<i64>();

        if x < self.width as i64 && z < self.depth as i64 {
            Some((x as u32, z as u32))
        } else {
            None
        }
    }

    /// World position of a cell centre, at the cell's surface height.
    #[must_use]
    pub fn cell_center(&self, x: u32, z: u32) -> Vec3Fixed {
        let half = self.cell_size / Fixed::const_from_int(2);
        let height = self.get_cell(x, z).map_or(Fixed::ZERO, |c| c.height);
        Vec3Fixed::new(
            self.origin.x + Fixed::from_num(x) * self.cell_size + half,
            height,
            self.origin.y + Fixed::from_num(z) * self.cell_size + half,
        )
    }

    /// Cell at a world position.
    #[must_use]
    pub fn cell_at(&self, pos: Vec3Fixed) -> Option<TerrainCell> {
        self.world_to_grid(pos).and_then(|(x, z)| self.get_cell(x, z))
    }

    /// Inclusive grid-coordinate box covering a disc, clamped to the grid.
    fn cell_range(&self, center: Vec3Fixed, radius: Fixed) -> (u32, u32, u32, u32) {
        let to_cell = |value: Fixed, origin: Fixed, max: u32| -> u32 {
            let cell = ((value - origin) / self.cell_size).floor().to_num::<i64>();
            cell.clamp(0, i64::from(max) - 1) as u32
        };
        (
            to_cell(center.x - radius, self.origin.x, self.width),
            to_cell(center.z - radius, self.origin.y, self.depth),
            to_cell(center.x + radius, self.origin.x, self.width),
            to_cell(center.z + radius, self.origin.y, self.depth),
        )
    }
}

impl TerrainSampler for TerrainGrid {
    fn sample_height(&self, point: Vec3Fixed, profile: &MovementProfile) -> Fixed {
        self.cell_at(point).map_or(Fixed::ZERO, |c| c.height) + profile.height_offset
    }

    fn area_restricted_position(&self, point: Vec3Fixed, allowed: AreaMask) -> Vec3Fixed {
        let on_allowed = |cell: TerrainCell| cell.area.is_some_and(|a| allowed.contains(a));

        if self.cell_at(point).is_some_and(on_allowed) {
            return point;
        }

        // Nearest allowed cell centre; row-major order breaks ties.
        let mut best: Option<(Fixed, Vec3Fixed)> = None;
        for z in 0..self.depth {
            for x in 0..self.width {
                let cell = self.cells[self.coords_to_index(x, z)];
                if !on_allowed(cell) {
                    continue;
                }
                let center = self.cell_center(x, z);
                let dist_sq = center.horizontal_distance_squared(point);
                if best.map_or(true, |(d, _)| dist_sq < d) {
                    best = Some((dist_sq, center));
                }
            }
        }

        best.map_or(point, |(_, center)| center.with_y(point.y))
    }

    fn raycast_down(&self, origin: Vec3Fixed, max_distance: Fixed) -> Option<TerrainHit> {
        let cell = self.cell_at(origin)?;
        let area = cell.area?;
        let drop = origin.y - cell.height;
        if drop < Fixed::ZERO || drop > max_distance {
            return None;
        }
        Some(TerrainHit {
            point: origin.with_y(cell.height),
            area,
        })
    }
}

impl NavigationOracle for TerrainGrid {
    fn try_find_navigable_point(
        &self,
        center: Vec3Fixed,
        radius: Fixed,
        area_mask: AreaMask,
    ) -> Option<Vec3Fixed> {
        let navigable =
            |cell: TerrainCell| cell.walkable && cell.area.is_some_and(|a| area_mask.contains(a));

        if let Some(cell) = self.cell_at(center) {
            if navigable(cell) {
                return Some(center.with_y(cell.height));
            }
        }

        let radius_sq = radius * radius;
        let (min_x, min_z, max_x, max_z) = self.cell_range(center, radius);
        let mut best: Option<(Fixed, Vec3Fixed)> = None;
        for z in min_z..=max_z {
            for x in min_x..=max_x {
                let cell = self.cells[self.coords_to_index(x, z)];
                if !navigable(cell) {
                    continue;
                }
                let candidate = self.cell_center(x, z);
                let dist_sq = candidate.horizontal_distance_squared(center);
                if dist_sq <= radius_sq && best.map_or(true, |(d, _)| dist_sq < d) {
                    best = Some((dist_sq, candidate));
                }
            }
        }

        best.map(|(_, point)| point)
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

    fn profile() -> MovementProfile {
        MovementProfile::new("test", Fixed::ONE)
    }

    #[test]
    fn test_area_mask() {
        let ground = TerrainAreaId(0);
        let water = TerrainAreaId(3);
        let mask = AreaMask::of(ground);
        assert!(mask.contains(ground));
        assert!(!mask.contains(water));
        assert!(mask.union(AreaMask::of(water)).contains(water));
        assert!(AreaMask::ALL.intersects(mask));
        assert!(!AreaMask::NONE.intersects(mask));
        assert_eq!(AreaMask::of(TerrainAreaId(40)), AreaMask::NONE);
    }

    #[test]
    fn test_centered_grid_coordinates() {
        let grid = TerrainGrid::centered(10, fixed(1));
        assert_eq!(grid.world_to_grid(point(0, 0)), Some((5, 5)));
        assert_eq!(grid.world_to_grid(point(-5, -5)), Some((0, 0)));
        assert_eq!(grid.world_to_grid(point(5, 0)), None);
        assert_eq!(grid.world_to_grid(point(-6, 0)), None);
    }

    #[test]
    fn test_sample_height_adds_profile_offset() {
        let mut grid = TerrainGrid::centered(4, fixed(1));
        grid.edit_disc(point(0, 0), fixed(10), |c| c.height = fixed(3));

        let mut flyer = profile();
        flyer.height_offset = fixed(5);
        assert_eq!(grid.sample_height(point(0, 0), &profile()), fixed(3));
        assert_eq!(grid.sample_height(point(0, 0), &flyer), fixed(8));
    }

    #[test]
    fn test_navigable_point_prefers_the_query_point() {
        let grid = TerrainGrid::centered(10, fixed(1));
        let found = grid.try_find_navigable_point(point(1, 1), fixed(1), AreaMask::ALL);
        assert_eq!(found, Some(point(1, 1)));
    }

    #[test]
    fn test_navigable_point_searches_within_radius() {
        let mut grid = TerrainGrid::centered(10, fixed(1));
        grid.edit_disc(point(0, 0), fixed(1), |c| c.walkable = false);

        assert!(grid
            .try_find_navigable_point(point(0, 0), Fixed::ONE / fixed(4), AreaMask::ALL)
            .is_none());

        let found = grid
            .try_find_navigable_point(point(0, 0), fixed(2), AreaMask::ALL)
            .expect("walkable cell within radius");
        assert!(found.horizontal_distance(point(0, 0)) <= fixed(2));
        assert!(grid.cell_at(found).is_some_and(|c| c.walkable));
    }

    #[test]
    fn test_navigable_point_respects_area_mask() {
        let grid = TerrainGrid::centered(4, fixed(1));
        let water_only = AreaMask::of(TerrainAreaId(1));
        assert!(grid
            .try_find_navigable_point(point(0, 0), fixed(3), water_only)
            .is_none());
    }

    #[test]
    fn test_area_restricted_position_moves_to_allowed_area() {
        let mut grid = TerrainGrid::centered(10, fixed(1));
        grid.edit_disc(point(0, 0), fixed(2), |c| c.area = Some(TerrainAreaId(1)));

        let ground = AreaMask::of(TerrainAreaId(0));
        let restricted = grid.area_restricted_position(point(0, 0), ground);
        assert_ne!(restricted, point(0, 0));
        assert!(grid
            .cell_at(restricted)
            .and_then(|c| c.area)
            .is_some_and(|a| ground.contains(a)));

        let anywhere = grid.area_restricted_position(point(0, 0), AreaMask::ALL);
        assert_eq!(anywhere, point(0, 0));
    }

    #[test]
    fn test_raycast_down() {
        let mut grid = TerrainGrid::centered(4, fixed(1));
        let hole = Vec3Fixed::new(Fixed::from_num(1.5), fixed(5), Fixed::from_num(1.5));
        grid.edit_disc(hole, Fixed::ONE / fixed(4), |c| c.area = None);

        let origin = Vec3Fixed::new(fixed(0), fixed(5), fixed(0));
        let hit = grid.raycast_down(origin, fixed(10)).expect("surface below");
        assert_eq!(hit.point.y, Fixed::ZERO);
        assert_eq!(hit.area, TerrainAreaId(0));

        assert!(grid.raycast_down(origin, fixed(2)).is_none());
        assert!(grid.raycast_down(hole, fixed(10)).is_none());
        let off_map = Vec3Fixed::new(fixed(50), fixed(5), fixed(0));
        assert!(grid.raycast_down(off_map, fixed(10)).is_none());
    }
}
