//! Movement requests and the path-destination planner.
//!
//! [`MovementManager`] turns "move these agents to that target" into one
//! destination per agent. Agents are grouped by movement code, each group
//! asks the formation dispatch loop for as many destinations as it has
//! members, and destinations are handed out closest-first. Every assigned
//! destination is reserved with a target-position marker so that later
//! groups and later requests steer around it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, PositionLookup};
use crate::error::MovementError;
use crate::formation::{
    self, FormationEnv, FormationRegistry, MovementFormationSelector, PathDestinationInput,
};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::spatial::{NavigationOracle, ReservationGrid, SpatialQuery};
use crate::terrain::{AreaMask, TerrainSampler};

// ============================================================================
// Agents
// ============================================================================

/// Read-only view of an agent used while generating destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementProfile {
    /// Movement code; agents sharing it move as one formation group.
    pub code: String,
    /// Agent radius.
    pub radius: Fixed,
    /// Navigation areas the agent can walk on.
    pub nav_areas: AreaMask,
    /// Terrain areas the agent can stand on.
    pub terrain_areas: AreaMask,
    /// Height added on top of the sampled terrain height.
    pub height_offset: Fixed,
}

impl MovementProfile {
    /// Profile allowed on every area, standing on the ground.
    #[must_use]
    pub fn new(code: impl Into<String>, radius: Fixed) -> Self {
        Self {
            code: code.into(),
            radius,
            nav_areas: AreaMask::ALL,
            terrain_areas: AreaMask::ALL,
            height_offset: Fixed::ZERO,
        }
    }
}

/// Lifecycle of an agent's current movement order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovementState {
    /// No order.
    #[default]
    Idle,
    /// Heading to an assigned destination.
    Moving,
    /// The last request left the agent without a destination.
    Interrupted,
}

/// Movement capability of an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementComponent {
    /// Whether the agent can move at all.
    pub enabled: bool,
    /// Rejects player-issued movement while set.
    pub player_command_locked: bool,
    /// Lower priorities are planned first.
    pub priority: i32,
    /// Preferred formation.
    pub formation: MovementFormationSelector,
    /// Navigation areas the agent can walk on.
    pub nav_areas: AreaMask,
    /// Terrain areas the agent can stand on.
    pub terrain_areas: AreaMask,
    /// Height added on top of the sampled terrain height.
    pub height_offset: Fixed,
    /// Assigned destination.
    pub destination: Option<Vec3Fixed>,
    /// Target of the current order.
    pub target: Option<TargetData>,
    /// Why the current order was issued.
    pub source: Option<MovementSource>,
    /// Order state.
    pub state: MovementState,
}

impl MovementComponent {
    /// Enabled component using `formation`, allowed on every area.
    #[must_use]
    pub fn new(formation: MovementFormationSelector) -> Self {
        Self {
            enabled: true,
            player_command_locked: false,
            priority: 0,
            formation,
            nav_areas: AreaMask::ALL,
            terrain_areas: AreaMask::ALL,
            height_offset: Fixed::ZERO,
            destination: None,
            target: None,
            source: None,
            state: MovementState::Idle,
        }
    }

    /// Set the planning priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Restrict the areas the agent may use.
    #[must_use]
    pub fn with_areas(mut self, nav_areas: AreaMask, terrain_areas: AreaMask) -> Self {
        self.nav_areas = nav_areas;
        self.terrain_areas = terrain_areas;
        self
    }
}

/// An entity taking part in a movement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementAgent {
    /// Entity id.
    pub id: EntityId,
    /// Movement code.
    pub code: String,
    /// Current position.
    pub position: Vec3Fixed,
    /// Agent radius.
    pub radius: Fixed,
    /// Movement capability.
    pub movement: MovementComponent,
}

impl MovementAgent {
    /// Create an agent.
    #[must_use]
    pub fn new(
        id: EntityId,
        code: impl Into<String>,
        position: Vec3Fixed,
        radius: Fixed,
        movement: MovementComponent,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            position,
            radius,
            movement,
        }
    }

    /// Profile consumed by the formation handlers.
    #[must_use]
    pub fn profile(&self) -> MovementProfile {
        MovementProfile {
            code: self.code.clone(),
            radius: self.radius,
            nav_areas: self.movement.nav_areas,
            terrain_areas: self.movement.terrain_areas,
            height_offset: self.movement.height_offset,
        }
    }

    /// Check the movement gate for a request from `source`.
    ///
    /// # Errors
    ///
    /// [`MovementError::Disabled`] if movement is off, or locked for player
    /// commands and `source` is one.
    pub fn can_move(&self, source: &MovementSource) -> Result<(), MovementError> {
        let movement = &self.movement;
        if !movement.enabled || (source.is_player_command() && movement.player_command_locked) {
            return Err(MovementError::Disabled);
        }
        Ok(())
    }
}

// ============================================================================
// Targets & Sources
// ============================================================================

/// Movement target: a tracked entity or a fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetData {
    /// Entity being followed, if any.
    pub instance: Option<EntityId>,
    /// Point to move to.
    pub position: Vec3Fixed,
    /// Point the order was originally issued at.
    pub op_position: Vec3Fixed,
}

impl TargetData {
    /// Target a fixed point.
    #[must_use]
    pub const fn at(position: Vec3Fixed) -> Self {
        Self {
            instance: None,
            position,
            op_position: position,
        }
    }

    /// Target an entity last seen at `position`.
    #[must_use]
    pub const fn entity(instance: EntityId, position: Vec3Fixed) -> Self {
        Self {
            instance: Some(instance),
            position,
            op_position: position,
        }
    }

    /// Copy with `position` refreshed from the target instance.
    ///
    /// # Errors
    ///
    /// [`MovementError::Invalid`] if the instance can no longer be found.
    pub fn refresh(self, positions: &dyn PositionLookup) -> Result<Self, MovementError> {
        let Some(instance) = self.instance else {
            return Ok(self);
        };
        match positions.position(instance) {
            Some(position) => Ok(Self { position, ..self }),
            None => {
                tracing::error!(target_entity = instance, "Movement target no longer exists");
                Err(MovementError::Invalid)
            }
        }
    }
}

/// Reasons a movement was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MovementSourceFlags(u8);

impl MovementSourceFlags {
    /// Issued directly by a player.
    pub const PLAYER_COMMAND: Self = Self(1 << 0);
    /// Part of an attack-move chain.
    pub const ATTACK_MOVE: Self = Self(1 << 1);
    /// Issued by a queued task.
    pub const FROM_TASK: Self = Self(1 << 2);
    /// Moving to enter a container.
    pub const ADD_TO_CONTAINER: Self = Self(1 << 3);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if all flags in `other` are set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of flags.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for MovementSourceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Horizontal disc destinations must stay inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeConstraint {
    /// Disc centre.
    pub center: Vec3Fixed,
    /// Disc radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

impl RangeConstraint {
    /// Whether `point` lies inside the disc (boundary included).
    #[must_use]
    pub fn contains(&self, point: Vec3Fixed) -> bool {
        self.center.horizontal_distance_squared(point) <= self.radius * self.radius
    }
}

/// Why a movement was requested, carried to every assigned agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementSource {
    /// Request flags.
    pub flags: MovementSourceFlags,
    /// Container the agents will enter on arrival.
    pub target_container: Option<EntityId>,
    /// Allowed destination range.
    pub range: Option<RangeConstraint>,
}

impl MovementSource {
    /// Source with the given flags and no metadata.
    #[must_use]
    pub const fn new(flags: MovementSourceFlags) -> Self {
        Self {
            flags,
            target_container: None,
            range: None,
        }
    }

    /// Direct player command.
    #[must_use]
    pub const fn player_command() -> Self {
        Self::new(MovementSourceFlags::PLAYER_COMMAND)
    }

    /// Set the container agents move into.
    #[must_use]
    pub const fn with_target_container(mut self, container: EntityId) -> Self {
        self.flags = self.flags.union(MovementSourceFlags::ADD_TO_CONTAINER);
        self.target_container = Some(container);
        self
    }

    /// Restrict destinations to a disc.
    #[must_use]
    pub const fn with_range(mut self, center: Vec3Fixed, radius: Fixed) -> Self {
        self.range = Some(RangeConstraint { center, radius });
        self
    }

    /// Whether the request was issued by a player.
    #[must_use]
    pub const fn is_player_command(&self) -> bool {
        self.flags.contains(MovementSourceFlags::PLAYER_COMMAND)
    }

    /// Whether `point` satisfies the range constraint, if any.
    #[must_use]
    pub fn is_in_range(&self, point: Vec3Fixed) -> bool {
        self.range.map_or(true, |range| range.contains(point))
    }
}

// ============================================================================
// Feedback
// ============================================================================

/// Audio/visual feedback for accepted move orders.
pub trait MovementFeedback {
    /// Called once per player move order to a free point.
    fn play_move_order_feedback(&mut self, entity: EntityId, destination: Vec3Fixed);
}

/// Feedback hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl MovementFeedback for NoFeedback {
    fn play_move_order_feedback(&mut self, _entity: EntityId, _destination: Vec3Fixed) {}
}

// ============================================================================
// Planner
// ============================================================================

/// Failure of one formation group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFailure {
    /// Movement code of the group.
    pub code: String,
    /// Members of the group, all interrupted.
    pub members: Vec<EntityId>,
    /// Why the group failed.
    pub error: MovementError,
}

/// Outcome of [`MovementManager::plan_group`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPlan {
    /// Agents with their assigned destination, in assignment order.
    pub assigned: Vec<(EntityId, Vec3Fixed)>,
    /// Agents left without a destination.
    pub interrupted: Vec<EntityId>,
    /// Agents rejected by the movement gate.
    pub disabled: Vec<EntityId>,
    /// Groups whose destination search failed.
    pub failures: Vec<GroupFailure>,
}

impl GroupPlan {
    /// Destination assigned to `entity`.
    #[must_use]
    pub fn destination_of(&self, entity: EntityId) -> Option<Vec3Fixed> {
        self.assigned
            .iter()
            .find(|(id, _)| *id == entity)
            .map(|(_, destination)| *destination)
    }
}

/// Plans movement destinations for single agents and groups.
pub struct MovementManager {
    registry: FormationRegistry,
    terrain: Box<dyn TerrainSampler>,
    navigation: Box<dyn NavigationOracle>,
    reservations: ReservationGrid,
    feedback: Box<dyn MovementFeedback>,
}

impl std::fmt::Debug for MovementManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovementManager")
            .field("registry", &self.registry)
            .field("reservations", &self.reservations.len())
            .finish_non_exhaustive()
    }
}

impl MovementManager {
    /// Create a planner without feedback.
    #[must_use]
    pub fn new(
        registry: FormationRegistry,
        terrain: Box<dyn TerrainSampler>,
        navigation: Box<dyn NavigationOracle>,
        reservations: ReservationGrid,
    ) -> Self {
        Self {
            registry,
            terrain,
            navigation,
            reservations,
            feedback: Box::new(NoFeedback),
        }
    }

    /// Install a move-order feedback hook.
    #[must_use]
    pub fn with_feedback(mut self, feedback: Box<dyn MovementFeedback>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Registered formations.
    #[must_use]
    pub fn registry(&self) -> &FormationRegistry {
        &self.registry
    }

    /// Reservation index (obstacles and destination markers).
    #[must_use]
    pub fn reservations(&self) -> &ReservationGrid {
        &self.reservations
    }

    /// Mutable reservation index, for adding and removing obstacles.
    pub fn reservations_mut(&mut self) -> &mut ReservationGrid {
        &mut self.reservations
    }

    /// Run the formation dispatch loop against this manager's world.
    ///
    /// # Errors
    ///
    /// See [`formation::generate_path_destinations`].
    pub fn generate_path_destinations(
        &self,
        input: &PathDestinationInput<'_>,
        amount: usize,
        offset: Fixed,
    ) -> Result<Vec<Vec3Fixed>, MovementError> {
        let env = FormationEnv {
            terrain: self.terrain.as_ref(),
            spatial: SpatialQuery::new(self.navigation.as_ref(), &self.reservations),
        };
        formation::generate_path_destinations(&self.registry, input, amount, offset, &env)
    }

    /// Plan the destination of one agent.
    ///
    /// With a zero `offset_radius` the target itself is used when it is
    /// clear. Otherwise the formation search runs and the nearest result
    /// to the agent wins.
    ///
    /// # Errors
    ///
    /// [`MovementError::Disabled`] from the movement gate,
    /// [`MovementError::Invalid`] for a vanished target, or the formation
    /// search error.
    pub fn plan_single(
        &mut self,
        agent: &mut MovementAgent,
        target: TargetData,
        offset_radius: Fixed,
        source: &MovementSource,
        positions: &dyn PositionLookup,
    ) -> Result<Vec3Fixed, MovementError> {
        agent.can_move(source)?;
        let mut target = target.refresh(positions)?;
        target.position = self
            .terrain
            .area_restricted_position(target.position, agent.movement.terrain_areas);

        self.reservations.toggle_marker(agent.id, false);

        let profile = agent.profile();
        let direction = (target.position - agent.position).horizontal_direction();
        let in_range = |point: Vec3Fixed| source.is_in_range(point);
        let input = PathDestinationInput {
            profile: &profile,
            target,
            direction,
            selector: &agent.movement.formation,
            player_command: source.is_player_command(),
            validity: Some(&in_range),
            condition: None,
        };

        let result = self
            .direct_destination(&input, offset_radius)
            .map_or_else(
                || {
                    self.generate_path_destinations(&input, SINGLE_CANDIDATES, offset_radius)
                        .and_then(|destinations| {
                            nearest(&destinations, agent.position)
                                .ok_or(MovementError::TargetPositionNotFound)
                        })
                },
                Ok,
            );

        match result {
            Ok(destination) => {
                self.assign(agent, destination, target, source);
                if source.is_player_command() && target.instance.is_none() {
                    self.feedback.play_move_order_feedback(agent.id, destination);
                }
                Ok(destination)
            }
            Err(err) => {
                self.reservations.toggle_marker(agent.id, true);
                tracing::debug!(entity = agent.id, code = %agent.code, ?err, "Single movement failed");
                Err(err)
            }
        }
    }

    /// Plan destinations for a group of agents.
    ///
    /// Agents are grouped by movement code and groups are planned in
    /// `(priority, code)` order, members closest to the target first.
    /// A failing group is recorded and the remaining groups still run.
    pub fn plan_group(
        &mut self,
        agents: &mut [MovementAgent],
        target: TargetData,
        offset_radius: Fixed,
        source: &MovementSource,
        positions: &dyn PositionLookup,
    ) -> GroupPlan {
        let mut plan = GroupPlan::default();

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, agent) in agents.iter().enumerate() {
            if agent.can_move(source).is_err() {
                plan.disabled.push(agent.id);
                continue;
            }
            groups.entry(agent.code.clone()).or_default().push(index);
        }

        let target = match target.refresh(positions) {
            Ok(target) => target,
            Err(err) => {
                for (code, members) in groups {
                    self.fail_group(agents, code, &members, err, &mut plan);
                }
                return plan;
            }
        };

        let mut ordered: Vec<(i32, String, Vec<usize>)> = groups
            .into_iter()
            .map(|(code, members)| (agents[members[0]].movement.priority, code, members))
            .collect();
        ordered.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        for (_, code, mut members) in ordered {
            let reference = &agents[members[0]];
            let mut group_target = target;
            group_target.position = self
                .terrain
                .area_restricted_position(target.position, reference.movement.terrain_areas);

            members.sort_by(|&a, &b| {
                let da = agents[a].position.horizontal_distance_squared(group_target.position);
                let db = agents[b].position.horizontal_distance_squared(group_target.position);
                da.cmp(&db).then(agents[a].id.cmp(&agents[b].id))
            });

            for &index in &members {
                self.reservations.toggle_marker(agents[index].id, false);
            }

            let reference = &agents[members[0]];
            let profile = reference.profile();
            let selector = reference.movement.formation.clone();
            let centroid = Vec3Fixed::centroid(members.iter().map(|&i| agents[i].position));
            let in_range = |point: Vec3Fixed| source.is_in_range(point);
            let input = PathDestinationInput {
                profile: &profile,
                target: group_target,
                direction: (group_target.position - centroid).horizontal_direction(),
                selector: &selector,
                player_command: source.is_player_command(),
                validity: Some(&in_range),
                condition: None,
            };

            let destinations =
                match self.generate_path_destinations(&input, members.len(), offset_radius) {
                    Ok(destinations) => destinations,
                    Err(err) => {
                        self.fail_group(agents, code, &members, err, &mut plan);
                        continue;
                    }
                };

            let assignments = if group_target.instance.is_some() {
                assign_nearest_first(agents, &members, destinations)
            } else {
                assign_in_order(&members, &destinations)
            };

            for (slot, &index) in members.iter().enumerate() {
                match assignments.get(slot).copied().flatten() {
                    Some(destination) => {
                        self.assign(&mut agents[index], destination, group_target, source);
                        plan.assigned.push((agents[index].id, destination));
                    }
                    None => {
                        self.interrupt(&mut agents[index]);
                        plan.interrupted.push(agents[index].id);
                    }
                }
            }

            let left_over = members.len() - assignments.iter().flatten().count();
            if left_over > 0 {
                tracing::debug!(code = %code, left_over, "Group members interrupted");
            }
        }

        if source.is_player_command() && target.instance.is_none() {
            if let Some(&(entity, destination)) = plan.assigned.first() {
                self.feedback.play_move_order_feedback(entity, destination);
            }
        }

        plan
    }

    /// The target itself, when no offset is requested and it is usable.
    fn direct_destination(
        &self,
        input: &PathDestinationInput<'_>,
        offset_radius: Fixed,
    ) -> Option<Vec3Fixed> {
        if offset_radius != Fixed::ZERO {
            return None;
        }
        let position = input.target.position;
        if !input.validity.map_or(true, |valid| valid(position)) {
            return None;
        }
        let profile = input.profile;
        SpatialQuery::new(self.navigation.as_ref(), &self.reservations)
            .is_position_clear(
                position,
                profile.radius,
                profile.nav_areas,
                profile.terrain_areas,
                input.player_command,
            )
            .ok()
    }

    fn assign(
        &mut self,
        agent: &mut MovementAgent,
        destination: Vec3Fixed,
        target: TargetData,
        source: &MovementSource,
    ) {
        self.reservations.place_marker(
            agent.id,
            destination,
            agent.radius,
            agent.movement.terrain_areas,
        );
        let movement = &mut agent.movement;
        movement.destination = Some(destination);
        movement.target = Some(target);
        movement.source = Some(*source);
        movement.state = MovementState::Moving;
    }

    fn interrupt(&mut self, agent: &mut MovementAgent) {
        self.reservations.toggle_marker(agent.id, true);
        agent.movement.destination = None;
        agent.movement.state = MovementState::Interrupted;
    }

    fn fail_group(
        &mut self,
        agents: &mut [MovementAgent],
        code: String,
        members: &[usize],
        error: MovementError,
        plan: &mut GroupPlan,
    ) {
        tracing::warn!(code = %code, members = members.len(), ?error, "Formation group failed");
        let mut ids = Vec::with_capacity(members.len());
        for &index in members {
            self.interrupt(&mut agents[index]);
            plan.interrupted.push(agents[index].id);
            ids.push(agents[index].id);
        }
        plan.failures.push(GroupFailure {
            code,
            members: ids,
            error,
        });
    }
}

/// Point of `points` nearest to `origin`; the first one wins ties.
/// Candidates generated for a single agent, which then takes the nearest.
const SINGLE_CANDIDATES: usize = 8;

fn nearest(points: &[Vec3Fixed], origin: Vec3Fixed) -> Option<Vec3Fixed> {
    points
        .iter()
        .copied()
        .enumerate()
        .min_by_key(|(index, point)| (point.horizontal_distance_squared(origin), *index))
        .map(|(_, point)| point)
}

/// Each member, in order, takes the nearest remaining destination.
fn assign_nearest_first(
    agents: &[MovementAgent],
    members: &[usize],
    mut pool: Vec<Vec3Fixed>,
) -> Vec<Option<Vec3Fixed>> {
    members
        .iter()
        .map(|&index| {
            let origin = agents[index].position;
            let best = pool
                .iter()
                .enumerate()
                .min_by_key(|(slot, point)| (point.horizontal_distance_squared(origin), *slot))
                .map(|(slot, _)| slot)?;
            Some(pool.remove(best))
        })
        .collect()
}

/// Members take destinations in generation order, keeping the formation shape.
fn assign_in_order(members: &[usize], destinations: &[Vec3Fixed]) -> Vec<Option<Vec3Fixed>> {
    (0..members.len())
        .map(|slot| destinations.get(slot).copied())
        .collect()
}
