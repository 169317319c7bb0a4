//! Formation planning from the command line.
//!
//! Lines up a group of agents behind the target on an open map, runs one
//! group plan and reports where every agent ended up.

use frontier_core::components::{EntityId, EntityPositions};
use frontier_core::data::MovementConfig;
use frontier_core::formation::{MovementFormationSelector, SPACING};
use frontier_core::math::{Fixed, Vec3Fixed};
use frontier_core::movement::{
    MovementAgent, MovementComponent, MovementManager, MovementSource, TargetData,
};
use frontier_core::spatial::ReservationGrid;
use frontier_core::terrain::{AreaMask, TerrainGrid};
use serde::Serialize;

use crate::error::ToolError;

/// Cell size of the reservation grid.
const RESERVATION_CELL: i32 = 4;

/// A circular obstacle on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obstacle {
    /// Centre x.
    pub x: Fixed,
    /// Centre z.
    pub z: Fixed,
    /// Radius.
    pub radius: Fixed,
}

/// One planning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    /// Formation every agent uses.
    pub formation: String,
    /// Number of agents.
    pub agents: u32,
    /// Agent radius.
    pub radius: Fixed,
    /// Target point (x, z).
    pub target: (Fixed, Fixed),
    /// Distance behind the target at which the agents start.
    pub start_distance: Fixed,
    /// Initial offset radius.
    pub offset: Fixed,
    /// Spacing override for every agent.
    pub spacing: Option<Fixed>,
    /// Obstacles to place before planning.
    pub obstacles: Vec<Obstacle>,
    /// Cells per side of the square map.
    pub map_cells: u32,
}

impl Default for PlanRequest {
    fn default() -> Self {
        Self {
            formation: "circle".to_string(),
            agents: 8,
            radius: Fixed::from_num(1),
            target: (Fixed::ZERO, Fixed::ZERO),
            start_distance: Fixed::from_num(10),
            offset: Fixed::ZERO,
            spacing: None,
            obstacles: Vec::new(),
            map_cells: 64,
        }
    }
}

/// Destination of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDestination {
    /// Agent id.
    pub entity: EntityId,
    /// Destination x, as a decimal.
    pub x: String,
    /// Destination z, as a decimal.
    pub z: String,
}

/// Outcome of a planning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    /// Formation planned.
    pub formation: String,
    /// Assigned destinations, in assignment order.
    pub destinations: Vec<PlannedDestination>,
    /// Agents left without a destination.
    pub interrupted: Vec<EntityId>,
    /// One line per failed group.
    pub failures: Vec<String>,
}

/// Parse a decimal fixed-point value.
pub fn parse_fixed(text: &str) -> Result<Fixed, String> {
    text.trim()
        .parse::<Fixed>()
        .map_err(|e| format!("'{text}' is not a decimal number: {e}"))
}

/// Parse an `x,z` point.
pub fn parse_point(text: &str) -> Result<(Fixed, Fixed), String> {
    match text.split(',').collect::<Vec<_>>().as_slice() {
        [x, z] => Ok((parse_fixed(x)?, parse_fixed(z)?)),
        _ => Err(format!("'{text}' is not an x,z point")),
    }
}

/// Parse an `x,z,radius` obstacle.
pub fn parse_obstacle(text: &str) -> Result<Obstacle, String> {
    match text.split(',').collect::<Vec<_>>().as_slice() {
        [x, z, radius] => Ok(Obstacle {
            x: parse_fixed(x)?,
            z: parse_fixed(z)?,
            radius: parse_fixed(radius)?,
        }),
        _ => Err(format!("'{text}' is not an x,z,radius obstacle")),
    }
}

/// Agents on a line `start_distance` behind the target (towards -z), centred on x.
fn line_up(request: &PlanRequest, selector: &MovementFormationSelector) -> Vec<MovementAgent> {
    let (target_x, target_z) = request.target;
    let count = Fixed::from_num(request.agents);
    let half_width = (count - Fixed::from_num(1)) / 2;
    (0..request.agents)
        .map(|i| {
            let x = target_x + Fixed::from_num(i) - half_width;
            let position = Vec3Fixed::flat(x, target_z - request.start_distance);
            MovementAgent::new(
                EntityId::from(i) + 1,
                "unit",
                position,
                request.radius,
                MovementComponent::new(selector.clone()),
            )
        })
        .collect()
}

/// Run one group plan.
///
/// # Errors
///
/// Returns an error if the config does not build or the formation is not
/// registered.
pub fn run_plan(config: &MovementConfig, request: &PlanRequest) -> Result<PlanReport, ToolError> {
    let registry = config.build_registry()?;
    if registry.get(&request.formation).is_none() {
        return Err(ToolError::InvalidArgument {
            name: "formation",
            message: format!("'{}' has no handler", request.formation),
        });
    }
    if request.agents == 0 {
        return Err(ToolError::InvalidArgument {
            name: "agents",
            message: "at least one agent is required".to_string(),
        });
    }
    if request.map_cells < 4 {
        return Err(ToolError::InvalidArgument {
            name: "map-size",
            message: "the map needs at least 4 cells per side".to_string(),
        });
    }

    let terrain = TerrainGrid::centered(request.map_cells, Fixed::from_num(1));
    let mut reservations = ReservationGrid::centered(
        request.map_cells / 4,
        Fixed::from_num(RESERVATION_CELL),
    );
    for obstacle in &request.obstacles {
        reservations.add_obstacle(
            Vec3Fixed::flat(obstacle.x, obstacle.z),
            obstacle.radius,
            AreaMask::ALL,
            false,
        );
    }
    let mut manager = MovementManager::new(
        registry,
        Box::new(terrain.clone()),
        Box::new(terrain),
        reservations,
    );

    let mut selector = MovementFormationSelector::new(request.formation.as_str());
    if let Some(spacing) = request.spacing {
        selector = selector.with_float_override(SPACING, spacing);
    }
    let mut agents = line_up(request, &selector);

    let (x, z) = request.target;
    let plan = manager.plan_group(
        &mut agents,
        TargetData::at(Vec3Fixed::flat(x, z)),
        request.offset,
        &MovementSource::player_command(),
        &EntityPositions::new(),
    );

    tracing::info!(
        formation = %request.formation,
        assigned = plan.assigned.len(),
        interrupted = plan.interrupted.len(),
        "Plan finished"
    );

    Ok(PlanReport {
        formation: request.formation.clone(),
        destinations: plan
            .assigned
            .iter()
            .map(|&(entity, destination)| PlannedDestination {
                entity,
                x: destination.x.to_string(),
                z: destination.z.to_string(),
            })
            .collect(),
        interrupted: plan.interrupted,
        failures: plan
            .failures
            .iter()
            .map(|f| format!("{} ({} agents): {}", f.code, f.members.len(), f.error))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontier_test_utils::fixtures::{fixed, fixed_f, standard_movement_config};

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_fixed(" 0.5 "), Ok(fixed_f(0.5)));
        assert!(parse_fixed("half").is_err());
        assert_eq!(parse_point("3,-4"), Ok((fixed(3), fixed(-4))));
        assert!(parse_point("3").is_err());
        assert_eq!(
            parse_obstacle("0,0,2"),
            Ok(Obstacle {
                x: fixed(0),
                z: fixed(0),
                radius: fixed(2),
            })
        );
        assert!(parse_obstacle("0,0").is_err());
    }

    #[test]
    fn test_plan_assigns_every_agent() {
        let request = PlanRequest {
            formation: "line".to_string(),
            agents: 6,
            ..PlanRequest::default()
        };
        let report = run_plan(&standard_movement_config(), &request).expect("plan");
        assert_eq!(report.destinations.len(), 6);
        assert!(report.interrupted.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_plan_rejects_unknown_formation() {
        let request = PlanRequest {
            formation: "wedge".to_string(),
            ..PlanRequest::default()
        };
        let result = run_plan(&standard_movement_config(), &request);
        assert!(matches!(
            result,
            Err(ToolError::InvalidArgument {
                name: "formation",
                ..
            })
        ));
    }

    #[test]
    fn test_plan_report_encodes_as_json() {
        let request = PlanRequest {
            agents: 1,
            ..PlanRequest::default()
        };
        let report = run_plan(&standard_movement_config(), &request).expect("plan");
        let json = serde_json::to_string(&report).expect("encode");
        assert!(json.contains("\"formation\":\"circle\""));
        assert!(json.contains("\"x\":\"0\""));
    }
}
