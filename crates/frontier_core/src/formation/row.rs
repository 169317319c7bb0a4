//! Row (line) formation.

use crate::error::MovementError;
use crate::math::Fixed;

use super::{
    required_float, try_accept_candidate, FormationEnv, FormationHandler, HandlerSettings,
    MovementFormationType, PathDestinationInput, SearchState, AMOUNT_PER_ROW, HORIZONTAL_SPACING,
    SPACING, VERTICAL_SPACING,
};

/// Places agents in rows behind the target, centre-out.
///
/// Each call fills one row whose centre sits `offset` behind the target
/// along the approach direction. Slots alternate around the centre
/// (`0, +1, -1, +2, -2, ...`) in units of `radius + horizontal_spacing`.
/// After the row the offset grows by `radius + vertical_spacing`.
#[derive(Debug, Clone)]
pub struct RowFormationHandler {
    settings: HandlerSettings,
}

impl RowFormationHandler {
    /// Create a row handler.
    #[must_use]
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }

    /// Signed lateral slot for the `index`-th position of a row.
    fn lateral_slot(index: usize) -> i64 {
        let half = i64::try_from(index.div_ceil(2)).unwrap_or(i64::MAX);
        if index % 2 == 1 {
            half
        } else {
            -half
        }
    }

    fn invalid(&self, input: &PathDestinationInput<'_>, reason: &str) -> MovementError {
        tracing::error!(
            formation = self.formation().code(),
            profile = %input.profile.code,
            reason,
            "Row formation misconfigured"
        );
        MovementError::Invalid
    }
}

impl FormationHandler for RowFormationHandler {
    fn formation(&self) -> &MovementFormationType {
        &self.settings.formation
    }

    fn max_empty_attempts(&self) -> u32 {
        self.settings.max_empty_attempts
    }

    fn fallback_formation(&self) -> Option<&str> {
        self.settings.fallback.as_deref()
    }

    fn generate_path_destinations(
        &self,
        input: &PathDestinationInput<'_>,
        state: &mut SearchState,
        env: &FormationEnv<'_>,
    ) -> Result<usize, MovementError> {
        let per_row = input
            .selector
            .int_value(self.formation(), AMOUNT_PER_ROW, None)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| self.invalid(input, "amount_per_row must be at least 1"))?;

        let radius = input.profile.radius;
        let lateral_step =
            radius + required_float(input, self.formation(), HORIZONTAL_SPACING, Some(SPACING))?;
        let row_step =
            radius + required_float(input, self.formation(), VERTICAL_SPACING, Some(SPACING))?;
        if lateral_step <= Fixed::ZERO || row_step <= Fixed::ZERO {
            return Err(self.invalid(input, "row steps must be positive"));
        }

        let forward = input.direction.horizontal_direction();
        let right = forward.right();
        let row_center = input.target.position - forward.scale(state.offset);

        let mut generated = 0;
        for index in 0..per_row {
            if state.remaining == 0 {
                break;
            }
            let lateral = lateral_step * Fixed::from_num(Self::lateral_slot(index));
            let candidate = row_center + right.scale(lateral);
            if try_accept_candidate(candidate, input, state, env)? {
                generated += 1;
            }
        }

        tracing::trace!(offset = %state.offset, generated, "Row formation row");
        state.offset += row_step;
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formation::MovementFormationSelector;
    use crate::math::Vec3Fixed;
    use crate::movement::{MovementProfile, TargetData};
    use crate::spatial::{ReservationGrid, SpatialQuery};
    use crate::terrain::TerrainGrid;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn line(per_row: i32) -> RowFormationHandler {
        RowFormationHandler::new(HandlerSettings::new(
            MovementFormationType::new("line")
                .with_float(SPACING, fixed(1))
                .with_int(AMOUNT_PER_ROW, per_row),
            3,
        ))
    }

    fn run(
        handler: &RowFormationHandler,
        selector: &MovementFormationSelector,
        state: &mut SearchState,
    ) -> Result<usize, MovementError> {
        let terrain = TerrainGrid::centered(64, fixed(1));
        let reservations = ReservationGrid::centered(16, fixed(4));
        let profile = MovementProfile::new("infantry", fixed(1));
        let input = PathDestinationInput {
            profile: &profile,
            target: TargetData::at(Vec3Fixed::ZERO),
            direction: Vec3Fixed::FORWARD,
            selector,
            player_command: true,
            validity: None,
            condition: None,
        };
        let env = FormationEnv {
            terrain: &terrain,
            spatial: SpatialQuery::new(&terrain, &reservations),
        };
        handler.generate_path_destinations(&input, state, &env)
    }

    #[test]
    fn test_lateral_slots_alternate_from_centre() {
        let slots: Vec<i64> = (0..5).map(RowFormationHandler::lateral_slot).collect();
        assert_eq!(slots, vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn test_rows_fill_centre_out_then_step_back() {
        let selector = MovementFormationSelector::new("line");
        let mut state = SearchState::new(5, Fixed::ZERO);

        assert_eq!(run(&line(3), &selector, &mut state), Ok(3));
        assert_eq!(
            state.destinations,
            vec![
                Vec3Fixed::ZERO,
                Vec3Fixed::flat(fixed(2), Fixed::ZERO),
                Vec3Fixed::flat(fixed(-2), Fixed::ZERO),
            ]
        );
        assert_eq!(state.offset, fixed(2));

        assert_eq!(run(&line(3), &selector, &mut state), Ok(2));
        assert_eq!(state.destinations[3], Vec3Fixed::flat(Fixed::ZERO, fixed(-2)));
        assert_eq!(state.destinations[4], Vec3Fixed::flat(fixed(2), fixed(-2)));
        assert_eq!(state.remaining, 0);
    }

    #[test]
    fn test_spacing_overrides() {
        let selector = MovementFormationSelector::new("line")
            .with_float_override(HORIZONTAL_SPACING, fixed(3))
            .with_float_override(VERTICAL_SPACING, fixed(4));
        let mut state = SearchState::new(2, Fixed::ZERO);

        assert_eq!(run(&line(2), &selector, &mut state), Ok(2));
        assert_eq!(state.destinations[1], Vec3Fixed::flat(fixed(4), Fixed::ZERO));
        assert_eq!(state.offset, fixed(5));
    }

    #[test]
    fn test_empty_rows_are_invalid() {
        let selector = MovementFormationSelector::new("line");
        let mut state = SearchState::new(2, Fixed::ZERO);
        assert_eq!(
            run(&line(0), &selector, &mut state),
            Err(MovementError::Invalid)
        );
    }

    #[test]
    fn test_non_positive_step_is_invalid() {
        let selector =
            MovementFormationSelector::new("line").with_float_override(SPACING, fixed(-5));
        let mut state = SearchState::new(2, Fixed::ZERO);
        assert_eq!(
            run(&line(3), &selector, &mut state),
            Err(MovementError::Invalid)
        );
    }
}
