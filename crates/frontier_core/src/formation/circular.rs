//! Concentric-ring formation.

use crate::error::MovementError;
use crate::math::{Fixed, TAU};

use super::{
    required_float, try_accept_candidate, FormationEnv, FormationHandler, HandlerSettings,
    MovementFormationType, PathDestinationInput, SearchState, SPACING,
};

/// Places agents on rings of growing radius around the target.
///
/// Each call visits one ring of radius `offset`, then grows the offset by
/// `agent radius + spacing`. The number of slots on a ring is
/// `floor(circumference / (2 * (radius + spacing)))`, with a single slot
/// at the centre when the offset is zero.
#[derive(Debug, Clone)]
pub struct CircularFormationHandler {
    settings: HandlerSettings,
}

impl CircularFormationHandler {
    /// Create a circular handler.
    #[must_use]
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }

    /// Slots on a ring of `offset` for a given step.
    fn slot_count(offset: Fixed, step: Fixed) -> usize {
        let slots = (TAU * offset / (step * Fixed::const_from_int(2)))
            .floor()
            .to_num::<i64>();
        let slots = usize::try_from(slots).unwrap_or(0);
        if slots == 0 && offset == Fixed::ZERO {
            1
        } else {
            slots
        }
    }
}

impl FormationHandler for CircularFormationHandler {
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
        let spacing = required_float(input, self.formation(), SPACING, None)?;
        let step = input.profile.radius + spacing;
        if step <= Fixed::ZERO {
            tracing::error!(
                formation = self.formation().code(),
                profile = %input.profile.code,
                %step,
                "Circular formation step must be positive"
            );
            return Err(MovementError::Invalid);
        }

        let slots = Self::slot_count(state.offset, step);
        let angle_step = if slots > 0 {
            TAU / Fixed::from_num(slots)
        } else {
            Fixed::ZERO
        };
        let radial = input
            .direction
            .horizontal_direction()
            .right()
            .scale(state.offset);

        let mut generated = 0;
        for slot in 0..slots {
            if state.remaining == 0 {
                break;
            }
            let angle = angle_step * Fixed::from_num(slot);
            let candidate = input.target.position + radial.rotate_y(angle);
            if try_accept_candidate(candidate, input, state, env)? {
                generated += 1;
            }
        }

        tracing::trace!(
            offset = %state.offset,
            slots,
            generated,
            "Circular formation ring"
        );
        state.offset += step;
        Ok(generated)
    }
}
