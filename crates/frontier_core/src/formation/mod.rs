//! Movement formations and path-destination generation.
//!
//! A formation handler turns a target point into a sequence of candidate
//! destinations, one ring (circular) or one row (row) per call. The
//! dispatch loop in [`generate_path_destinations`] keeps calling the
//! handler until enough destinations are found, switching to the
//! handler's fallback formation when a handler keeps coming up empty.
//!
//! # Determinism
//!
//! Candidates are visited in a fixed order, all math is fixed-point and
//! every map in this module is a `BTreeMap`, so identical inputs always
//! produce identical destination lists.

mod circular;
mod row;

use std::collections::{BTreeMap, BTreeSet};

pub use circular::CircularFormationHandler;
pub use row::RowFormationHandler;

use crate::error::{GameError, MovementError, Result};
use crate::math::{Fixed, Vec3Fixed};
use crate::movement::{MovementProfile, TargetData};
use crate::spatial::SpatialQuery;
use crate::terrain::TerrainSampler;

/// Float property: spacing between agents.
pub const SPACING: &str = "spacing";
/// Float property: lateral spacing inside a row (falls back to `spacing`).
pub const HORIZONTAL_SPACING: &str = "horizontal_spacing";
/// Float property: spacing between rows (falls back to `spacing`).
pub const VERTICAL_SPACING: &str = "vertical_spacing";
/// Int property: positions per row.
pub const AMOUNT_PER_ROW: &str = "amount_per_row";

// ============================================================================
// Formation Types
// ============================================================================

/// Named, immutable formation definition with default property values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementFormationType {
    code: String,
    float_properties: BTreeMap<String, Fixed>,
    int_properties: BTreeMap<String, i32>,
}

impl MovementFormationType {
    /// Create a formation type without properties.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            float_properties: BTreeMap::new(),
            int_properties: BTreeMap::new(),
        }
    }

    /// Add a default float property.
    #[must_use]
    pub fn with_float(mut self, name: impl Into<String>, value: Fixed) -> Self {
        self.float_properties.insert(name.into(), value);
        self
    }

    /// Add a default int property.
    #[must_use]
    pub fn with_int(mut self, name: impl Into<String>, value: i32) -> Self {
        self.int_properties.insert(name.into(), value);
        self
    }

    /// Formation code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Default value of a float property.
    #[must_use]
    pub fn float_property(&self, name: &str) -> Option<Fixed> {
        self.float_properties.get(name).copied()
    }

    /// Default value of an int property.
    #[must_use]
    pub fn int_property(&self, name: &str) -> Option<i32> {
        self.int_properties.get(name).copied()
    }
}

/// A formation choice plus caller-supplied property overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementFormationSelector {
    formation: String,
    float_overrides: BTreeMap<String, Fixed>,
    int_overrides: BTreeMap<String, i32>,
}

impl MovementFormationSelector {
    /// Select a formation by code, without overrides.
    #[must_use]
    pub fn new(formation: impl Into<String>) -> Self {
        Self {
            formation: formation.into(),
            float_overrides: BTreeMap::new(),
            int_overrides: BTreeMap::new(),
        }
    }

    /// Override a float property.
    #[must_use]
    pub fn with_float_override(mut self, name: impl Into<String>, value: Fixed) -> Self {
        self.float_overrides.insert(name.into(), value);
        self
    }

    /// Override an int property.
    #[must_use]
    pub fn with_int_override(mut self, name: impl Into<String>, value: i32) -> Self {
        self.int_overrides.insert(name.into(), value);
        self
    }

    /// Same overrides, different formation.
    #[must_use]
    pub fn with_formation(&self, formation: impl Into<String>) -> Self {
        Self {
            formation: formation.into(),
            ..self.clone()
        }
    }

    /// Selected formation code.
    #[must_use]
    pub fn formation(&self) -> &str {
        &self.formation
    }

    /// Resolve a float property.
    ///
    /// Lookup order: override of `name`, override of `fallback`, formation
    /// default of `name`, formation default of `fallback`.
    #[must_use]
    pub fn float_value(
        &self,
        formation: &MovementFormationType,
        name: &str,
        fallback: Option<&str>,
    ) -> Option<Fixed> {
        resolve(
            &self.float_overrides,
            |key| formation.float_property(key),
            name,
            fallback,
        )
    }

    /// Resolve an int property with the same lookup order as [`Self::float_value`].
    #[must_use]
    pub fn int_value(
        &self,
        formation: &MovementFormationType,
        name: &str,
        fallback: Option<&str>,
    ) -> Option<i32> {
        resolve(
            &self.int_overrides,
            |key| formation.int_property(key),
            name,
            fallback,
        )
    }
}

fn resolve<T: Copy>(
    overrides: &BTreeMap<String, T>,
    defaults: impl Fn(&str) -> Option<T>,
    name: &str,
    fallback: Option<&str>,
) -> Option<T> {
    overrides
        .get(name)
        .or_else(|| fallback.and_then(|f| overrides.get(f)))
        .copied()
        .or_else(|| defaults(name))
        .or_else(|| fallback.and_then(|f| defaults(f)))
}

// ============================================================================
// Generation Input & State
// ============================================================================

/// Extra per-candidate predicate supplied by the caller.
pub type CandidateFilter<'a> = &'a dyn Fn(Vec3Fixed) -> bool;

/// Input bundle for one path-destination generation call.
#[derive(Clone, Copy)]
pub struct PathDestinationInput<'a> {
    /// Reference agent whose size and areas drive the search.
    pub profile: &'a MovementProfile,
    /// Target with an up-to-date position.
    pub target: TargetData,
    /// Approach direction used to orient the formation.
    pub direction: Vec3Fixed,
    /// Formation choice and overrides.
    pub selector: &'a MovementFormationSelector,
    /// Whether the request comes from a player command.
    pub player_command: bool,
    /// Checked right after height correction.
    pub validity: Option<CandidateFilter<'a>>,
    /// Checked last, on the navigation-corrected point.
    pub condition: Option<CandidateFilter<'a>>,
}

impl PathDestinationInput<'_> {
    fn is_valid(&self, candidate: Vec3Fixed) -> bool {
        self.validity.map_or(true, |f| f(candidate))
    }

    fn meets_condition(&self, candidate: Vec3Fixed) -> bool {
        self.condition.map_or(true, |f| f(candidate))
    }
}

/// Mutable search state threaded through successive handler calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    /// Destinations still needed.
    pub remaining: usize,
    /// Current ring radius (circular) or row depth (row).
    pub offset: Fixed,
    /// Accepted destinations, in generation order.
    pub destinations: Vec<Vec3Fixed>,
}

impl SearchState {
    /// Start a search for `amount` destinations at `offset`.
    #[must_use]
    pub fn new(amount: usize, offset: Fixed) -> Self {
        Self {
            remaining: amount,
            offset,
            destinations: Vec::with_capacity(amount),
        }
    }

    fn accept(&mut self, destination: Vec3Fixed) {
        self.destinations.push(destination);
        self.remaining = self.remaining.saturating_sub(1);
    }
}

/// Collaborators a handler needs to validate candidates.
#[derive(Clone, Copy)]
pub struct FormationEnv<'a> {
    /// Terrain sampler for height correction.
    pub terrain: &'a dyn TerrainSampler,
    /// Navigation and reservation checks.
    pub spatial: SpatialQuery<'a>,
}

/// Run one candidate through the validation pipeline.
///
/// Returns `Ok(true)` if it was accepted. Only a terminal error is
/// propagated; every other failure just skips the candidate.
fn try_accept_candidate(
    candidate: Vec3Fixed,
    input: &PathDestinationInput<'_>,
    state: &mut SearchState,
    env: &FormationEnv<'_>,
) -> std::result::Result<bool, MovementError> {
    let candidate = candidate.with_y(env.terrain.sample_height(candidate, input.profile));

    if !input.is_valid(candidate) {
        return Ok(false);
    }

    let profile = input.profile;
    match env.spatial.is_position_clear(
        candidate,
        profile.radius,
        profile.nav_areas,
        profile.terrain_areas,
        input.player_command,
    ) {
        Ok(corrected) if input.meets_condition(corrected) => {
            state.accept(corrected);
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(err) if err.is_terminal() => Err(err),
        Err(_) => Ok(false),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Settings shared by every formation handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Formation this handler generates.
    pub formation: MovementFormationType,
    /// Empty calls tolerated before falling back.
    pub max_empty_attempts: u32,
    /// Formation to switch to when this one fails.
    pub fallback: Option<String>,
}

impl HandlerSettings {
    /// Settings without a fallback.
    #[must_use]
    pub fn new(formation: MovementFormationType, max_empty_attempts: u32) -> Self {
        Self {
            formation,
            max_empty_attempts,
            fallback: None,
        }
    }

    /// Set the fallback formation.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

/// Strategy generating formation destinations around a target.
pub trait FormationHandler {
    /// Formation generated by this handler.
    fn formation(&self) -> &MovementFormationType;

    /// Empty calls tolerated before the dispatch loop falls back.
    fn max_empty_attempts(&self) -> u32;

    /// Formation to switch to on failure.
    fn fallback_formation(&self) -> Option<&str>;

    /// Generate one ring/row of destinations.
    ///
    /// Appends accepted points to `state.destinations`, decrements
    /// `state.remaining` per point and advances `state.offset`. Returns the
    /// number of points accepted by this call.
    fn generate_path_destinations(
        &self,
        input: &PathDestinationInput<'_>,
        state: &mut SearchState,
        env: &FormationEnv<'_>,
    ) -> std::result::Result<usize, MovementError>;
}

/// Read a required float property, logging when it is missing.
fn required_float(
    input: &PathDestinationInput<'_>,
    formation: &MovementFormationType,
    name: &str,
    fallback: Option<&str>,
) -> std::result::Result<Fixed, MovementError> {
    input
        .selector
        .float_value(formation, name, fallback)
        .ok_or_else(|| {
            tracing::error!(
                formation = formation.code(),
                profile = %input.profile.code,
                property = name,
                "Formation property is missing"
            );
            MovementError::Invalid
        })
}

/// Formation handlers keyed by formation code.
#[derive(Default)]
pub struct FormationRegistry {
    handlers: BTreeMap<String, Box<dyn FormationHandler>>,
}

impl std::fmt::Debug for FormationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormationRegistry")
            .field("formations", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FormationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its formation code.
    ///
    /// # Errors
    ///
    /// Fails if a handler for the same formation is already registered.
    pub fn register(&mut self, handler: Box<dyn FormationHandler>) -> Result<()> {
        let code = handler.formation().code().to_string();
        if self.handlers.contains_key(&code) {
            return Err(GameError::InvalidConfig(vec![format!(
                "Formation '{code}' has more than one handler"
            )]));
        }
        self.handlers.insert(code, handler);
        Ok(())
    }

    /// Handler for a formation code.
    #[must_use]
    pub fn get(&self, formation: &str) -> Option<&dyn FormationHandler> {
        self.handlers.get(formation).map(|h| h.as_ref())
    }

    /// Registered formation codes, sorted.
    pub fn formations(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// Slack on the carried-over separation check, absorbing rotation rounding.
const SEPARATION_SLACK: Fixed = Fixed::from_bits(1 << 22);

/// Generate up to `amount` destinations, falling back between formations.
///
/// Each formation is attempted at most once per call, so fallback cycles
/// terminate. Destinations accepted before a fallback are kept, and the
/// fallback only fills the remaining slots, skipping candidates closer than
/// `radius + spacing` to a kept point. A partial list is returned only when
/// no untried fallback is left.
///
/// # Errors
///
/// Returns [`MovementError::Invalid`] for an unregistered formation, the
/// last handler error, or [`MovementError::TargetPositionNotFound`] when
/// the empty-attempt budget ran out without a usable fallback and nothing
/// was found.
pub fn generate_path_destinations(
    registry: &FormationRegistry,
    input: &PathDestinationInput<'_>,
    amount: usize,
    offset: Fixed,
    env: &FormationEnv<'_>,
) -> std::result::Result<Vec<Vec3Fixed>, MovementError> {
    if amount == 0 {
        return Ok(Vec::new());
    }

    let mut selector = input.selector.clone();
    let mut state = SearchState::new(amount, offset);
    let mut attempted: BTreeSet<String> = BTreeSet::new();
    let mut empty_attempts = 0u32;
    // Destinations carried over from formations already given up on.
    let mut kept: Vec<Vec3Fixed> = Vec::new();

    loop {
        let Some(handler) = registry.get(selector.formation()) else {
            tracing::error!(
                formation = selector.formation(),
                profile = %input.profile.code,
                "No handler registered for formation"
            );
            return Err(MovementError::Invalid);
        };
        attempted.insert(selector.formation().to_string());

        let gap = input.profile.radius
            + selector
                .float_value(handler.formation(), SPACING, None)
                .unwrap_or(Fixed::ZERO)
            - SEPARATION_SLACK;
        let min_distance_squared = if gap > Fixed::ZERO {
            gap * gap
        } else {
            Fixed::ZERO
        };
        let caller_condition = input.condition;
        let apart_from_kept = |candidate: Vec3Fixed| {
            caller_condition.map_or(true, |f| f(candidate))
                && kept
                    .iter()
                    .all(|p| p.horizontal_distance_squared(candidate) >= min_distance_squared)
        };
        let apart_from_kept: CandidateFilter<'_> = &apart_from_kept;
        let call_input = PathDestinationInput {
            selector: &selector,
            condition: if kept.is_empty() {
                caller_condition
            } else {
                Some(apart_from_kept)
            },
            ..*input
        };
        #[cfg(feature = "debug-validation")]
        let offset_before = state.offset;

        let failure = match handler.generate_path_destinations(&call_input, &mut state, env) {
            Ok(generated) => {
                #[cfg(feature = "debug-validation")]
                debug_assert!(
                    state.remaining == 0 || state.offset > offset_before,
                    "formation offset must grow after a completed call"
                );
                if state.remaining == 0 {
                    return Ok(state.destinations);
                }
                if generated == 0 {
                    empty_attempts += 1;
                }
                if generated > 0 || empty_attempts < handler.max_empty_attempts() {
                    continue;
                }
                MovementError::TargetPositionNotFound
            }
            Err(err) => err,
        };

        match handler.fallback_formation() {
            Some(fallback) if !attempted.contains(fallback) => {
                tracing::debug!(
                    from = selector.formation(),
                    to = fallback,
                    kept = state.destinations.len(),
                    ?failure,
                    "Switching to fallback formation"
                );
                selector = selector.with_formation(fallback);
                kept.clone_from(&state.destinations);
                state.offset = offset;
                empty_attempts = 0;
            }
            _ if !state.destinations.is_empty() => {
                tracing::debug!(
                    formation = selector.formation(),
                    found = state.destinations.len(),
                    requested = amount,
                    ?failure,
                    "Returning partial formation"
                );
                return Ok(state.destinations);
            }
            _ => return Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn wedge() -> MovementFormationType {
        MovementFormationType::new("wedge")
            .with_float(SPACING, fixed(2))
            .with_int(AMOUNT_PER_ROW, 3)
    }

    #[test]
    fn test_selector_prefers_override() {
        let selector = MovementFormationSelector::new("wedge").with_float_override(SPACING, fixed(5));
        assert_eq!(selector.float_value(&wedge(), SPACING, None), Some(fixed(5)));
    }

    #[test]
    fn test_selector_fallback_name_override_beats_type_default() {
        let selector = MovementFormationSelector::new("wedge").with_float_override(SPACING, fixed(7));
        assert_eq!(
            selector.float_value(&wedge(), HORIZONTAL_SPACING, Some(SPACING)),
            Some(fixed(7))
        );
    }

    #[test]
    fn test_selector_uses_type_defaults() {
        let selector = MovementFormationSelector::new("wedge");
        assert_eq!(selector.float_value(&wedge(), SPACING, None), Some(fixed(2)));
        assert_eq!(
            selector.float_value(&wedge(), VERTICAL_SPACING, Some(SPACING)),
            Some(fixed(2))
        );
        assert_eq!(selector.int_value(&wedge(), AMOUNT_PER_ROW, None), Some(3));
        assert_eq!(selector.float_value(&wedge(), "missing", None), None);
    }

    #[test]
    fn test_with_formation_keeps_overrides() {
        let selector = MovementFormationSelector::new("wedge").with_int_override(AMOUNT_PER_ROW, 9);
        let switched = selector.with_formation("circle");
        assert_eq!(switched.formation(), "circle");
        assert_eq!(switched.int_value(&wedge(), AMOUNT_PER_ROW, None), Some(9));
    }

    #[test]
    fn test_search_state_accept() {
        let mut state = SearchState::new(2, Fixed::ZERO);
        state.accept(Vec3Fixed::ZERO);
        state.accept(Vec3Fixed::ZERO);
        state.accept(Vec3Fixed::ZERO);
        assert_eq!(state.remaining, 0);
        assert_eq!(state.destinations.len(), 3);
    }

    #[test]
    fn test_registry_rejects_duplicate_formation() {
        let mut registry = FormationRegistry::new();
        let settings = HandlerSettings::new(wedge(), 3);
        registry
            .register(Box::new(CircularFormationHandler::new(settings.clone())))
            .expect("first registration");
        assert!(registry
            .register(Box::new(RowFormationHandler::new(settings)))
            .is_err());
        assert_eq!(registry.formations().collect::<Vec<_>>(), vec!["wedge"]);
    }
}
