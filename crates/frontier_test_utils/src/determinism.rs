//! Determinism testing utilities.
//!
//! Provides a harness for verifying that formation planning and territory
//! bookkeeping produce identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Planning results feed a lockstep simulation, so they must be 100%
//! deterministic. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`frontier_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Groups, borders and subscribers are kept in `BTreeMap`/`BTreeSet`.
//!
//! - **Tie-breaking**: Equal distances are resolved by entity id or
//!   generation index, never by container order.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual handlers and border operations
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full planning scenarios are reproducible
//! 4. **Parallel tests**: Running N plans on separate threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use frontier_core::math::Vec3Fixed;
use frontier_core::movement::GroupPlan;
use frontier_core::territory::TerritoryWorld;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps applied per run.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Run is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel runs.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final hash from each run.
    pub hashes: Vec<u64>,
    /// Number of runs.
    pub num_runs: usize,
}

impl ParallelRunResult {
    /// Check if all runs produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all runs matched.
    ///
    /// # Panics
    ///
    /// Panics if runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel runs diverged!\n\
                 Runs: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_runs,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a scenario multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the scenario
/// * `steps` - Number of steps to apply per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```ignore
/// use frontier_test_utils::determinism::verify_determinism;
/// use frontier_test_utils::fixtures::border_world;
///
/// let result = verify_determinism(
///     5,  // Run 5 times
///     10, // 10 steps each
///     || border_world(&owners).0,
///     |world| spawn_next_resource(world),
///     |world| world.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    if !is_deterministic {
        tracing::warn!(?hashes, "Determinism check failed");
    }

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Run `run` on `num_runs` scoped threads and collect the hashes.
///
/// # Panics
///
/// Panics if a run panics.
pub fn run_parallel_scoped<F>(run: F, num_runs: usize) -> ParallelRunResult
where
    F: Fn() -> u64 + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_runs).map(|_| s.spawn(&run)).collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("run panicked"))
            .collect()
    });

    ParallelRunResult { hashes, num_runs }
}

/// Compare two runs step-by-step, finding the first divergence.
///
/// Useful for debugging non-determinism by finding exactly when
/// two runs start to differ.
///
/// # Returns
///
/// `None` if the runs are deterministic, `Some(step)` if they diverge
/// at that step.
pub fn find_first_divergence<S, Setup, Step, HashFn>(
    setup: Setup,
    step: Step,
    hash: HashFn,
    steps: u64,
) -> Option<u64>
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut first = setup();
    let mut second = setup();

    if hash(&first) != hash(&second) {
        return Some(0);
    }

    for index in 1..=steps {
        step(&mut first, index);
        step(&mut second, index);

        if hash(&first) != hash(&second) {
            return Some(index);
        }
    }

    None
}

/// Verify that a snapshot round-trip preserves a territory world exactly.
pub fn verify_serialization_determinism(world: &TerritoryWorld) -> bool {
    let Ok(bytes) = world.serialize() else {
        return false;
    };
    let Ok(restored) = TerritoryWorld::deserialize(&bytes) else {
        return false;
    };

    restored.state_hash() == world.state_hash() && restored == *world
}

/// Hash of a group plan: assignments, interruptions and failures in order.
#[must_use]
pub fn plan_hash(plan: &GroupPlan) -> u64 {
    let mut hasher = DefaultHasher::new();
    plan.assigned.hash(&mut hasher);
    plan.interrupted.hash(&mut hasher);
    plan.disabled.hash(&mut hasher);
    for failure in &plan.failures {
        failure.code.hash(&mut hasher);
        failure.members.hash(&mut hasher);
        failure.error.hash(&mut hasher);
    }
    hasher.finish()
}

/// Hash of a destination list, in order.
#[must_use]
pub fn destinations_hash(destinations: &[Vec3Fixed]) -> u64 {
    compute_hash(&destinations)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of planners and borders.
pub mod strategies {
    use proptest::prelude::*;

    use frontier_core::math::{Fixed, Vec3Fixed};

    /// Generate a fixed-point coordinate inside the standard 64x64 test map.
    ///
    /// Range: -24 to 24, leaving room for a formation around the point.
    pub fn arb_map_coordinate() -> impl Strategy<Value = Fixed> {
        (-24i32..=24i32).prop_map(Fixed::from_num)
    }

    /// Generate a ground-level point inside the standard test map.
    pub fn arb_map_point() -> impl Strategy<Value = Vec3Fixed> {
        (arb_map_coordinate(), arb_map_coordinate()).prop_map(|(x, z)| Vec3Fixed::flat(x, z))
    }

    /// Generate a spacing between agents in quarter steps.
    ///
    /// Range: 0.25 to 3
    pub fn arb_spacing() -> impl Strategy<Value = Fixed> {
        (1i32..=12i32).prop_map(|quarters| Fixed::from_num(quarters) / 4)
    }

    /// Generate an agent radius in quarter steps.
    ///
    /// Range: 0.25 to 2
    pub fn arb_radius() -> impl Strategy<Value = Fixed> {
        (1i32..=8i32).prop_map(|quarters| Fixed::from_num(quarters) / 4)
    }

    /// Generate a starting offset radius.
    ///
    /// Range: 0 to 4
    pub fn arb_offset() -> impl Strategy<Value = Fixed> {
        (0i32..=4i32).prop_map(Fixed::from_num)
    }

    /// Generate a group size.
    pub fn arb_group_size(max: usize) -> impl Strategy<Value = usize> {
        1usize..=max
    }

    /// Generate a list of agent positions.
    pub fn arb_agent_positions(max_agents: usize) -> impl Strategy<Value = Vec<Vec3Fixed>> {
        proptest::collection::vec(arb_map_point(), 1..=max_agents)
    }
}
