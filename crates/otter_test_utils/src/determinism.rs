//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation produces
//! identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Sources of non-determinism in an idle simulation include:
//!
//! - **Wall-clock time**: The world only moves through its virtual clock,
//!   so identical `advance` calls fire identical timers.
//!
//! - **HashMap iteration order**: Stacks fold in priority order with ties
//!   broken by insertion order, and saves are written in key order.
//!
//! - **Timer ties**: Timers sharing a deadline fire in scheduling order.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual folds and transitions
//! 2. **Property tests**: Random stacks still fold reproducibly
//! 3. **Integration tests**: Full scenarios are reproducible

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use otter_core::persistence::MemoryStore;
use otter_core::world::World;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
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

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `steps` - Number of steps to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one step
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for n in 0..steps {
            step(&mut state, n);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Hash everything a save would contain, plus the clock.
///
/// # Panics
///
/// Panics if the world cannot be encoded.
#[must_use]
pub fn world_hash(world: &World) -> u64 {
    let mut store = MemoryStore::new();
    world
        .save_to(&mut store)
        .expect("world state should encode");
    let entries: Vec<(&str, &str)> = store.iter().collect();
    compute_hash(&(entries, world.ticker().now_millis()))
}

/// Run a world setup twice, advancing by `step_seconds` each step and
/// letting `drive` issue commands, and compare the final hashes.
pub fn verify_world_determinism<Setup, Drive>(
    setup: Setup,
    steps: u64,
    step_seconds: f64,
    drive: Drive,
) -> DeterminismResult
where
    Setup: Fn() -> World,
    Drive: Fn(&mut World, u64),
{
    verify_determinism(
        2,
        steps,
        setup,
        |world, n| {
            drive(world, n);
            world.advance(step_seconds);
        },
        world_hash,
    )
}

/// Compare two runs step by step, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs agree throughout, `Some(step)` if they diverge
/// after that step.
pub fn find_first_divergence<Setup, Drive>(
    setup: Setup,
    steps: u64,
    step_seconds: f64,
    drive: Drive,
) -> Option<u64>
where
    Setup: Fn() -> World,
    Drive: Fn(&mut World, u64),
{
    let mut first = setup();
    let mut second = setup();

    if world_hash(&first) != world_hash(&second) {
        return Some(0);
    }

    for n in 1..=steps {
        for world in [&mut first, &mut second] {
            drive(world, n);
            world.advance(step_seconds);
        }
        if world_hash(&first) != world_hash(&second) {
            return Some(n);
        }
    }

    None
}

/// Verify that saving and loading into a freshly set-up world preserves
/// everything a save contains.
///
/// Only the saved state is compared. The restored world's clock is left
/// at zero; its play time comes back from the save.
///
/// # Panics
///
/// Panics if the world cannot be encoded.
pub fn verify_save_round_trip<Setup>(setup: Setup, seconds: f64) -> bool
where
    Setup: Fn() -> World,
{
    let mut world = setup();
    world.advance(seconds);

    let mut store = MemoryStore::new();
    world
        .save_to(&mut store)
        .expect("world state should encode");

    let mut restored = setup();
    let report = restored.load_from(&store);
    if !report.skipped.is_empty() {
        return false;
    }

    let mut again = MemoryStore::new();
    restored
        .save_to(&mut again)
        .expect("world state should encode");
    store == again
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for modifier and resource testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the fold and clamping.
pub mod strategies {
    use otter_core::modifier::{Modifier, Operation};
    use proptest::prelude::*;

    /// One of the five supported operations.
    pub fn arb_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            Just(Operation::Add),
            Just(Operation::Sub),
            Just(Operation::Mul),
            Just(Operation::Div),
            Just(Operation::Pow),
        ]
    }

    /// Any operation, including zero operands and the unrecognized tag.
    pub fn arb_any_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![arb_operation(), Just(Operation::Unrecognized)]
    }

    /// A modifier with small amounts and a handful of priority levels, so
    /// ties are common.
    pub fn arb_modifier() -> impl Strategy<Value = Modifier> {
        (
            arb_any_operation(),
            -4.0f64..4.0,
            prop_oneof![Just(1.0f64), 0.5f64..3.0],
            -2i32..3,
            any::<bool>(),
        )
            .prop_map(|(operation, amount, quantity, priority, serialize)| {
                let mut modifier = Modifier::new("arb", amount, operation)
                    .with_quantity(quantity)
                    .with_priority(f64::from(priority));
                modifier.serialize = serialize;
                modifier
            })
    }

    /// Keyed entries for a stack; keys may repeat to exercise replacement.
    pub fn arb_entries() -> impl Strategy<Value = Vec<(String, Modifier)>> {
        prop::collection::vec(("[a-e]", arb_modifier()), 0..12)
    }

    /// A base value in a reasonable range.
    pub fn arb_base() -> impl Strategy<Value = f64> {
        -1000.0f64..1000.0
    }
}
