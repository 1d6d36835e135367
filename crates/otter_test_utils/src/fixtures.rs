//! Test fixtures and helpers.
//!
//! Pre-built worlds and content for consistent testing.

use otter_core::prelude::*;

/// The otter game's content file.
pub const OTTER_CONTENT_RON: &str = include_str!("../../../assets/data/otter.ron");

/// Parse the otter game's content.
///
/// # Panics
///
/// Panics if the bundled content file does not parse.
#[must_use]
pub fn otter_content() -> ContentData {
    ContentData::from_ron(OTTER_CONTENT_RON, "assets/data/otter.ron")
        .expect("bundled otter content should parse")
}

/// A world with the otter game's content installed.
///
/// # Panics
///
/// Panics if the bundled content fails validation.
#[must_use]
pub fn otter_world() -> World {
    let mut world = World::new();
    otter_content()
        .install(&mut world)
        .expect("bundled otter content should install");
    world
}

/// A world holding one resource with the given ceiling.
///
/// # Panics
///
/// Never; the world is empty before registration.
#[must_use]
pub fn world_with_resource(id: &str, max: f64) -> World {
    let mut world = World::new();
    world
        .register_resource(ResourceOptions::new(id, id, max))
        .expect("fresh world has no resources");
    world
}

/// Set a resource's amount.
///
/// # Panics
///
/// Panics if the resource is not registered.
pub fn set_amount(world: &mut World, id: &str, amount: f64) {
    world
        .resource_mut(&ResourceId::from(id))
        .expect("resource should be registered")
        .set_amount(amount);
}

/// Read a resource's amount.
///
/// # Panics
///
/// Panics if the resource is not registered.
#[must_use]
pub fn amount(world: &World, id: &str) -> f64 {
    world
        .resource(&ResourceId::from(id))
        .expect("resource should be registered")
        .amount()
}

/// Advance in `step` increments until `seconds` have passed.
pub fn advance_in_steps(world: &mut World, seconds: f64, step: f64) {
    let steps = (seconds / step).round() as u64;
    for _ in 0..steps {
        world.advance(step);
    }
}
