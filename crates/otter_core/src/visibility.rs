//! Visibility predicates over world state.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::resource::ResourceId;
use crate::world::World;

/// Code-declared visibility test.
#[derive(Clone)]
pub struct Predicate(Rc<dyn Fn(&World) -> bool>);

impl Predicate {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&World) -> bool + 'static) -> Self {
        Self(Rc::new(f))
    }

    fn test(&self, world: &World) -> bool {
        (self.0)(world)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Pure predicate deciding whether an entity is exposed to the player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Visibility {
    /// Always visible.
    #[default]
    Always,
    /// Never visible.
    Never,
    /// Visible once any amount of the resource has ever been obtained.
    RequiresDiscovery(ResourceId),
    /// Visible once the resource's lifetime total reaches `amount`.
    EverObtainedAtLeast {
        /// Resource to read.
        resource: ResourceId,
        /// Threshold on the lifetime total.
        amount: f64,
    },
    /// Arbitrary code-declared test. Not representable in content files.
    #[serde(skip)]
    Custom(Predicate),
}

impl Visibility {
    /// Build a custom predicate.
    pub fn custom(f: impl Fn(&World) -> bool + 'static) -> Self {
        Self::Custom(Predicate::new(f))
    }

    /// Evaluate against current world state.
    ///
    /// A reference to an unregistered resource evaluates to `false`.
    #[must_use]
    pub fn evaluate(&self, world: &World) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::RequiresDiscovery(id) => lifetime_total(world, id).is_some_and(|total| total > 0.0),
            Self::EverObtainedAtLeast { resource, amount } => {
                lifetime_total(world, resource).is_some_and(|total| total >= *amount)
            }
            Self::Custom(predicate) => predicate.test(world),
        }
    }

    /// Resources this predicate reads, for content validation.
    #[must_use]
    pub fn referenced_resources(&self) -> Vec<&ResourceId> {
        match self {
            Self::RequiresDiscovery(id) => vec![id],
            Self::EverObtainedAtLeast { resource, .. } => vec![resource],
            Self::Always | Self::Never | Self::Custom(_) => Vec::new(),
        }
    }
}

fn lifetime_total(world: &World, id: &ResourceId) -> Option<f64> {
    match world.resource(id) {
        Ok(resource) => Some(resource.amount_ever_obtained()),
        Err(err) => {
            tracing::warn!(resource = %id, error = %err, "Visibility predicate read a missing resource");
            None
        }
    }
}
