//! Data-driven command effects.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::command::{CommandId, RunId};
use crate::error::Result;
use crate::modifier::Modifier;
use crate::resource::ResourceId;
use crate::world::{StackRef, World};

/// What an action knows about the run that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionContext {
    /// Command being run.
    pub command: CommandId,
    /// Run handle.
    pub run: RunId,
    /// Quantity multiplier captured when the run started.
    pub multiplier: f64,
}

/// Code-declared effect.
#[derive(Clone)]
pub struct Effect(Rc<dyn Fn(&mut World, &ActionContext) -> Result<()>>);

impl Effect {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&mut World, &ActionContext) -> Result<()> + 'static) -> Self {
        Self(Rc::new(f))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Effect(..)")
    }
}

/// Side effect attached to a command transition.
///
/// # Example RON
///
/// ```ron
/// SetModifier(
///     stack: CommandQuantity("find_fish_solo"),
///     key: "well_fed",
///     modifier: (name: "Well Fed", amount: 1.2, operation: "*", serialize: true),
///     scale_by_multiplier: true,
///     lasts_for_cooldown: true,
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandAction {
    /// Add `amount * multiplier` to a resource.
    GiveResource {
        /// Resource to credit.
        resource: ResourceId,
        /// Amount per unit of multiplier.
        amount: f64,
    },
    /// Install a modifier on any stack.
    SetModifier {
        /// Target stack.
        stack: StackRef,
        /// Entry key.
        key: String,
        /// Modifier to install.
        modifier: Modifier,
        /// Multiply the modifier amount by the run multiplier.
        #[serde(default)]
        scale_by_multiplier: bool,
        /// Give the modifier a duration equal to the issuing command's
        /// current cooldown time.
        #[serde(default)]
        lasts_for_cooldown: bool,
    },
    /// Remove a modifier from a stack.
    RemoveModifier {
        /// Target stack.
        stack: StackRef,
        /// Entry key.
        key: String,
    },
    /// Run actions in order, stopping at the first failure.
    Sequence(Vec<CommandAction>),
    /// Arbitrary code-declared effect. Not representable in content files.
    #[serde(skip)]
    Custom(Effect),
}

impl CommandAction {
    /// Build a custom effect.
    pub fn custom(f: impl Fn(&mut World, &ActionContext) -> Result<()> + 'static) -> Self {
        Self::Custom(Effect::new(f))
    }

    /// Credit a resource.
    #[must_use]
    pub fn give(resource: impl Into<String>, amount: f64) -> Self {
        Self::GiveResource {
            resource: ResourceId::new(resource),
            amount,
        }
    }

    /// Apply the action to the world.
    ///
    /// # Errors
    ///
    /// Not-found errors for unknown resources, commands or stacks, and
    /// [`GameError::NoQuantityModifiers`](crate::error::GameError::NoQuantityModifiers)
    /// when targeting a missing quantity stack.
    pub fn execute(&self, world: &mut World, ctx: &ActionContext) -> Result<()> {
        match self {
            Self::GiveResource { resource, amount } => {
                world.resource_mut(resource)?.add(amount * ctx.multiplier);
            }
            Self::SetModifier {
                stack,
                key,
                modifier,
                scale_by_multiplier,
                lasts_for_cooldown,
            } => {
                let mut modifier = modifier.clone();
                if *scale_by_multiplier {
                    modifier.amount *= ctx.multiplier;
                }
                if *lasts_for_cooldown {
                    modifier.duration = Some(world.command(&ctx.command)?.cooldown_time());
                }
                world.set_modifier(stack, key.clone(), modifier)?;
            }
            Self::RemoveModifier { stack, key } => {
                world.delete_modifier(stack, key)?;
            }
            Self::Sequence(actions) => {
                for action in actions {
                    action.execute(world, ctx)?;
                }
            }
            Self::Custom(effect) => (effect.0)(world, ctx)?,
        }
        Ok(())
    }

    /// Resources this action credits.
    #[must_use]
    pub fn referenced_resources(&self) -> Vec<&ResourceId> {
        let mut found = Vec::new();
        self.walk(&mut |action| {
            if let Self::GiveResource { resource, .. } = action {
                found.push(resource);
            }
        });
        found
    }

    /// Stacks this action touches.
    #[must_use]
    pub fn referenced_stacks(&self) -> Vec<&StackRef> {
        let mut found = Vec::new();
        self.walk(&mut |action| match action {
            Self::SetModifier { stack, .. } | Self::RemoveModifier { stack, .. } => {
                found.push(stack);
            }
            _ => {}
        });
        found
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        if let Self::Sequence(actions) = self {
            for action in actions {
                action.walk(visit);
            }
        } else {
            visit(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOptions;
    use crate::modifier::Operation;
    use crate::resource::ResourceOptions;

    fn world() -> World {
        let mut world = World::new();
        world
            .register_resource(ResourceOptions::new("fish", "Fish", 100.0))
            .unwrap();
        world
            .register_command(
                CommandOptions::new("eat", "Eat", 1.0)
                    .with_cooldown(4.0)
                    .with_quantity_modifiers(),
            )
            .unwrap();
        world
    }

    fn ctx(multiplier: f64) -> ActionContext {
        ActionContext {
            command: CommandId::from("eat"),
            run: RunId(0),
            multiplier,
        }
    }

    #[test]
    fn test_give_scales_by_multiplier() {
        let mut world = world();
        CommandAction::give("fish", 2.0)
            .execute(&mut world, &ctx(3.0))
            .unwrap();
        assert_eq!(world.resource(&"fish".into()).unwrap().amount(), 6.0);
    }

    #[test]
    fn test_set_modifier_for_cooldown() {
        let mut world = world();
        let action = CommandAction::SetModifier {
            stack: StackRef::CommandQuantity(CommandId::from("eat")),
            key: "well_fed".into(),
            modifier: Modifier::new("Well Fed", 1.2, Operation::Mul),
            scale_by_multiplier: true,
            lasts_for_cooldown: true,
        };
        action.execute(&mut world, &ctx(2.0)).unwrap();

        let command = world.command(&"eat".into()).unwrap();
        let installed = command.quantity_modifiers().unwrap().get("well_fed").unwrap();
        assert!((installed.amount - 2.4).abs() < 1e-12);
        assert_eq!(installed.duration, Some(4.0));
    }

    #[test]
    fn test_sequence_stops_at_first_failure() {
        let mut world = world();
        let action = CommandAction::Sequence(vec![
            CommandAction::give("fish", 1.0),
            CommandAction::give("gold", 1.0),
            CommandAction::give("fish", 1.0),
        ]);
        assert!(action.execute(&mut world, &ctx(1.0)).is_err());
        assert_eq!(world.resource(&"fish".into()).unwrap().amount(), 1.0);
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let mut world = world();
        let action = CommandAction::RemoveModifier {
            stack: StackRef::ResourceGeneration(ResourceId::from("fish")),
            key: "nothing".into(),
        };
        assert!(action.execute(&mut world, &ctx(1.0)).is_ok());
    }

    #[test]
    fn test_custom_effect() {
        let mut world = world();
        let action = CommandAction::custom(|world, ctx| {
            world.resource_mut(&"fish".into())?.set_amount(ctx.multiplier * 10.0);
            Ok(())
        });
        action.execute(&mut world, &ctx(1.5)).unwrap();
        assert_eq!(world.resource(&"fish".into()).unwrap().amount(), 15.0);
    }

    #[test]
    fn test_references_walk_sequences() {
        let action = CommandAction::Sequence(vec![
            CommandAction::give("fish", 1.0),
            CommandAction::RemoveModifier {
                stack: StackRef::CommandSpeed(CommandId::from("eat")),
                key: "x".into(),
            },
        ]);
        assert_eq!(action.referenced_resources(), vec![&ResourceId::from("fish")]);
        assert_eq!(action.referenced_stacks().len(), 1);
    }
}
