//! A game's resource and command declarations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::action::CommandAction;
use crate::command::{CommandId, CommandOptions};
use crate::error::{GameError, Result};
use crate::modifier::{KeyedModifier, Operation};
use crate::resource::{ResourceId, ResourceOptions};
use crate::world::{StackRef, World};

/// Every resource and command a game defines.
///
/// # Example RON
///
/// ```ron
/// ContentData(
///     resources: [
///         (id: "fish", name: "Fish", max: 3000.0),
///     ],
///     commands: [
///         (
///             id: "find_fish_solo",
///             name: "Find Fish",
///             time_required: 0.2,
///             has_quantity_modifiers: true,
///             finish_action: Some(GiveResource(resource: "fish", amount: 1.0)),
///         ),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentData {
    /// Resource declarations in registration order.
    #[serde(default)]
    pub resources: Vec<ResourceOptions>,
    /// Command declarations in registration order.
    #[serde(default)]
    pub commands: Vec<CommandOptions>,
}

impl ContentData {
    /// Parse content from RON. `label` names the source in errors.
    ///
    /// # Errors
    ///
    /// [`GameError::DataParseError`] on malformed input.
    pub fn from_ron(text: &str, label: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })
    }

    /// Find a resource declaration.
    #[must_use]
    pub fn get_resource(&self, id: &ResourceId) -> Option<&ResourceOptions> {
        self.resources.iter().find(|r| r.id == *id)
    }

    /// Find a command declaration.
    #[must_use]
    pub fn get_command(&self, id: &CommandId) -> Option<&CommandOptions> {
        self.commands.iter().find(|c| c.id == *id)
    }

    /// Check internal consistency.
    ///
    /// Checks for:
    /// - Duplicate ids
    /// - Costs, visibility predicates and actions naming unknown resources
    /// - Actions targeting unknown stacks or missing quantity stacks
    /// - Negative durations and unrecognized modifier operations
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.id.as_str()) {
                errors.push(format!("Duplicate resource id '{}'", resource.id));
            }
        }
        let mut seen = HashSet::new();
        for command in &self.commands {
            if !seen.insert(command.id.as_str()) {
                errors.push(format!("Duplicate command id '{}'", command.id));
            }
        }

        for resource in &self.resources {
            let owner = format!("Resource '{}'", resource.id);
            if !(resource.max.is_finite() && resource.max >= 0.0) {
                errors.push(format!("{owner} has invalid max {}", resource.max));
            }
            for referenced in resource.visible.referenced_resources() {
                self.check_resource(&owner, "is gated on", referenced, &mut errors);
            }
            check_modifiers(&owner, &resource.max_modifiers, &mut errors);
            check_modifiers(&owner, &resource.generation_modifiers, &mut errors);
        }

        for command in &self.commands {
            let owner = format!("Command '{}'", command.id);
            if !(command.time_required.is_finite() && command.time_required >= 0.0) {
                errors.push(format!(
                    "{owner} has invalid time_required {}",
                    command.time_required
                ));
            }
            if !(command.cooldown.is_finite() && command.cooldown >= 0.0) {
                errors.push(format!("{owner} has invalid cooldown {}", command.cooldown));
            }
            for (resource, amount) in &command.cost {
                self.check_resource(&owner, "costs", resource, &mut errors);
                if *amount < 0.0 {
                    errors.push(format!("{owner} has negative cost for '{resource}'"));
                }
            }
            for referenced in command.visible.referenced_resources() {
                self.check_resource(&owner, "is gated on", referenced, &mut errors);
            }
            if !command.has_quantity_modifiers && !command.quantity_modifiers.is_empty() {
                errors.push(format!(
                    "{owner} declares quantity modifiers without a quantity stack"
                ));
            }
            check_modifiers(&owner, &command.speed_modifiers, &mut errors);
            check_modifiers(&owner, &command.cooldown_modifiers, &mut errors);
            check_modifiers(&owner, &command.quantity_modifiers, &mut errors);

            let actions = [
                &command.start_action,
                &command.finish_action,
                &command.cooldown_start_action,
                &command.cooldown_finish_action,
            ];
            for action in actions.into_iter().flatten() {
                self.check_action(&owner, action, &mut errors);
            }
        }

        errors
    }

    /// Register every declaration into `world`, resources first.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidContent`] if [`validate`](Self::validate)
    /// reports problems, or any registration error.
    pub fn install(&self, world: &mut World) -> Result<()> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(GameError::InvalidContent(errors.join("; ")));
        }
        for resource in &self.resources {
            world.register_resource(resource.clone())?;
        }
        for command in &self.commands {
            world.register_command(command.clone())?;
        }
        tracing::info!(
            resources = self.resources.len(),
            commands = self.commands.len(),
            "Installed content"
        );
        Ok(())
    }

    fn check_resource(&self, owner: &str, relation: &str, id: &ResourceId, errors: &mut Vec<String>) {
        if self.get_resource(id).is_none() {
            errors.push(format!("{owner} {relation} unknown resource '{id}'"));
        }
    }

    fn check_action(&self, owner: &str, action: &CommandAction, errors: &mut Vec<String>) {
        for resource in action.referenced_resources() {
            self.check_resource(owner, "gives", resource, errors);
        }
        for stack in action.referenced_stacks() {
            match stack {
                StackRef::ResourceMax(id) | StackRef::ResourceGeneration(id) => {
                    self.check_resource(owner, "modifies", id, errors);
                }
                StackRef::CommandSpeed(id) | StackRef::CommandCooldown(id) => {
                    if self.get_command(id).is_none() {
                        errors.push(format!("{owner} modifies unknown command '{id}'"));
                    }
                }
                StackRef::CommandQuantity(id) => match self.get_command(id) {
                    Some(target) if !target.has_quantity_modifiers => errors.push(format!(
                        "{owner} modifies quantity of '{id}', which has no quantity stack"
                    )),
                    Some(_) => {}
                    None => errors.push(format!("{owner} modifies unknown command '{id}'")),
                },
            }
        }
    }
}

fn check_modifiers(owner: &str, modifiers: &[KeyedModifier], errors: &mut Vec<String>) {
    for entry in modifiers {
        if entry.modifier.operation == Operation::Unrecognized {
            errors.push(format!(
                "{owner} modifier '{}' has an unrecognized operation",
                entry.key
            ));
        }
        if entry.modifier.duration.is_some_and(|d| d < 0.0) {
            errors.push(format!("{owner} modifier '{}' has a negative duration", entry.key));
        }
    }
}
