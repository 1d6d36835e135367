//! Save and restore through a flat key-value store.
//!
//! Each registry is written as one JSON object under its own key:
//!
//! - `resources`: resource id to [`ResourceSnapshot`]
//! - `commands`: command id to [`CommandSnapshot`]
//! - `timePlayed`: play time in seconds
//!
//! Loading is isolated per entity. A missing or unparsable snapshot leaves
//! that entity fresh and is reported in [`LoadReport::skipped`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::command::{CommandId, CommandSnapshot};
use crate::error::{GameError, Result};
use crate::resource::{ResourceId, ResourceSnapshot};
use crate::world::{StackRef, World};

/// Key holding resource snapshots.
pub const RESOURCES_KEY: &str = "resources";
/// Key holding command snapshots.
pub const COMMANDS_KEY: &str = "commands";
/// Key holding play time.
pub const TIME_PLAYED_KEY: &str = "timePlayed";

/// Flat string key-value storage.
pub trait SaveStore {
    /// Read the value at `key`; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// [`GameError::Persistence`] when the backing storage fails.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value at `key`.
    ///
    /// # Errors
    ///
    /// [`GameError::Persistence`] when the backing storage fails.
    fn write(&mut self, key: &str, value: String) -> Result<()>;
}

/// In-memory [`SaveStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value at `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl SaveStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: String) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// What [`World::load_from`] restored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Resources restored from a snapshot.
    pub restored_resources: Vec<ResourceId>,
    /// Commands restored from a snapshot.
    pub restored_commands: Vec<CommandId>,
    /// Entities left fresh, with the reason.
    pub skipped: Vec<String>,
    /// Restored play time.
    pub time_played: Option<f64>,
}

pub(crate) fn write_time_played(store: &mut dyn SaveStore, seconds: f64) -> Result<()> {
    store.write(TIME_PLAYED_KEY, encode(TIME_PLAYED_KEY, &seconds)?)
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| GameError::Persistence {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Read and parse the object at `key`. Absent and corrupt blobs both
/// yield an empty map; corruption is logged.
fn read_object(store: &dyn SaveStore, key: &str, report: &mut LoadReport) -> Map<String, Value> {
    let text = match store.read(key) {
        Ok(Some(text)) => text,
        Ok(None) => return Map::new(),
        Err(err) => {
            tracing::warn!(key, error = %err, "Could not read saved state");
            report.skipped.push(format!("{key}: {err}"));
            return Map::new();
        }
    };
    match serde_json::from_str::<Map<String, Value>>(&text) {
        Ok(map) => map,
        Err(err) => {
            tracing::warn!(key, error = %err, "Discarding corrupt saved state");
            report.skipped.push(format!("{key}: {err}"));
            Map::new()
        }
    }
}

impl World {
    /// Write every registry and the play time to `store`.
    ///
    /// # Errors
    ///
    /// [`GameError::Persistence`] when encoding or the store fails.
    pub fn save_to(&self, store: &mut dyn SaveStore) -> Result<()> {
        let resources: BTreeMap<&ResourceId, ResourceSnapshot> = self
            .resources()
            .iter()
            .map(|r| (r.id(), r.snapshot()))
            .collect();
        let commands: BTreeMap<&CommandId, CommandSnapshot> = self
            .commands()
            .iter()
            .map(|c| (c.id(), c.snapshot()))
            .collect();

        store.write(RESOURCES_KEY, encode(RESOURCES_KEY, &resources)?)?;
        store.write(COMMANDS_KEY, encode(COMMANDS_KEY, &commands)?)?;
        write_time_played(store, self.time_played())?;
        tracing::debug!(
            resources = resources.len(),
            commands = commands.len(),
            "Saved world"
        );
        Ok(())
    }

    /// Restore registered entities from `store`.
    ///
    /// Call after content is registered. Saved modifiers merge under the
    /// declared ones (declared entries win on key collision) and restored
    /// timed modifiers resume counting down. Saved ids that are not
    /// registered are ignored.
    pub fn load_from(&mut self, store: &dyn SaveStore) -> LoadReport {
        let mut report = LoadReport::default();

        let mut saved = read_object(store, RESOURCES_KEY, &mut report);
        let ids: Vec<ResourceId> = self.resources().iter().map(|r| r.id().clone()).collect();
        for id in ids {
            let Some(value) = saved.remove(id.as_str()) else {
                continue;
            };
            let snapshot: ResourceSnapshot = match serde_json::from_value(value) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!(resource = %id, error = %err, "Discarding corrupt resource snapshot");
                    report.skipped.push(format!("resource {id}: {err}"));
                    continue;
                }
            };
            let Ok(resource) = self.resource_mut(&id) else {
                continue;
            };
            let keys = resource.restore_from(snapshot);
            self.start_countdowns(&StackRef::ResourceMax(id.clone()), &keys.max);
            self.start_countdowns(&StackRef::ResourceGeneration(id.clone()), &keys.generation);
            report.restored_resources.push(id);
        }
        for id in saved.keys() {
            tracing::warn!(resource = %id, "Ignoring saved state for unknown resource");
        }

        let mut saved = read_object(store, COMMANDS_KEY, &mut report);
        let ids: Vec<CommandId> = self.commands().iter().map(|c| c.id().clone()).collect();
        for id in ids {
            let Some(value) = saved.remove(id.as_str()) else {
                continue;
            };
            let snapshot: CommandSnapshot = match serde_json::from_value(value) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!(command = %id, error = %err, "Discarding corrupt command snapshot");
                    report.skipped.push(format!("command {id}: {err}"));
                    continue;
                }
            };
            let Ok(command) = self.command_mut(&id) else {
                continue;
            };
            let keys = command.restore_from(snapshot);
            self.start_countdowns(&StackRef::CommandSpeed(id.clone()), &keys.speed);
            self.start_countdowns(&StackRef::CommandCooldown(id.clone()), &keys.cooldown);
            self.start_countdowns(&StackRef::CommandQuantity(id.clone()), &keys.quantity);
            self.refresh_availability(&id);
            report.restored_commands.push(id);
        }
        for id in saved.keys() {
            tracing::warn!(command = %id, "Ignoring saved state for unknown command");
        }

        match store.read(TIME_PLAYED_KEY) {
            Ok(Some(text)) => match serde_json::from_str::<f64>(&text) {
                Ok(seconds) => {
                    self.set_time_played(seconds);
                    report.time_played = Some(self.time_played());
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Discarding corrupt play time");
                    report.skipped.push(format!("{TIME_PLAYED_KEY}: {err}"));
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Could not read play time");
                report.skipped.push(format!("{TIME_PLAYED_KEY}: {err}"));
            }
        }

        tracing::debug!(
            resources = report.restored_resources.len(),
            commands = report.restored_commands.len(),
            skipped = report.skipped.len(),
            "Loaded world"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOptions;
    use crate::modifier::{Modifier, Operation};
    use crate::resource::ResourceOptions;

    fn world() -> World {
        let mut world = World::new();
        world
            .register_resource(
                ResourceOptions::new("fish", "Fish", 100.0).with_generation_modifier(
                    "hunger",
                    Modifier::new("Hunger", 0.03, Operation::Sub)
                        .with_priority(0.0)
                        .serialized(),
                ),
            )
            .unwrap();
        world
            .register_resource(ResourceOptions::new("wood", "Wood", 50.0))
            .unwrap();
        world
            .register_command(CommandOptions::new("fish_solo", "Fish", 0.2).with_quantity_modifiers())
            .unwrap();
        world
    }

    #[test]
    fn test_save_writes_every_key() {
        let mut world = world();
        world.resource_mut(&"fish".into()).unwrap().set_amount(12.0);
        let mut store = MemoryStore::new();
        world.save_to(&mut store).unwrap();

        let resources: Value = serde_json::from_str(store.get(RESOURCES_KEY).unwrap()).unwrap();
        assert_eq!(resources["fish"]["amount"], 12.0);
        assert_eq!(
            resources["fish"]["generationModifiers"]["hunger"]["operation"],
            "-"
        );
        assert!(store.get(COMMANDS_KEY).is_some());
        assert_eq!(store.get(TIME_PLAYED_KEY), Some("0.0"));
    }

    #[test]
    fn test_corrupt_resource_is_isolated() {
        let mut store = MemoryStore::new();
        store
            .write(
                RESOURCES_KEY,
                r#"{"fish": {"amount": "lots"}, "wood": {"amount": 7.0, "amountEverObtained": 9.0}}"#
                    .to_string(),
            )
            .unwrap();

        let mut world = world();
        let report = world.load_from(&store);

        assert_eq!(report.restored_resources, vec![ResourceId::from("wood")]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(world.resource(&"fish".into()).unwrap().amount(), 0.0);
        assert_eq!(world.resource(&"wood".into()).unwrap().amount(), 7.0);
        assert_eq!(
            world.resource(&"wood".into()).unwrap().amount_ever_obtained(),
            9.0
        );
    }

    #[test]
    fn test_out_of_range_amounts_are_clamped_on_load() {
        let mut store = MemoryStore::new();
        store
            .write(
                RESOURCES_KEY,
                r#"{"fish": {"amount": -50.0, "amountEverObtained": -3.0}, "wood": {"amount": 900.0, "amountEverObtained": 900.0}}"#
                    .to_string(),
            )
            .unwrap();

        let mut world = world();
        let report = world.load_from(&store);
        assert!(report.skipped.is_empty());

        let fish = world.resource(&"fish".into()).unwrap();
        assert_eq!(fish.amount(), 0.0);
        assert_eq!(fish.amount_ever_obtained(), 0.0);
        let wood = world.resource(&"wood".into()).unwrap();
        assert_eq!(wood.amount(), 50.0);
        assert_eq!(wood.amount_ever_obtained(), 900.0);
    }

    #[test]
    fn test_corrupt_blob_starts_fresh() {
        let mut store = MemoryStore::new();
        store.write(RESOURCES_KEY, "{{{".to_string()).unwrap();
        store.write(TIME_PLAYED_KEY, "12.5".to_string()).unwrap();

        let mut world = world();
        let report = world.load_from(&store);
        assert!(report.restored_resources.is_empty());
        assert_eq!(report.time_played, Some(12.5));
        assert_eq!(world.time_played(), 12.5);
    }

    #[test]
    fn test_restored_timed_modifier_keeps_counting_down() {
        let mut source = world();
        source
            .set_modifier(
                &StackRef::CommandQuantity("fish_solo".into()),
                "well_fed",
                Modifier::new("Well Fed", 1.2, Operation::Mul)
                    .serialized()
                    .with_duration(0.35),
            )
            .unwrap();
        let mut store = MemoryStore::new();
        source.save_to(&mut store).unwrap();

        let mut world = world();
        let report = world.load_from(&store);
        assert_eq!(report.restored_commands, vec![CommandId::from("fish_solo")]);
        let stack = StackRef::CommandQuantity("fish_solo".into());
        assert!(world.stack(&stack).unwrap().contains_key("well_fed"));

        world.advance(0.4);
        assert!(!world.stack(&stack).unwrap().contains_key("well_fed"));
    }

    #[test]
    fn test_autosave_to_attached_store() {
        let mut world = world();
        world.attach_store(Box::new(MemoryStore::new()));
        world.resource_mut(&"wood".into()).unwrap().set_amount(3.0);
        world.advance(0.1);

        let store = world.detach_store().unwrap();
        let text = store.read(RESOURCES_KEY).unwrap().unwrap();
        let resources: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(resources["wood"]["amount"], 3.0);
        assert!(store.read(TIME_PLAYED_KEY).unwrap().is_some());
    }
}
