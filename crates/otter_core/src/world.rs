//! The simulation world.
//!
//! [`World`] is the explicit context every component works against: it owns
//! the registries, the [`Ticker`], in-flight command runs and the optional
//! save store. Timers fire as [`TickTarget`]s and are dispatched here, so
//! every callback sees the whole world without any ambient global.
//!
//! Time only moves through [`World::advance`] (virtual clock) and
//! [`World::force_tick`] (catch-up); nothing here reads wall-clock time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{ActionContext, CommandAction};
use crate::command::{Blocked, Command, CommandId, CommandOptions, RunId, RunOutcome};
use crate::config::SimConfig;
use crate::error::{GameError, Result};
use crate::modifier::{Modifier, ModifierStack};
use crate::persistence::SaveStore;
use crate::registry::Registry;
use crate::resource::{Resource, ResourceId, ResourceOptions};
use crate::ticker::{seconds_to_millis, Fired, TickTarget, Ticker, TimerId};

/// Names one modifier stack in the world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackRef {
    /// A resource's max modifiers.
    ResourceMax(ResourceId),
    /// A resource's generation modifiers.
    ResourceGeneration(ResourceId),
    /// A command's speed modifiers.
    CommandSpeed(CommandId),
    /// A command's cooldown modifiers.
    CommandCooldown(CommandId),
    /// A command's quantity modifiers.
    CommandQuantity(CommandId),
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceMax(id) => write!(f, "{id}.max"),
            Self::ResourceGeneration(id) => write!(f, "{id}.generation"),
            Self::CommandSpeed(id) => write!(f, "{id}.speed"),
            Self::CommandCooldown(id) => write!(f, "{id}.cooldown"),
            Self::CommandQuantity(id) => write!(f, "{id}.quantity"),
        }
    }
}

/// One-shot callback fired at a run boundary.
pub type Completion = Box<dyn FnOnce(&mut World)>;

type Callback = Box<dyn FnMut(&mut World, f64)>;

struct ActiveRun {
    id: RunId,
    command: CommandId,
    multiplier: f64,
    on_finish: Option<Completion>,
    on_cooldown_finish: Option<Completion>,
}

/// The simulation: registries, scheduler and in-flight runs.
pub struct World {
    config: SimConfig,
    ticker: Ticker,
    resources: Registry<Resource>,
    commands: Registry<Command>,
    runs: Vec<ActiveRun>,
    next_run: u64,
    callbacks: Vec<(u64, Option<Callback>)>,
    next_callback: u64,
    store: Option<Box<dyn SaveStore>>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("now", &self.ticker.now())
            .field("resources", &self.resources.len())
            .field("commands", &self.commands.len())
            .field("runs", &self.runs.len())
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world with default cadences.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create an empty world. Play time starts being tracked immediately.
    #[must_use]
    pub fn with_config(config: SimConfig) -> Self {
        let mut world = Self {
            config,
            ticker: Ticker::new(),
            resources: Registry::new(),
            commands: Registry::new(),
            runs: Vec::new(),
            next_run: 0,
            callbacks: Vec::new(),
            next_callback: 0,
            store: None,
        };
        world.track(TickTarget::TimePlayed, world.config.time_played_interval);
        world
    }

    /// Active cadences.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The scheduler.
    #[must_use]
    pub const fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Current virtual time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.ticker.now()
    }

    /// Total play time in seconds.
    #[must_use]
    pub const fn time_played(&self) -> f64 {
        self.ticker.time_played()
    }

    pub(crate) fn set_time_played(&mut self, seconds: f64) {
        self.ticker.set_time_played(seconds);
    }

    /// Resource registry.
    #[must_use]
    pub const fn resources(&self) -> &Registry<Resource> {
        &self.resources
    }

    /// Command registry.
    #[must_use]
    pub const fn commands(&self) -> &Registry<Command> {
        &self.commands
    }

    /// Look up a resource.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unregistered id.
    pub fn resource(&self, id: &ResourceId) -> Result<&Resource> {
        self.resources.get_by_id(id)
    }

    /// Look up a resource mutably.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unregistered id.
    pub fn resource_mut(&mut self, id: &ResourceId) -> Result<&mut Resource> {
        self.resources.get_by_id_mut(id)
    }

    /// Look up a command.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unregistered id.
    pub fn command(&self, id: &CommandId) -> Result<&Command> {
        self.commands.get_by_id(id)
    }

    /// Look up a command mutably.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unregistered id.
    pub fn command_mut(&mut self, id: &CommandId) -> Result<&mut Command> {
        self.commands.get_by_id_mut(id)
    }

    /// Register a resource, install its declared modifiers and start
    /// ticking its generation and visibility.
    ///
    /// # Errors
    ///
    /// [`GameError::DuplicateId`] if the id is taken.
    pub fn register_resource(&mut self, options: ResourceOptions) -> Result<()> {
        let id = options.id.clone();
        self.resources.register(Resource::new(&options))?;

        for entry in options.max_modifiers {
            self.set_modifier(&StackRef::ResourceMax(id.clone()), entry.key, entry.modifier)?;
        }
        for entry in options.generation_modifiers {
            self.set_modifier(
                &StackRef::ResourceGeneration(id.clone()),
                entry.key,
                entry.modifier,
            )?;
        }

        self.track(
            TickTarget::Generation(id.clone()),
            self.config.generation_interval,
        );
        self.track(
            TickTarget::ResourceVisibility(id.clone()),
            self.config.visibility_interval,
        );
        self.refresh_resource_visibility(&id);
        tracing::debug!(resource = %id, "Registered resource");
        Ok(())
    }

    /// Register a command, install its declared modifiers and start
    /// ticking its visibility and availability.
    ///
    /// # Errors
    ///
    /// [`GameError::DuplicateId`] if the id is taken.
    pub fn register_command(&mut self, options: CommandOptions) -> Result<()> {
        let id = options.id.clone();
        self.commands.register(Command::new(&options))?;

        for entry in options.speed_modifiers {
            self.set_modifier(&StackRef::CommandSpeed(id.clone()), entry.key, entry.modifier)?;
        }
        for entry in options.cooldown_modifiers {
            self.set_modifier(
                &StackRef::CommandCooldown(id.clone()),
                entry.key,
                entry.modifier,
            )?;
        }
        if options.has_quantity_modifiers {
            for entry in options.quantity_modifiers {
                self.set_modifier(
                    &StackRef::CommandQuantity(id.clone()),
                    entry.key,
                    entry.modifier,
                )?;
            }
        }

        self.track(
            TickTarget::CommandVisibility(id.clone()),
            self.config.visibility_interval,
        );
        self.track(
            TickTarget::CommandAvailability(id.clone()),
            self.config.availability_interval,
        );
        self.refresh_command_visibility(&id);
        self.refresh_availability(&id);
        tracing::debug!(command = %id, "Registered command");
        Ok(())
    }

    /// Resolve a stack reference.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unknown owner,
    /// [`GameError::NoQuantityModifiers`] for a missing quantity stack.
    pub fn stack(&self, stack: &StackRef) -> Result<&ModifierStack> {
        match stack {
            StackRef::ResourceMax(id) => Ok(self.resource(id)?.max_modifiers()),
            StackRef::ResourceGeneration(id) => Ok(self.resource(id)?.generation_modifiers()),
            StackRef::CommandSpeed(id) => Ok(self.command(id)?.speed_modifiers()),
            StackRef::CommandCooldown(id) => Ok(self.command(id)?.cooldown_modifiers()),
            StackRef::CommandQuantity(id) => self.command(id)?.quantity_modifiers(),
        }
    }

    /// Resolve a stack reference mutably.
    ///
    /// Timed entries set through the returned stack do not count down; use
    /// [`set_modifier`](Self::set_modifier) for those.
    ///
    /// # Errors
    ///
    /// Same as [`stack`](Self::stack).
    pub fn stack_mut(&mut self, stack: &StackRef) -> Result<&mut ModifierStack> {
        match stack {
            StackRef::ResourceMax(id) => Ok(self.resource_mut(id)?.max_modifiers_mut()),
            StackRef::ResourceGeneration(id) => {
                Ok(self.resource_mut(id)?.generation_modifiers_mut())
            }
            StackRef::CommandSpeed(id) => Ok(self.command_mut(id)?.speed_modifiers_mut()),
            StackRef::CommandCooldown(id) => Ok(self.command_mut(id)?.cooldown_modifiers_mut()),
            StackRef::CommandQuantity(id) => self.command_mut(id)?.quantity_modifiers_mut(),
        }
    }

    /// Insert or replace a modifier.
    ///
    /// A countdown belonging to the replaced entry is cancelled. If the new
    /// modifier has a duration, a countdown is scheduled that deletes the
    /// entry once the remaining time reaches zero.
    ///
    /// # Errors
    ///
    /// Same as [`stack`](Self::stack).
    pub fn set_modifier(
        &mut self,
        stack: &StackRef,
        key: impl Into<String>,
        modifier: Modifier,
    ) -> Result<Option<Modifier>> {
        let key = key.into();
        let timed = modifier.is_timed();
        let (stale, previous) = {
            let target = self.stack_mut(stack)?;
            let stale = target.countdown_of(&key);
            (stale, target.set(key.clone(), modifier))
        };
        if let Some(timer) = stale {
            self.cancel_timer(timer);
        }
        if timed {
            if let Err(err) = self.start_countdown(stack, &key) {
                let target = self.stack_mut(stack)?;
                match previous {
                    Some(previous) => {
                        target.set(key, previous);
                    }
                    None => {
                        target.delete(&key);
                    }
                }
                return Err(err);
            }
        }
        Ok(previous)
    }

    /// Remove a modifier and cancel its countdown. Missing keys are a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`stack`](Self::stack).
    pub fn delete_modifier(&mut self, stack: &StackRef, key: &str) -> Result<Option<Modifier>> {
        let (stale, removed) = {
            let target = self.stack_mut(stack)?;
            (target.countdown_of(key), target.delete(key))
        };
        if let Some(timer) = stale {
            self.cancel_timer(timer);
        }
        Ok(removed)
    }

    /// Schedule countdowns for restored timed entries.
    pub(crate) fn start_countdowns(&mut self, stack: &StackRef, keys: &[String]) {
        for key in keys {
            let timed = self
                .stack(stack)
                .ok()
                .and_then(|s| s.get(key))
                .is_some_and(Modifier::is_timed);
            if timed {
                if let Err(err) = self.start_countdown(stack, key) {
                    tracing::warn!(stack = %stack, key = %key, error = %err, "Could not resume countdown");
                }
            }
        }
    }

    /// Track a countdown for `key`, replacing any timer still ticking the
    /// same key (left behind when the entry was replaced through
    /// [`stack_mut`](Self::stack_mut)).
    fn start_countdown(&mut self, stack: &StackRef, key: &str) -> Result<()> {
        let target = TickTarget::ModifierCountdown {
            stack: stack.clone(),
            key: key.to_string(),
        };
        if self.ticker.untrack_target(&target).is_ok() {
            tracing::debug!(stack = %stack, key = %key, "Replaced orphaned countdown");
        }
        let timer = self
            .ticker
            .track(target, Some(self.config.countdown_interval))?;
        self.stack_mut(stack)?.attach_countdown(key, timer);
        Ok(())
    }

    /// Why a run would be refused right now, if at all.
    ///
    /// Reads live balances for every cost entry.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unknown command or cost resource.
    pub fn check_run(&self, id: &CommandId) -> Result<Option<Blocked>> {
        let command = self.command(id)?;
        if let Some(blocked) = command.blocked_by_state() {
            return Ok(Some(blocked));
        }
        for (resource, required) in command.cost() {
            let available = self.resource(resource)?.amount();
            if available < *required {
                return Ok(Some(Blocked::InsufficientResources {
                    resource: resource.clone(),
                    required: *required,
                    available,
                }));
            }
        }
        Ok(None)
    }

    /// Live run gate. Unknown commands cannot run.
    #[must_use]
    pub fn can_run(&self, id: &CommandId) -> bool {
        matches!(self.check_run(id), Ok(None))
    }

    /// Start a run.
    ///
    /// # Errors
    ///
    /// See [`run_command_with`](Self::run_command_with).
    pub fn run_command(&mut self, id: &CommandId) -> Result<RunOutcome> {
        self.run_command_with(id, None, None)
    }

    /// Start a run with completion callbacks.
    ///
    /// A refused run is [`RunOutcome::Rejected`] and changes nothing. On
    /// success every cost is debited, the quantity multiplier is captured,
    /// the start action runs and the finish is scheduled after
    /// `total_time()` seconds. `on_finish` fires once at run finish;
    /// `on_cooldown_finish` fires once when the cooldown ends, or right
    /// after `on_finish` when there is no cooldown.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unknown command or cost resource.
    pub fn run_command_with(
        &mut self,
        id: &CommandId,
        on_finish: Option<Completion>,
        on_cooldown_finish: Option<Completion>,
    ) -> Result<RunOutcome> {
        if let Some(blocked) = self.check_run(id)? {
            tracing::debug!(command = %id, reason = %blocked, "Run rejected");
            return Ok(RunOutcome::Rejected(blocked));
        }

        let cost = self.command(id)?.cost().clone();
        for (resource, amount) in &cost {
            self.resource_mut(resource)?.add(-amount);
        }

        let run = RunId(self.next_run);
        self.next_run += 1;
        let (multiplier, total, start) = {
            let command = self.command_mut(id)?;
            command.begin_run(run);
            (
                command.multiplier(),
                command.total_time(),
                command.actions().start.clone(),
            )
        };
        self.runs.push(ActiveRun {
            id: run,
            command: id.clone(),
            multiplier,
            on_finish,
            on_cooldown_finish,
        });
        tracing::debug!(command = %id, run = run.0, multiplier, duration = total, "Run started");

        self.perform(start, id, run, multiplier);
        self.ticker.schedule_once(
            TickTarget::RunFinished {
                command: id.clone(),
                run,
            },
            total,
        );
        self.refresh_availability(id);
        Ok(RunOutcome::Started(run))
    }

    /// Number of runs in flight or cooling down.
    #[must_use]
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    fn finish_run(&mut self, id: &CommandId, run: RunId) {
        let Some(multiplier) = self.run_entry(run).map(|r| r.multiplier) else {
            tracing::warn!(command = %id, run = run.0, "Finish for unknown run");
            return;
        };
        let finish = match self.command(id) {
            Ok(command) => command.actions().finish.clone(),
            Err(err) => {
                tracing::warn!(command = %id, error = %err, "Finish for missing command");
                return;
            }
        };
        self.perform(finish, id, run, multiplier);

        let Ok(command) = self.command_mut(id) else {
            return;
        };
        command.end_run(run);
        let cooldown = command.cooldown_time();
        tracing::debug!(command = %id, run = run.0, cooldown, "Run finished");

        if cooldown > 0.0 {
            command.begin_cooldown(run);
            let cooldown_start = command.actions().cooldown_start.clone();
            self.perform(cooldown_start, id, run, multiplier);
            self.ticker.schedule_once(
                TickTarget::CooldownFinished {
                    command: id.clone(),
                    run,
                },
                cooldown,
            );
            let on_finish = self.run_entry(run).and_then(|r| r.on_finish.take());
            if let Some(callback) = on_finish {
                callback(self);
            }
        } else {
            if let Some(mut entry) = self.take_run(run) {
                if let Some(callback) = entry.on_finish.take() {
                    callback(self);
                }
                if let Some(callback) = entry.on_cooldown_finish.take() {
                    callback(self);
                }
            }
        }
        self.refresh_availability(id);
    }

    fn finish_cooldown(&mut self, id: &CommandId, run: RunId) {
        let Some(mut entry) = self.take_run(run) else {
            tracing::warn!(command = %id, run = run.0, "Cooldown finish for unknown run");
            return;
        };
        let cooldown_finish = match self.command_mut(id) {
            Ok(command) => {
                command.end_cooldown(run);
                command.actions().cooldown_finish.clone()
            }
            Err(err) => {
                tracing::warn!(command = %id, error = %err, "Cooldown finish for missing command");
                return;
            }
        };
        tracing::debug!(command = %id, run = run.0, "Cooldown finished");
        self.perform(cooldown_finish, id, run, entry.multiplier);
        if let Some(callback) = entry.on_cooldown_finish.take() {
            callback(self);
        }
        self.refresh_availability(id);
    }

    fn run_entry(&mut self, run: RunId) -> Option<&mut ActiveRun> {
        self.runs.iter_mut().find(|r| r.id == run)
    }

    fn take_run(&mut self, run: RunId) -> Option<ActiveRun> {
        let index = self.runs.iter().position(|r| r.id == run)?;
        Some(self.runs.remove(index))
    }

    fn perform(&mut self, action: Option<CommandAction>, command: &CommandId, run: RunId, multiplier: f64) {
        let Some(action) = action else {
            return;
        };
        let ctx = ActionContext {
            command: command.clone(),
            run,
            multiplier,
        };
        if let Err(err) = action.execute(self, &ctx) {
            tracing::warn!(command = %command, run = run.0, error = %err, "Command action failed");
        }
    }

    /// Recompute a command's cached `can_run` flag.
    pub fn refresh_availability(&mut self, id: &CommandId) {
        let can_run = self.can_run(id);
        if let Ok(command) = self.command_mut(id) {
            command.set_can_run(can_run);
        }
    }

    fn refresh_resource_visibility(&mut self, id: &ResourceId) {
        let Ok(resource) = self.resource(id) else {
            return;
        };
        let visible = resource.visibility().evaluate(self);
        if let Ok(resource) = self.resource_mut(id) {
            if resource.set_visible(visible) {
                tracing::debug!(resource = %id, visible, "Visibility changed");
            }
        }
    }

    fn refresh_command_visibility(&mut self, id: &CommandId) {
        let Ok(command) = self.command(id) else {
            return;
        };
        let visible = command.visibility().evaluate(self);
        if let Ok(command) = self.command_mut(id) {
            if command.set_visible(visible) {
                tracing::debug!(command = %id, visible, "Visibility changed");
            }
        }
    }

    /// Tick every periodic timer once with `delta = length`, in
    /// registration order. The clock does not move and run/cooldown
    /// boundaries are not fired.
    pub fn force_tick(&mut self, length: f64) {
        for (timer, target) in self.ticker.tracked() {
            if !self.ticker.is_tracked(timer) {
                continue;
            }
            self.dispatch(Fired {
                timer,
                target,
                delta: length,
            });
        }
    }

    /// Move the virtual clock forward, firing every timer that comes due
    /// in deadline order (scheduling order for ties).
    ///
    /// The clock stops at [`LAST_INSTANT_MILLIS`](crate::ticker::LAST_INSTANT_MILLIS);
    /// timers scheduled beyond it never fire. Every periodic firing is
    /// dispatched, so long offline spans are cheaper through
    /// [`force_tick`](Self::force_tick).
    pub fn advance(&mut self, seconds: f64) {
        let until = self.ticker.deadline_after(seconds_to_millis(seconds));
        while let Some(fired) = self.ticker.pop_due(until) {
            self.dispatch(fired);
        }
        self.ticker.settle(until);
    }

    /// Tick `callback` periodically with the elapsed seconds.
    ///
    /// # Errors
    ///
    /// Never in practice; callback targets are unique.
    pub fn track_callback(
        &mut self,
        interval: Option<f64>,
        callback: impl FnMut(&mut World, f64) + 'static,
    ) -> Result<TimerId> {
        let id = self.next_callback;
        self.next_callback += 1;
        let timer = self.ticker.track(
            TickTarget::Callback(id),
            Some(interval.unwrap_or(self.config.default_interval)),
        )?;
        self.callbacks.push((id, Some(Box::new(callback))));
        Ok(timer)
    }

    /// Stop a timer.
    ///
    /// # Errors
    ///
    /// [`GameError::NotTracked`] if the timer does not exist.
    pub fn untrack(&mut self, timer: TimerId) -> Result<()> {
        if let Some(TickTarget::Callback(id)) = self.ticker.target_of(timer) {
            let id = *id;
            self.callbacks.retain(|(callback, _)| *callback != id);
        }
        self.ticker.untrack(timer)
    }

    /// Attach a store; registries are written to it on the autosave
    /// cadence and play time on its own cadence.
    pub fn attach_store(&mut self, store: Box<dyn SaveStore>) {
        self.store = Some(store);
        self.track(TickTarget::Autosave, self.config.autosave_interval);
    }

    /// Detach the store and stop autosaving.
    pub fn detach_store(&mut self) -> Option<Box<dyn SaveStore>> {
        if self.ticker.untrack_target(&TickTarget::Autosave).is_err() {
            tracing::debug!("Autosave was not tracked");
        }
        self.store.take()
    }

    /// The attached store.
    #[must_use]
    pub fn store(&self) -> Option<&dyn SaveStore> {
        self.store.as_deref()
    }

    fn autosave(&mut self) {
        let Some(mut store) = self.store.take() else {
            return;
        };
        if let Err(err) = self.save_to(store.as_mut()) {
            tracing::warn!(error = %err, "Autosave failed");
        }
        self.store = Some(store);
    }

    fn persist_time_played(&mut self) {
        let time_played = self.time_played();
        if let Some(store) = self.store.as_mut() {
            if let Err(err) = crate::persistence::write_time_played(store.as_mut(), time_played) {
                tracing::warn!(error = %err, "Could not persist play time");
            }
        }
    }

    fn dispatch(&mut self, fired: Fired) {
        let Fired {
            timer,
            target,
            delta,
        } = fired;
        match target {
            TickTarget::TimePlayed => {
                self.ticker.add_time_played(delta);
                self.persist_time_played();
            }
            TickTarget::Autosave => self.autosave(),
            TickTarget::Generation(id) => {
                if let Ok(resource) = self.resource_mut(&id) {
                    resource.tick(delta);
                }
            }
            TickTarget::ResourceVisibility(id) => self.refresh_resource_visibility(&id),
            TickTarget::CommandVisibility(id) => self.refresh_command_visibility(&id),
            TickTarget::CommandAvailability(id) => self.refresh_availability(&id),
            TickTarget::ModifierCountdown { stack, key } => {
                self.count_down(&stack, &key, timer, delta);
            }
            TickTarget::RunFinished { command, run } => self.finish_run(&command, run),
            TickTarget::CooldownFinished { command, run } => self.finish_cooldown(&command, run),
            TickTarget::Callback(id) => self.run_callback(id, delta),
        }
    }

    fn count_down(&mut self, stack: &StackRef, key: &str, timer: TimerId, delta: f64) {
        let remaining = self
            .stack_mut(stack)
            .ok()
            .and_then(|s| s.count_down(key, timer, delta));
        match remaining {
            Some(remaining) if remaining <= 0.0 => {
                if let Err(err) = self.delete_modifier(stack, key) {
                    tracing::warn!(stack = %stack, key = %key, error = %err, "Could not expire modifier");
                }
                tracing::debug!(stack = %stack, key = %key, "Modifier expired");
            }
            Some(_) => {}
            None => self.cancel_timer(timer),
        }
    }

    fn run_callback(&mut self, id: u64, delta: f64) {
        let Some(mut callback) = self
            .callbacks
            .iter_mut()
            .find(|(callback, _)| *callback == id)
            .and_then(|(_, slot)| slot.take())
        else {
            return;
        };
        callback(self, delta);
        if let Some((_, slot)) = self.callbacks.iter_mut().find(|(callback, _)| *callback == id) {
            *slot = Some(callback);
        }
    }

    fn track(&mut self, target: TickTarget, interval: f64) {
        if let Err(err) = self.ticker.track(target, Some(interval)) {
            tracing::debug!(error = %err, "Target already tracked");
        }
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        if self.ticker.untrack(timer).is_err() {
            tracing::debug!(timer = %timer, "Timer already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::command::CommandState;
    use crate::modifier::Operation;
    use crate::visibility::Visibility;

    fn world() -> World {
        let mut world = World::new();
        world
            .register_resource(ResourceOptions::new("gold", "Gold", 100.0))
            .unwrap();
        world
    }

    #[test]
    fn test_generation_follows_clock() {
        let mut world = world();
        world
            .set_modifier(
                &StackRef::ResourceGeneration("gold".into()),
                "mine",
                Modifier::new("Mine", 2.0, Operation::Add),
            )
            .unwrap();
        world.advance(1.0);
        let amount = world.resource(&"gold".into()).unwrap().amount();
        assert!((amount - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_replacing_timed_modifier_restarts_countdown() {
        let mut world = world();
        let stack = StackRef::ResourceMax("gold".into());
        world
            .set_modifier(&stack, "vault", Modifier::new("Vault", 2.0, Operation::Mul).with_duration(0.5))
            .unwrap();
        world.advance(0.3);
        world
            .set_modifier(&stack, "vault", Modifier::new("Vault", 2.0, Operation::Mul).with_duration(0.5))
            .unwrap();
        world.advance(0.4);
        assert!(world.stack(&stack).unwrap().contains_key("vault"));
        world.advance(0.2);
        assert!(!world.stack(&stack).unwrap().contains_key("vault"));
    }

    #[test]
    fn test_timed_modifier_set_after_direct_replace_still_expires() {
        let mut world = world();
        let stack = StackRef::ResourceMax("gold".into());
        let before = world.ticker().pending();
        let buff = || Modifier::new("Buff", 2.0, Operation::Mul).with_duration(1.0);

        world.set_modifier(&stack, "buff", buff()).unwrap();
        world.stack_mut(&stack).unwrap().set("buff", buff());
        world.set_modifier(&stack, "buff", buff()).unwrap();
        assert_eq!(world.ticker().pending(), before + 1);
        assert_eq!(world.resource(&"gold".into()).unwrap().max(), 200.0);

        world.advance(5.0);
        assert!(!world.stack(&stack).unwrap().contains_key("buff"));
        assert_eq!(world.resource(&"gold".into()).unwrap().max(), 100.0);
        assert_eq!(world.ticker().pending(), before);
    }

    #[test]
    fn test_deleting_modifier_cancels_countdown() {
        let mut world = world();
        let stack = StackRef::ResourceMax("gold".into());
        let before = world.ticker().pending();
        world
            .set_modifier(&stack, "vault", Modifier::new("Vault", 2.0, Operation::Mul).with_duration(5.0))
            .unwrap();
        assert_eq!(world.ticker().pending(), before + 1);
        world.delete_modifier(&stack, "vault").unwrap();
        assert_eq!(world.ticker().pending(), before);
    }

    #[test]
    fn test_unknown_stack_is_not_found() {
        let mut world = world();
        let err = world
            .set_modifier(
                &StackRef::CommandSpeed("nope".into()),
                "x",
                Modifier::new("X", 1.0, Operation::Add),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rejected_run_changes_nothing() {
        let mut world = world();
        world
            .register_command(CommandOptions::new("buy", "Buy", 1.0).with_cost("gold", 10.0))
            .unwrap();
        world.resource_mut(&"gold".into()).unwrap().set_amount(5.0);

        let outcome = world.run_command(&"buy".into()).unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Rejected(Blocked::InsufficientResources { .. })
        ));
        assert_eq!(world.resource(&"gold".into()).unwrap().amount(), 5.0);
        assert_eq!(world.active_runs(), 0);
    }

    #[test]
    fn test_no_cooldown_fires_both_completions_at_finish() {
        let mut world = world();
        world
            .register_command(CommandOptions::new("dig", "Dig", 1.0))
            .unwrap();
        let finished = Rc::new(Cell::new(0));
        let cooled = Rc::new(Cell::new(0));
        let (f, c) = (Rc::clone(&finished), Rc::clone(&cooled));
        world
            .run_command_with(
                &"dig".into(),
                Some(Box::new(move |_: &mut World| f.set(f.get() + 1))),
                Some(Box::new(move |_: &mut World| c.set(c.get() + 1))),
            )
            .unwrap();

        world.advance(0.9);
        assert_eq!(finished.get(), 0);
        world.advance(0.1);
        assert_eq!((finished.get(), cooled.get()), (1, 1));
        assert_eq!(world.command(&"dig".into()).unwrap().state(), CommandState::Idle);
        assert_eq!(world.active_runs(), 0);
    }

    #[test]
    fn test_visibility_recomputed_on_cadence() {
        let mut world = world();
        world
            .register_resource(
                ResourceOptions::new("wood", "Wood", 50.0)
                    .with_visibility(Visibility::RequiresDiscovery("wood".into())),
            )
            .unwrap();
        assert!(!world.resource(&"wood".into()).unwrap().is_visible());

        world.resource_mut(&"wood".into()).unwrap().set_amount(1.0);
        world.advance(0.05);
        assert!(world.resource(&"wood".into()).unwrap().is_visible());
    }

    #[test]
    fn test_callback_can_be_untracked() {
        let mut world = World::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let timer = world
            .track_callback(Some(0.1), move |_, _| counter.set(counter.get() + 1))
            .unwrap();

        world.advance(0.3);
        assert_eq!(calls.get(), 3);
        world.untrack(timer).unwrap();
        world.advance(0.3);
        assert_eq!(calls.get(), 3);
        assert!(world.untrack(timer).is_err());
    }

    #[test]
    fn test_enormous_durations_do_not_overflow_the_clock() {
        let mut world = world();
        world
            .register_command(CommandOptions::new("nap", "Eternal Nap", 1e17))
            .unwrap();
        let id = CommandId::from("nap");

        world.advance(0.1);
        assert!(world.run_command(&id).unwrap().is_started());
        world.advance(1.0);
        assert_eq!(world.command(&id).unwrap().state(), CommandState::Running(1));
        assert!(!world.can_run(&id));
    }

    #[test]
    fn test_force_tick_does_not_move_clock() {
        let mut world = world();
        world.force_tick(10.0);
        assert_eq!(world.now(), 0.0);
        assert_eq!(world.time_played(), 10.0);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut world = world();
        let err = world
            .register_resource(ResourceOptions::new("gold", "Gold", 1.0))
            .unwrap_err();
        assert!(matches!(err, GameError::DuplicateId { kind: "resource", .. }));
    }
}
