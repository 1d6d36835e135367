//! Player-triggered commands and their run/cooldown state machine.
//!
//! A [`Command`] only holds state: its modifier stacks, declared actions
//! and the counters that make up [`CommandState`]. Driving a run through
//! `Running -> OnCooldown -> Idle` is done by the
//! [`World`](crate::world::World), which owns the timers and the
//! resources a run debits.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::CommandAction;
use crate::error::{GameError, Result};
use crate::modifier::{ordered_modifiers, KeyedModifier, Modifier, ModifierStack};
use crate::observer::{Observers, SubscriptionId};
use crate::registry::Identified;
use crate::resource::ResourceId;
use crate::visibility::Visibility;

/// Unique identifier of a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub String);

impl CommandId {
    /// Create a command id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Handle to a single in-flight run of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

/// Resource debits required to start a run.
pub type CostMap = BTreeMap<ResourceId, f64>;

/// How the cooldown duration is scaled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CooldownScaling {
    /// `cooldown_modifiers.apply(speed_modifiers.apply(cooldown))`.
    #[default]
    SharedWithSpeed,
    /// `cooldown_modifiers.apply(cooldown)`; speed buffs leave it alone.
    Independent,
}

/// Declaration of a command.
///
/// # Example RON
///
/// ```ron
/// (
///     id: "eat_fish",
///     name: "Eat Fish",
///     time_required: 3.0,
///     cooldown: 30.0,
///     cooldown_is_buff: true,
///     cost: { "fish": 10.0 },
///     visible: EverObtainedAtLeast(resource: "fish", amount: 25.0),
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOptions {
    /// Unique id.
    pub id: CommandId,
    /// Display name.
    pub name: String,
    /// Player-facing description.
    #[serde(default)]
    pub description: String,
    /// Base run duration in seconds.
    pub time_required: f64,
    /// Base cooldown in seconds; zero means none.
    #[serde(default)]
    pub cooldown: f64,
    /// The cooldown period is presented as an active buff.
    #[serde(default)]
    pub cooldown_is_buff: bool,
    /// How the cooldown is scaled.
    #[serde(default)]
    pub cooldown_scaling: CooldownScaling,
    /// Allow overlapping runs.
    #[serde(default)]
    pub concurrent: bool,
    /// Give the command a quantity modifier stack.
    #[serde(default)]
    pub has_quantity_modifiers: bool,
    /// All-or-nothing resource debits.
    #[serde(default)]
    pub cost: CostMap,
    /// Runs when a run starts.
    #[serde(default)]
    pub start_action: Option<CommandAction>,
    /// Runs when a run finishes.
    #[serde(default)]
    pub finish_action: Option<CommandAction>,
    /// Runs when the cooldown starts.
    #[serde(default)]
    pub cooldown_start_action: Option<CommandAction>,
    /// Runs when the cooldown finishes.
    #[serde(default)]
    pub cooldown_finish_action: Option<CommandAction>,
    /// Visibility predicate.
    #[serde(default)]
    pub visible: Visibility,
    /// Initial speed modifiers.
    #[serde(default)]
    pub speed_modifiers: Vec<KeyedModifier>,
    /// Initial cooldown modifiers.
    #[serde(default)]
    pub cooldown_modifiers: Vec<KeyedModifier>,
    /// Initial quantity modifiers; ignored without `has_quantity_modifiers`.
    #[serde(default)]
    pub quantity_modifiers: Vec<KeyedModifier>,
}

impl CommandOptions {
    /// Declare a command taking `time_required` seconds.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, time_required: f64) -> Self {
        Self {
            id: CommandId::new(id),
            name: name.into(),
            description: String::new(),
            time_required,
            cooldown: 0.0,
            cooldown_is_buff: false,
            cooldown_scaling: CooldownScaling::default(),
            concurrent: false,
            has_quantity_modifiers: false,
            cost: CostMap::new(),
            start_action: None,
            finish_action: None,
            cooldown_start_action: None,
            cooldown_finish_action: None,
            visible: Visibility::Always,
            speed_modifiers: Vec::new(),
            cooldown_modifiers: Vec::new(),
            quantity_modifiers: Vec::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the base cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, seconds: f64) -> Self {
        self.cooldown = seconds;
        self
    }

    /// Present the cooldown as a buff.
    #[must_use]
    pub fn cooldown_as_buff(mut self) -> Self {
        self.cooldown_is_buff = true;
        self
    }

    /// Set the cooldown scaling policy.
    #[must_use]
    pub fn with_cooldown_scaling(mut self, scaling: CooldownScaling) -> Self {
        self.cooldown_scaling = scaling;
        self
    }

    /// Allow overlapping runs.
    #[must_use]
    pub fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }

    /// Give the command a quantity modifier stack.
    #[must_use]
    pub fn with_quantity_modifiers(mut self) -> Self {
        self.has_quantity_modifiers = true;
        self
    }

    /// Add a cost entry.
    #[must_use]
    pub fn with_cost(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.cost.insert(ResourceId::new(resource), amount);
        self
    }

    /// Set the start action.
    #[must_use]
    pub fn on_start(mut self, action: CommandAction) -> Self {
        self.start_action = Some(action);
        self
    }

    /// Set the finish action.
    #[must_use]
    pub fn on_finish(mut self, action: CommandAction) -> Self {
        self.finish_action = Some(action);
        self
    }

    /// Set the cooldown start action.
    #[must_use]
    pub fn on_cooldown_start(mut self, action: CommandAction) -> Self {
        self.cooldown_start_action = Some(action);
        self
    }

    /// Set the cooldown finish action.
    #[must_use]
    pub fn on_cooldown_finish(mut self, action: CommandAction) -> Self {
        self.cooldown_finish_action = Some(action);
        self
    }

    /// Set the visibility predicate.
    #[must_use]
    pub fn with_visibility(mut self, visible: Visibility) -> Self {
        self.visible = visible;
        self
    }

    /// Add an initial speed modifier.
    #[must_use]
    pub fn with_speed_modifier(mut self, key: impl Into<String>, modifier: Modifier) -> Self {
        self.speed_modifiers.push(KeyedModifier::new(key, modifier));
        self
    }

    /// Add an initial cooldown modifier.
    #[must_use]
    pub fn with_cooldown_modifier(mut self, key: impl Into<String>, modifier: Modifier) -> Self {
        self.cooldown_modifiers.push(KeyedModifier::new(key, modifier));
        self
    }

    /// Add an initial quantity modifier, enabling the quantity stack.
    #[must_use]
    pub fn with_quantity_modifier(mut self, key: impl Into<String>, modifier: Modifier) -> Self {
        self.has_quantity_modifiers = true;
        self.quantity_modifiers.push(KeyedModifier::new(key, modifier));
        self
    }
}

/// The four declared action slots.
#[derive(Debug, Clone, Default)]
pub struct CommandActions {
    /// Runs when a run starts.
    pub start: Option<CommandAction>,
    /// Runs when a run finishes.
    pub finish: Option<CommandAction>,
    /// Runs when the cooldown starts.
    pub cooldown_start: Option<CommandAction>,
    /// Runs when the cooldown finishes.
    pub cooldown_finish: Option<CommandAction>,
}

/// Where a command is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Nothing in flight.
    Idle,
    /// Number of runs in flight.
    Running(u32),
    /// Waiting out a cooldown.
    OnCooldown,
}

/// Why a run was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum Blocked {
    /// A non-concurrent command already has a run in flight.
    AlreadyRunning,
    /// The command is cooling down.
    OnCooldown,
    /// A cost entry exceeds the live balance.
    InsufficientResources {
        /// Resource that is short.
        resource: ResourceId,
        /// Amount the cost requires.
        required: f64,
        /// Live balance.
        available: f64,
    },
}

impl fmt::Display for Blocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "already running"),
            Self::OnCooldown => write!(f, "on cooldown"),
            Self::InsufficientResources {
                resource,
                required,
                available,
            } => write!(f, "needs {required} {resource}, has {available}"),
        }
    }
}

/// Result of asking a command to run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The run was started.
    Started(RunId),
    /// The gate refused the run; nothing changed.
    Rejected(Blocked),
}

impl RunOutcome {
    /// Whether a run was started.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Change notification emitted by a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandChange {
    /// A run started.
    Started(RunId),
    /// A run finished.
    Finished(RunId),
    /// A cooldown started.
    CooldownStarted(RunId),
    /// A cooldown finished.
    CooldownFinished(RunId),
    /// The visibility flag flipped.
    Visibility(bool),
    /// The cached `can_run` flag flipped.
    CanRun(bool),
}

/// Persisted modifier state of a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSnapshot {
    /// Serializable speed modifiers.
    #[serde(default, with = "ordered_modifiers")]
    pub speed_modifiers: Vec<(String, Modifier)>,
    /// Serializable cooldown modifiers.
    #[serde(default, with = "ordered_modifiers")]
    pub cooldown_modifiers: Vec<(String, Modifier)>,
    /// Serializable quantity modifiers, when the command has the stack.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_modifiers")]
    pub quantity_modifiers: Option<Vec<(String, Modifier)>>,
}

/// Keys added to each stack by [`Command::restore_from`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredCommandKeys {
    /// Keys added to the speed stack.
    pub speed: Vec<String>,
    /// Keys added to the cooldown stack.
    pub cooldown: Vec<String>,
    /// Keys added to the quantity stack.
    pub quantity: Vec<String>,
}

/// A player-triggerable timed action.
#[derive(Debug)]
pub struct Command {
    id: CommandId,
    name: String,
    description: String,
    time_required: f64,
    cooldown: f64,
    cooldown_is_buff: bool,
    cooldown_scaling: CooldownScaling,
    concurrent: bool,
    cost: CostMap,
    actions: CommandActions,
    speed_modifiers: ModifierStack,
    cooldown_modifiers: ModifierStack,
    quantity_modifiers: Option<ModifierStack>,
    visibility: Visibility,
    visible: bool,
    can_run: bool,
    running: u32,
    cooling_down: u32,
    observers: Observers<CommandChange>,
}

impl Command {
    /// Create an idle command.
    ///
    /// Initial modifiers listed in `options` are not installed here; the
    /// world installs them so timed entries get their countdowns.
    #[must_use]
    pub fn new(options: &CommandOptions) -> Self {
        Self {
            id: options.id.clone(),
            name: options.name.clone(),
            description: options.description.clone(),
            time_required: options.time_required,
            cooldown: options.cooldown,
            cooldown_is_buff: options.cooldown_is_buff,
            cooldown_scaling: options.cooldown_scaling,
            concurrent: options.concurrent,
            cost: options.cost.clone(),
            actions: CommandActions {
                start: options.start_action.clone(),
                finish: options.finish_action.clone(),
                cooldown_start: options.cooldown_start_action.clone(),
                cooldown_finish: options.cooldown_finish_action.clone(),
            },
            speed_modifiers: ModifierStack::new(),
            cooldown_modifiers: ModifierStack::new(),
            quantity_modifiers: options.has_quantity_modifiers.then(ModifierStack::new),
            visibility: options.visible.clone(),
            visible: false,
            can_run: false,
            running: 0,
            cooling_down: 0,
            observers: Observers::new(),
        }
    }

    /// Command id.
    #[must_use]
    pub fn id(&self) -> &CommandId {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Player-facing description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Base run duration.
    #[must_use]
    pub const fn time_required(&self) -> f64 {
        self.time_required
    }

    /// Base cooldown.
    #[must_use]
    pub const fn base_cooldown(&self) -> f64 {
        self.cooldown
    }

    /// Whether the cooldown is presented as a buff.
    #[must_use]
    pub const fn cooldown_is_buff(&self) -> bool {
        self.cooldown_is_buff
    }

    /// Cooldown scaling policy.
    #[must_use]
    pub const fn cooldown_scaling(&self) -> CooldownScaling {
        self.cooldown_scaling
    }

    /// Whether runs may overlap.
    #[must_use]
    pub const fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Resource debits per run.
    #[must_use]
    pub const fn cost(&self) -> &CostMap {
        &self.cost
    }

    /// Declared actions.
    #[must_use]
    pub const fn actions(&self) -> &CommandActions {
        &self.actions
    }

    /// Effective run duration: `speed_modifiers.apply(time_required)`.
    #[must_use]
    pub fn total_time(&self) -> f64 {
        non_negative(self.speed_modifiers.apply(self.time_required))
    }

    /// Effective cooldown duration under the scaling policy.
    #[must_use]
    pub fn cooldown_time(&self) -> f64 {
        let base = match self.cooldown_scaling {
            CooldownScaling::SharedWithSpeed => self.speed_modifiers.apply(self.cooldown),
            CooldownScaling::Independent => self.cooldown,
        };
        non_negative(self.cooldown_modifiers.apply(base))
    }

    /// Effective quantity multiplier: `quantity_modifiers.apply(1)`, or 1
    /// without a quantity stack.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.quantity_modifiers
            .as_ref()
            .map_or(1.0, |stack| stack.apply(1.0))
    }

    /// Speed modifier stack.
    #[must_use]
    pub const fn speed_modifiers(&self) -> &ModifierStack {
        &self.speed_modifiers
    }

    /// Cooldown modifier stack.
    #[must_use]
    pub const fn cooldown_modifiers(&self) -> &ModifierStack {
        &self.cooldown_modifiers
    }

    /// Quantity modifier stack.
    ///
    /// # Errors
    ///
    /// [`GameError::NoQuantityModifiers`] if the command has none.
    pub fn quantity_modifiers(&self) -> Result<&ModifierStack> {
        self.quantity_modifiers
            .as_ref()
            .ok_or_else(|| GameError::NoQuantityModifiers(self.id.to_string()))
    }

    /// Whether the command has a quantity stack.
    #[must_use]
    pub const fn has_quantity_modifiers(&self) -> bool {
        self.quantity_modifiers.is_some()
    }

    /// Mutable speed modifier stack. Timed entries set here do not count down.
    pub fn speed_modifiers_mut(&mut self) -> &mut ModifierStack {
        &mut self.speed_modifiers
    }

    /// Mutable cooldown modifier stack. Timed entries set here do not count down.
    pub fn cooldown_modifiers_mut(&mut self) -> &mut ModifierStack {
        &mut self.cooldown_modifiers
    }

    /// Mutable quantity modifier stack. Timed entries set here do not count down.
    ///
    /// # Errors
    ///
    /// [`GameError::NoQuantityModifiers`] if the command has none.
    pub fn quantity_modifiers_mut(&mut self) -> Result<&mut ModifierStack> {
        let id = &self.id;
        self.quantity_modifiers
            .as_mut()
            .ok_or_else(|| GameError::NoQuantityModifiers(id.to_string()))
    }

    /// Visibility predicate.
    #[must_use]
    pub const fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    /// Last computed visibility.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Last computed availability; refreshed on the availability cadence
    /// and after every transition.
    #[must_use]
    pub const fn can_run(&self) -> bool {
        self.can_run
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CommandState {
        if self.running > 0 {
            CommandState::Running(self.running)
        } else if self.cooling_down > 0 {
            CommandState::OnCooldown
        } else {
            CommandState::Idle
        }
    }

    /// Whether a cooldown is active.
    #[must_use]
    pub const fn is_on_cooldown(&self) -> bool {
        self.cooling_down > 0
    }

    /// The state part of the run gate; costs are checked by the world.
    #[must_use]
    pub fn blocked_by_state(&self) -> Option<Blocked> {
        if self.cooling_down > 0 {
            Some(Blocked::OnCooldown)
        } else if !self.concurrent && self.running > 0 {
            Some(Blocked::AlreadyRunning)
        } else {
            None
        }
    }

    /// Persisted modifier state.
    #[must_use]
    pub fn snapshot(&self) -> CommandSnapshot {
        CommandSnapshot {
            speed_modifiers: self.speed_modifiers.serialized_values(),
            cooldown_modifiers: self.cooldown_modifiers.serialized_values(),
            quantity_modifiers: self
                .quantity_modifiers
                .as_ref()
                .map(ModifierStack::serialized_values),
        }
    }

    /// Merge saved modifiers under the installed ones.
    pub fn restore_from(&mut self, snapshot: CommandSnapshot) -> RestoredCommandKeys {
        let quantity = match (&mut self.quantity_modifiers, snapshot.quantity_modifiers) {
            (Some(stack), Some(saved)) => stack.merge_restored(saved),
            (None, Some(saved)) if !saved.is_empty() => {
                tracing::warn!(command = %self.id, "Dropping saved quantity modifiers");
                Vec::new()
            }
            _ => Vec::new(),
        };
        RestoredCommandKeys {
            speed: self.speed_modifiers.merge_restored(snapshot.speed_modifiers),
            cooldown: self
                .cooldown_modifiers
                .merge_restored(snapshot.cooldown_modifiers),
            quantity,
        }
    }

    /// Register a change observer.
    pub fn subscribe(&mut self, observer: impl FnMut(&CommandChange) + 'static) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    /// Remove a change observer.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub(crate) fn begin_run(&mut self, run: RunId) {
        self.running += 1;
        self.observers.notify(&CommandChange::Started(run));
    }

    pub(crate) fn end_run(&mut self, run: RunId) {
        self.running = self.running.saturating_sub(1);
        self.observers.notify(&CommandChange::Finished(run));
    }

    pub(crate) fn begin_cooldown(&mut self, run: RunId) {
        self.cooling_down += 1;
        self.observers.notify(&CommandChange::CooldownStarted(run));
    }

    pub(crate) fn end_cooldown(&mut self, run: RunId) {
        self.cooling_down = self.cooling_down.saturating_sub(1);
        self.observers.notify(&CommandChange::CooldownFinished(run));
    }

    pub(crate) fn set_visible(&mut self, visible: bool) -> bool {
        if visible == self.visible {
            return false;
        }
        self.visible = visible;
        self.observers.notify(&CommandChange::Visibility(visible));
        true
    }

    pub(crate) fn set_can_run(&mut self, can_run: bool) -> bool {
        if can_run == self.can_run {
            return false;
        }
        self.can_run = can_run;
        self.observers.notify(&CommandChange::CanRun(can_run));
        true
    }
}

impl Identified for Command {
    type Id = CommandId;
    const KIND: &'static str = "command";

    fn id(&self) -> &CommandId {
        &self.id
    }
}

fn non_negative(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

mod optional_modifiers {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::modifier::{ordered_modifiers, Modifier};

    #[derive(Serialize, Deserialize)]
    struct Ordered(#[serde(with = "ordered_modifiers")] Vec<(String, Modifier)>);

    pub fn serialize<S>(
        entries: &Option<Vec<(String, Modifier)>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match entries {
            Some(entries) => serializer.serialize_some(&Ordered(entries.clone())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<(String, Modifier)>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Ordered>::deserialize(deserializer)?.map(|ordered| ordered.0))
    }
}
