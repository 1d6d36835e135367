//! Resources: bounded quantities that accumulate over time.
//!
//! A [`Resource`] holds an amount clamped into `[0, max]` where
//! `max = max_modifiers.apply(base_max)`. Every tick it gains
//! `generation_modifiers.apply(0) * delta`, so the generation stack's net
//! value *is* the per-second rate. A stack with only multiplicative
//! entries therefore generates nothing until some additive entry seeds it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::modifier::{ordered_modifiers, KeyedModifier, Modifier, ModifierStack};
use crate::observer::{Observers, SubscriptionId};
use crate::registry::Identified;
use crate::visibility::Visibility;

/// Unique identifier of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a resource id.
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

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Declaration of a resource.
///
/// # Example RON
///
/// ```ron
/// (
///     id: "fish",
///     name: "Fish",
///     max: 3000.0,
///     generation_modifiers: [
///         (key: "permanent_hunger", modifier: (name: "Otter Hunger", amount: 0.03, operation: "-", priority: 0.0)),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOptions {
    /// Unique id.
    pub id: ResourceId,
    /// Short display name.
    pub name: String,
    /// Long display name; defaults to `name`.
    #[serde(default)]
    pub name_long: Option<String>,
    /// Player-facing description.
    #[serde(default)]
    pub description: String,
    /// Display color.
    #[serde(default)]
    pub color: String,
    /// Declared ceiling before max modifiers.
    pub max: f64,
    /// Remove the lower clamp bound of zero.
    #[serde(default)]
    pub permits_negative_values: bool,
    /// Visibility predicate.
    #[serde(default)]
    pub visible: Visibility,
    /// Max modifiers installed at registration.
    #[serde(default)]
    pub max_modifiers: Vec<KeyedModifier>,
    /// Generation modifiers installed at registration.
    #[serde(default)]
    pub generation_modifiers: Vec<KeyedModifier>,
}

impl ResourceOptions {
    /// Declare a resource with the given ceiling.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, max: f64) -> Self {
        Self {
            id: ResourceId::new(id),
            name: name.into(),
            name_long: None,
            description: String::new(),
            color: String::new(),
            max,
            permits_negative_values: false,
            visible: Visibility::Always,
            max_modifiers: Vec::new(),
            generation_modifiers: Vec::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the display color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Allow the amount to go below zero.
    #[must_use]
    pub fn permitting_negative_values(mut self) -> Self {
        self.permits_negative_values = true;
        self
    }

    /// Set the visibility predicate.
    #[must_use]
    pub fn with_visibility(mut self, visible: Visibility) -> Self {
        self.visible = visible;
        self
    }

    /// Add an initial generation modifier.
    #[must_use]
    pub fn with_generation_modifier(mut self, key: impl Into<String>, modifier: Modifier) -> Self {
        self.generation_modifiers.push(KeyedModifier::new(key, modifier));
        self
    }

    /// Add an initial max modifier.
    #[must_use]
    pub fn with_max_modifier(mut self, key: impl Into<String>, modifier: Modifier) -> Self {
        self.max_modifiers.push(KeyedModifier::new(key, modifier));
        self
    }
}

/// Persisted state of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    /// Current amount.
    pub amount: f64,
    /// Lifetime total obtained.
    pub amount_ever_obtained: f64,
    /// Serializable max modifiers.
    #[serde(default, with = "ordered_modifiers")]
    pub max_modifiers: Vec<(String, Modifier)>,
    /// Serializable generation modifiers.
    #[serde(default, with = "ordered_modifiers")]
    pub generation_modifiers: Vec<(String, Modifier)>,
}

/// Keys added to each stack by [`Resource::restore_from`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredKeys {
    /// Keys added to the max stack.
    pub max: Vec<String>,
    /// Keys added to the generation stack.
    pub generation: Vec<String>,
}

/// Change notification emitted by a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceChange {
    /// The amount changed.
    Amount {
        /// Previous amount.
        old: f64,
        /// New amount.
        new: f64,
    },
    /// The visibility flag flipped.
    Visibility(bool),
    /// State was replaced from a snapshot.
    Restored,
}

/// A bounded, accumulating quantity.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    name: String,
    name_long: String,
    description: String,
    color: String,
    base_max: f64,
    permits_negative_values: bool,
    amount: f64,
    amount_ever_obtained: f64,
    max_modifiers: ModifierStack,
    generation_modifiers: ModifierStack,
    visibility: Visibility,
    visible: bool,
    observers: Observers<ResourceChange>,
}

impl Resource {
    /// Create a resource at amount zero.
    ///
    /// Initial modifiers listed in `options` are not installed here; the
    /// world installs them so timed entries get their countdowns.
    #[must_use]
    pub fn new(options: &ResourceOptions) -> Self {
        Self {
            id: options.id.clone(),
            name: options.name.clone(),
            name_long: options
                .name_long
                .clone()
                .unwrap_or_else(|| options.name.clone()),
            description: options.description.clone(),
            color: options.color.clone(),
            base_max: options.max,
            permits_negative_values: options.permits_negative_values,
            amount: 0.0,
            amount_ever_obtained: 0.0,
            max_modifiers: ModifierStack::new(),
            generation_modifiers: ModifierStack::new(),
            visibility: options.visible.clone(),
            visible: false,
            observers: Observers::new(),
        }
    }

    /// Resource id.
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Short display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Long display name.
    #[must_use]
    pub fn name_long(&self) -> &str {
        &self.name_long
    }

    /// Player-facing description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Display color.
    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }

    /// Declared ceiling before modifiers.
    #[must_use]
    pub const fn base_max(&self) -> f64 {
        self.base_max
    }

    /// Whether the amount may go below zero.
    #[must_use]
    pub const fn permits_negative_values(&self) -> bool {
        self.permits_negative_values
    }

    /// Current amount.
    #[must_use]
    pub const fn amount(&self) -> f64 {
        self.amount
    }

    /// Lifetime total obtained.
    #[must_use]
    pub const fn amount_ever_obtained(&self) -> f64 {
        self.amount_ever_obtained
    }

    /// Effective ceiling: `max_modifiers.apply(base_max)`.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max_modifiers.apply(self.base_max)
    }

    /// Max modifier stack.
    #[must_use]
    pub const fn max_modifiers(&self) -> &ModifierStack {
        &self.max_modifiers
    }

    /// Generation modifier stack.
    #[must_use]
    pub const fn generation_modifiers(&self) -> &ModifierStack {
        &self.generation_modifiers
    }

    /// Mutable max modifier stack.
    ///
    /// Timed entries set here do not count down; use
    /// [`World::set_modifier`](crate::world::World::set_modifier) for those.
    pub fn max_modifiers_mut(&mut self) -> &mut ModifierStack {
        &mut self.max_modifiers
    }

    /// Mutable generation modifier stack.
    ///
    /// Timed entries set here do not count down; use
    /// [`World::set_modifier`](crate::world::World::set_modifier) for those.
    pub fn generation_modifiers_mut(&mut self) -> &mut ModifierStack {
        &mut self.generation_modifiers
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

    /// Net generation per second.
    #[must_use]
    pub fn generation_rate(&self) -> f64 {
        self.generation_modifiers.apply(0.0)
    }

    /// Generation over `period` seconds.
    #[must_use]
    pub fn generation_amount(&self, period: f64) -> f64 {
        self.generation_rate() * period
    }

    /// Set the amount, clamped into `[0, max]` (`(-inf, max]` when negative
    /// values are permitted).
    ///
    /// Increases add to the lifetime total. NaN is ignored.
    pub fn set_amount(&mut self, value: f64) {
        if value.is_nan() {
            tracing::warn!(resource = %self.id, "Ignoring NaN amount");
            return;
        }
        let lower = self.lower_bound();
        let old = self.amount;
        let new = value.max(lower).min(self.max());
        self.amount = new;
        if new > old {
            self.amount_ever_obtained += new - old;
        }
        if new != old {
            self.observers.notify(&ResourceChange::Amount { old, new });
        }
    }

    fn lower_bound(&self) -> f64 {
        if self.permits_negative_values {
            f64::NEG_INFINITY
        } else {
            0.0
        }
    }

    /// Add `delta` through [`set_amount`](Self::set_amount).
    pub fn add(&mut self, delta: f64) {
        self.set_amount(self.amount + delta);
    }

    /// Add `delta` without clamping or lifetime tracking.
    ///
    /// Reserved for restore and migration paths.
    pub fn add_unsafe(&mut self, delta: f64) {
        let old = self.amount;
        self.amount += delta;
        self.observers.notify(&ResourceChange::Amount {
            old,
            new: self.amount,
        });
    }

    /// Passive accumulation over `delta` seconds.
    pub fn tick(&mut self, delta: f64) {
        let generated = self.generation_amount(delta);
        if generated != 0.0 {
            self.add(generated);
        }
    }

    /// Persisted state: amounts plus serializable modifiers.
    #[must_use]
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            amount: self.amount,
            amount_ever_obtained: self.amount_ever_obtained,
            max_modifiers: self.max_modifiers.serialized_values(),
            generation_modifiers: self.generation_modifiers.serialized_values(),
        }
    }

    /// Replace amounts from a snapshot and merge its modifiers.
    ///
    /// Modifiers are merged first, then the amount is clamped against the
    /// resulting max. A non-finite amount restores as the lower bound. The
    /// lifetime total is floored at the restored amount and at zero.
    /// Modifiers already installed (by declarations) win on key collision.
    pub fn restore_from(&mut self, snapshot: ResourceSnapshot) -> RestoredKeys {
        let keys = RestoredKeys {
            max: self.max_modifiers.merge_restored(snapshot.max_modifiers),
            generation: self
                .generation_modifiers
                .merge_restored(snapshot.generation_modifiers),
        };

        let lower = self.lower_bound();
        let amount = if snapshot.amount.is_nan() {
            lower.max(0.0)
        } else {
            snapshot.amount.max(lower).min(self.max())
        };
        let floor = amount.max(0.0);
        let ever = if snapshot.amount_ever_obtained.is_finite() {
            snapshot.amount_ever_obtained.max(floor)
        } else {
            floor
        };
        if amount != snapshot.amount || ever != snapshot.amount_ever_obtained {
            tracing::warn!(
                resource = %self.id,
                amount = snapshot.amount,
                ever = snapshot.amount_ever_obtained,
                "Clamped out-of-range saved amounts"
            );
        }
        self.amount = amount;
        self.amount_ever_obtained = ever;

        self.observers.notify(&ResourceChange::Restored);
        keys
    }

    /// Update the visibility flag. Returns `true` if it changed.
    pub(crate) fn set_visible(&mut self, visible: bool) -> bool {
        if visible == self.visible {
            return false;
        }
        self.visible = visible;
        self.observers.notify(&ResourceChange::Visibility(visible));
        true
    }

    /// Register a change observer.
    pub fn subscribe(&mut self, observer: impl FnMut(&ResourceChange) + 'static) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    /// Remove a change observer.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

impl Identified for Resource {
    type Id = ResourceId;
    const KIND: &'static str = "resource";

    fn id(&self) -> &ResourceId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::Operation;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fish() -> Resource {
        Resource::new(&ResourceOptions::new("fish", "Fish", 100.0))
    }

    #[test]
    fn test_clamps_to_max() {
        let mut resource = fish();
        resource.set_amount(150.0);
        assert_eq!(resource.amount(), 100.0);
        assert_eq!(resource.amount_ever_obtained(), 100.0);
    }

    #[test]
    fn test_clamps_to_zero() {
        let mut resource = fish();
        resource.set_amount(40.0);
        resource.set_amount(-10.0);
        assert_eq!(resource.amount(), 0.0);
        assert_eq!(resource.amount_ever_obtained(), 40.0);
    }

    #[test]
    fn test_negative_values_permitted() {
        let mut resource =
            Resource::new(&ResourceOptions::new("debt", "Debt", 10.0).permitting_negative_values());
        resource.set_amount(-5.0);
        assert_eq!(resource.amount(), -5.0);
        assert_eq!(resource.amount_ever_obtained(), 0.0);
    }

    #[test]
    fn test_lifetime_counts_only_increases() {
        let mut resource = fish();
        resource.set_amount(30.0);
        resource.set_amount(10.0);
        resource.set_amount(25.0);
        assert_eq!(resource.amount_ever_obtained(), 45.0);
    }

    #[test]
    fn test_nan_is_ignored() {
        let mut resource = fish();
        resource.set_amount(12.0);
        resource.set_amount(f64::NAN);
        assert_eq!(resource.amount(), 12.0);
    }

    #[test]
    fn test_max_modifiers_raise_ceiling() {
        let mut resource = fish();
        resource
            .max_modifiers_mut()
            .set("shelf", Modifier::new("Shelf", 2.0, Operation::Mul));
        resource.set_amount(150.0);
        assert_eq!(resource.max(), 200.0);
        assert_eq!(resource.amount(), 150.0);
    }

    #[test]
    fn test_tick_uses_generation_rate() {
        let mut resource = fish();
        resource
            .generation_modifiers_mut()
            .set("base", Modifier::new("Base", 2.0, Operation::Add));
        resource
            .generation_modifiers_mut()
            .set("boost", Modifier::new("Boost", 1.5, Operation::Mul).with_priority(0.0));

        assert_eq!(resource.generation_rate(), 3.0);
        resource.tick(0.5);
        assert_eq!(resource.amount(), 1.5);
    }

    #[test]
    fn test_negative_generation_clamps_at_zero() {
        let mut resource = fish();
        resource
            .generation_modifiers_mut()
            .set("hunger", Modifier::new("Hunger", 0.03, Operation::Sub));
        resource.tick(1.0);
        assert_eq!(resource.amount(), 0.0);
    }

    #[test]
    fn test_add_unsafe_bypasses_clamp() {
        let mut resource = fish();
        resource.add_unsafe(500.0);
        assert_eq!(resource.amount(), 500.0);
        assert_eq!(resource.amount_ever_obtained(), 0.0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut resource = fish();
        resource.set_amount(42.5);
        resource.set_amount(20.0);
        resource.generation_modifiers_mut().set(
            "net",
            Modifier::new("Net", 0.5, Operation::Add).serialized(),
        );
        resource
            .generation_modifiers_mut()
            .set("temp", Modifier::new("Temp", 9.0, Operation::Add));

        let snapshot = resource.snapshot();
        let mut restored = fish();
        let keys = restored.restore_from(snapshot);

        assert_eq!(restored.amount(), 20.0);
        assert_eq!(restored.amount_ever_obtained(), 42.5);
        assert_eq!(keys.generation, vec!["net".to_string()]);
        assert!(restored.generation_modifiers().contains_key("net"));
        assert!(!restored.generation_modifiers().contains_key("temp"));
    }

    #[test]
    fn test_restore_keeps_declared_modifiers() {
        let mut saved = fish();
        saved.generation_modifiers_mut().set(
            "hunger",
            Modifier::new("Old Hunger", 1.0, Operation::Sub).serialized(),
        );
        let snapshot = saved.snapshot();

        let mut current = fish();
        current.generation_modifiers_mut().set(
            "hunger",
            Modifier::new("Hunger", 0.03, Operation::Sub).serialized(),
        );
        let keys = current.restore_from(snapshot);

        assert!(keys.generation.is_empty());
        assert_eq!(
            current.generation_modifiers().get("hunger").map(|m| m.amount),
            Some(0.03)
        );
    }

    #[test]
    fn test_restore_clamps_out_of_range_amounts() {
        let snapshot = |amount, ever| ResourceSnapshot {
            amount,
            amount_ever_obtained: ever,
            max_modifiers: Vec::new(),
            generation_modifiers: Vec::new(),
        };

        let mut below = fish();
        below.restore_from(snapshot(-50.0, -3.0));
        assert_eq!(below.amount(), 0.0);
        assert_eq!(below.amount_ever_obtained(), 0.0);

        let mut above = fish();
        above.restore_from(snapshot(1e6, 5.0));
        assert_eq!(above.amount(), 100.0);
        assert_eq!(above.amount_ever_obtained(), 100.0);

        let mut garbage = fish();
        garbage.restore_from(snapshot(f64::NAN, f64::INFINITY));
        assert_eq!(garbage.amount(), 0.0);
        assert_eq!(garbage.amount_ever_obtained(), 0.0);
    }

    #[test]
    fn test_restore_clamps_against_restored_max() {
        let mut saved = fish();
        saved.max_modifiers_mut().set(
            "rack",
            Modifier::new("Rack", 100.0, Operation::Add).serialized(),
        );
        saved.set_amount(150.0);

        let mut restored = fish();
        restored.restore_from(saved.snapshot());
        assert_eq!(restored.max(), 200.0);
        assert_eq!(restored.amount(), 150.0);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut resource = fish();
        resource.set_amount(3.0);
        let json = serde_json::to_value(resource.snapshot()).unwrap();
        assert_eq!(json["amount"], 3.0);
        assert_eq!(json["amountEverObtained"], 3.0);
        assert!(json["maxModifiers"].as_object().unwrap().is_empty());
        assert!(json["generationModifiers"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_observers_notified_on_change_only() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut resource = fish();
        let sink = Rc::clone(&log);
        resource.subscribe(move |change| sink.borrow_mut().push(*change));

        resource.set_amount(5.0);
        resource.set_amount(5.0);
        assert!(resource.set_visible(true));
        assert!(!resource.set_visible(true));

        assert_eq!(
            *log.borrow(),
            vec![
                ResourceChange::Amount { old: 0.0, new: 5.0 },
                ResourceChange::Visibility(true),
            ]
        );
    }
}
