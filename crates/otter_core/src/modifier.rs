//! Modifiers and modifier stacks.
//!
//! A [`Modifier`] is a named arithmetic adjustment. A [`ModifierStack`] owns
//! a keyed set of modifiers and folds a base value through them in
//! descending priority order. Ties keep insertion order, so identical stack
//! contents always produce identical results.
//!
//! Timed modifiers (`duration` set) only count down when the stack is owned
//! by a [`World`](crate::world::World) and mutated through
//! [`World::set_modifier`](crate::world::World::set_modifier); the world
//! schedules the countdown with its ticker and deletes the entry on expiry.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::format::{display, DISPLAY_PLACES};
use crate::observer::{Observers, SubscriptionId};
use crate::ticker::TimerId;

/// Arithmetic operation applied by a modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `value + operand`
    Add,
    /// `value - operand`
    Sub,
    /// `value * operand`
    Mul,
    /// `value / operand`
    Div,
    /// `value ^ operand`
    Pow,
    /// A tag that is not one of the five supported symbols.
    ///
    /// Only produced when parsing persisted or declared data; skipped
    /// during every fold.
    Unrecognized,
}

impl Operation {
    /// Parse an operation symbol (`+ - * / ^`).
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "^" => Self::Pow,
            _ => Self::Unrecognized,
        }
    }

    /// The persisted symbol for this operation.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Unrecognized => "?",
        }
    }

    /// Apply this operation to `value`.
    ///
    /// Returns `None` when the step must be skipped: unrecognized tags,
    /// division or exponentiation by zero, and results that turn a finite
    /// value into a non-finite one.
    #[must_use]
    pub fn apply(self, value: f64, operand: f64) -> Option<f64> {
        let result = match self {
            Self::Add => value + operand,
            Self::Sub => value - operand,
            Self::Mul => value * operand,
            Self::Div if operand == 0.0 => return None,
            Self::Div => value / operand,
            Self::Pow if operand == 0.0 => return None,
            Self::Pow => value.powf(operand),
            Self::Unrecognized => return None,
        };
        if result.is_nan() || (result.is_infinite() && value.is_finite()) {
            return None;
        }
        Some(result)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Operation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let symbol = String::deserialize(deserializer)?;
        let operation = Self::from_symbol(&symbol);
        if operation == Self::Unrecognized {
            tracing::warn!(symbol = %symbol, "Unrecognized modifier operation");
        }
        Ok(operation)
    }
}

const fn one() -> f64 {
    1.0
}

/// A named arithmetic adjustment applicable to a base value.
///
/// The effective operand is `amount * quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
    /// Player-facing name.
    pub name: String,
    /// Amount the operation uses.
    pub amount: f64,
    /// Operation to apply.
    pub operation: Operation,
    /// Multiplied by `amount` to get the operand.
    #[serde(default = "one")]
    pub quantity: f64,
    /// Higher priorities fold first.
    #[serde(default = "one")]
    pub priority: f64,
    /// Whether this modifier is persisted with its owner.
    #[serde(default)]
    pub serialize: bool,
    /// Seconds remaining; `None` is permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Modifier {
    /// Create a permanent, ephemeral modifier with quantity 1 and priority 1.
    #[must_use]
    pub fn new(name: impl Into<String>, amount: f64, operation: Operation) -> Self {
        Self {
            name: name.into(),
            amount,
            operation,
            quantity: 1.0,
            priority: 1.0,
            serialize: false,
            duration: None,
        }
    }

    /// Set the quantity.
    #[must_use]
    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the modifier as persisted.
    #[must_use]
    pub fn serialized(mut self) -> Self {
        self.serialize = true;
        self
    }

    /// Give the modifier a lifetime in seconds.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// The operand used when folding: `amount * quantity`.
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.amount * self.quantity
    }

    /// Whether the modifier expires.
    #[must_use]
    pub const fn is_timed(&self) -> bool {
        self.duration.is_some()
    }

    /// Short player-facing description of the effect, e.g. `+20%`.
    #[must_use]
    pub fn describe(&self) -> String {
        let m = self.magnitude();
        match self.operation {
            Operation::Add => format!("+{}", display(m, DISPLAY_PLACES)),
            Operation::Sub => format!("-{}", display(m, DISPLAY_PLACES)),
            Operation::Mul => format!("+{}%", display((m - 1.0) * 100.0, DISPLAY_PLACES)),
            Operation::Div if m == 0.0 => "?".to_string(),
            Operation::Div => format!("-{}%", display((1.0 - 1.0 / m) * 100.0, DISPLAY_PLACES)),
            Operation::Pow => format!("^{}", display(m, DISPLAY_PLACES)),
            Operation::Unrecognized => "?".to_string(),
        }
    }
}

/// A modifier paired with the stack key it is installed under.
///
/// Used by content declarations, where initial modifiers are listed in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedModifier {
    /// Stack key.
    pub key: String,
    /// The modifier.
    pub modifier: Modifier,
}

impl KeyedModifier {
    /// Pair a key with a modifier.
    #[must_use]
    pub fn new(key: impl Into<String>, modifier: Modifier) -> Self {
        Self {
            key: key.into(),
            modifier,
        }
    }
}

/// Change notification emitted by a [`ModifierStack`].
#[derive(Debug, Clone, PartialEq)]
pub enum StackChange {
    /// An entry was inserted or replaced.
    Set {
        /// Entry key.
        key: String,
        /// New modifier.
        modifier: Modifier,
    },
    /// An entry was removed.
    Deleted {
        /// Entry key.
        key: String,
        /// Removed modifier.
        modifier: Modifier,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    modifier: Modifier,
    countdown: Option<TimerId>,
}

/// Keyed collection of modifiers folded into one net adjustment.
///
/// Keys are unique; setting an existing key replaces the entry in place.
#[derive(Debug, Default)]
pub struct ModifierStack {
    entries: Vec<Entry>,
    observers: Observers<StackChange>,
}

impl ModifierStack {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stack from entries in order, without notifying anyone.
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Modifier)>) -> Self {
        let mut stack = Self::new();
        for (key, modifier) in entries {
            stack.insert(key.into(), modifier);
        }
        stack
    }

    /// Insert or replace the entry at `key`.
    ///
    /// Returns the replaced modifier. Observers are notified.
    pub fn set(&mut self, key: impl Into<String>, modifier: Modifier) -> Option<Modifier> {
        let key = key.into();
        let previous = self.insert(key.clone(), modifier.clone());
        self.observers.notify(&StackChange::Set { key, modifier });
        previous
    }

    /// Remove the entry at `key`, if present. Observers are notified on removal.
    pub fn delete(&mut self, key: &str) -> Option<Modifier> {
        let index = self.position(key)?;
        let entry = self.entries.remove(index);
        self.observers.notify(&StackChange::Deleted {
            key: entry.key,
            modifier: entry.modifier.clone(),
        });
        Some(entry.modifier)
    }

    /// Look up a modifier by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Modifier> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.modifier)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Modifier)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.modifier))
    }

    /// Entries sorted by descending priority, ties in insertion order.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<(&str, &Modifier)> {
        let mut sorted: Vec<(&str, &Modifier)> = self.iter().collect();
        sorted.sort_by(|a, b| b.1.priority.total_cmp(&a.1.priority));
        sorted
    }

    /// Fold `base` through every entry in priority order.
    ///
    /// Entries whose step is invalid (unrecognized operation, division or
    /// exponentiation by zero, non-finite result) are logged and skipped.
    #[must_use]
    pub fn apply(&self, base: f64) -> f64 {
        self.sorted_entries()
            .into_iter()
            .fold(base, |value, (key, modifier)| {
                match modifier.operation.apply(value, modifier.magnitude()) {
                    Some(next) => next,
                    None => {
                        tracing::warn!(
                            key = %key,
                            modifier = %modifier.name,
                            operation = %modifier.operation,
                            operand = modifier.magnitude(),
                            "Skipping invalid modifier step"
                        );
                        value
                    }
                }
            })
    }

    /// Entries flagged for persistence, in insertion order.
    #[must_use]
    pub fn serialized_values(&self) -> Vec<(String, Modifier)> {
        self.entries
            .iter()
            .filter(|e| e.modifier.serialize)
            .map(|e| (e.key.clone(), e.modifier.clone()))
            .collect()
    }

    /// Register a change observer.
    pub fn subscribe(&mut self, observer: impl FnMut(&StackChange) + 'static) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    /// Remove a change observer.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Merge restored entries under the ones already installed.
    ///
    /// Entries follow the saved order, then any installed keys the save
    /// lacks. On a key collision the installed value wins but keeps the
    /// saved position, so equal-priority ties fold the way they did before
    /// the save. Returns the keys that were added.
    pub(crate) fn merge_restored(&mut self, restored: Vec<(String, Modifier)>) -> Vec<String> {
        let mut merged = Vec::with_capacity(restored.len() + self.entries.len());
        let mut added = Vec::new();
        for (key, modifier) in restored {
            if merged.iter().any(|e: &Entry| e.key == key) {
                continue;
            }
            if let Some(index) = self.entries.iter().position(|e| e.key == key) {
                merged.push(self.entries.remove(index));
                continue;
            }
            added.push(key.clone());
            merged.push(Entry {
                key,
                modifier,
                countdown: None,
            });
        }
        merged.append(&mut self.entries);
        self.entries = merged;

        for key in &added {
            if let Some(modifier) = self.get(key).cloned() {
                self.observers.notify(&StackChange::Set {
                    key: key.clone(),
                    modifier,
                });
            }
        }
        added
    }

    /// Countdown timer attached to `key`.
    pub(crate) fn countdown_of(&self, key: &str) -> Option<TimerId> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.countdown)
    }

    /// Attach a countdown timer to `key`. Returns `false` if the key is absent.
    pub(crate) fn attach_countdown(&mut self, key: &str, timer: TimerId) -> bool {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.countdown = Some(timer);
                true
            }
            None => false,
        }
    }

    /// Subtract `delta` from the remaining duration of `key`.
    ///
    /// Returns the remaining seconds, or `None` when the entry is missing,
    /// permanent, or owned by a different timer.
    pub(crate) fn count_down(&mut self, key: &str, timer: TimerId, delta: f64) -> Option<f64> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.key == key && e.countdown == Some(timer))?;
        let remaining = entry.modifier.duration.as_mut()?;
        *remaining -= delta;
        Some(*remaining)
    }

    fn insert(&mut self, key: String, modifier: Modifier) -> Option<Modifier> {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.countdown = None;
                Some(std::mem::replace(&mut entry.modifier, modifier))
            }
            None => {
                self.entries.push(Entry {
                    key,
                    modifier,
                    countdown: None,
                });
                None
            }
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }
}

/// Serde support for ordered `(key, Modifier)` lists.
///
/// Serializes as a map in list order and deserializes in document order,
/// so tie-breaking by insertion order survives a save round trip.
pub mod ordered_modifiers {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::Modifier;

    /// Serialize entries as a map, preserving order.
    pub fn serialize<S>(entries: &[(String, Modifier)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, modifier) in entries {
            map.serialize_entry(key, modifier)?;
        }
        map.end()
    }

    /// Deserialize a map into entries, preserving document order.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, Modifier)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, Modifier)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of modifier keys to modifiers")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, modifier)) = access.next_entry::<String, Modifier>()? {
                    entries.push((key, modifier));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
