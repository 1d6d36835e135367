//! Change-notification registry.
//!
//! Entities hold an [`Observers`] list and call [`Observers::notify`]
//! synchronously whenever their externally visible state changes.
//! Observers receive a shared reference to the change and cannot mutate
//! the entity that produced it.

use std::fmt;

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Callback invoked for every change of type `E`.
pub type Observer<E> = Box<dyn FnMut(&E)>;

/// Ordered list of observers for one entity.
pub struct Observers<E> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Observer<E>)>,
}

impl<E> Observers<E> {
    /// Create an empty observer list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    /// Register a callback. Callbacks run in subscription order.
    pub fn subscribe(&mut self, observer: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(observer)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    /// Deliver a change to every subscriber.
    pub fn notify(&mut self, change: &E) {
        for (_, observer) in &mut self.subscribers {
            observer(change);
        }
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.subscribers.len())
            .finish()
    }
}
