//! Generic id-keyed registries.
//!
//! Registries are append-only and preserve registration order. Lookups
//! scan linearly; cardinalities are small (a few dozen items per game).

use std::fmt::Display;

use crate::error::{GameError, Result};

/// Items that can be stored in a [`Registry`].
pub trait Identified {
    /// Identifier type.
    type Id: PartialEq + Display + ?Sized;

    /// Name of the item kind, used in not-found errors.
    const KIND: &'static str;

    /// The item's identifier.
    fn id(&self) -> &Self::Id;
}

/// Append-only ordered collection of id-keyed items.
#[derive(Debug)]
pub struct Registry<T> {
    items: Vec<T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Identified> Registry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item.
    ///
    /// # Errors
    ///
    /// [`GameError::DuplicateId`] if an item with the same id exists.
    pub fn register(&mut self, item: T) -> Result<()> {
        if self.contains(item.id()) {
            return Err(GameError::DuplicateId {
                kind: T::KIND,
                id: item.id().to_string(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Look up an item by id.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] if no item has this id.
    pub fn get_by_id(&self, id: &T::Id) -> Result<&T> {
        self.items
            .iter()
            .find(|item| item.id() == id)
            .ok_or_else(|| Self::not_found(id))
    }

    /// Look up an item by id, mutably.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] if no item has this id.
    pub fn get_by_id_mut(&mut self, id: &T::Id) -> Result<&mut T> {
        self.items
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| Self::not_found(id))
    }

    /// Whether an item with this id is registered.
    #[must_use]
    pub fn contains(&self, id: &T::Id) -> bool {
        self.items.iter().any(|item| item.id() == id)
    }

    /// All items in registration order.
    #[must_use]
    pub fn all(&self) -> &[T] {
        &self.items
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterate mutably in registration order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Number of registered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn not_found(id: &T::Id) -> GameError {
        GameError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        }
    }
}
