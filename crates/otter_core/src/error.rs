//! Error types for the game simulation.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    /// Lookup of an id that was never registered.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of registry that was searched ("resource", "command").
        kind: &'static str,
        /// The id that was requested.
        id: String,
    },

    /// An item with the same id is already registered.
    #[error("Duplicate {kind} id: {id}")]
    DuplicateId {
        /// Kind of registry.
        kind: &'static str,
        /// The colliding id.
        id: String,
    },

    /// The command was declared without a quantity modifier stack.
    #[error("Command '{0}' has no quantity modifiers")]
    NoQuantityModifiers(String),

    /// The tick target is already being tracked.
    #[error("Already tracked: {0}")]
    AlreadyTracked(String),

    /// The timer or target is not tracked by the ticker.
    #[error("Not tracked: {0}")]
    NotTracked(String),

    /// Reading or writing persisted state failed.
    #[error("Persistence failure for key '{key}': {message}")]
    Persistence {
        /// Storage key involved.
        key: String,
        /// Error message.
        message: String,
    },

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Content declarations are internally inconsistent.
    #[error("Invalid content: {0}")]
    InvalidContent(String),
}

impl GameError {
    /// Build a not-found error for a resource id.
    #[must_use]
    pub fn resource_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "resource",
            id: id.into(),
        }
    }

    /// Build a not-found error for a command id.
    #[must_use]
    pub fn command_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "command",
            id: id.into(),
        }
    }

    /// Whether this error is a not-found outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
