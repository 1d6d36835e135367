//! Errors for the command-line tools.

use otter_core::error::GameError;
use thiserror::Error;

/// Errors that can occur while running a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Failed to read or write a file.
    #[error("Failed to access '{path}': {source}")]
    Io {
        /// Path to the file.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Content failed validation.
    #[error("Validation failed for '{path}': {errors:?}")]
    Validation {
        /// File that failed validation.
        path: String,
        /// List of validation errors.
        errors: Vec<String>,
    },

    /// Error from the simulation core.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

impl ToolError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
