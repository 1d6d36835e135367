//! A save store backed by a single JSON file.
//!
//! The file holds one object mapping each store key to its blob, so a
//! save is readable and diffable by hand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use otter_core::error::{GameError, Result};
use otter_core::persistence::SaveStore;

use crate::error::{ToolError, ToolResult};

/// Key-value store persisted to one JSON file.
///
/// Writes are held in memory until [`JsonFileStore::flush`].
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist yet.
    ///
    /// A file that is not a JSON object of strings is discarded with a
    /// warning, the same way a corrupt blob is treated on load.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> ToolResult<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Ignoring corrupt save file");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(ToolError::io(&path, err)),
        };
        Ok(Self { path, values })
    }

    /// Location on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write the current contents to disk, replacing the file in one rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn flush(&self) -> ToolResult<()> {
        let text =
            serde_json::to_string_pretty(&self.values).map_err(|e| GameError::Persistence {
                key: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, text).map_err(|e| ToolError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| ToolError::io(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), keys = self.values.len(), "Save file written");
        Ok(())
    }
}

impl SaveStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: String) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
