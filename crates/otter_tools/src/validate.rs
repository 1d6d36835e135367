//! Content validation.

use std::path::{Path, PathBuf};

use otter_core::data::ContentData;

use crate::error::{ToolError, ToolResult};

/// Read, parse and cross-check one RON content file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or
/// fails [`ContentData::validate`].
pub fn validate_content_file(path: &Path) -> ToolResult<ContentData> {
    let text = std::fs::read_to_string(path).map_err(|e| ToolError::io(path, e))?;
    let label = path.display().to_string();
    let content = ContentData::from_ron(&text, &label)?;

    let errors = content.validate();
    if !errors.is_empty() {
        return Err(ToolError::Validation {
            path: label,
            errors,
        });
    }

    tracing::info!(
        path = %label,
        resources = content.resources.len(),
        commands = content.commands.len(),
        "Content is valid"
    );
    Ok(content)
}

/// Validate every `.ron` file in a directory, in name order.
///
/// Returns the number of files checked.
///
/// # Errors
///
/// Returns the first failure encountered.
pub fn validate_data_directory(dir: &Path) -> ToolResult<usize> {
    let entries = std::fs::read_dir(dir).map_err(|e| ToolError::io(dir, e))?;
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ToolError::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "ron") {
            files.push(path);
        }
    }
    files.sort();

    for file in &files {
        validate_content_file(file)?;
    }
    Ok(files.len())
}

/// Validate `path`, which may be a single file or a directory.
///
/// # Errors
///
/// See [`validate_content_file`] and [`validate_data_directory`].
pub fn validate_path(path: &Path) -> ToolResult<usize> {
    if path.is_dir() {
        validate_data_directory(path)
    } else {
        validate_content_file(path).map(|_| 1)
    }
}
