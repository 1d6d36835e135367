//! Offline catch-up runner.
//!
//! Loads content and a save file, moves the clock forward, and writes
//! the save back.

use std::path::{Path, PathBuf};

use otter_core::config::SimConfig;
use otter_core::format::{display, DISPLAY_PLACES};
use otter_core::persistence::LoadReport;
use otter_core::world::World;

use crate::error::{ToolError, ToolResult};
use crate::store::JsonFileStore;
use crate::validate::validate_content_file;

/// How to advance the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceMode {
    /// Fire every timer on the virtual clock.
    Clock,
    /// One `force_tick` pass over the periodic timers.
    Force,
}

/// Inputs for [`run`].
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// RON content file.
    pub content: PathBuf,
    /// JSON save file, created if missing.
    pub save: PathBuf,
    /// Optional RON cadence overrides.
    pub config: Option<PathBuf>,
    /// Seconds to simulate.
    pub seconds: f64,
    /// How to move the clock.
    pub mode: AdvanceMode,
}

/// One resource line in a [`SimulationSummary`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLine {
    /// Resource id.
    pub id: String,
    /// Amount after the run.
    pub amount: f64,
    /// Effective maximum after the run.
    pub max: f64,
    /// Whether the player can see it.
    pub visible: bool,
}

/// Outcome of [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSummary {
    /// What the save contained.
    pub loaded: LoadReport,
    /// Play time after the run.
    pub time_played: f64,
    /// Every registered resource.
    pub resources: Vec<ResourceLine>,
}

impl SimulationSummary {
    /// Render as aligned text lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let width = self.resources.iter().map(|r| r.id.len()).max().unwrap_or(0);
        let mut lines = vec![format!(
            "time played: {}s",
            display(self.time_played, DISPLAY_PLACES)
        )];
        for resource in &self.resources {
            let marker = if resource.visible { ' ' } else { '?' };
            lines.push(format!(
                "{marker} {:<width$}  {} / {}",
                resource.id,
                display(resource.amount, DISPLAY_PLACES),
                display(resource.max, DISPLAY_PLACES),
            ));
        }
        lines
    }
}

/// Read cadence overrides from a RON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
pub fn load_config(path: &Path) -> ToolResult<SimConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| ToolError::io(path, e))?;
    Ok(SimConfig::from_ron(&text, &path.display().to_string())?)
}

/// Load, advance, save.
///
/// # Errors
///
/// Returns an error if the content is invalid, or if a file cannot be
/// read or written. A corrupt save is not an error; it starts fresh.
pub fn run(options: &SimulateOptions) -> ToolResult<SimulationSummary> {
    let config = match &options.config {
        Some(path) => load_config(path)?,
        None => SimConfig::default(),
    };
    let content = validate_content_file(&options.content)?;

    let mut world = World::with_config(config);
    content.install(&mut world)?;

    let mut store = JsonFileStore::open(&options.save)?;
    let loaded = world.load_from(&store);
    tracing::info!(
        resources = loaded.restored_resources.len(),
        commands = loaded.restored_commands.len(),
        skipped = loaded.skipped.len(),
        "Save loaded"
    );

    match options.mode {
        AdvanceMode::Clock => world.advance(options.seconds),
        AdvanceMode::Force => world.force_tick(options.seconds),
    }
    tracing::info!(seconds = options.seconds, mode = ?options.mode, "Simulated");

    world.save_to(&mut store)?;
    store.flush()?;

    let resources = world
        .resources()
        .iter()
        .map(|resource| ResourceLine {
            id: resource.id().to_string(),
            amount: resource.amount(),
            max: resource.max(),
            visible: resource.is_visible(),
        })
        .collect();

    Ok(SimulationSummary {
        loaded,
        time_played: world.time_played(),
        resources,
    })
}
