//! Simulation cadences.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::ticker::DEFAULT_TICK_INTERVAL;

/// Tick cadences in seconds for every periodic concern of the world.
///
/// # Example RON
///
/// ```ron
/// (
///     generation_interval: 0.1,
///     autosave_interval: 5.0,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Cadence for callbacks tracked without an explicit interval.
    pub default_interval: f64,
    /// Resource generation.
    pub generation_interval: f64,
    /// Resource and command visibility recomputation.
    pub visibility_interval: f64,
    /// Command `can_run` recomputation.
    pub availability_interval: f64,
    /// Timed modifier countdowns.
    pub countdown_interval: f64,
    /// Play-time accumulation and its persistence.
    pub time_played_interval: f64,
    /// Persisting registries to the attached store.
    pub autosave_interval: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_TICK_INTERVAL,
            generation_interval: 0.1,
            visibility_interval: 0.05,
            availability_interval: 0.05,
            countdown_interval: 0.1,
            time_played_interval: 0.1,
            autosave_interval: 0.1,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from RON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`GameError::DataParseError`] on malformed input or a non-positive
    /// interval.
    pub fn from_ron(text: &str, label: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        config.check().map_err(|message| GameError::DataParseError {
            path: label.to_string(),
            message,
        })?;
        Ok(config)
    }

    fn check(&self) -> std::result::Result<(), String> {
        let intervals = [
            ("default_interval", self.default_interval),
            ("generation_interval", self.generation_interval),
            ("visibility_interval", self.visibility_interval),
            ("availability_interval", self.availability_interval),
            ("countdown_interval", self.countdown_interval),
            ("time_played_interval", self.time_played_interval),
            ("autosave_interval", self.autosave_interval),
        ];
        match intervals
            .iter()
            .find(|(_, seconds)| !seconds.is_finite() || *seconds <= 0.0)
        {
            Some((name, seconds)) => Err(format!("{name} must be positive, got {seconds}")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = SimConfig::from_ron("(autosave_interval: 5.0)", "test").unwrap();
        assert_eq!(config.autosave_interval, 5.0);
        assert_eq!(config.generation_interval, 0.1);
        assert_eq!(config.default_interval, DEFAULT_TICK_INTERVAL);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = SimConfig::from_ron("(countdown_interval: 0.0)", "bad.ron").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { ref path, .. } if path == "bad.ron"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(SimConfig::from_ron("not ron", "x").is_err());
    }
}
