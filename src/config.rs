// SPDX-License-Identifier: GPL-3.0-only

//! Persisted user configuration
//!
//! Stored as pretty JSON in `$XDG_CONFIG_HOME/interval-camera/config.json`.
//! Only the command line host reads and writes it; it pre-populates the
//! defaults of a run.

use crate::backends::camera::{CameraBackendType, CaptureSettings};
use crate::constants::{
    APP_DIR_NAME, DEFAULT_INTERVAL_SECONDS, DEFAULT_TOTAL_SHOTS, is_valid_interval,
    is_valid_shot_count,
};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between two shots
    pub interval_seconds: u32,
    /// Shots per run
    pub total_shots: u32,
    /// Capture settings of the last run
    pub settings: CaptureSettings,
    /// Camera backend to use (V4L2 or virtual)
    pub backend: CameraBackendType,
    /// Last used camera id (device path for V4L2)
    pub last_camera_id: Option<String>,
    /// Photo directory, `$XDG_PICTURES_DIR/interval-camera` when unset
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            total_shots: DEFAULT_TOTAL_SHOTS,
            settings: CaptureSettings::default(),
            backend: CameraBackendType::default(),
            last_camera_id: None,
            output_dir: None,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/interval-camera/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn has_saved(path: &Path) -> bool {
        path.is_file()
    }

    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config.validate())
    }

    /// Missing file gives defaults; an unreadable one is reported and ignored
    pub fn load_or_default(path: &Path) -> Self {
        if !Self::has_saved(path) {
            debug!(path = %path.display(), "No saved config, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Write the config, creating its directory
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Back to defaults, keeping the backend choice
    pub fn reset(&mut self) {
        *self = Self {
            backend: self.backend,
            ..Self::default()
        };
    }

    /// Replace out-of-range values with defaults
    pub fn validate(mut self) -> Self {
        if !is_valid_interval(self.interval_seconds) {
            warn!(
                interval_seconds = self.interval_seconds,
                "Configured interval out of range, using default"
            );
            self.interval_seconds = DEFAULT_INTERVAL_SECONDS;
        }
        if !is_valid_shot_count(self.total_shots) {
            warn!(
                total_shots = self.total_shots,
                "Configured shot count out of range, using default"
            );
            self.total_shots = DEFAULT_TOTAL_SHOTS;
        }
        if !self.settings.zoom_ratio.is_finite() || self.settings.zoom_ratio < 1.0 {
            self.settings.zoom_ratio = 1.0;
        }
        self
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "interval:    {}s", self.interval_seconds)?;
        writeln!(f, "shots:       {}", self.total_shots)?;
        writeln!(f, "settings:    {}", self.settings)?;
        writeln!(f, "backend:     {}", self.backend)?;
        writeln!(
            f,
            "camera:      {}",
            self.last_camera_id.as_deref().unwrap_or("(auto)")
        )?;
        match &self.output_dir {
            Some(dir) => write!(f, "output dir:  {}", dir.display()),
            None => write!(f, "output dir:  (default)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::LensFacing;

    #[test]
    fn test_validate_replaces_out_of_range_values() {
        let config = Config {
            interval_seconds: 0,
            total_shots: 5000,
            ..Config::default()
        }
        .validate();
        assert_eq!(config.interval_seconds, DEFAULT_INTERVAL_SECONDS);
        assert_eq!(config.total_shots, DEFAULT_TOTAL_SHOTS);
    }

    #[test]
    fn test_reset_keeps_backend() {
        let mut config = Config {
            interval_seconds: 60,
            backend: CameraBackendType::Virtual,
            settings: CaptureSettings {
                lens_facing: LensFacing::Front,
                ..Default::default()
            },
            ..Config::default()
        };
        config.reset();
        assert_eq!(config.interval_seconds, DEFAULT_INTERVAL_SECONDS);
        assert_eq!(config.settings, CaptureSettings::default());
        assert_eq!(config.backend, CameraBackendType::Virtual);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{ "interval_seconds": 30 }"#).unwrap();
        assert_eq!(config.interval_seconds, 30);
        assert_eq!(config.total_shots, DEFAULT_TOTAL_SHOTS);
    }
}
