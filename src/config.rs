// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{CameraBackendType, Facing};
use crate::constants::{BitratePreset, app_info, recording, timing};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration file name inside the application's config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Errors reading or writing the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory on this system")]
    NoConfigDir,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera API to drive (modern or legacy)
    pub backend: CameraBackendType,
    /// Facing of the camera opened on start
    pub preferred_facing: Facing,
    /// Deadline for each auto-focus / auto-exposure wait
    pub converge_timeout_ms: u64,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    pub video_framerate: u32,
    pub record_audio: bool,
    /// Overrides the default Pictures directory
    pub photo_dir: Option<PathBuf>,
    /// Overrides the default Videos directory
    pub video_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: CameraBackendType::default(),
            preferred_facing: Facing::Back,
            converge_timeout_ms: timing::CONVERGE_TIMEOUT.as_millis() as u64,
            bitrate_preset: BitratePreset::default(), // Default to Medium
            video_framerate: recording::DEFAULT_FRAMERATE,
            record_audio: true,
            photo_dir: None,
            video_dir: None,
        }
    }
}

impl Config {
    pub fn converge_timeout(&self) -> Duration {
        Duration::from_millis(self.converge_timeout_ms)
    }

    /// `<config_dir>/camera-orchestrator/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(app_info::CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_error)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path()?)
    }
}
