//! Global run settings.
//!
//! Read from a JSON settings file, then overridden field by field from the command
//! line. The file is optional; a missing file yields empty settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_LEVEL: &str = "DEBUG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub project_name: Option<String>,
    pub project_folder: Option<PathBuf>,
    /// Interpreter used to execute the model scripts.
    pub python_path: Option<PathBuf>,
    /// Folder holding the model system entry scripts.
    pub scripts_path: Option<PathBuf>,
    pub base_data_folder: Option<PathBuf>,
    pub log_level: Option<String>,
    pub mode_dest_calibration_file: Option<PathBuf>,
    pub municipality_calibration_file: Option<PathBuf>,
}

impl GlobalConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("scenario-orchestrator").join("settings.json"))
    }

    /// Load settings from `path`, or from [`GlobalConfig::default_path`] when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            tracing::debug!("no settings file at {}", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read settings {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse settings {}", path.display()))
    }

    /// Apply every field that is set in `overrides` on top of `self`.
    pub fn merge(self, overrides: GlobalConfig) -> Self {
        Self {
            project_name: overrides.project_name.or(self.project_name),
            project_folder: overrides.project_folder.or(self.project_folder),
            python_path: overrides.python_path.or(self.python_path),
            scripts_path: overrides.scripts_path.or(self.scripts_path),
            base_data_folder: overrides.base_data_folder.or(self.base_data_folder),
            log_level: overrides.log_level.or(self.log_level),
            mode_dest_calibration_file: overrides
                .mode_dest_calibration_file
                .or(self.mode_dest_calibration_file),
            municipality_calibration_file: overrides
                .municipality_calibration_file
                .or(self.municipality_calibration_file),
        }
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}
