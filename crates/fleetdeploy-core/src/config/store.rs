//! Config store for loading and saving fleetdeploy.toml.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::{FleetConfig, parser, schema::FleetConfigFile};

pub const CONFIG_FILE_NAME: &str = "fleetdeploy.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at `<config dir>/fleetdeploy/fleetdeploy.toml`.
    pub fn from_default() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir()
            .ok_or_else(|| {
                ConfigError::InvalidConfiguration(
                    "Could not determine config directory".to_string(),
                )
            })?
            .join("fleetdeploy");
        Ok(Self::from_path(dir.join(CONFIG_FILE_NAME)))
    }

    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Load and validate. A missing file is an error: there is no usable
    /// default MDM server.
    pub fn load(&self) -> Result<FleetConfig, ConfigError> {
        parser::parse_fleet_toml(&self.config_path)
    }

    /// Load the raw file without validation, or an empty schema if absent.
    pub fn load_file(&self) -> Result<FleetConfigFile, ConfigError> {
        if !self.config_path.exists() {
            return Ok(FleetConfigFile::default());
        }
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| ConfigError::Unreadable {
                path: self.config_path.display().to_string(),
                message: e.to_string(),
            })?;
        parser::parse_raw(&content)
    }

    pub fn save(&self, config: &FleetConfigFile) -> Result<(), ConfigError> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Unwritable {
                path: self.config_path.display().to_string(),
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
        std::fs::write(&self.config_path, content).map_err(|e| ConfigError::Unwritable {
            path: self.config_path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
