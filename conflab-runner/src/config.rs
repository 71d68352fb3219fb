//! Runner configuration loaded from TOML.
//!
//! ```toml
//! data_dir = "data"
//! targets_file = "targets.toml"
//! default_domain = "log"
//!
//! [calibration]
//! window_size = 60
//! min_points = 10
//!
//! [calibration.mode]
//! type = "aci"
//! eta = 0.01
//! ```
//!
//! Every key is optional. A missing file yields the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use conflab_core::domain::Domain;
use conflab_core::CalibrationConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Root of the file-backed stores.
    pub data_dir: PathBuf,
    /// TOML file with `[targets.<SYMBOL>]` tables. Relative paths resolve
    /// against the config file's directory.
    pub targets_file: PathBuf,
    /// Domain used when a command does not name one.
    pub default_domain: Domain,
    pub calibration: CalibrationConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            targets_file: PathBuf::from("targets.toml"),
            default_domain: Domain::Log,
            calibration: CalibrationConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if self.targets_file.is_relative() {
            self.targets_file = base.join(&self.targets_file);
        }
        if self.data_dir.is_relative() {
            self.data_dir = base.join(&self.data_dir);
        }
    }

    /// Check the calibration settings without touching any store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration
            .build_engine()
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn base_forecasts_path(&self) -> PathBuf {
        self.data_dir.join(crate::forecast_store::BASE_FILE)
    }

    pub fn conformal_forecasts_path(&self) -> PathBuf {
        self.data_dir.join(crate::forecast_store::CONFORMAL_FILE)
    }
}
