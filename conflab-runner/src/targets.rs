//! Target specifications from a TOML file.
//!
//! ```toml
//! [targets.SPY]
//! horizon = 1
//! coverage = 0.9
//!
//! [targets."BRK.B"]
//! horizon = 5
//! coverage = 0.95
//! exchange_tz = "America/New_York"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use conflab_core::domain::TargetSpec;
use conflab_core::store::TargetSpecResolver;
use conflab_core::StoreError;

use crate::config::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSpecFile {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetSpec>,
}

impl TargetSpecFile {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        file.validate()?;
        Ok(file)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (symbol, spec) in &self.targets {
            if spec.horizon == 0 {
                return Err(ConfigError::Invalid(format!("{symbol}: horizon must be at least 1")));
            }
            if !(spec.coverage > 0.0 && spec.coverage < 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{symbol}: coverage {} outside (0, 1)",
                    spec.coverage
                )));
            }
        }
        Ok(())
    }

    /// Configured symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl TargetSpecResolver for TargetSpecFile {
    fn target_spec(&self, symbol: &str) -> Result<Option<TargetSpec>, StoreError> {
        Ok(self.targets.get(symbol).cloned())
    }
}
