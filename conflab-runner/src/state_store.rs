//! Conformal state persisted as one pretty JSON file per symbol.
//!
//! Writes go to a temporary file that is renamed over the target, so a reader
//! never sees a half-written state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use conflab_core::state::ConformalState;
use conflab_core::store::StateStore;
use conflab_core::StoreError;

#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

pub(crate) fn io_error(path: &Path, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

impl JsonStateStore {
    /// Open the store, creating `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self, symbol: &str) -> Result<PathBuf, StoreError> {
        if symbol.is_empty() || symbol.starts_with('.') || symbol.contains(|c: char| c == '/' || c == '\\') {
            return Err(StoreError::Backend(format!("symbol '{symbol}' is not a valid file name")));
        }
        Ok(self.dir.join(format!("{symbol}.json")))
    }
}

impl StateStore for JsonStateStore {
    fn load(&self, symbol: &str) -> Result<Option<ConformalState>, StoreError> {
        let path = self.state_path(symbol)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let state = serde_json::from_str(&json)
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?;
        Ok(Some(state))
    }

    fn save(&self, symbol: &str, state: &ConformalState) -> Result<(), StoreError> {
        let path = self.state_path(symbol)?;
        let json = serde_json::to_string_pretty(state).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        tracing::debug!(symbol, path = %path.display(), "state saved");
        Ok(())
    }

    fn delete(&self, symbol: &str) -> Result<bool, StoreError> {
        let path = self.state_path(symbol)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn symbols(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let mut symbols: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}
