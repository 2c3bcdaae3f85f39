//! Engine configuration

use crate::error::{Error, Result};
use crate::history::MIN_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_FEATURE_BATCH_SIZE: usize = 16;

/// Tunables for an engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum snapshots kept for undo/redo
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Features recomputed per recalculation step
    #[serde(default = "default_feature_batch_size")]
    pub feature_batch_size: usize,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_feature_batch_size() -> usize {
    DEFAULT_FEATURE_BATCH_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            feature_batch_size: DEFAULT_FEATURE_BATCH_SIZE,
        }
    }
}

impl EngineConfig {
    /// Clamp values that would leave the engine unusable
    pub fn normalized(mut self) -> Self {
        self.history_limit = self.history_limit.max(MIN_HISTORY_LIMIT);
        self.feature_batch_size = self.feature_batch_size.max(1);
        self
    }

    /// Load a config file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config.normalized())
    }

    /// Save the config to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
