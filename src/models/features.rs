use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReadmitError, Result};

/// Describes the feature splits written by the feature builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMeta {
    pub label: String,
    pub categoricals: Vec<String>,
    pub numericals: Vec<String>,
    pub rows: SplitRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRows {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitRows {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

impl FeatureMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ReadmitError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ReadmitError::io(path, e))
    }
}
