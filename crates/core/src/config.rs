//! Diff configuration.
//!
//! The scoring formulas have two documented variant points (the scalar
//! ratio curve and the block-blend transform) plus a flaggable feature
//! group; all of them live here so a comparison is fully described by one
//! `DiffConfig` value. Defaults reproduce the linear/identity arithmetic.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalization curve applied by the scalar similarity primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarCurve {
    #[default]
    Linear,
    Squared,
}

/// Optional compressive transform applied to the block-level blend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockTransform {
    #[default]
    Identity,
    Sqrt,
}

/// Tunables for one diff run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Minimum similarity for a pair to count as a match in the summary.
    pub match_threshold: f64,
    pub scalar_curve: ScalarCurve,
    pub block_transform: BlockTransform,
    /// Whether code/data/string reference counts participate in block
    /// scoring. When disabled their weights leave the denominator entirely.
    pub reference_features: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            scalar_curve: ScalarCurve::default(),
            block_transform: BlockTransform::default(),
            reference_features: true,
        }
    }
}

impl DiffConfig {
    /// Load a configuration from a JSON file. Missing fields fall back to
    /// their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&data)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
