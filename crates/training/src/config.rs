//! Experiment configuration, loadable from TOML.

use crate::error::ExperimentError;
use image_dataset::{DatasetOptions, DiskCache};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Subdirectory of a run's log directory that holds spilled cache entries.
pub const CACHE_SPILL_DIR: &str = "_cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Train,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Root for per-dataspec (or pooled) log directories.
    pub log_dir: PathBuf,
    /// Root every dataspec `*_dir` is resolved against.
    pub dataset_dir: PathBuf,
    pub phase: Phase,
    /// Weights to evaluate with in the test phase; the best checkpoint is reloaded when absent.
    pub pretrained_path: Option<PathBuf>,
    /// Files per dataset, and sparse test datasets per split.
    pub load_limit: Option<usize>,
    /// Build one test dataset per image instead of one per split.
    pub load_sparse: bool,
    pub debug: bool,
    pub seed: Option<u64>,
    /// Decoded images kept in memory before older ones spill to disk.
    pub cache_memory_entries: usize,
    /// Spill evicted images under `log_dir/_cache`. When off, the cache holds
    /// every image of a fold in memory.
    pub cache_spill: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("net_logs"),
            dataset_dir: PathBuf::from("datasets"),
            phase: Phase::Train,
            pretrained_path: None,
            load_limit: None,
            load_sparse: false,
            debug: false,
            seed: None,
            cache_memory_entries: 256,
            cache_spill: true,
        }
    }
}

impl ExperimentConfig {
    pub fn from_path(path: &Path) -> Result<Self, ExperimentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ExperimentError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&raw).map_err(|e| ExperimentError::Config {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            limit: self.load_limit,
            seed: self.seed,
        }
    }

    /// Fresh image cache for a run logging under `log_dir`.
    pub fn new_cache(&self, log_dir: &Path) -> Result<Arc<DiskCache>, ExperimentError> {
        if !self.cache_spill {
            return Ok(Arc::new(DiskCache::in_memory()));
        }
        let cache = DiskCache::with_spill(log_dir.join(CACHE_SPILL_DIR), self.cache_memory_entries)?;
        Ok(Arc::new(cache))
    }
}
