use crate::dataspec::ContractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File names assigned to each phase of one fold. All three keys are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFile {
    pub train: Vec<String>,
    pub validation: Vec<String>,
    pub test: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKey {
    Train,
    Validation,
    Test,
}

impl SplitKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitKey::Train => "train",
            SplitKey::Validation => "validation",
            SplitKey::Test => "test",
        }
    }
}

impl fmt::Display for SplitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SplitFile {
    pub fn files(&self, key: SplitKey) -> &[String] {
        match key {
            SplitKey::Train => &self.train,
            SplitKey::Validation => &self.validation,
            SplitKey::Test => &self.test,
        }
    }
}

/// Every `*.json` split file in `split_dir`, sorted by path.
pub fn list_split_files(split_dir: &Path) -> Result<Vec<PathBuf>, ContractError> {
    let entries = fs::read_dir(split_dir).map_err(|e| ContractError::Io {
        path: split_dir.to_path_buf(),
        source: e,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn load_split(path: &Path) -> Result<SplitFile, ContractError> {
    let raw = fs::read(path).map_err(|e| ContractError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&raw).map_err(|e| ContractError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Experiment id of a split file: its name up to the first `.`.
pub fn experiment_id_for(split_path: &Path) -> String {
    let name = split_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}
