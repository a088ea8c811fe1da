//! Core types, error definitions, and index entries for image_dataset.

use data_contracts::ContractError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("required file missing for dataset {dataset}: {path}")]
    MissingFile { dataset: String, path: PathBuf },
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("patch {axis} {patch} is larger than image {axis} {size}")]
    PatchLargerThanImage {
        axis: &'static str,
        patch: usize,
        size: usize,
    },
    #[error("invalid patch geometry along {axis}: {msg}")]
    InvalidGeometry { axis: &'static str, msg: String },
    #[error("patch {corners:?} lies outside image of shape {shape:?}")]
    PatchOutOfBounds {
        corners: PatchCorners,
        shape: (usize, usize),
    },
    #[error("{what} shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("no ground truth loaded for {key}")]
    MissingGroundTruth { key: String },
    #[error("cache key {key} was read before it was populated")]
    CacheMiss { key: String },
    #[error("no label known for {dataset}/{file}")]
    MissingLabel { dataset: String, file: String },
    #[error("dataset {name} has no registered dataspec")]
    UnknownDataset { name: String },
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0}")]
    Other(String),
}

/// Whether items are drawn for training (augmented) or evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    Eval,
}

/// Half-open rectangle `[row_from, row_to) x [col_from, col_to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchCorners {
    pub row_from: usize,
    pub row_to: usize,
    pub col_from: usize,
    pub col_to: usize,
}

impl PatchCorners {
    pub fn new(row_from: usize, row_to: usize, col_from: usize, col_to: usize) -> Self {
        Self {
            row_from,
            row_to,
            col_from,
            col_to,
        }
    }

    pub fn height(&self) -> usize {
        self.row_to - self.row_from
    }

    pub fn width(&self) -> usize {
        self.col_to - self.col_from
    }

    pub fn fits_within(&self, shape: (usize, usize)) -> bool {
        self.row_from < self.row_to
            && self.col_from < self.col_to
            && self.row_to <= shape.0
            && self.col_to <= shape.1
    }
}

/// One addressable patch of a cached source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub dataset: String,
    pub file: String,
    pub corners: PatchCorners,
    pub cache_key: String,
}

/// One whole image paired with its resolved class label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullImageEntry {
    pub dataset: String,
    pub file: String,
    pub label: u32,
}

pub fn cache_key(dataset: &str, file: &str) -> String {
    format!("{dataset}_{file}")
}
