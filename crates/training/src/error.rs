use data_contracts::ContractError;
use image_dataset::DatasetError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid experiment config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write scores to {path}: {source}")]
    Scores {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write run log {path}: {source}")]
    RunLog {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write prediction {path}: {source}")]
    Prediction {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{what} shape {actual:?} does not match {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}
