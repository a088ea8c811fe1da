//! Bookkeeping the driver carries across folds and dataspecs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Starting best score for a minimized metric.
pub const MINIMIZE_INITIAL_BEST: f64 = 1e11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ScoreDirection {
    pub fn initial_best(&self) -> f64 {
        match self {
            ScoreDirection::Maximize => 0.0,
            ScoreDirection::Minimize => MINIMIZE_INITIAL_BEST,
        }
    }

    pub fn improves(&self, candidate: f64, best: f64) -> bool {
        match self {
            ScoreDirection::Maximize => candidate > best,
            ScoreDirection::Minimize => candidate < best,
        }
    }
}

/// One score-file line: a split file name (or `Global`) and its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub label: String,
    pub values: Vec<f64>,
}

impl ScoreRow {
    pub fn new(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }
}

/// State of one fold (one split file), rebuilt before every fold.
#[derive(Debug, Clone, Serialize)]
pub struct FoldState {
    pub log_dir: PathBuf,
    pub experiment_id: String,
    /// Checkpoint file name inside `log_dir`.
    pub checkpoint: String,
    pub best_epoch: usize,
    pub best_score: f64,
    pub score_direction: ScoreDirection,
    pub test_score: Vec<ScoreRow>,
    pub training_log: Vec<Vec<f64>>,
    pub validation_log: Vec<Vec<f64>>,
}

impl FoldState {
    pub fn new(log_dir: impl Into<PathBuf>, experiment_id: impl Into<String>, score_direction: ScoreDirection) -> Self {
        let experiment_id = experiment_id.into();
        Self {
            log_dir: log_dir.into(),
            checkpoint: format!("{experiment_id}.bin"),
            experiment_id,
            best_epoch: 0,
            best_score: score_direction.initial_best(),
            score_direction,
            test_score: Vec::new(),
            training_log: Vec::new(),
            validation_log: Vec::new(),
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.log_dir.join(&self.checkpoint)
    }

    /// Record `score` at `epoch` if it beats the best so far; returns whether it did.
    pub fn update_best(&mut self, epoch: usize, score: f64) -> bool {
        if self.score_direction.improves(score, self.best_score) {
            self.best_score = score;
            self.best_epoch = epoch;
            true
        } else {
            false
        }
    }
}

/// State of one dataspec (or the pooled run) across all of its folds.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub name: String,
    pub log_dir: PathBuf,
    pub global_test_score: Vec<ScoreRow>,
}

impl RunState {
    pub fn new(name: impl Into<String>, log_dir: &Path) -> Self {
        Self {
            name: name.into(),
            log_dir: log_dir.to_path_buf(),
            global_test_score: Vec::new(),
        }
    }

    /// The final `Global` row, once every fold has been scored.
    pub fn global_row(&self) -> Option<&ScoreRow> {
        self.global_test_score.last().filter(|row| row.label == "Global")
    }
}
