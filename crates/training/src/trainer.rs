use crate::metrics::ScoreAccumulator;
use crate::state::{FoldState, ScoreDirection};
use data_contracts::SplitKey;
use image_dataset::{DatasetBehavior, ImageDataset};

/// Model-side collaborator of the experiment driver.
///
/// The driver owns fold bookkeeping and dataset assembly; a trainer owns the
/// model, its optimisation loop and how predictions turn into scores.
pub trait Trainer<B: DatasetBehavior> {
    type Metrics: ScoreAccumulator;

    fn new_metrics(&self) -> Self::Metrics;

    fn score_direction(&self) -> ScoreDirection {
        ScoreDirection::Maximize
    }

    /// Inspect earlier logs in `fold.log_dir` before a fold starts.
    fn check_previous_logs(&mut self, _fold: &FoldState) -> anyhow::Result<()> {
        Ok(())
    }

    /// Build fresh model and optimizer state for a fold.
    fn init_model(&mut self, fold: &FoldState) -> anyhow::Result<()>;

    fn reset_fold_state(&mut self, _fold: &mut FoldState) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fit on `train`, tracking the best validation score in `fold`.
    fn train(&mut self, fold: &mut FoldState, train: &mut ImageDataset<B>, validation: &ImageDataset<B>) -> anyhow::Result<()>;

    fn load_best_model(&mut self, fold: &FoldState) -> anyhow::Result<()>;

    /// Evaluate over `datasets`, returning the mean loss and the accumulated score.
    fn evaluation(
        &mut self,
        fold: &mut FoldState,
        split_key: SplitKey,
        save_pred: bool,
        datasets: &[ImageDataset<B>],
    ) -> anyhow::Result<(f64, Self::Metrics)>;

    /// Model and optimizer settings to persist in the run log.
    fn describe(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
