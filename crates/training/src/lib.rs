//! Experiment driver for patch and full-image datasets.
//!
//! Runs one fold per split file for every dataspec (or one pooled fold over
//! all of them), delegating model work to a [`Trainer`] and persisting fold
//! scores, global scores and run logs under the configured log directory.

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod predict;
pub mod scores;
pub mod state;
pub mod trainer;

pub use config::{ExperimentConfig, Phase};
pub use driver::{Experiment, GLOBAL_ROW, GLOBAL_SCORE_FILE, POOLED_ID};
pub use error::ExperimentError;
pub use logging::init_tracing;
pub use metrics::{AverageLoss, Prf1a, ScoreAccumulator};
pub use predict::{save_mask, stitch_predictions, ImagePrediction};
pub use scores::{save_run_log, save_scores};
pub use state::{FoldState, RunState, ScoreDirection, ScoreRow};
pub use trainer::Trainer;
