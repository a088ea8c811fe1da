//! Score accumulators shared by trainers and the experiment driver.

use crate::error::ExperimentError;
use ndarray::{ArrayView2, Zip};
use serde::Serialize;

/// A metric that can be merged across folds and flattened into score-file columns.
pub trait ScoreAccumulator: Send {
    /// Merge `other` into `self`, as when folding per-split scores into a global score.
    fn accumulate(&mut self, other: &Self);

    fn scores(&self) -> Vec<f64>;

    /// Column names matching `scores`.
    fn headers(&self) -> Vec<&'static str>;

    /// Precision, recall, F1 and accuracy where the metric has them.
    fn prfa(&self) -> Vec<f64> {
        self.scores()
    }
}

/// Binary confusion matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Prf1a {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    pub fn_: u64,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl Prf1a {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tp: u64, fp: u64, tn: u64, fn_: u64) {
        self.tp += tp;
        self.fp += fp;
        self.tn += tn;
        self.fn_ += fn_;
    }

    /// Count agreement between two masks; any non-zero value is foreground.
    pub fn update_from_masks(&mut self, pred: ArrayView2<'_, u8>, truth: ArrayView2<'_, u8>) -> Result<(), ExperimentError> {
        if pred.dim() != truth.dim() {
            return Err(ExperimentError::ShapeMismatch {
                what: "prediction",
                expected: truth.dim(),
                actual: pred.dim(),
            });
        }
        let mut counts = Prf1a::new();
        Zip::from(pred).and(truth).for_each(|p, t| match (*p > 0, *t > 0) {
            (true, true) => counts.tp += 1,
            (true, false) => counts.fp += 1,
            (false, false) => counts.tn += 1,
            (false, true) => counts.fn_ += 1,
        });
        self.accumulate(&counts);
        Ok(())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.tp + self.fp + self.tn + self.fn_)
    }
}

impl ScoreAccumulator for Prf1a {
    fn accumulate(&mut self, other: &Self) {
        self.add(other.tp, other.fp, other.tn, other.fn_);
    }

    fn scores(&self) -> Vec<f64> {
        vec![self.precision(), self.recall(), self.f1(), self.accuracy()]
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["Precision", "Recall", "F1", "Accuracy"]
    }
}

/// Running mean of a per-batch loss, weighted by batch size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AverageLoss {
    sum: f64,
    count: u64,
}

impl AverageLoss {
    pub fn add(&mut self, loss: f64, n: u64) {
        self.sum += loss * n as f64;
        self.count += n;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl ScoreAccumulator for AverageLoss {
    fn accumulate(&mut self, other: &Self) {
        self.sum += other.sum;
        self.count += other.count;
    }

    fn scores(&self) -> Vec<f64> {
        vec![self.average()]
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["Loss"]
    }
}
