//! Reassembles per-patch predictions into a full-image result.

use crate::types::{DatasetError, DatasetResult, PatchCorners};
use ndarray::{s, Array2, ArrayView2, Zip};

/// Full-image canvas that averages overlapping patch predictions.
#[derive(Debug, Clone)]
pub struct PatchStitcher {
    sum: Array2<f32>,
    count: Array2<u32>,
    expand_by: usize,
}

impl PatchStitcher {
    /// Canvas for an image of `shape` (rows, cols) whose patches were grown by `expand_by`.
    pub fn new(shape: (usize, usize), expand_by: usize) -> Self {
        Self {
            sum: Array2::zeros(shape),
            count: Array2::zeros(shape),
            expand_by,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.sum.dim()
    }

    /// Add the prediction for `corners`, given at either patch or expanded size.
    pub fn add(&mut self, corners: PatchCorners, pred: ArrayView2<'_, f32>) -> DatasetResult<()> {
        if !corners.fits_within(self.shape()) {
            return Err(DatasetError::PatchOutOfBounds {
                corners,
                shape: self.shape(),
            });
        }
        let patch = (corners.height(), corners.width());
        let e = self.expand_by;
        let expanded = (patch.0 + 2 * e, patch.1 + 2 * e);
        let pred = if pred.dim() == patch {
            pred
        } else if pred.dim() == expanded {
            pred.slice_move(s![e..e + patch.0, e..e + patch.1])
        } else {
            return Err(DatasetError::ShapeMismatch {
                what: "patch prediction",
                expected: expanded,
                actual: pred.dim(),
            });
        };
        let (rows, cols) = (corners.row_from..corners.row_to, corners.col_from..corners.col_to);
        Zip::from(self.sum.slice_mut(s![rows.clone(), cols.clone()]))
            .and(self.count.slice_mut(s![rows, cols]))
            .and(pred)
            .for_each(|sum, count, p| {
                *sum += *p;
                *count += 1;
            });
        Ok(())
    }

    /// Fraction of pixels covered by at least one patch.
    pub fn coverage(&self) -> f32 {
        let total = self.count.len();
        if total == 0 {
            return 0.0;
        }
        self.count.iter().filter(|c| **c > 0).count() as f32 / total as f32
    }

    /// Averaged probability map; uncovered pixels are 0.
    pub fn finish(&self) -> Array2<f32> {
        Zip::from(&self.sum)
            .and(&self.count)
            .map_collect(|sum, count| if *count == 0 { 0.0 } else { sum / *count as f32 })
    }

    /// Averaged map thresholded into a 0/255 mask.
    pub fn finish_mask(&self, thr: f32) -> Array2<u8> {
        self.finish().mapv(|p| if p > thr { 255 } else { 0 })
    }
}
