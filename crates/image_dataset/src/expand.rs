//! Context-margin expansion of patches with reflect padding at image edges.

use crate::types::{DatasetError, DatasetResult, PatchCorners};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};
use std::ops::Range;

/// Source window clipped to the image plus the mirror padding that restores
/// the full requested margin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedWindow {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    /// [(top, bottom), (left, right)]
    pub pad: [(usize, usize); 2],
}

impl ExpandedWindow {
    /// Shape after padding: always the patch grown by the margin on every side.
    pub fn padded_shape(&self) -> (usize, usize) {
        (
            self.pad[0].0 + self.rows.len() + self.pad[0].1,
            self.pad[1].0 + self.cols.len() + self.pad[1].1,
        )
    }
}

/// Corners outside `shape` are a `PatchOutOfBounds` error.
pub fn expand_and_mirror_patch(
    shape: (usize, usize),
    corners: PatchCorners,
    expand_by: usize,
) -> DatasetResult<ExpandedWindow> {
    if !corners.fits_within(shape) {
        return Err(DatasetError::PatchOutOfBounds { corners, shape });
    }
    let (height, width) = shape;
    let p = corners.row_from.saturating_sub(expand_by);
    let q = (corners.row_to + expand_by).min(height);
    let r = corners.col_from.saturating_sub(expand_by);
    let s = (corners.col_to + expand_by).min(width);
    Ok(ExpandedWindow {
        rows: p..q,
        cols: r..s,
        pad: [
            (
                expand_by - (corners.row_from - p),
                expand_by - (q - corners.row_to),
            ),
            (
                expand_by - (corners.col_from - r),
                expand_by - (s - corners.col_to),
            ),
        ],
    })
}

/// Map a possibly out-of-range index onto `0..n` by reflection about the
/// edge samples, which are not repeated.
fn reflect_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

pub fn mirror_pad2<T: Clone>(view: ArrayView2<'_, T>, pad: [(usize, usize); 2]) -> Array2<T> {
    let (h, w) = view.dim();
    let out_shape = (pad[0].0 + h + pad[0].1, pad[1].0 + w + pad[1].1);
    Array2::from_shape_fn(out_shape, |(r, c)| {
        let sr = reflect_index(r as isize - pad[0].0 as isize, h);
        let sc = reflect_index(c as isize - pad[1].0 as isize, w);
        view[[sr, sc]].clone()
    })
}

/// Pads rows and cols of a (rows, cols, channels) array; channels are untouched.
pub fn mirror_pad3<T: Clone>(view: ArrayView3<'_, T>, pad: [(usize, usize); 2]) -> Array3<T> {
    let (h, w, ch) = view.dim();
    let out_shape = (pad[0].0 + h + pad[0].1, pad[1].0 + w + pad[1].1, ch);
    Array3::from_shape_fn(out_shape, |(r, c, k)| {
        let sr = reflect_index(r as isize - pad[0].0 as isize, h);
        let sc = reflect_index(c as isize - pad[1].0 as isize, w);
        view[[sr, sc, k]].clone()
    })
}

/// Cut `corners` grown by `expand_by` out of `array`, mirroring past the edges.
pub fn extract_expanded<T: Clone>(array: &Array3<T>, corners: PatchCorners, expand_by: usize) -> DatasetResult<Array3<T>> {
    let (h, w, _) = array.dim();
    let window = expand_and_mirror_patch((h, w), corners, expand_by)?;
    let source = array.slice(s![window.rows.clone(), window.cols.clone(), ..]);
    Ok(mirror_pad3(source, window.pad))
}
