//! Overlapping patch grid over an image.

use crate::types::{DatasetError, DatasetResult, PatchCorners};

/// Patch corners on a `offset`-strided grid covering an image of `img_shape`.
///
/// All shapes are (rows, cols). Every rectangle is exactly `patch_shape`; the
/// last rectangle of each axis is shifted inward to end on the image edge.
/// Rectangles are emitted row-major. The offset may not exceed the patch size,
/// so the rectangles always cover the whole image.
pub fn chunk_indexes(
    img_shape: (usize, usize),
    patch_shape: (usize, usize),
    offset: (usize, usize),
) -> DatasetResult<Vec<PatchCorners>> {
    let rows = axis_starts("rows", img_shape.0, patch_shape.0, offset.0)?;
    let cols = axis_starts("cols", img_shape.1, patch_shape.1, offset.1)?;
    let mut corners = Vec::with_capacity(rows.len() * cols.len());
    for &r in &rows {
        for &c in &cols {
            corners.push(PatchCorners::new(r, r + patch_shape.0, c, c + patch_shape.1));
        }
    }
    Ok(corners)
}

fn axis_starts(axis: &'static str, size: usize, patch: usize, stride: usize) -> DatasetResult<Vec<usize>> {
    if patch == 0 {
        return Err(DatasetError::InvalidGeometry {
            axis,
            msg: "patch size must be positive".to_string(),
        });
    }
    if stride == 0 {
        return Err(DatasetError::InvalidGeometry {
            axis,
            msg: "patch offset must be positive".to_string(),
        });
    }
    if stride > patch {
        return Err(DatasetError::InvalidGeometry {
            axis,
            msg: format!("patch offset {stride} exceeds patch size {patch}; windows would leave gaps"),
        });
    }
    if patch > size {
        return Err(DatasetError::PatchLargerThanImage { axis, patch, size });
    }
    let last = size - patch;
    let mut starts = Vec::with_capacity(last / stride + 2);
    let mut start = 0;
    while start < last {
        starts.push(start);
        start += stride;
    }
    starts.push(last);
    Ok(starts)
}
