//! Collation of patch items into burn tensors.

use crate::behavior::PatchItem;
use crate::types::{DatasetError, DatasetResult};
use burn::tensor::{backend::Backend, Tensor, TensorData};

pub struct PatchBatch<B: Backend> {
    /// [N, C, H, W]
    pub inputs: Tensor<B, 4>,
    /// [N, H, W]
    pub labels: Tensor<B, 3>,
}

/// Stack `items` into one batch; every item must share the first item's shapes.
pub fn collate_patches<B: Backend>(items: &[PatchItem], device: &B::Device) -> DatasetResult<PatchBatch<B>> {
    let Some(first) = items.first() else {
        return Err(DatasetError::Other("cannot collate an empty batch".to_string()));
    };
    let (c, h, w) = first.input.dim();
    let (lh, lw) = first.label.dim();
    let mut inputs_buf = Vec::with_capacity(items.len() * c * h * w);
    let mut labels_buf = Vec::with_capacity(items.len() * lh * lw);
    for item in items {
        if item.input.dim() != (c, h, w) {
            return Err(DatasetError::ShapeMismatch {
                what: "batch input",
                expected: (h, w),
                actual: (item.input.dim().1, item.input.dim().2),
            });
        }
        if item.label.dim() != (lh, lw) {
            return Err(DatasetError::ShapeMismatch {
                what: "batch label",
                expected: (lh, lw),
                actual: item.label.dim(),
            });
        }
        inputs_buf.extend(item.input.iter().copied());
        labels_buf.extend(item.label.iter().copied());
    }
    let n = items.len();
    let inputs = Tensor::<B, 4>::from_data(TensorData::new(inputs_buf, [n, c, h, w]), device);
    let labels = Tensor::<B, 3>::from_data(TensorData::new(labels_buf, [n, lh, lw]), device);
    Ok(PatchBatch { inputs, labels })
}
