//! Data-quality checks applied to freshly decoded images.
//!
//! Recoverable problems are logged and corrected in place; only shape
//! disagreements between pixels, ground truth and mask are errors.

use crate::imaging::{binarize, masked_bbox_crop, promote_ones, resize2, resize3, unique_values, ImageObject};
use crate::types::DatasetResult;
use data_contracts::DatasetSpec;
use tracing::warn;

/// Checks for binary semantic segmentation: label cardinality, 0/1 labels,
/// optional bbox crop, optional resize followed by re-binarization.
pub fn validate_segmentation(spec: &DatasetSpec, obj: &mut ImageObject) -> DatasetResult<()> {
    let thr = spec.thr_manual;
    if spec.has_gt() {
        if let Some(gt) = obj.ground_truth.as_mut() {
            let gt_unique = unique_values(gt);
            if gt_unique == [0, 1] || gt_unique == [1] {
                warn!(dataset = %spec.name, file = %obj.file, "ground truth 1 converted to 255");
                promote_ones(gt);
            }
            if gt_unique.len() != spec.num_class {
                warn!(
                    dataset = %spec.name,
                    file = %obj.file,
                    expected = spec.num_class,
                    observed = ?gt_unique,
                    "number of unique ground truth values differs from num_class, binarizing"
                );
                binarize(gt, thr);
            }
        }
    }

    if let Some(mask) = obj.mask.as_mut() {
        let mask_unique = unique_values(mask);
        if mask_unique == [0, 1] || mask_unique == [1] {
            warn!(dataset = %spec.name, file = %obj.file, "mask 1 converted to 255");
            promote_ones(mask);
        }
        if mask_unique.len() != 2 {
            warn!(
                dataset = %spec.name,
                file = %obj.file,
                observed = ?mask_unique,
                "unexpected number of unique values in mask"
            );
        }
    }

    if spec.bbox_crop {
        masked_bbox_crop(obj);
    }

    let resized = apply_resize(spec, obj)?;

    // Interpolation leaves non-binary edges, so binarize strictly after resizing.
    if resized && spec.num_class == 2 {
        if let Some(gt) = obj.ground_truth.as_mut() {
            binarize(gt, thr);
        }
        if let Some(mask) = obj.mask.as_mut() {
            binarize(mask, thr);
        }
    }
    obj.check_shapes()
}

/// Checks for full-image classification: resize only.
pub fn validate_full_image(spec: &DatasetSpec, obj: &mut ImageObject) -> DatasetResult<()> {
    apply_resize(spec, obj)?;
    obj.check_shapes()
}

fn apply_resize(spec: &DatasetSpec, obj: &mut ImageObject) -> DatasetResult<bool> {
    let Some([width, height]) = spec.resize else {
        return Ok(false);
    };
    obj.array = resize3(&obj.array, width, height)?;
    if let Some(gt) = obj.ground_truth.as_ref() {
        obj.ground_truth = Some(resize2(gt, width, height)?);
    }
    if let Some(mask) = obj.mask.as_ref() {
        obj.mask = Some(resize2(mask, width, height)?);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn spec_with_labels() -> DatasetSpec {
        let mut spec = DatasetSpec::new("unit", "img", "splits");
        spec.label_dir = Some("gt".into());
        spec
    }

    #[test]
    fn zero_one_labels_are_promoted() {
        let spec = spec_with_labels();
        let mut obj = ImageObject::new("a.png", Array3::zeros((2, 2, 3)));
        obj.ground_truth = Some(Array2::from_shape_vec((2, 2), vec![0, 1, 1, 0]).unwrap());
        validate_segmentation(&spec, &mut obj).unwrap();
        assert_eq!(unique_values(obj.ground_truth.as_ref().unwrap()), vec![0, 255]);
    }

    #[test]
    fn noisy_labels_are_binarized_at_threshold() {
        let spec = spec_with_labels();
        let mut obj = ImageObject::new("a.png", Array3::zeros((2, 2, 3)));
        obj.ground_truth = Some(Array2::from_shape_vec((2, 2), vec![0, 30, 90, 255]).unwrap());
        validate_segmentation(&spec, &mut obj).unwrap();
        let gt = obj.ground_truth.unwrap();
        assert_eq!(gt.as_slice().unwrap(), &[0, 0, 255, 255]);
    }

    #[test]
    fn ground_truth_is_binary_after_resize() {
        let mut spec = spec_with_labels();
        spec.resize = Some([256, 256]);
        let mut obj = ImageObject::new("a.png", Array3::from_elem((16, 16, 3), 90));
        obj.ground_truth = Some(Array2::from_shape_fn((16, 16), |(r, c)| {
            if (r / 2 + c / 2) % 2 == 0 {
                255
            } else {
                0
            }
        }));
        // Interpolating this checkerboard alone yields more than two levels.
        let raw = resize2(obj.ground_truth.as_ref().unwrap(), 256, 256).unwrap();
        assert!(unique_values(&raw).len() > 2);

        validate_segmentation(&spec, &mut obj).unwrap();
        assert_eq!(obj.dims(), (256, 256));
        assert_eq!(unique_values(obj.ground_truth.as_ref().unwrap()), vec![0, 255]);
    }

    #[test]
    fn full_image_resize_leaves_labels_alone() {
        let mut spec = DatasetSpec::new("unit", "img", "splits");
        spec.resize = Some([8, 4]);
        let mut obj = ImageObject::new("a.png", Array3::from_elem((10, 10, 3), 7));
        validate_full_image(&spec, &mut obj).unwrap();
        assert_eq!(obj.dims(), (4, 8));
        assert!(obj.ground_truth.is_none());
    }

    #[test]
    fn full_image_mask_is_resized_without_binarizing() {
        let mut spec = DatasetSpec::new("unit", "img", "splits");
        spec.resize = Some([4, 4]);
        let mut obj = ImageObject::new("a.png", Array3::from_elem((8, 8, 3), 7));
        obj.mask = Some(Array2::from_elem((8, 8), 30));
        validate_full_image(&spec, &mut obj).unwrap();
        let mask = obj.mask.as_ref().unwrap();
        assert_eq!(mask.dim(), (4, 4));
        // Below thr_manual, so binarizing would have zeroed it.
        assert!(mask.iter().all(|v| *v == 30));
    }
}
