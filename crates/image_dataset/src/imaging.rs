//! Image decoding, channel normalization and pixel-level helpers.

use crate::types::{DatasetError, DatasetResult};
use data_contracts::DatasetSpec;
use image::imageops::FilterType;
use image::GenericImageView;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use std::path::Path;
use tracing::warn;

/// Pixels below this level on every channel count as background for bbox cropping.
const BBOX_FOREGROUND_MIN: u8 = 10;

/// A decoded image with its optional ground truth and mask.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageObject {
    pub file: String,
    /// Pixels as (rows, cols, channels).
    pub array: Array3<u8>,
    pub ground_truth: Option<Array2<u8>>,
    pub mask: Option<Array2<u8>>,
}

impl ImageObject {
    pub fn new(file: impl Into<String>, array: Array3<u8>) -> Self {
        Self {
            file: file.into(),
            array,
            ground_truth: None,
            mask: None,
        }
    }

    /// (rows, cols) of the pixel array.
    pub fn dims(&self) -> (usize, usize) {
        let (h, w, _) = self.array.dim();
        (h, w)
    }

    pub fn channels(&self) -> usize {
        self.array.dim().2
    }

    /// Ground truth and mask must share the array's rows and cols.
    pub fn check_shapes(&self) -> DatasetResult<()> {
        let expected = self.dims();
        if let Some(gt) = &self.ground_truth {
            if gt.dim() != expected {
                return Err(DatasetError::ShapeMismatch {
                    what: "ground truth",
                    expected,
                    actual: gt.dim(),
                });
            }
        }
        if let Some(mask) = &self.mask {
            if mask.dim() != expected {
                return Err(DatasetError::ShapeMismatch {
                    what: "mask",
                    expected,
                    actual: mask.dim(),
                });
            }
        }
        Ok(())
    }
}

/// Which parts of an image record to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadParts {
    /// Pixels, ground truth (or a random fallback) and mask.
    Full,
    /// Pixels and mask only.
    ArrayOnly,
}

/// Decode `path` into a (rows, cols, channels) array, keeping the stored channel count.
pub fn read_array(dataset: &str, path: &Path) -> DatasetResult<Array3<u8>> {
    if !path.exists() {
        return Err(DatasetError::MissingFile {
            dataset: dataset.to_string(),
            path: path.to_path_buf(),
        });
    }
    let img = image::open(path).map_err(|e| DatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (width, height) = img.dimensions();
    let channels = img.color().channel_count() as usize;
    let (raw, channels) = match channels {
        1 => (img.to_luma8().into_raw(), 1),
        2 => (img.to_luma_alpha8().into_raw(), 2),
        3 => (img.to_rgb8().into_raw(), 3),
        _ => (img.to_rgba8().into_raw(), 4),
    };
    Array3::from_shape_vec((height as usize, width as usize, channels), raw)
        .map_err(|e| DatasetError::Other(format!("{}: {e}", path.display())))
}

/// Decode one image record described by `spec`, applying the channel policy.
pub fn load_image(
    spec: &DatasetSpec,
    file: &str,
    parts: LoadParts,
    rng: &mut impl Rng,
) -> DatasetResult<ImageObject> {
    let array = read_array(&spec.name, &spec.data_path(file))?;
    let mut obj = ImageObject::new(file, normalize_channels(spec, array));

    if parts == LoadParts::Full {
        obj.ground_truth = Some(match spec.label_path(file) {
            Some(path) => to_single_channel(spec, "ground truth", read_array(&spec.name, &path)?),
            None => {
                warn!(dataset = %spec.name, file, "no label_dir configured, random label initialized");
                random_label(obj.dims(), spec.num_class, rng)
            }
        });
    }

    if let Some(path) = spec.mask_path(file) {
        obj.mask = Some(to_single_channel(spec, "mask", read_array(&spec.name, &path)?));
    }

    obj.check_shapes()?;
    Ok(obj)
}

fn normalize_channels(spec: &DatasetSpec, array: Array3<u8>) -> Array3<u8> {
    let channels = array.dim().2;
    let array = match channels {
        1 | 3 => array,
        2 => {
            warn!(dataset = %spec.name, shape = ?array.shape(), "suspicious image shape, keeping luma channel");
            array.slice(s![.., .., ..1]).to_owned()
        }
        _ => {
            warn!(dataset = %spec.name, shape = ?array.shape(), "suspicious image shape, clipping to RGB");
            array.slice(s![.., .., ..3]).to_owned()
        }
    };
    if spec.num_channel == 1 && array.dim().2 == 3 {
        warn!(dataset = %spec.name, "using green channel only");
        return array.slice(s![.., .., 1..2]).to_owned();
    }
    array
}

fn to_single_channel(spec: &DatasetSpec, what: &str, array: Array3<u8>) -> Array2<u8> {
    if array.dim().2 > 1 {
        warn!(
            dataset = %spec.name,
            shape = ?array.shape(),
            "{what} shape suspicious, using 1st channel only"
        );
    }
    array.index_axis(Axis(2), 0).to_owned()
}

fn random_label(dims: (usize, usize), num_class: usize, rng: &mut impl Rng) -> Array2<u8> {
    let classes = num_class.max(2);
    let scale = 255 / (classes - 1);
    Array2::from_shape_fn(dims, |_| (rng.random_range(0..classes) * scale) as u8)
}

/// Set values above `thr` to 255 and the rest to 0.
pub fn binarize(arr: &mut Array2<u8>, thr: u8) {
    arr.mapv_inplace(|v| if v > thr { 255 } else { 0 });
}

/// Sorted distinct values of a label plane.
pub fn unique_values(arr: &Array2<u8>) -> Vec<u8> {
    let mut seen = [false; 256];
    for &v in arr.iter() {
        seen[v as usize] = true;
    }
    (0..=255u8).filter(|v| seen[*v as usize]).collect()
}

/// Promote 1-valued labels to 255.
pub fn promote_ones(arr: &mut Array2<u8>) {
    arr.mapv_inplace(|v| if v == 1 { 255 } else { v });
}

fn resize_plane(plane: ArrayView2<'_, u8>, width: u32, height: u32) -> DatasetResult<Array2<u8>> {
    let (rows, cols) = plane.dim();
    let gray = image::GrayImage::from_raw(cols as u32, rows as u32, plane.iter().copied().collect())
        .ok_or_else(|| DatasetError::Other("plane buffer does not match its shape".to_string()))?;
    let resized = image::imageops::resize(&gray, width, height, FilterType::Triangle);
    Array2::from_shape_vec((height as usize, width as usize), resized.into_raw())
        .map_err(|e| DatasetError::Other(e.to_string()))
}

/// Resize a label plane to `width` x `height` with a triangle filter.
pub fn resize2(arr: &Array2<u8>, width: u32, height: u32) -> DatasetResult<Array2<u8>> {
    resize_plane(arr.view(), width, height)
}

/// Resize every channel of a pixel array to `width` x `height`.
pub fn resize3(arr: &Array3<u8>, width: u32, height: u32) -> DatasetResult<Array3<u8>> {
    let channels = arr.dim().2;
    let mut out = Array3::<u8>::zeros((height as usize, width as usize, channels));
    for c in 0..channels {
        let plane = resize_plane(arr.index_axis(Axis(2), c), width, height)?;
        out.index_axis_mut(Axis(2), c).assign(&plane);
    }
    Ok(out)
}

/// Crop to the bounding box of non-background pixels and derive a foreground mask.
pub fn masked_bbox_crop(obj: &mut ImageObject) {
    let (rows, cols) = obj.dims();
    let foreground = Array2::from_shape_fn((rows, cols), |(r, c)| {
        obj.array
            .slice(s![r, c, ..])
            .iter()
            .any(|v| *v >= BBOX_FOREGROUND_MIN)
    });
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for ((r, c), fg) in foreground.indexed_iter() {
        if !*fg {
            continue;
        }
        bounds = Some(match bounds {
            None => (r, r + 1, c, c + 1),
            Some((r0, r1, c0, c1)) => (r0.min(r), r1.max(r + 1), c0.min(c), c1.max(c + 1)),
        });
    }
    let Some((r0, r1, c0, c1)) = bounds else {
        warn!(file = %obj.file, "no foreground found for bbox crop, keeping full image");
        return;
    };
    obj.array = obj.array.slice(s![r0..r1, c0..c1, ..]).to_owned();
    if let Some(gt) = obj.ground_truth.as_mut() {
        *gt = gt.slice(s![r0..r1, c0..c1]).to_owned();
    }
    obj.mask = Some(
        foreground
            .slice(s![r0..r1, c0..c1])
            .mapv(|fg| if fg { 255 } else { 0 }),
    );
}

/// (channels, rows, cols) float view scaled to [0, 1].
pub fn to_chw_f32(arr: &Array3<u8>) -> Array3<f32> {
    arr.view()
        .permuted_axes([2, 0, 1])
        .mapv(|v| v as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binarize_is_idempotent() {
        let mut once = Array2::from_shape_vec((2, 3), vec![0, 49, 50, 51, 200, 255]).unwrap();
        binarize(&mut once, 50);
        let mut twice = once.clone();
        binarize(&mut twice, 50);
        assert_eq!(once, twice);
        assert_eq!(once.as_slice().unwrap(), &[0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn unique_values_are_sorted() {
        let arr = Array2::from_shape_vec((2, 2), vec![255, 0, 7, 0]).unwrap();
        assert_eq!(unique_values(&arr), vec![0, 7, 255]);
    }

    #[test]
    fn resize_introduces_intermediate_values() {
        let arr = Array2::from_shape_fn((4, 4), |(r, c)| if (r + c) % 2 == 0 { 255 } else { 0 });
        let resized = resize2(&arr, 7, 7).unwrap();
        assert_eq!(resized.dim(), (7, 7));
        assert!(unique_values(&resized).len() > 2);
    }

    #[test]
    fn bbox_crop_trims_black_border() {
        let mut array = Array3::<u8>::zeros((6, 8, 3));
        array.slice_mut(s![1..4, 2..6, ..]).fill(120);
        let mut obj = ImageObject::new("a.png", array);
        obj.ground_truth = Some(Array2::zeros((6, 8)));
        masked_bbox_crop(&mut obj);
        assert_eq!(obj.dims(), (3, 4));
        assert_eq!(obj.ground_truth.as_ref().map(|g| g.dim()), Some((3, 4)));
        assert!(obj.mask.as_ref().unwrap().iter().all(|v| *v == 255));
        obj.check_shapes().unwrap();
    }

    #[test]
    fn chw_conversion_moves_channels_first() {
        let mut array = Array3::<u8>::zeros((2, 3, 3));
        array[[1, 2, 0]] = 255;
        let chw = to_chw_f32(&array);
        assert_eq!(chw.dim(), (3, 2, 3));
        assert_eq!(chw[[0, 1, 2]], 1.0);
    }
}
