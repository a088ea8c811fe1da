//! Full-image predictions assembled from per-patch model outputs.

use crate::error::ExperimentError;
use image_dataset::{BinarySemSegPatches, ImageDataset, PatchItem, PatchStitcher};
use ndarray::{Array2, ArrayView2};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Stitched prediction for one source image.
#[derive(Debug, Clone)]
pub struct ImagePrediction {
    pub dataset: String,
    pub file: String,
    pub probabilities: Array2<f32>,
    /// Ground truth of the cached source image, when it has one.
    pub ground_truth: Option<Array2<u8>>,
}

impl ImagePrediction {
    pub fn mask(&self, thr: f32) -> Array2<u8> {
        self.probabilities.mapv(|p| if p > thr { 255 } else { 0 })
    }
}

/// Run `predict` over every patch of `dataset` and stitch the outputs per source image.
///
/// `predict` returns a (rows, cols) map at either patch or expanded size.
pub fn stitch_predictions<F>(dataset: &ImageDataset<BinarySemSegPatches>, mut predict: F) -> anyhow::Result<Vec<ImagePrediction>>
where
    F: FnMut(&PatchItem) -> anyhow::Result<Array2<f32>>,
{
    let mut stitchers: BTreeMap<String, (PatchStitcher, String, String)> = BTreeMap::new();
    for index in 0..dataset.len() {
        let item = dataset.get(index)?;
        let entry = &item.entry;
        if !stitchers.contains_key(&entry.cache_key) {
            let source = dataset.cache().get(&entry.cache_key)?;
            let expand_by = dataset.spec(&entry.dataset).map(|s| s.expand_by).unwrap_or_default();
            stitchers.insert(
                entry.cache_key.clone(),
                (PatchStitcher::new(source.dims(), expand_by), entry.dataset.clone(), entry.file.clone()),
            );
        }
        let pred = predict(&item)?;
        if let Some((stitcher, _, _)) = stitchers.get_mut(&entry.cache_key) {
            stitcher.add(entry.corners, pred.view())?;
        }
    }

    let mut out = Vec::with_capacity(stitchers.len());
    for (key, (stitcher, dataset_name, file)) in stitchers {
        let source = dataset.cache().get(&key)?;
        out.push(ImagePrediction {
            dataset: dataset_name,
            file,
            probabilities: stitcher.finish(),
            ground_truth: source.ground_truth.clone(),
        });
    }
    Ok(out)
}

/// Save a 0/255 mask as a grayscale PNG named after `file` under `dir`.
pub fn save_mask(dir: &Path, file: &str, mask: ArrayView2<'_, u8>) -> Result<PathBuf, ExperimentError> {
    std::fs::create_dir_all(dir).map_err(|e| ExperimentError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    let path = dir.join(format!("{stem}.png"));
    let (rows, cols) = mask.dim();
    let img = image::GrayImage::from_fn(cols as u32, rows as u32, |x, y| image::Luma([mask[[y as usize, x as usize]]]));
    img.save(&path).map_err(|e| ExperimentError::Prediction {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}
