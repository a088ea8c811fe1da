//! Dataset behaviours: how one file is indexed, how one item is fetched, and
//! which validation a decoded image goes through.

use crate::aug::{FlipPlan, DEFAULT_FLIP_PROB};
use crate::cache::DiskCache;
use crate::chunks::chunk_indexes;
use crate::expand::extract_expanded;
use crate::imaging::{load_image, to_chw_f32, ImageObject, LoadParts};
use crate::labels::LabelResolver;
use crate::types::{cache_key, DatasetError, DatasetResult, FullImageEntry, Mode, PatchEntry};
use crate::validation::{validate_full_image, validate_segmentation};
use data_contracts::DatasetSpec;
use ndarray::{s, Array2, Array3};
use rand::rngs::StdRng;
use std::fmt::Debug;

/// What a behaviour sees while indexing one file.
pub struct IndexContext<'a> {
    pub spec: &'a DatasetSpec,
    pub cache: &'a DiskCache,
    pub rng: &'a mut StdRng,
}

/// What a behaviour sees while fetching one item.
pub struct FetchContext<'a> {
    pub spec: &'a DatasetSpec,
    pub cache: &'a DiskCache,
    pub mode: Mode,
    pub rng: &'a mut StdRng,
}

pub trait DatasetBehavior: Send + Sync + Clone {
    type Entry: Clone + Debug + Send + Sync;
    type Item: Send;

    /// Called once per dataspec before any of its files are indexed.
    fn prepare(&mut self, _spec: &DatasetSpec) -> DatasetResult<()> {
        Ok(())
    }

    /// Decode and validate `file`, appending its index entries to `out`.
    fn index_file(&self, ctx: &mut IndexContext<'_>, file: &str, out: &mut Vec<Self::Entry>) -> DatasetResult<()>;

    /// Name of the dataspec an entry belongs to.
    fn dataset_of(entry: &Self::Entry) -> &str;

    fn fetch(&self, ctx: &mut FetchContext<'_>, entry: &Self::Entry) -> DatasetResult<Self::Item>;

    fn validate_image(&self, spec: &DatasetSpec, obj: &mut ImageObject) -> DatasetResult<()>;
}

/// One training or evaluation sample for patched segmentation.
#[derive(Debug, Clone)]
pub struct PatchItem {
    pub entry: PatchEntry,
    /// Expanded patch as (channels, rows, cols) in [0, 1].
    pub input: Array3<f32>,
    /// Un-expanded ground-truth patch, 255 mapped to 1.
    pub label: Array2<f32>,
}

/// Binary semantic segmentation over overlapping, mirror-expanded patches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySemSegPatches;

impl DatasetBehavior for BinarySemSegPatches {
    type Entry = PatchEntry;
    type Item = PatchItem;

    fn index_file(&self, ctx: &mut IndexContext<'_>, file: &str, out: &mut Vec<PatchEntry>) -> DatasetResult<()> {
        let spec = ctx.spec;
        let geometry = spec.patch_geometry()?;
        let mut obj = load_image(spec, file, LoadParts::Full, &mut *ctx.rng)?;
        self.validate_image(spec, &mut obj)?;

        let corners = chunk_indexes(obj.dims(), geometry.shape, geometry.offset)?;
        let key = cache_key(&spec.name, file);
        ctx.cache.add(key.clone(), obj)?;
        out.extend(corners.into_iter().map(|corners| PatchEntry {
            dataset: spec.name.clone(),
            file: file.to_string(),
            corners,
            cache_key: key.clone(),
        }));
        Ok(())
    }

    fn dataset_of(entry: &PatchEntry) -> &str {
        &entry.dataset
    }

    fn fetch(&self, ctx: &mut FetchContext<'_>, entry: &PatchEntry) -> DatasetResult<PatchItem> {
        let obj = ctx.cache.get(&entry.cache_key)?;
        let gt = obj
            .ground_truth
            .as_ref()
            .ok_or_else(|| DatasetError::MissingGroundTruth {
                key: entry.cache_key.clone(),
            })?;
        let c = entry.corners;
        if !c.fits_within(obj.dims()) {
            return Err(DatasetError::PatchOutOfBounds {
                corners: c,
                shape: obj.dims(),
            });
        }
        let mut label = gt.slice(s![c.row_from..c.row_to, c.col_from..c.col_to]).to_owned();
        let mut input = extract_expanded(&obj.array, c, ctx.spec.expand_by)?;

        if ctx.mode == Mode::Train {
            let plan = FlipPlan::sample(&mut *ctx.rng, DEFAULT_FLIP_PROB);
            plan.apply3(&mut input);
            plan.apply2(&mut label);
        }

        Ok(PatchItem {
            entry: entry.clone(),
            input: to_chw_f32(&input),
            label: label.mapv(|v| v as f32 / 255.0),
        })
    }

    fn validate_image(&self, spec: &DatasetSpec, obj: &mut ImageObject) -> DatasetResult<()> {
        validate_segmentation(spec, obj)
    }
}

/// One whole-image sample with its class label.
#[derive(Debug, Clone)]
pub struct ClassificationItem {
    pub entry: FullImageEntry,
    /// Image as (channels, rows, cols) in [0, 1].
    pub input: Array3<f32>,
    pub label: u32,
}

/// Whole-image classification with labels from a pluggable resolver.
#[derive(Debug, Clone)]
pub struct FullImageClassification<R> {
    labels: R,
}

impl<R: LabelResolver> FullImageClassification<R> {
    pub fn new(labels: R) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &R {
        &self.labels
    }
}

impl<R: LabelResolver> DatasetBehavior for FullImageClassification<R> {
    type Entry = FullImageEntry;
    type Item = ClassificationItem;

    fn prepare(&mut self, spec: &DatasetSpec) -> DatasetResult<()> {
        self.labels.load_labels(spec)
    }

    fn index_file(&self, ctx: &mut IndexContext<'_>, file: &str, out: &mut Vec<FullImageEntry>) -> DatasetResult<()> {
        let spec = ctx.spec;
        let mut obj = load_image(spec, file, LoadParts::ArrayOnly, &mut *ctx.rng)?;
        self.validate_image(spec, &mut obj)?;
        out.push(FullImageEntry {
            dataset: spec.name.clone(),
            file: file.to_string(),
            label: self.labels.label_for(&spec.name, file)?,
        });
        Ok(())
    }

    fn dataset_of(entry: &FullImageEntry) -> &str {
        &entry.dataset
    }

    fn fetch(&self, ctx: &mut FetchContext<'_>, entry: &FullImageEntry) -> DatasetResult<ClassificationItem> {
        let mut obj = load_image(ctx.spec, &entry.file, LoadParts::ArrayOnly, &mut *ctx.rng)?;
        self.validate_image(ctx.spec, &mut obj)?;
        if ctx.mode == Mode::Train {
            FlipPlan::sample(&mut *ctx.rng, DEFAULT_FLIP_PROB).apply3(&mut obj.array);
        }
        Ok(ClassificationItem {
            entry: entry.clone(),
            input: to_chw_f32(&obj.array),
            label: entry.label,
        })
    }

    fn validate_image(&self, spec: &DatasetSpec, obj: &mut ImageObject) -> DatasetResult<()> {
        validate_full_image(spec, obj)
    }
}
