//! Patch-based and full-image dataset assembly for supervised image-model training.
//!
//! This crate provides utilities for:
//! - Decoding and validating images with their ground truth and masks
//! - Tiling images into overlapping patches and mirroring context margins
//! - Caching decoded images across patch accesses
//! - Indexing datasets per patch or per image, and pooling several dataspecs
//! - Stitching per-patch predictions back into full-image results

pub mod aug;
pub mod behavior;
pub mod cache;
pub mod chunks;
pub mod dataset;
pub mod expand;
pub mod imaging;
pub mod labels;
pub mod stitch;
pub mod types;
pub mod validation;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use aug::{item_rng, FlipPlan};
pub use behavior::{
    BinarySemSegPatches, ClassificationItem, DatasetBehavior, FetchContext,
    FullImageClassification, IndexContext, PatchItem,
};
pub use cache::DiskCache;
pub use chunks::chunk_indexes;
pub use dataset::{DatasetOptions, ImageDataset};
pub use expand::{expand_and_mirror_patch, extract_expanded, mirror_pad2, mirror_pad3, ExpandedWindow};
pub use imaging::{binarize, load_image, ImageObject, LoadParts};
pub use labels::{LabelResolver, PatternLabels, TableLabels};
pub use stitch::PatchStitcher;
pub use types::*;

#[cfg(feature = "burn-runtime")]
pub use batch::{collate_patches, PatchBatch};
