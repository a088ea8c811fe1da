//! Indexed dataset container and pooled assembly across dataspecs.

use crate::aug::item_rng;
use crate::behavior::{DatasetBehavior, FetchContext, IndexContext};
use crate::cache::DiskCache;
use crate::types::{DatasetError, DatasetResult, Mode};
use data_contracts::{list_split_files, load_split, DatasetSpec, SplitKey};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetOptions {
    /// Index at most this many files per `add`.
    pub limit: Option<usize>,
    /// Seed for random-label fallback and train-time flips; entropy when absent.
    pub seed: Option<u64>,
}

/// Ordered index over the files of one or more dataspecs.
pub struct ImageDataset<B: DatasetBehavior> {
    behavior: B,
    mode: Mode,
    options: DatasetOptions,
    specs: BTreeMap<String, DatasetSpec>,
    indices: Vec<B::Entry>,
    cache: Arc<DiskCache>,
    rng: StdRng,
    epoch: u64,
}

impl<B: DatasetBehavior> std::fmt::Debug for ImageDataset<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDataset")
            .field("mode", &self.mode)
            .field("options", &self.options)
            .field("datasets", &self.specs.keys().collect::<Vec<_>>())
            .field("len", &self.indices.len())
            .finish()
    }
}

impl<B: DatasetBehavior> ImageDataset<B> {
    pub fn new(behavior: B, mode: Mode, options: DatasetOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            behavior,
            mode,
            options,
            specs: BTreeMap::new(),
            indices: Vec::new(),
            cache: Arc::new(DiskCache::in_memory()),
            rng,
            epoch: 0,
        }
    }

    /// Share `cache` instead of the private in-memory one.
    pub fn with_cache(mut self, cache: Arc<DiskCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Index `files` of `spec`, decoding every file before returning.
    ///
    /// A missing or undecodable file aborts the whole pass.
    pub fn add(&mut self, spec: &DatasetSpec, files: &[String]) -> DatasetResult<()> {
        self.behavior.prepare(spec)?;
        let spec = self.specs.entry(spec.name.clone()).or_insert_with(|| spec.clone());
        let take = self.options.limit.unwrap_or(usize::MAX);
        let before = self.indices.len();
        let mut ctx = IndexContext {
            spec,
            cache: &self.cache,
            rng: &mut self.rng,
        };
        let mut indexed = 0usize;
        for file in files.iter().take(take) {
            self.behavior.index_file(&mut ctx, file, &mut self.indices)?;
            indexed += 1;
        }
        debug!(
            dataset = %spec.name,
            mode = ?self.mode,
            files = indexed,
            entries = self.indices.len() - before,
            "indexed dataset files"
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn entries(&self) -> &[B::Entry] {
        &self.indices
    }

    pub fn entry(&self, index: usize) -> Option<&B::Entry> {
        self.indices.get(index)
    }

    pub fn spec(&self, name: &str) -> Option<&DatasetSpec> {
        self.specs.get(name)
    }

    pub fn cache(&self) -> &Arc<DiskCache> {
        &self.cache
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    /// Epoch mixed into per-item random draws so flips differ between epochs.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Fetch item `index`; train-mode randomness depends only on seed, index and epoch.
    pub fn get(&self, index: usize) -> DatasetResult<B::Item> {
        let entry = self.indices.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.indices.len(),
        })?;
        let name = B::dataset_of(entry);
        let spec = self.specs.get(name).ok_or_else(|| DatasetError::UnknownDataset {
            name: name.to_string(),
        })?;
        let mut rng = item_rng(self.options.seed, index, self.epoch);
        let mut ctx = FetchContext {
            spec,
            cache: &self.cache,
            mode: self.mode,
            rng: &mut rng,
        };
        self.behavior.fetch(&mut ctx, entry)
    }

    /// Fetch several items in parallel, preserving the order of `indexes`.
    pub fn fetch_batch(&self, indexes: &[usize]) -> DatasetResult<Vec<B::Item>> {
        indexes.par_iter().map(|&index| self.get(index)).collect()
    }

    /// One dataset holding `split_key` files of every split file of every dataspec.
    ///
    /// Files listed by several split files of the same dataspec are indexed once.
    pub fn pool(
        behavior: B,
        mode: Mode,
        specs: &[DatasetSpec],
        split_key: SplitKey,
        options: DatasetOptions,
    ) -> DatasetResult<Self> {
        let mut pooled = Self::new(behavior, mode, options);
        pooled.add_pooled(specs, split_key)?;
        Ok(pooled)
    }

    /// Add the `split_key` files of every split file of every dataspec.
    pub fn add_pooled(&mut self, specs: &[DatasetSpec], split_key: SplitKey) -> DatasetResult<()> {
        for spec in specs {
            let files = pooled_files(spec, split_key)?;
            self.add(spec, &files)?;
        }
        info!(split = %split_key, datasets = specs.len(), entries = self.len(), "pooled dataset built");
        Ok(())
    }

    /// Like [`ImageDataset::pool`] but one dataset per file, at most `options.limit` of them.
    pub fn pool_sparse(
        behavior: B,
        mode: Mode,
        specs: &[DatasetSpec],
        split_key: SplitKey,
        options: DatasetOptions,
        cache: Arc<DiskCache>,
    ) -> DatasetResult<Vec<Self>> {
        let max = options.limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        'specs: for spec in specs {
            for file in pooled_files(spec, split_key)? {
                if out.len() >= max {
                    break 'specs;
                }
                let mut single = Self::new(behavior.clone(), mode, options).with_cache(Arc::clone(&cache));
                single.add(spec, std::slice::from_ref(&file))?;
                out.push(single);
            }
        }
        info!(split = %split_key, datasets = out.len(), "sparse pooled datasets built");
        Ok(out)
    }
}

fn pooled_files(spec: &DatasetSpec, split_key: SplitKey) -> DatasetResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for path in list_split_files(&spec.split_dir)? {
        let split = load_split(&path)?;
        for file in split.files(split_key) {
            if seen.insert(file.clone()) {
                files.push(file.clone());
            }
        }
    }
    Ok(files)
}
