//! Per-split and pooled experiment runs.

use crate::config::{ExperimentConfig, Phase};
use crate::error::ExperimentError;
use crate::metrics::ScoreAccumulator;
use crate::scores::{save_run_log, save_scores};
use crate::state::{FoldState, RunState, ScoreRow};
use crate::trainer::Trainer;
use anyhow::Context;
use data_contracts::{experiment_id_for, list_split_files, load_dataspecs, load_split, resolve_all, DatasetSpec, SplitKey};
use image_dataset::{DatasetBehavior, DatasetResult, DiskCache, ImageDataset, Mode};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GLOBAL_SCORE_FILE: &str = "global_test_score.csv";
pub const POOLED_ID: &str = "pooled";
pub const GLOBAL_ROW: &str = "Global";

#[derive(Serialize)]
struct RunLog<'a> {
    config: &'a ExperimentConfig,
    fold: &'a FoldState,
    dataspecs: &'a [DatasetSpec],
    model: serde_json::Value,
}

/// Dataspecs plus the configuration every run over them shares.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
    dataspecs: Vec<DatasetSpec>,
}

impl Experiment {
    /// Resolves every dataspec directory against `config.dataset_dir`.
    pub fn new(config: ExperimentConfig, mut dataspecs: Vec<DatasetSpec>) -> Self {
        resolve_all(&mut dataspecs, &config.dataset_dir);
        Self { config, dataspecs }
    }

    pub fn from_paths(config_path: Option<&Path>, dataspec_path: &Path) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => ExperimentConfig::from_path(path)?,
            None => ExperimentConfig::default(),
        };
        let dataspecs = load_dataspecs(dataspec_path)
            .with_context(|| format!("loading dataspecs from {}", dataspec_path.display()))?;
        Ok(Self::new(config, dataspecs))
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn dataspecs(&self) -> &[DatasetSpec] {
        &self.dataspecs
    }

    /// One run per dataspec, one fold per split file; returns the score rows of every run.
    pub fn run<B, T, F>(&self, behavior: &B, mut new_trainer: F) -> anyhow::Result<Vec<RunState>>
    where
        B: DatasetBehavior,
        T: Trainer<B>,
        F: FnMut(&ExperimentConfig) -> T,
    {
        let mut runs = Vec::with_capacity(self.dataspecs.len());
        for spec in &self.dataspecs {
            let mut trainer = new_trainer(&self.config);
            runs.push(self.run_dataspec(spec, behavior, &mut trainer)?);
        }
        Ok(runs)
    }

    fn run_dataspec<B, T>(&self, spec: &DatasetSpec, behavior: &B, trainer: &mut T) -> anyhow::Result<RunState>
    where
        B: DatasetBehavior,
        T: Trainer<B>,
    {
        let log_dir = self.prepare_log_dir(&spec.name)?;
        let mut global = trainer.new_metrics();
        let mut run = RunState::new(&spec.name, &log_dir);

        let split_files = list_split_files(&spec.split_dir)?;
        if split_files.is_empty() {
            warn!(dataset = %spec.name, dir = %spec.split_dir.display(), "no split files found");
        }
        for split_path in split_files {
            let split = load_split(&split_path)?;
            let split_name = split_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut fold = FoldState::new(&log_dir, experiment_id_for(&split_path), trainer.score_direction());
            info!(dataset = %spec.name, experiment_id = %fold.experiment_id, "starting fold");

            trainer.check_previous_logs(&fold)?;
            trainer.init_model(&fold)?;
            trainer.reset_fold_state(&mut fold)?;

            // Decoded images belong to this fold only; the cache is dropped with the fold.
            let cache = self.config.new_cache(&log_dir)?;
            if self.config.phase == Phase::Train {
                let mut trainset = self.dataset(behavior, Mode::Train, &cache);
                trainset.add(spec, &split.train)?;
                let mut valset = self.dataset(behavior, Mode::Eval, &cache);
                valset.add(spec, &split.validation)?;
                trainer.train(&mut fold, &mut trainset, &valset)?;
                let log = RunLog {
                    config: &self.config,
                    fold: &fold,
                    dataspecs: std::slice::from_ref(spec),
                    model: trainer.describe(),
                };
                save_run_log(&log_dir, &fold.experiment_id, &log)?;
            }

            if self.config.phase == Phase::Train || self.config.pretrained_path.is_none() {
                trainer.load_best_model(&fold)?;
            }

            let testsets = self.test_datasets(behavior, spec, &split.test, &cache)?;
            let (loss, score) = trainer.evaluation(&mut fold, SplitKey::Test, true, &testsets)?;
            global.accumulate(&score);
            let row = ScoreRow::new(split_name, score.scores());
            fold.test_score.push(row.clone());
            run.global_test_score.push(row);
            save_scores(
                &log_dir,
                &format!("{}_test_score.csv", fold.experiment_id),
                &score.headers(),
                &fold.test_score,
            )?;
            info!(dataset = %spec.name, experiment_id = %fold.experiment_id, loss, scores = ?score.scores(), "fold tested");
        }

        run.global_test_score.push(ScoreRow::new(GLOBAL_ROW, global.scores()));
        save_scores(&log_dir, GLOBAL_SCORE_FILE, &global.headers(), &run.global_test_score)?;
        Ok(run)
    }

    /// A single fold over all dataspecs pooled together.
    pub fn run_pooled<B, T>(&self, behavior: &B, mut trainer: T) -> anyhow::Result<RunState>
    where
        B: DatasetBehavior,
        T: Trainer<B>,
    {
        let log_dir = self.prepare_log_dir(POOLED_ID)?;
        let cache = self.config.new_cache(&log_dir)?;
        let mut global = trainer.new_metrics();
        let mut fold = FoldState::new(&log_dir, POOLED_ID, trainer.score_direction());
        info!(datasets = self.dataspecs.len(), "starting pooled run");

        trainer.check_previous_logs(&fold)?;
        trainer.init_model(&fold)?;
        trainer.reset_fold_state(&mut fold)?;

        if self.config.phase == Phase::Train {
            let mut trainset = self.dataset(behavior, Mode::Train, &cache);
            trainset.add_pooled(&self.dataspecs, SplitKey::Train)?;
            let mut valset = self.dataset(behavior, Mode::Eval, &cache);
            valset.add_pooled(&self.dataspecs, SplitKey::Validation)?;
            trainer.train(&mut fold, &mut trainset, &valset)?;
            let log = RunLog {
                config: &self.config,
                fold: &fold,
                dataspecs: &self.dataspecs,
                model: trainer.describe(),
            };
            save_run_log(&log_dir, &fold.experiment_id, &log)?;
        }

        if self.config.phase == Phase::Train || self.config.pretrained_path.is_none() {
            trainer.load_best_model(&fold)?;
        }

        let testsets = if self.config.load_sparse {
            ImageDataset::pool_sparse(
                behavior.clone(),
                Mode::Eval,
                &self.dataspecs,
                SplitKey::Test,
                self.config.dataset_options(),
                Arc::clone(&cache),
            )?
        } else {
            let mut pooled = self.dataset(behavior, Mode::Eval, &cache);
            pooled.add_pooled(&self.dataspecs, SplitKey::Test)?;
            vec![pooled]
        };
        let (loss, score) = trainer.evaluation(&mut fold, SplitKey::Test, true, &testsets)?;
        global.accumulate(&score);
        fold.test_score.push(ScoreRow::new(GLOBAL_ROW, global.prfa()));
        save_scores(
            &log_dir,
            &format!("{}_test_score.csv", fold.experiment_id),
            &global.headers(),
            &fold.test_score,
        )?;
        info!(loss, scores = ?global.prfa(), "pooled run tested");

        let mut run = RunState::new(POOLED_ID, &log_dir);
        run.global_test_score = fold.test_score;
        Ok(run)
    }

    fn prepare_log_dir(&self, name: &str) -> Result<PathBuf, ExperimentError> {
        let dir = self.config.log_dir.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| ExperimentError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(dir)
    }

    fn dataset<B: DatasetBehavior>(&self, behavior: &B, mode: Mode, cache: &Arc<DiskCache>) -> ImageDataset<B> {
        ImageDataset::new(behavior.clone(), mode, self.config.dataset_options()).with_cache(Arc::clone(cache))
    }

    /// One test dataset, or with `load_sparse` one per file up to `load_limit`.
    fn test_datasets<B: DatasetBehavior>(
        &self,
        behavior: &B,
        spec: &DatasetSpec,
        files: &[String],
        cache: &Arc<DiskCache>,
    ) -> DatasetResult<Vec<ImageDataset<B>>> {
        if !self.config.load_sparse {
            let mut testset = self.dataset(behavior, Mode::Eval, cache);
            testset.add(spec, files)?;
            return Ok(vec![testset]);
        }
        let max = self.config.load_limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for file in files.iter().take(max) {
            let mut testset = self.dataset(behavior, Mode::Eval, cache);
            testset.add(spec, std::slice::from_ref(file))?;
            out.push(testset);
        }
        debug!(dataset = %spec.name, count = out.len(), "sparse test datasets loaded");
        Ok(out)
    }
}
