//! End-to-end experiment runs over synthetic datasets with scripted trainers.

use data_contracts::SplitKey;
use image::{GrayImage, Luma, Rgb, RgbImage};
use image_dataset::{
    cache_key, BinarySemSegPatches, DatasetBehavior, FullImageClassification, ImageDataset, PatternLabels,
};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use training::{
    save_mask, stitch_predictions, Experiment, ExperimentConfig, FoldState, Phase, Prf1a, ScoreAccumulator,
    ScoreDirection, Trainer, GLOBAL_SCORE_FILE,
};

#[derive(Default)]
struct Journal {
    events: Vec<String>,
    fold_scores: Vec<Prf1a>,
    initial_best: Vec<f64>,
    train_sizes: Vec<(usize, usize)>,
    test_datasets: Vec<usize>,
    /// (cache entries, first file of the first fold still cached) per evaluation.
    cache_seen: Vec<(usize, bool)>,
}

type Shared = Rc<RefCell<Journal>>;

/// Predicts foreground everywhere, so every fold scores differently.
struct AllForeground {
    journal: Shared,
    direction: ScoreDirection,
}

impl Trainer<BinarySemSegPatches> for AllForeground {
    type Metrics = Prf1a;

    fn new_metrics(&self) -> Prf1a {
        Prf1a::new()
    }

    fn score_direction(&self) -> ScoreDirection {
        self.direction
    }

    fn check_previous_logs(&mut self, _fold: &FoldState) -> anyhow::Result<()> {
        self.journal.borrow_mut().events.push("check".into());
        Ok(())
    }

    fn init_model(&mut self, fold: &FoldState) -> anyhow::Result<()> {
        let mut journal = self.journal.borrow_mut();
        journal.events.push("init".into());
        journal.initial_best.push(fold.best_score);
        Ok(())
    }

    fn reset_fold_state(&mut self, _fold: &mut FoldState) -> anyhow::Result<()> {
        self.journal.borrow_mut().events.push("reset".into());
        Ok(())
    }

    fn train(
        &mut self,
        fold: &mut FoldState,
        train: &mut ImageDataset<BinarySemSegPatches>,
        validation: &ImageDataset<BinarySemSegPatches>,
    ) -> anyhow::Result<()> {
        for epoch in 0..2 {
            train.set_epoch(epoch);
            let all: Vec<usize> = (0..train.len()).collect();
            let items = train.fetch_batch(&all)?;
            fold.training_log.push(vec![epoch as f64, items.len() as f64]);
            fold.update_best(epoch as usize, 0.5 + epoch as f64);
        }
        let mut journal = self.journal.borrow_mut();
        journal.events.push("train".into());
        journal.train_sizes.push((train.len(), validation.len()));
        Ok(())
    }

    fn load_best_model(&mut self, _fold: &FoldState) -> anyhow::Result<()> {
        self.journal.borrow_mut().events.push("best".into());
        Ok(())
    }

    fn evaluation(
        &mut self,
        fold: &mut FoldState,
        _split_key: SplitKey,
        save_pred: bool,
        datasets: &[ImageDataset<BinarySemSegPatches>],
    ) -> anyhow::Result<(f64, Prf1a)> {
        let mut score = Prf1a::new();
        for dataset in datasets {
            let predictions = stitch_predictions(dataset, |item| Ok(item.label.mapv(|_| 1.0)))?;
            for pred in predictions {
                let mask = pred.mask(0.5);
                if let Some(truth) = &pred.ground_truth {
                    score.update_from_masks(mask.view(), truth.view())?;
                }
                if save_pred {
                    save_mask(&fold.log_dir.join("pred"), &pred.file, mask.view())?;
                }
            }
        }
        let mut journal = self.journal.borrow_mut();
        journal.events.push("eval".into());
        journal.fold_scores.push(score);
        journal.test_datasets.push(datasets.len());
        Ok((0.25, score))
    }
}

/// Counts fetched items; works for any dataset behaviour.
struct Counting {
    journal: Shared,
}

impl<B: DatasetBehavior> Trainer<B> for Counting {
    type Metrics = Prf1a;

    fn new_metrics(&self) -> Prf1a {
        Prf1a::new()
    }

    fn init_model(&mut self, _fold: &FoldState) -> anyhow::Result<()> {
        Ok(())
    }

    fn train(&mut self, _fold: &mut FoldState, train: &mut ImageDataset<B>, validation: &ImageDataset<B>) -> anyhow::Result<()> {
        self.journal.borrow_mut().train_sizes.push((train.len(), validation.len()));
        Ok(())
    }

    fn load_best_model(&mut self, _fold: &FoldState) -> anyhow::Result<()> {
        Ok(())
    }

    fn evaluation(
        &mut self,
        _fold: &mut FoldState,
        _split_key: SplitKey,
        _save_pred: bool,
        datasets: &[ImageDataset<B>],
    ) -> anyhow::Result<(f64, Prf1a)> {
        let mut score = Prf1a::new();
        for dataset in datasets {
            for index in 0..dataset.len() {
                dataset.get(index)?;
                score.add(1, 0, 0, 0);
            }
        }
        let mut journal = self.journal.borrow_mut();
        journal.test_datasets.push(datasets.len());
        if let Some(first) = datasets.first() {
            let cache = first.cache();
            journal.cache_seen.push((cache.len(), cache.contains(&cache_key("alpha", "a.png"))));
        }
        Ok((0.0, score))
    }
}

/// Writes images, labels and `splits` (split file name, contents) under `root/name`.
fn create_dataset(root: &Path, name: &str, files: &[&str], splits: &[(&str, serde_json::Value)]) -> anyhow::Result<()> {
    let base = root.join(name);
    for dir in ["images", "labels", "splits"] {
        fs::create_dir_all(base.join(dir))?;
    }
    for (i, file) in files.iter().enumerate() {
        RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 90])).save(base.join("images").join(file))?;
        let edge = 8 + i as u32;
        GrayImage::from_fn(32, 32, |x, y| if x < edge && y < 20 { Luma([255]) } else { Luma([0]) })
            .save(base.join("labels").join(file))?;
    }
    for (split, contents) in splits {
        fs::write(base.join("splits").join(split), serde_json::to_vec(contents)?)?;
    }
    Ok(())
}

fn split(train: &[&str], validation: &[&str], test: &[&str]) -> serde_json::Value {
    serde_json::json!({ "train": train, "validation": validation, "test": test })
}

fn write_dataspecs(root: &Path, names: &[&str]) -> anyhow::Result<std::path::PathBuf> {
    let specs: Vec<_> = names
        .iter()
        .map(|name| {
            serde_json::json!({
                "name": name,
                "data_dir": format!("{name}/images"),
                "label_dir": format!("{name}/labels"),
                "split_dir": format!("{name}/splits"),
                "patch_shape": [16, 16],
                "patch_offset": [12, 12],
                "expand_by": 4,
            })
        })
        .collect();
    let path = root.join("dataspecs.json");
    fs::write(&path, serde_json::to_vec_pretty(&specs)?)?;
    Ok(path)
}

fn three_fold_dataset(root: &Path, name: &str) -> anyhow::Result<()> {
    let files = ["a.png", "b.png", "c.png", "d.png", "e.png", "f.png"];
    create_dataset(
        root,
        name,
        &files,
        &[
            ("SPLIT_0.json", split(&["a.png", "b.png", "c.png"], &["d.png"], &["e.png", "f.png"])),
            ("SPLIT_1.json", split(&["c.png", "d.png", "e.png"], &["f.png"], &["a.png", "b.png"])),
            ("SPLIT_2.json", split(&["e.png", "f.png", "a.png"], &["b.png"], &["c.png", "d.png"])),
        ],
    )
}

fn config_for(root: &Path) -> ExperimentConfig {
    ExperimentConfig {
        log_dir: root.join("logs"),
        dataset_dir: root.join("data"),
        seed: Some(17),
        ..Default::default()
    }
}

#[test]
fn per_split_run_persists_fold_and_global_scores() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data = tmp.path().join("data");
    three_fold_dataset(&data, "alpha")?;
    let dataspecs = write_dataspecs(tmp.path(), &["alpha"])?;
    let config_path = tmp.path().join("experiment.toml");
    fs::write(
        &config_path,
        format!(
            "log_dir = {:?}\ndataset_dir = {:?}\nseed = 17\ncache_spill = true\ncache_memory_entries = 2\n",
            tmp.path().join("logs").display().to_string(),
            data.display().to_string()
        ),
    )?;

    let experiment = Experiment::from_paths(Some(&config_path), &dataspecs)?;
    assert!(experiment.dataspecs()[0].data_dir.starts_with(&data));

    let journal: Shared = Rc::default();
    let runs = experiment.run(&BinarySemSegPatches, |_| AllForeground {
        journal: Rc::clone(&journal),
        direction: ScoreDirection::Maximize,
    })?;
    assert_eq!(runs.len(), 1);

    let journal = journal.borrow();
    let cycle = ["check", "init", "reset", "train", "best", "eval"];
    assert_eq!(journal.events.len(), 3 * cycle.len());
    for fold_events in journal.events.chunks(cycle.len()) {
        assert_eq!(fold_events, cycle);
    }
    assert!(journal.initial_best.iter().all(|b| *b == 0.0));

    let log_dir = tmp.path().join("logs").join("alpha");
    for id in ["SPLIT_0", "SPLIT_1", "SPLIT_2"] {
        assert!(log_dir.join(format!("{id}_test_score.csv")).is_file());
        assert!(log_dir.join(format!("{id}_log.json")).is_file());
    }
    assert!(log_dir.join("pred").join("a.png").is_file());

    // Global row is the metric of the summed confusion counts.
    let mut summed = Prf1a::new();
    for fold in &journal.fold_scores {
        summed.accumulate(fold);
    }
    let run = &runs[0];
    assert_eq!(run.global_test_score.len(), 4);
    assert_eq!(run.global_row().map(|r| r.values.clone()), Some(summed.scores()));
    assert_eq!(run.global_test_score[0].label, "SPLIT_0.json");

    let global_csv = fs::read_to_string(log_dir.join(GLOBAL_SCORE_FILE))?;
    let lines: Vec<_> = global_csv.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "Split,Precision,Recall,F1,Accuracy");
    assert!(lines[4].starts_with("Global,"));

    let log: serde_json::Value = serde_json::from_slice(&fs::read(log_dir.join("SPLIT_1_log.json"))?)?;
    assert_eq!(log["fold"]["experiment_id"], "SPLIT_1");
    assert_eq!(log["fold"]["best_epoch"], 1);
    assert_eq!(log["dataspecs"][0]["name"], "alpha");
    // The spilled cache is gone once the run finishes.
    assert_eq!(fs::read_dir(log_dir.join("_cache"))?.count(), 0);
    Ok(())
}

#[test]
fn test_phase_with_pretrained_weights_skips_training() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    three_fold_dataset(&tmp.path().join("data"), "alpha")?;
    let dataspecs = training_specs(tmp.path(), &["alpha"])?;
    let config = ExperimentConfig {
        phase: Phase::Test,
        pretrained_path: Some(tmp.path().join("weights.bin")),
        ..config_for(tmp.path())
    };
    let journal: Shared = Rc::default();
    Experiment::new(config, dataspecs).run(&BinarySemSegPatches, |_| AllForeground {
        journal: Rc::clone(&journal),
        direction: ScoreDirection::Minimize,
    })?;

    let journal = journal.borrow();
    assert!(!journal.events.iter().any(|e| e == "train" || e == "best"));
    assert_eq!(journal.events.iter().filter(|e| *e == "eval").count(), 3);
    assert!(journal.initial_best.iter().all(|b| *b == 1e11));
    assert!(!tmp.path().join("logs/alpha/SPLIT_0_log.json").exists());
    Ok(())
}

#[test]
fn sparse_test_loading_builds_one_dataset_per_image() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let files = ["a.png", "b.png", "c.png", "d.png"];
    create_dataset(
        &tmp.path().join("data"),
        "alpha",
        &files,
        &[("SPLIT_0.json", split(&["a.png"], &["b.png"], &["b.png", "c.png", "d.png"]))],
    )?;
    let dataspecs = training_specs(tmp.path(), &["alpha"])?;
    let config = ExperimentConfig {
        load_sparse: true,
        load_limit: Some(2),
        ..config_for(tmp.path())
    };
    let journal: Shared = Rc::default();
    Experiment::new(config, dataspecs).run(&BinarySemSegPatches, |_| AllForeground {
        journal: Rc::clone(&journal),
        direction: ScoreDirection::Maximize,
    })?;
    assert_eq!(journal.borrow().test_datasets, vec![2]);
    Ok(())
}

#[test]
fn each_fold_starts_with_an_empty_cache() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let files = ["a.png", "b.png", "c.png", "d.png", "e.png", "f.png"];
    create_dataset(
        &tmp.path().join("data"),
        "alpha",
        &files,
        &[
            ("SPLIT_0.json", split(&["a.png"], &["b.png"], &["c.png"])),
            ("SPLIT_1.json", split(&["d.png"], &["e.png"], &["f.png"])),
        ],
    )?;
    let dataspecs = training_specs(tmp.path(), &["alpha"])?;
    let journal: Shared = Rc::default();
    Experiment::new(config_for(tmp.path()), dataspecs).run(&BinarySemSegPatches, |_| Counting {
        journal: Rc::clone(&journal),
    })?;

    // Fold 1 only sees its own three images; nothing from fold 0 survives.
    assert_eq!(journal.borrow().cache_seen, vec![(3, true), (3, false)]);
    Ok(())
}

#[test]
fn pooled_run_concatenates_every_dataspec() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let files = ["f0.png", "f1.png", "f2.png", "f3.png", "f4.png", "f5.png", "f6.png"];
    for name in ["alpha", "beta"] {
        create_dataset(
            &tmp.path().join("data"),
            name,
            &files,
            &[("SPLIT_0.json", split(&files[..5], &files[5..6], &files[6..]))],
        )?;
    }
    let dataspecs = training_specs(tmp.path(), &["alpha", "beta"])?;
    let experiment = Experiment::new(config_for(tmp.path()), dataspecs);
    let behavior = FullImageClassification::new(PatternLabels::default().with_default(1));

    let journal: Shared = Rc::default();
    let run = experiment.run_pooled(
        &behavior,
        Counting {
            journal: Rc::clone(&journal),
        },
    )?;
    assert_eq!(journal.borrow().train_sizes, vec![(10, 2)]);
    assert_eq!(journal.borrow().test_datasets, vec![1]);
    assert_eq!(run.global_row().map(|r| r.values.clone()), Some(vec![1.0, 1.0, 1.0, 1.0]));

    let pooled_csv = fs::read_to_string(tmp.path().join("logs/pooled/pooled_test_score.csv"))?;
    assert_eq!(pooled_csv.lines().count(), 2);
    assert!(tmp.path().join("logs/pooled/pooled_log.json").is_file());
    Ok(())
}

fn training_specs(root: &Path, names: &[&str]) -> anyhow::Result<Vec<data_contracts::DatasetSpec>> {
    let path = write_dataspecs(root, names)?;
    Ok(data_contracts::load_dataspecs(&path)?)
}
