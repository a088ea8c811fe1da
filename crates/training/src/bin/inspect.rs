use clap::{Parser, ValueEnum};
use data_contracts::{list_split_files, load_dataspecs, load_split, SplitKey};
use image_dataset::{BinarySemSegPatches, DatasetBehavior, FullImageClassification, ImageDataset, Mode, PatternLabels};
use std::path::PathBuf;
use tracing::info;
use training::{init_tracing, Experiment, ExperimentConfig};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Layout {
    Patched,
    FullImage,
}

#[derive(Parser, Debug)]
#[command(name = "inspect", about = "Build dataset indices for every split of a dataspec list without training")]
struct Args {
    /// JSON list of dataspecs.
    #[arg(long)]
    dataspecs: PathBuf,
    /// Experiment config (TOML); defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `dataset_dir` from the config.
    #[arg(long)]
    dataset_dir: Option<PathBuf>,
    /// How images are indexed.
    #[arg(long, value_enum, default_value_t = Layout::Patched)]
    layout: Layout,
    /// Also build the pooled train/validation/test sets.
    #[arg(long)]
    pooled: bool,
}

const KEYS: [SplitKey; 3] = [SplitKey::Train, SplitKey::Validation, SplitKey::Test];

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_path(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(dir) = args.dataset_dir.clone() {
        config.dataset_dir = dir;
    }
    init_tracing(config.debug);
    let experiment = Experiment::new(config, load_dataspecs(&args.dataspecs)?);

    match args.layout {
        Layout::Patched => inspect(&experiment, &BinarySemSegPatches, args.pooled),
        // Every file gets class 0; only the index sizes matter here.
        Layout::FullImage => inspect(
            &experiment,
            &FullImageClassification::new(PatternLabels::default().with_default(0)),
            args.pooled,
        ),
    }
}

fn inspect<B: DatasetBehavior>(experiment: &Experiment, behavior: &B, pooled: bool) -> anyhow::Result<()> {
    let options = experiment.config().dataset_options();
    for spec in experiment.dataspecs() {
        let split_files = list_split_files(&spec.split_dir)?;
        info!(dataset = %spec.name, splits = split_files.len(), "inspecting dataspec");
        for split_path in split_files {
            let split = load_split(&split_path)?;
            for key in KEYS {
                let files = split.files(key);
                let indexed = files_indexed(files.len(), options.limit);
                let mut dataset = ImageDataset::new(behavior.clone(), Mode::Eval, options);
                dataset.add(spec, files)?;
                println!(
                    "{}\t{}\t{}\tfiles={}\tentries={}",
                    spec.name,
                    split_path.display(),
                    key,
                    indexed,
                    dataset.len()
                );
            }
        }
    }
    if pooled {
        for key in KEYS {
            let dataset = ImageDataset::pool(behavior.clone(), Mode::Eval, experiment.dataspecs(), key, options)?;
            println!("pooled\t{key}\tentries={}", dataset.len());
        }
    }
    Ok(())
}

/// Files `ImageDataset::add` actually indexes out of `listed` under `limit`.
fn files_indexed(listed: usize, limit: Option<usize>) -> usize {
    limit.map_or(listed, |limit| listed.min(limit))
}
