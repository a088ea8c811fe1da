//! Shared data contracts for dataspecs and fold split files.

pub mod dataspec;
pub mod split;

pub use dataspec::{load_dataspecs, resolve_all, ContractError, DatasetSpec, FileNameRule, PatchGeometry};
pub use split::{experiment_id_for, list_split_files, load_split, SplitFile, SplitKey};
