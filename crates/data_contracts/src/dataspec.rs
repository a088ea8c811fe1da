use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("dataspec {dataset} is missing required key `{key}`")]
    MissingKey { dataset: String, key: &'static str },
}

/// How a label or mask file name is derived from an image file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileNameRule {
    /// Same file name as the image.
    #[default]
    Identity,
    /// Replace the first occurrence of `from` with `to`.
    Replace { from: String, to: String },
    /// Append `suffix` to the file stem, optionally swapping the extension.
    StemSuffix {
        suffix: String,
        #[serde(default)]
        extension: Option<String>,
    },
}

impl FileNameRule {
    pub fn apply(&self, file: &str) -> String {
        match self {
            FileNameRule::Identity => file.to_string(),
            FileNameRule::Replace { from, to } => file.replacen(from.as_str(), to, 1),
            FileNameRule::StemSuffix { suffix, extension } => {
                let (stem, ext) = match file.rfind('.') {
                    Some(dot) if dot > 0 => (&file[..dot], Some(&file[dot + 1..])),
                    _ => (file, None),
                };
                match extension.as_deref().or(ext) {
                    Some(ext) => format!("{stem}{suffix}.{ext}"),
                    None => format!("{stem}{suffix}"),
                }
            }
        }
    }
}

/// Patch shape and grid stride, both as (rows, cols).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchGeometry {
    pub shape: (usize, usize),
    pub offset: (usize, usize),
    pub expand_by: usize,
}

/// One dataset's directories, patch geometry and class layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub label_dir: Option<PathBuf>,
    #[serde(default)]
    pub mask_dir: Option<PathBuf>,
    pub split_dir: PathBuf,
    #[serde(default)]
    pub label_getter: FileNameRule,
    #[serde(default)]
    pub mask_getter: FileNameRule,
    /// Patch size as [rows, cols]; required in patched mode.
    #[serde(default)]
    pub patch_shape: Option<[usize; 2]>,
    /// Grid stride as [rows, cols]; required in patched mode.
    #[serde(default)]
    pub patch_offset: Option<[usize; 2]>,
    /// Context margin mirrored around every patch.
    #[serde(default)]
    pub expand_by: usize,
    /// Resize target as [width, height].
    #[serde(default)]
    pub resize: Option<[u32; 2]>,
    #[serde(default = "default_num_class")]
    pub num_class: usize,
    /// 1 keeps only the green channel, anything else clips to RGB.
    #[serde(default = "default_num_channel")]
    pub num_channel: usize,
    #[serde(default = "default_thr_manual")]
    pub thr_manual: u8,
    #[serde(default)]
    pub bbox_crop: bool,
    /// JSON object mapping file name to class id (full-image classification).
    #[serde(default)]
    pub label_table: Option<PathBuf>,
    #[serde(skip)]
    resolved: bool,
}

fn default_num_class() -> usize {
    2
}

fn default_num_channel() -> usize {
    3
}

fn default_thr_manual() -> u8 {
    50
}

impl DatasetSpec {
    pub fn new(name: impl Into<String>, data_dir: impl Into<PathBuf>, split_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data_dir: data_dir.into(),
            label_dir: None,
            mask_dir: None,
            split_dir: split_dir.into(),
            label_getter: FileNameRule::Identity,
            mask_getter: FileNameRule::Identity,
            patch_shape: None,
            patch_offset: None,
            expand_by: 0,
            resize: None,
            num_class: default_num_class(),
            num_channel: default_num_channel(),
            thr_manual: default_thr_manual(),
            bbox_crop: false,
            label_table: None,
            resolved: false,
        }
    }

    pub fn has_gt(&self) -> bool {
        self.label_dir.is_some()
    }

    pub fn has_mask(&self) -> bool {
        self.mask_dir.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Join every directory-valued field onto `root`. Later calls are no-ops.
    pub fn resolve_dirs(&mut self, root: &Path) {
        if self.resolved {
            return;
        }
        self.data_dir = root.join(&self.data_dir);
        self.split_dir = root.join(&self.split_dir);
        for dir in [&mut self.label_dir, &mut self.mask_dir, &mut self.label_table]
            .into_iter()
            .flatten()
        {
            *dir = root.join(&*dir);
        }
        self.resolved = true;
    }

    /// Patch geometry, failing when either the shape or the stride is absent.
    pub fn patch_geometry(&self) -> Result<PatchGeometry, ContractError> {
        let shape = self.patch_shape.ok_or_else(|| ContractError::MissingKey {
            dataset: self.name.clone(),
            key: "patch_shape",
        })?;
        let offset = self.patch_offset.ok_or_else(|| ContractError::MissingKey {
            dataset: self.name.clone(),
            key: "patch_offset",
        })?;
        Ok(PatchGeometry {
            shape: (shape[0], shape[1]),
            offset: (offset[0], offset[1]),
            expand_by: self.expand_by,
        })
    }

    pub fn data_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn label_path(&self, file: &str) -> Option<PathBuf> {
        self.label_dir
            .as_ref()
            .map(|dir| dir.join(self.label_getter.apply(file)))
    }

    pub fn mask_path(&self, file: &str) -> Option<PathBuf> {
        self.mask_dir
            .as_ref()
            .map(|dir| dir.join(self.mask_getter.apply(file)))
    }
}

/// Load a JSON array of dataspecs.
pub fn load_dataspecs(path: &Path) -> Result<Vec<DatasetSpec>, ContractError> {
    let raw = fs::read(path).map_err(|e| ContractError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&raw).map_err(|e| ContractError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn resolve_all(specs: &mut [DatasetSpec], root: &Path) {
    for spec in specs {
        spec.resolve_dirs(root);
    }
}
