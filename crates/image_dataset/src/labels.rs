//! Label strategies for full-image classification.

use crate::types::{DatasetError, DatasetResult};
use data_contracts::DatasetSpec;
use std::collections::HashMap;
use std::fs;

/// Maps (dataset, file) to a class label.
pub trait LabelResolver: Send + Sync + Clone {
    /// Prepare labels for `spec`; called once per dataspec before its files are indexed.
    fn load_labels(&mut self, spec: &DatasetSpec) -> DatasetResult<()>;

    fn label_for(&self, dataset: &str, file: &str) -> DatasetResult<u32>;
}

/// Classifies files by the first rule whose substring occurs in the file name.
#[derive(Debug, Clone, Default)]
pub struct PatternLabels {
    rules: Vec<(String, u32)>,
    default: Option<u32>,
}

impl PatternLabels {
    pub fn new<S: Into<String>>(rules: impl IntoIterator<Item = (S, u32)>) -> Self {
        Self {
            rules: rules.into_iter().map(|(p, c)| (p.into(), c)).collect(),
            default: None,
        }
    }

    /// Class for files that match no rule; without one they are an error.
    pub fn with_default(mut self, class: u32) -> Self {
        self.default = Some(class);
        self
    }
}

impl LabelResolver for PatternLabels {
    fn load_labels(&mut self, _spec: &DatasetSpec) -> DatasetResult<()> {
        Ok(())
    }

    fn label_for(&self, dataset: &str, file: &str) -> DatasetResult<u32> {
        self.rules
            .iter()
            .find(|(pattern, _)| file.contains(pattern.as_str()))
            .map(|(_, class)| *class)
            .or(self.default)
            .ok_or_else(|| DatasetError::MissingLabel {
                dataset: dataset.to_string(),
                file: file.to_string(),
            })
    }
}

/// Labels read from each dataspec's `label_table`, a JSON object of file name to class.
#[derive(Debug, Clone, Default)]
pub struct TableLabels {
    tables: HashMap<String, HashMap<String, u32>>,
}

impl TableLabels {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LabelResolver for TableLabels {
    fn load_labels(&mut self, spec: &DatasetSpec) -> DatasetResult<()> {
        if self.tables.contains_key(&spec.name) {
            return Ok(());
        }
        let Some(path) = spec.label_table.as_ref() else {
            return Err(DatasetError::Other(format!(
                "dataset {} has no label_table for table labels",
                spec.name
            )));
        };
        let raw = fs::read_to_string(path).map_err(|e| DatasetError::Io {
            path: path.clone(),
            source: e,
        })?;
        let table: HashMap<String, u32> = serde_json::from_str(&raw).map_err(|e| DatasetError::Json {
            path: path.clone(),
            source: e,
        })?;
        self.tables.insert(spec.name.clone(), table);
        Ok(())
    }

    fn label_for(&self, dataset: &str, file: &str) -> DatasetResult<u32> {
        self.tables
            .get(dataset)
            .and_then(|table| table.get(file))
            .copied()
            .ok_or_else(|| DatasetError::MissingLabel {
                dataset: dataset.to_string(),
                file: file.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_pattern_wins() {
        let labels = PatternLabels::new([("tumor", 1), ("normal", 0)]);
        assert_eq!(labels.label_for("ds", "tumor_normal_01.png").unwrap(), 1);
        assert_eq!(labels.label_for("ds", "normal_02.png").unwrap(), 0);
        let err = labels.label_for("ds", "other.png").unwrap_err();
        assert!(matches!(err, DatasetError::MissingLabel { .. }));
        assert_eq!(labels.with_default(3).label_for("ds", "other.png").unwrap(), 3);
    }

    #[test]
    fn table_labels_load_once_per_dataset() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let table = tmp.path().join("labels.json");
        fs::write(&table, r#"{"a.png": 2, "b.png": 0}"#)?;
        let mut spec = DatasetSpec::new("ds", "img", "splits");
        spec.label_table = Some(table.clone());

        let mut labels = TableLabels::new();
        labels.load_labels(&spec)?;
        fs::remove_file(&table)?;
        labels.load_labels(&spec)?;
        assert_eq!(labels.label_for("ds", "a.png")?, 2);
        assert!(labels.label_for("other", "a.png").is_err());
        Ok(())
    }
}
