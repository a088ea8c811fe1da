//! Score files and run logs written into a run's log directory.

use crate::error::ExperimentError;
use crate::state::ScoreRow;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write `rows` as CSV with a `Split` column followed by `headers`.
pub fn save_scores(dir: &Path, file_name: &str, headers: &[&str], rows: &[ScoreRow]) -> Result<PathBuf, ExperimentError> {
    let path = dir.join(file_name);
    let csv_err = |e| ExperimentError::Scores {
        path: path.clone(),
        source: e,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .map_err(csv_err)?;
    let mut header = vec!["Split"];
    header.extend_from_slice(headers);
    writer.write_record(&header).map_err(csv_err)?;
    for row in rows {
        let mut record = vec![row.label.clone()];
        record.extend(row.values.iter().map(|v| format!("{v:.5}")));
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| ExperimentError::Io {
        path: path.clone(),
        source: e,
    })?;
    info!(path = %path.display(), rows = rows.len(), "scores saved");
    Ok(path)
}

/// Write `{experiment_id}_log.json` into `dir`.
pub fn save_run_log<T: Serialize>(dir: &Path, experiment_id: &str, log: &T) -> Result<PathBuf, ExperimentError> {
    let path = dir.join(format!("{experiment_id}_log.json"));
    let json = serde_json::to_vec_pretty(log).map_err(|e| ExperimentError::RunLog {
        path: path.clone(),
        source: e,
    })?;
    std::fs::write(&path, json).map_err(|e| ExperimentError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_file_has_header_and_rows() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let rows = vec![ScoreRow::new("SPLIT_0.json", vec![0.5, 0.25]), ScoreRow::new("Global", vec![1.0, 0.0])];
        let path = save_scores(tmp.path(), "global_test_score.csv", &["F1", "Accuracy"], &rows)?;
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec!["Split,F1,Accuracy", "SPLIT_0.json,0.50000,0.25000", "Global,1.00000,0.00000"]);
        Ok(())
    }

    #[test]
    fn missing_log_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = save_scores(&tmp.path().join("absent"), "x.csv", &[], &[]).unwrap_err();
        assert!(matches!(err, ExperimentError::Scores { .. }));
    }
}
