//! Export-bi command - flat CSVs for dashboards.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::Config;
use crate::db::{queries, Database};
use crate::error::{ReadmitError, Result};
use crate::ml::{Metrics, Pipeline};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub split: String,
    pub auc_roc: Option<f64>,
    pub avg_precision: Option<f64>,
    pub f1: f64,
    pub accuracy: f64,
    pub confusion_matrix: String,
}

impl PerformanceRow {
    pub fn new(split: &str, metrics: &Metrics) -> Self {
        let [[tn, fp], [fn_, tp]] = metrics.confusion_matrix;
        Self {
            split: split.to_string(),
            auc_roc: metrics.auc_roc,
            avg_precision: metrics.avg_precision,
            f1: metrics.f1,
            accuracy: metrics.accuracy,
            confusion_matrix: format!("[[{tn}, {fp}], [{fn_}, {tp}]]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceRow {
    pub feature: String,
    pub importance: f64,
    pub raw_weight: f64,
}

/// Absolute coefficient per expanded feature, largest first.
pub fn feature_importance(pipeline: &Pipeline) -> Vec<ImportanceRow> {
    let mut rows: Vec<ImportanceRow> = pipeline
        .feature_names()
        .into_iter()
        .zip(pipeline.coefficients())
        .map(|(feature, weight)| ImportanceRow {
            feature,
            importance: weight.abs(),
            raw_weight: weight,
        })
        .collect();
    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    rows
}

pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| ReadmitError::io(path, e))
}

fn read_metrics(path: &Path) -> Result<Metrics> {
    let raw = std::fs::read_to_string(path).map_err(|e| ReadmitError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Runs the export-bi command.
///
/// # Errors
///
/// Returns an error if the mart is unreachable or training has not produced its artifacts.
#[instrument(skip(config))]
pub async fn run(config: &Config) -> Result<()> {
    let out = config.paths.bi_dir();
    std::fs::create_dir_all(&out).map_err(|e| ReadmitError::io(&out, e))?;

    let db = Database::connect(config.database.url()?).await?;
    let overview = queries::cohort_overview(db.pool(), &config.database.mart_table).await?;
    write_rows(&out.join("cohort_overview.csv"), &[overview])?;

    let ml_dir = config.paths.ml_dir();
    let performance = [
        PerformanceRow::new("val", &read_metrics(&ml_dir.join("val_metrics.json"))?),
        PerformanceRow::new("test", &read_metrics(&ml_dir.join("test_metrics.json"))?),
    ];
    write_rows(&out.join("model_performance.csv"), &performance)?;

    let pipeline = Pipeline::load(&config.paths.model_path())?;
    let importance = feature_importance(&pipeline);
    write_rows(&out.join("feature_importance.csv"), &importance)?;

    info!(dir = %out.display(), features = importance.len(), "Wrote BI exports");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_row_flattens_confusion_matrix() {
        let metrics = Metrics {
            auc_roc: None,
            avg_precision: Some(0.5),
            f1: 0.25,
            accuracy: 0.75,
            confusion_matrix: [[10, 2], [3, 1]],
        };
        let row = PerformanceRow::new("val", &metrics);
        assert_eq!(row.confusion_matrix, "[[10, 2], [3, 1]]");
        assert_eq!(row.auc_roc, None);
    }

    #[test]
    fn rows_are_written_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("importance.csv");
        let rows = vec![
            ImportanceRow {
                feature: "age".into(),
                importance: 0.5,
                raw_weight: -0.5,
            },
            ImportanceRow {
                feature: "sex__M".into(),
                importance: 0.25,
                raw_weight: 0.25,
            },
        ];
        write_rows(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("feature,importance,raw_weight"));
        assert_eq!(lines.next(), Some("age,0.5,-0.5"));
        assert_eq!(lines.next(), Some("sex__M,0.25,0.25"));
    }
}
