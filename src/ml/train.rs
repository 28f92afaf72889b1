//! Train command - fits the pipeline on the feature splits and persists it with its metrics.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{ReadmitError, Result};
use crate::ml::metrics::{classification_report, label_for, Metrics};
use crate::ml::pipeline::Pipeline;
use crate::models::{frame, FeatureMeta};

/// One split with its label column separated.
#[derive(Debug, Clone)]
pub struct Split {
    pub features: RecordBatch,
    pub labels: Vec<u8>,
}

impl Split {
    /// Reads a split CSV and pops the label column.
    pub fn load(path: &Path, label: &str) -> Result<Self> {
        let mut features = frame::read_csv(path)?;
        let labels = frame::labels(&features, label).map_err(|e| match e {
            ReadmitError::InvalidData(reason) => {
                ReadmitError::InvalidData(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        frame::pop_column(&mut features, label)?;
        Ok(Self { features, labels })
    }
}

/// Output from training.
#[derive(Debug)]
pub struct TrainingOutput {
    pub pipeline: Pipeline,
    pub val_metrics: Metrics,
    pub test_metrics: Metrics,
    pub report: String,
}

/// Runs the train command.
///
/// # Errors
///
/// Returns an error if the splits cannot be read or the classifier cannot be fitted.
#[instrument(skip(config))]
pub fn run(config: &Config) -> Result<TrainingOutput> {
    let features_dir = config.paths.features_dir();
    let ml_dir = config.paths.ml_dir();
    std::fs::create_dir_all(&ml_dir).map_err(|e| ReadmitError::io(&ml_dir, e))?;

    let meta = FeatureMeta::load(&features_dir.join("meta.json"))?;
    let train = Split::load(&features_dir.join("train.csv"), &meta.label)?;
    let val = Split::load(&features_dir.join("val.csv"), &meta.label)?;
    let test = Split::load(&features_dir.join("test.csv"), &meta.label)?;

    let output = fit_and_evaluate(&meta, &train, &val, &test, config)?;

    output.pipeline.save(&config.paths.model_path())?;
    write_json(&ml_dir.join("val_metrics.json"), &output.val_metrics)?;
    write_json(&ml_dir.join("test_metrics.json"), &output.test_metrics)?;
    let report_path = ml_dir.join("classification_report.txt");
    std::fs::write(&report_path, &output.report).map_err(|e| ReadmitError::io(&report_path, e))?;

    info!(
        model = %config.paths.model_path().display(),
        val_auc = ?output.val_metrics.auc_roc,
        test_auc = ?output.test_metrics.auc_roc,
        "Saved artifacts"
    );
    Ok(output)
}

/// Fits on `train` and scores `val` and `test`; nothing is written to disk.
pub fn fit_and_evaluate(
    meta: &FeatureMeta,
    train: &Split,
    val: &Split,
    test: &Split,
    config: &Config,
) -> Result<TrainingOutput> {
    let present = |names: &[String]| -> Vec<String> {
        names
            .iter()
            .filter(|name| frame::has_column(&train.features, name))
            .cloned()
            .collect()
    };
    let categoricals = present(&meta.categoricals);
    let numericals = present(&meta.numericals);
    info!(
        rows = train.labels.len(),
        numericals = numericals.len(),
        categoricals = categoricals.len(),
        "Fitting pipeline"
    );

    let pipeline = Pipeline::fit(
        &train.features,
        &train.labels,
        &meta.label,
        &numericals,
        &categoricals,
        &config.train,
    )?;

    let val_prob = pipeline.predict_proba(&val.features)?;
    let test_prob = pipeline.predict_proba(&test.features)?;
    let val_metrics = Metrics::evaluate(&val.labels, &val_prob);
    let test_metrics = Metrics::evaluate(&test.labels, &test_prob);

    let test_pred: Vec<u8> = test_prob.iter().map(|&p| label_for(p)).collect();
    let report = classification_report(&test.labels, &test_pred).to_string();

    info!(?val_metrics, "Val");
    info!(?test_metrics, "Test");

    Ok(TrainingOutput {
        pipeline,
        val_metrics,
        test_metrics,
        report,
    })
}

fn write_json(path: &Path, metrics: &Metrics) -> Result<()> {
    let json = serde_json::to_string_pretty(metrics)?;
    std::fs::write(path, json).map_err(|e| ReadmitError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_load_separates_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "sex,age,readmit_30d\nF,70,1\nM,,0\n").unwrap();

        let split = Split::load(&path, "readmit_30d").unwrap();
        assert_eq!(split.labels, vec![1, 0]);
        assert_eq!(frame::column_names(&split.features), ["sex", "age"]);
        assert_eq!(
            frame::numeric_column(&split.features, "age").unwrap(),
            Some(vec![Some(70.0), None])
        );
    }

    #[test]
    fn bad_labels_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("val.csv");
        std::fs::write(&path, "sex,age,readmit_30d\nF,70,2\n").unwrap();

        let err = Split::load(&path, "readmit_30d").unwrap_err().to_string();
        assert!(err.contains("val.csv"), "{err}");
        assert!(err.contains("row 1"), "{err}");
    }
}
