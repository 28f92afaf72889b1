//! The fitted preprocessing + classifier pipeline and its on-disk artifact.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::TrainConfig;
use crate::error::{ReadmitError, Result};
use crate::ml::classifier::{self, Classifier};
use crate::ml::preprocess::Preprocessor;
use crate::models::PredictRequest;

/// Bumped whenever the serialized layout changes.
pub const ARTIFACT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
pub struct Pipeline {
    pub version: u32,
    pub label: String,
    pub trained_at: DateTime<Utc>,
    pub preprocessor: Preprocessor,
    pub classifier: Classifier,
}

impl Pipeline {
    /// Fits preprocessing and the classifier on the training split.
    pub fn fit(
        x: &RecordBatch,
        y: &[u8],
        label: &str,
        numericals: &[String],
        categoricals: &[String],
        config: &TrainConfig,
    ) -> Result<Self> {
        if x.num_rows() != y.len() {
            return Err(ReadmitError::Training(format!(
                "{} feature rows but {} labels",
                x.num_rows(),
                y.len()
            )));
        }
        let preprocessor = Preprocessor::fit(x, numericals, categoricals)?;
        if preprocessor.n_features() == 0 {
            return Err(ReadmitError::Training("no feature columns to fit on".into()));
        }
        let design = preprocessor.transform(x)?;
        let classifier = classifier::fit(&design, y, config)?;

        Ok(Self {
            version: ARTIFACT_VERSION,
            label: label.to_string(),
            trained_at: Utc::now(),
            preprocessor,
            classifier,
        })
    }

    /// Positive-class probability for every row of `x`. Extra columns are ignored.
    pub fn predict_proba(&self, x: &RecordBatch) -> Result<Vec<f64>> {
        let design = self.preprocessor.transform(x)?;
        Ok(self.classifier.predict_probabilities(&design).to_vec())
    }

    /// Positive-class probability for one request.
    pub fn predict_request(&self, request: &PredictRequest) -> Result<f64> {
        let batch = request.to_batch()?;
        self.predict_proba(&batch)?
            .first()
            .copied()
            .ok_or_else(|| ReadmitError::InvalidData("request produced no rows".into()))
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.preprocessor.feature_names()
    }

    pub fn coefficients(&self) -> Vec<f64> {
        self.classifier.params().to_vec()
    }

    pub fn intercept(&self) -> f64 {
        self.classifier.intercept()
    }

    #[instrument(skip(self))]
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReadmitError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ReadmitError::io(path, e))?;
        info!(path = %path.display(), "saved model pipeline");
        Ok(())
    }

    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReadmitError::ModelNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ReadmitError::io(path, e))?;
        let pipeline: Pipeline = serde_json::from_str(&raw)?;
        if pipeline.version != ARTIFACT_VERSION {
            return Err(ReadmitError::InvalidData(format!(
                "artifact version {} is not supported (expected {})",
                pipeline.version, ARTIFACT_VERSION
            )));
        }
        if pipeline.classifier.params().len() != pipeline.preprocessor.n_features() {
            return Err(ReadmitError::InvalidData(
                "classifier width does not match preprocessing output".into(),
            ));
        }
        info!(path = %path.display(), features = pipeline.preprocessor.n_features(), "loaded model pipeline");
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, StringArray};

    use super::*;

    fn training_batch() -> (RecordBatch, Vec<u8>) {
        let rows = 0..60_i32;
        let sex: StringArray = rows
            .clone()
            .map(|i| Some(if i % 3 == 0 { "M" } else { "F" }))
            .collect();
        let age: Float64Array = rows.clone().map(|i| Some(30.0 + f64::from(i))).collect();
        let stay: Float64Array = rows
            .clone()
            .map(|i| Some(f64::from(i % 6) + 0.5))
            .collect();
        let glucose: Float64Array = rows
            .clone()
            .map(|i| (i % 5 != 0).then(|| 90.0 + f64::from(i % 11) * 7.0))
            .collect();
        let labels = rows.map(|i| u8::from(i > 35 || i % 9 == 0)).collect();

        let batch = RecordBatch::try_from_iter([
            ("sex", Arc::new(sex) as ArrayRef),
            ("age", Arc::new(age) as ArrayRef),
            ("length_of_stay_days", Arc::new(stay) as ArrayRef),
            ("avg_glucose", Arc::new(glucose) as ArrayRef),
        ])
        .unwrap();
        (batch, labels)
    }

    fn fitted() -> Pipeline {
        let (batch, labels) = training_batch();
        Pipeline::fit(
            &batch,
            &labels,
            "readmit_30d",
            &[
                "age".into(),
                "length_of_stay_days".into(),
                "avg_glucose".into(),
            ],
            &["sex".into()],
            &TrainConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn probabilities_are_bounded() {
        let pipeline = fitted();
        let (batch, _) = training_batch();
        let probs = pipeline.predict_proba(&batch).unwrap();
        assert_eq!(probs.len(), batch.num_rows());
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(pipeline.feature_names().len(), pipeline.coefficients().len());
        assert!(pipeline.intercept().is_finite());
    }

    #[test]
    fn older_ages_score_higher() {
        let pipeline = fitted();
        let age = pipeline
            .feature_names()
            .iter()
            .position(|n| n == "age")
            .unwrap();
        assert!(pipeline.coefficients()[age] > 0.0);
    }

    #[test]
    fn request_prediction_ignores_unused_fields() {
        let pipeline = fitted();
        let request = PredictRequest {
            sex: "F".into(),
            age: 65,
            length_of_stay_days: 3.2,
            avg_hemo: Some(12.5),
            avg_glucose: None,
            avg_creatinine: None,
            avg_wbc: Some(8.0),
            avg_platelets: None,
        };
        let p = pipeline.predict_request(&request).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn single_class_training_fails() {
        let (batch, labels) = training_batch();
        let ones = vec![1; labels.len()];
        let err = Pipeline::fit(
            &batch,
            &ones,
            "readmit_30d",
            &["age".into()],
            &[],
            &TrainConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReadmitError::Training(_)));
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_pipeline.json");
        let err = Pipeline::load(&path).unwrap_err();
        assert!(matches!(err, ReadmitError::ModelNotFound(_)));
        assert!(err.to_string().contains("Train first"));
    }

    #[test]
    fn reloaded_pipeline_predicts_identically() {
        let pipeline = fitted();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts").join("model_pipeline.json");
        pipeline.save(&path).unwrap();

        let reloaded = Pipeline::load(&path).unwrap();
        assert_eq!(reloaded.feature_names(), pipeline.feature_names());
        assert_eq!(reloaded.coefficients(), pipeline.coefficients());

        let (batch, _) = training_batch();
        assert_eq!(
            reloaded.predict_proba(&batch).unwrap(),
            pipeline.predict_proba(&batch).unwrap()
        );
    }
}
