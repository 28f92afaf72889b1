//! Column preprocessing fitted on the training split.
//!
//! Numeric columns are median-imputed and standardized; categorical columns
//! are mode-imputed and one-hot encoded. Categories unseen at fit time encode
//! as all zeros.

use std::collections::BTreeMap;

use arrow::record_batch::RecordBatch;
use linfa::traits::{Fit, Transformer};
use linfa::DatasetBase;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{concatenate, Array1, Array2, Axis, Zip};
use ndarray_stats::interpolate::Midpoint;
use ndarray_stats::QuantileExt;
use noisy_float::types::n64;
use serde::{Deserialize, Serialize};

use crate::error::{ReadmitError, Result};
use crate::models::frame;

/// Fallback level for a categorical column that had no values at fit time.
const MISSING_LEVEL: &str = "missing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub fill: String,
    pub levels: Vec<String>,
}

impl CategoricalColumn {
    fn fit(name: &str, cells: &[Option<String>]) -> Self {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for cell in cells.iter().flatten() {
            *counts.entry(cell.as_str()).or_default() += 1;
        }
        // BTreeMap iterates in order, so ties resolve to the smallest level.
        let fill = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, (&level, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((level, count)),
            })
            .map_or_else(|| MISSING_LEVEL.to_string(), |(level, _)| level.to_string());

        let mut levels: Vec<String> = counts.keys().map(|s| s.to_string()).collect();
        if !levels.contains(&fill) {
            levels.push(fill.clone());
            levels.sort();
        }

        Self {
            name: name.to_string(),
            fill,
            levels,
        }
    }

    /// Position of the cell's level, after filling nulls with the mode.
    fn level_of(&self, cell: Option<&str>) -> Option<usize> {
        let value = cell.unwrap_or(&self.fill);
        self.levels.iter().position(|level| level == value)
    }
}

/// Fitted transformer that turns a record batch into a dense design matrix.
#[derive(Debug, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric: Vec<String>,
    pub medians: Array1<f64>,
    pub scaler: LinearScaler<f64>,
    pub categorical: Vec<CategoricalColumn>,
}

impl Preprocessor {
    pub fn fit(batch: &RecordBatch, numericals: &[String], categoricals: &[String]) -> Result<Self> {
        let raw = numeric_block(batch, numericals)?;
        let medians = raw
            .clone()
            .quantile_axis_skipnan_mut(Axis(0), n64(0.5), &Midpoint)
            .map_err(|e| ReadmitError::Training(format!("median imputation: {e}")))?
            .mapv(|m| if m.is_nan() { 0.0 } else { m });

        let imputed = impute(raw, &medians);
        let scaler = LinearScaler::standard()
            .fit(&DatasetBase::from(imputed))
            .map_err(|e| ReadmitError::Training(format!("scaling: {e}")))?;

        let mut categorical = Vec::with_capacity(categoricals.len());
        for name in categoricals {
            let cells = frame::text_column(batch, name)?.unwrap_or_default();
            categorical.push(CategoricalColumn::fit(name, &cells));
        }

        Ok(Self {
            numeric: numericals.to_vec(),
            medians,
            scaler,
            categorical,
        })
    }

    /// Width of each transformed row.
    pub fn n_features(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.levels.len()).sum::<usize>()
    }

    /// Output feature names: numeric names, then `<column>__<level>` per one-hot level.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.numeric.clone();
        for column in &self.categorical {
            names.extend(
                column
                    .levels
                    .iter()
                    .map(|level| format!("{}__{}", column.name, level)),
            );
        }
        names
    }

    /// Transforms every row. Columns missing from `batch` are treated as all-null.
    pub fn transform(&self, batch: &RecordBatch) -> Result<Array2<f64>> {
        let numeric = self
            .scaler
            .transform(impute(numeric_block(batch, &self.numeric)?, &self.medians));
        let onehot = self.one_hot(batch)?;
        concatenate(Axis(1), &[numeric.view(), onehot.view()])
            .map_err(|e| ReadmitError::InvalidData(format!("design matrix: {e}")))
    }

    fn one_hot(&self, batch: &RecordBatch) -> Result<Array2<f64>> {
        let width = self.n_features() - self.numeric.len();
        let mut out = Array2::zeros((batch.num_rows(), width));
        let mut offset = 0;
        for column in &self.categorical {
            let cells = frame::text_column(batch, &column.name)?
                .unwrap_or_else(|| vec![None; batch.num_rows()]);
            for (row, cell) in cells.iter().enumerate() {
                if let Some(level) = column.level_of(cell.as_deref()) {
                    out[[row, offset + level]] = 1.0;
                }
            }
            offset += column.levels.len();
        }
        Ok(out)
    }
}

/// Numeric columns as a matrix, with NaN marking missing cells.
fn numeric_block(batch: &RecordBatch, names: &[String]) -> Result<Array2<f64>> {
    let mut block = Array2::from_elem((batch.num_rows(), names.len()), f64::NAN);
    for (mut column, name) in block.columns_mut().into_iter().zip(names) {
        if let Some(cells) = frame::numeric_column(batch, name)? {
            for (out, cell) in column.iter_mut().zip(cells) {
                *out = cell.unwrap_or(f64::NAN);
            }
        }
    }
    Ok(block)
}

fn impute(mut block: Array2<f64>, medians: &Array1<f64>) -> Array2<f64> {
    Zip::from(block.columns_mut())
        .and(medians)
        .for_each(|mut column, &median| column.mapv_inplace(|v| if v.is_nan() { median } else { v }));
    block
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, StringArray};

    use super::*;

    fn batch() -> RecordBatch {
        RecordBatch::try_from_iter([
            (
                "age",
                Arc::new(Float64Array::from(vec![60.0, 70.0, 80.0, 90.0])) as ArrayRef,
            ),
            (
                "avg_glucose",
                Arc::new(Float64Array::from(vec![
                    Some(100.0),
                    None,
                    Some(140.0),
                    Some(200.0),
                ])) as ArrayRef,
            ),
            (
                "sex",
                Arc::new(StringArray::from(vec![Some("F"), Some("M"), None, Some("F")])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    fn fitted() -> Preprocessor {
        Preprocessor::fit(
            &batch(),
            &["age".into(), "avg_glucose".into()],
            &["sex".into()],
        )
        .unwrap()
    }

    #[test]
    fn numeric_columns_impute_then_standardize() {
        let pre = fitted();
        assert_eq!(pre.medians[1], 140.0);

        let design = pre.transform(&batch()).unwrap();
        // imputed glucose: 100, 140, 140, 200
        let glucose = design.column(1);
        assert!(glucose.mean().unwrap().abs() < 1e-12);
        assert!((0.8..1.2).contains(&glucose.std(0.0)));
        assert_eq!(design[[1, 1]], design[[2, 1]]);
    }

    #[test]
    fn even_counts_take_the_midpoint_median() {
        let pre = Preprocessor::fit(&batch(), &["age".into()], &[]).unwrap();
        assert_eq!(pre.medians[0], 75.0);
    }

    #[test]
    fn categorical_mode_and_unknown_levels() {
        let pre = fitted();
        let sex = &pre.categorical[0];
        assert_eq!(sex.fill, "F");
        assert_eq!(sex.levels, vec!["F".to_string(), "M".to_string()]);
        assert_eq!(pre.n_features(), 4);
        assert_eq!(
            pre.feature_names(),
            vec!["age", "avg_glucose", "sex__F", "sex__M"]
        );

        let design = pre.transform(&batch()).unwrap();
        assert_eq!(design.row(2).to_vec()[2..], [1.0, 0.0]);

        let unseen = RecordBatch::try_from_iter([(
            "sex",
            Arc::new(StringArray::from(vec!["X"])) as ArrayRef,
        )])
        .unwrap();
        let encoded = pre.transform(&unseen).unwrap();
        assert_eq!(encoded.row(0).to_vec()[2..], [0.0, 0.0]);
    }

    #[test]
    fn constant_column_transforms_to_zero() {
        let constant = RecordBatch::try_from_iter([(
            "flag",
            Arc::new(Float64Array::from(vec![5.0, 5.0, 5.0])) as ArrayRef,
        )])
        .unwrap();
        let pre = Preprocessor::fit(&constant, &["flag".into()], &[]).unwrap();
        let design = pre.transform(&constant).unwrap();
        assert!(design.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn absent_columns_are_imputed() {
        let pre = fitted();
        let other = RecordBatch::try_from_iter([(
            "favourite_colour",
            Arc::new(StringArray::from(vec!["teal"])) as ArrayRef,
        )])
        .unwrap();
        let design = pre.transform(&other).unwrap();
        assert_eq!(design.dim(), (1, 4));
        assert_eq!(design.row(0).to_vec()[2..], [1.0, 0.0]);
        assert!(design.iter().all(|v| v.is_finite()));
    }
}
