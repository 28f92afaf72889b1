//! L2-regularized logistic regression fitted with `linfa-logistic`.
//!
//! Class balancing gives both classes the same total weight. The solver has no
//! sample weights, so the minority class is replicated instead, and the
//! penalty is rescaled to keep its strength relative to the data term.

use linfa::traits::Fit;
use linfa::Dataset;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use crate::config::TrainConfig;
use crate::error::{ReadmitError, Result};

/// Fitted binary model; `true` is the positive (readmitted) class.
pub type Classifier = FittedLogisticRegression<f64, bool>;

/// Copies of each row per class, indexed by label, and the weight of one copy.
///
/// Balanced class weights are `n / (2 * n_class)`. Each class gets that weight
/// divided by the majority weight, rounded to a whole number of copies.
pub fn replication(y: &[u8], balanced: bool) -> Result<([usize; 2], f64)> {
    let positives = y.iter().filter(|&&label| label == 1).count();
    let negatives = y.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ReadmitError::Training(
            "training labels must contain both classes".into(),
        ));
    }
    if !balanced {
        return Ok(([1, 1], 1.0));
    }
    let majority = positives.max(negatives) as f64;
    let copies = |count: usize| ((majority / count as f64).round() as usize).max(1);
    let unit_weight = y.len() as f64 / (2.0 * majority);
    Ok(([copies(negatives), copies(positives)], unit_weight))
}

pub fn fit(x: &Array2<f64>, y: &[u8], config: &TrainConfig) -> Result<Classifier> {
    if x.nrows() != y.len() {
        return Err(ReadmitError::Training(format!(
            "{} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    let (copies, unit_weight) = replication(y, config.balanced)?;
    let rows: Vec<usize> = y
        .iter()
        .enumerate()
        .flat_map(|(row, &label)| std::iter::repeat(row).take(copies[usize::from(label == 1)]))
        .collect();
    let targets: Array1<bool> = rows.iter().map(|&row| y[row] == 1).collect();
    let dataset = Dataset::new(x.select(Axis(0), &rows), targets);

    // the objective is sum(loss) + alpha / 2 * |w|^2, so C maps to 1 / (C * unit weight)
    let alpha = 1.0 / (config.c * unit_weight);
    debug!(rows = rows.len(), ?copies, alpha, "fitting logistic regression");

    LogisticRegression::default()
        .alpha(alpha)
        .max_iterations(config.max_iter)
        .gradient_tolerance(config.tolerance)
        .with_intercept(true)
        .fit(&dataset)
        .map_err(|e| ReadmitError::Training(e.to_string()))
}
