//! Binary classification metrics at a fixed 0.5 threshold.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Probability at or above which a row is labeled positive.
pub const THRESHOLD: f64 = 0.5;

pub fn label_for(probability: f64) -> u8 {
    u8::from(probability >= THRESHOLD)
}

/// Metrics for one evaluation split.
///
/// `auc_roc` and `avg_precision` are `None` when the split holds a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub auc_roc: Option<f64>,
    pub avg_precision: Option<f64>,
    pub f1: f64,
    pub accuracy: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[u64; 2]; 2],
}

impl Metrics {
    pub fn evaluate(y_true: &[u8], prob: &[f64]) -> Self {
        let pred: Vec<u8> = prob.iter().map(|&p| label_for(p)).collect();
        let confusion_matrix = confusion_matrix(y_true, &pred);
        let [[tn, fp], [fn_, tp]] = confusion_matrix;
        let total = (tn + fp + fn_ + tp).max(1) as f64;

        Self {
            auc_roc: roc_auc(y_true, prob),
            avg_precision: average_precision(y_true, prob),
            f1: f1(tp, fp, fn_),
            accuracy: (tn + tp) as f64 / total,
            confusion_matrix,
        }
    }
}

pub fn confusion_matrix(y_true: &[u8], y_pred: &[u8]) -> [[u64; 2]; 2] {
    let mut matrix = [[0u64; 2]; 2];
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        matrix[usize::from(truth.min(1))][usize::from(pred.min(1))] += 1;
    }
    matrix
}

fn f1(tp: u64, fp: u64, fn_: u64) -> f64 {
    let denominator = 2 * tp + fp + fn_;
    if denominator == 0 {
        0.0
    } else {
        (2 * tp) as f64 / denominator as f64
    }
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
pub fn roc_auc(y_true: &[u8], prob: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..prob.len()).collect();
    order.sort_by(|&a, &b| prob[a].total_cmp(&prob[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && prob[order[end + 1]] == prob[order[start]] {
            end += 1;
        }
        // ranks are 1-based; tied block shares the mean rank
        let mean_rank = (start + end) as f64 / 2.0 + 1.0;
        rank_sum += order[start..=end]
            .iter()
            .filter(|&&i| y_true[i] == 1)
            .count() as f64
            * mean_rank;
        start = end + 1;
    }

    let (p, n) = (positives as f64, negatives as f64);
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Average precision: `sum((R_n - R_{n-1}) * P_n)` over descending score thresholds.
pub fn average_precision(y_true: &[u8], prob: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    if positives == 0 || positives == y_true.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..prob.len()).collect();
    order.sort_by(|&a, &b| prob[b].total_cmp(&prob[a]));

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut last_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let score = prob[order[i]];
        while i < order.len() && prob[order[i]] == score {
            if y_true[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - last_recall) * precision;
        last_recall = recall;
    }
    Some(ap)
}

/// Precision, recall, F1 and support for one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

impl ClassScores {
    fn new(hit: u64, false_pos: u64, miss: u64) -> Self {
        Self {
            precision: ratio(hit, hit + false_pos),
            recall: ratio(hit, hit + miss),
            f1: f1(hit, false_pos, miss),
            support: hit + miss,
        }
    }
}

/// Per-class scores rendered as a plain-text table.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Indexed by class label.
    pub classes: [ClassScores; 2],
    pub accuracy: f64,
    pub total: u64,
}

pub fn classification_report(y_true: &[u8], y_pred: &[u8]) -> ClassificationReport {
    let [[tn, fp], [fn_, tp]] = confusion_matrix(y_true, y_pred);
    let total = tn + fp + fn_ + tp;
    ClassificationReport {
        classes: [ClassScores::new(tn, fn_, fp), ClassScores::new(tp, fp, fn_)],
        accuracy: ratio(tn + tp, total),
        total,
    }
}

impl ClassificationReport {
    fn macro_avg(&self, pick: fn(&ClassScores) -> f64) -> f64 {
        self.classes.iter().map(pick).sum::<f64>() / self.classes.len() as f64
    }

    fn weighted_avg(&self, pick: fn(&ClassScores) -> f64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.classes
            .iter()
            .map(|c| pick(c) * c.support as f64)
            .sum::<f64>()
            / self.total as f64
    }

    fn write_average(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        average: fn(&Self, fn(&ClassScores) -> f64) -> f64,
    ) -> fmt::Result {
        writeln!(
            f,
            "{name:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            average(self, |c| c.precision),
            average(self, |c| c.recall),
            average(self, |c| c.f1),
            self.total
        )
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (label, c) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{label:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        self.write_average(f, "macro avg", Self::macro_avg)?;
        self.write_average(f, "weighted avg", Self::weighted_avg)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
