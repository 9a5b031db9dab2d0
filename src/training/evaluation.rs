//! Held-out evaluation: ROC AUC and a per-class classification report

use crate::types::explanation::FRAUD_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Area under the ROC curve via the rank-sum statistic, averaging the ranks
/// of tied scores.
///
/// Returns 0.5 when only one class is present.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> f64 {
    let n = y_true.len().min(scores.len());
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let n_pos = y_true[..n].iter().filter(|&&y| y == 1).count() as f64;
    let n_neg = n as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return 0.5;
    }

    let pos_rank_sum: f64 = (0..n).filter(|&i| y_true[i] == 1).map(|i| ranks[i]).sum();
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Precision, recall and F1 per class at the fraud threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    #[serde(rename = "0")]
    pub legit: ClassMetrics,
    #[serde(rename = "1")]
    pub fraud: ClassMetrics,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn class_metrics(y_true: &[u8], y_pred: &[u8], class: u8) -> ClassMetrics {
    let tp = y_true
        .iter()
        .zip(y_pred)
        .filter(|&(&t, &p)| t == class && p == class)
        .count();
    let predicted = y_pred.iter().filter(|&&p| p == class).count();
    let support = y_true.iter().filter(|&&t| t == class).count();

    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassMetrics {
        precision,
        recall,
        f1_score,
        support,
    }
}

impl ClassificationReport {
    /// Report for fraud probabilities thresholded at [`FRAUD_THRESHOLD`].
    pub fn from_scores(y_true: &[u8], scores: &[f64]) -> Self {
        let y_pred: Vec<u8> = scores.iter().map(|&s| u8::from(s >= FRAUD_THRESHOLD)).collect();
        Self::from_labels(y_true, &y_pred)
    }

    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let legit = class_metrics(y_true, y_pred, 0);
        let fraud = class_metrics(y_true, y_pred, 1);
        let total = legit.support + fraud.support;

        let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();

        let macro_avg = ClassMetrics {
            precision: (legit.precision + fraud.precision) / 2.0,
            recall: (legit.recall + fraud.recall) / 2.0,
            f1_score: (legit.f1_score + fraud.f1_score) / 2.0,
            support: total,
        };
        let weigh = |a: f64, b: f64| {
            if total == 0 {
                0.0
            } else {
                (a * legit.support as f64 + b * fraud.support as f64) / total as f64
            }
        };
        let weighted_avg = ClassMetrics {
            precision: weigh(legit.precision, fraud.precision),
            recall: weigh(legit.recall, fraud.recall),
            f1_score: weigh(legit.f1_score, fraud.f1_score),
            support: total,
        };

        Self {
            accuracy: ratio(correct, total),
            legit,
            fraud,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for (name, m) in [("0", &self.legit), ("1", &self.fraud)] {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), 1.0);
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), 0.0);
    }

    #[test]
    fn test_auc_ties_count_half() {
        assert_eq!(roc_auc(&[0, 1], &[0.5, 0.5]), 0.5);
        // one of four pairs tied, the others ordered correctly
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.6, 0.6, 0.9]);
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class() {
        assert_eq!(roc_auc(&[1, 1, 1], &[0.2, 0.4, 0.9]), 0.5);
    }

    #[test]
    fn test_classification_report() {
        let y_true = [0, 0, 0, 1, 1];
        let scores = [0.1, 0.2, 0.7, 0.9, 0.3];
        let report = ClassificationReport::from_scores(&y_true, &scores);

        assert_eq!(report.legit.support, 3);
        assert_eq!(report.fraud.support, 2);
        assert!((report.fraud.precision - 0.5).abs() < 1e-12);
        assert!((report.fraud.recall - 0.5).abs() < 1e-12);
        assert!((report.legit.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.accuracy - 0.6).abs() < 1e-12);
        assert!(report.to_string().contains("weighted avg"));
    }

    #[test]
    fn test_report_serializes_with_class_keys() {
        let report = ClassificationReport::from_labels(&[0, 1], &[0, 1]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["1"]["recall"], 1.0);
        assert_eq!(json["macro avg"]["support"], 2);
    }
}
