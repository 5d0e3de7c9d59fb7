// ============================================================
// Layer 5 — Metric Engine
// ============================================================
// Scores one evaluation pass. Pure functions over host data:
// no Burn types, no I/O, no hidden state.
//
//   micro F1 (no_relation excluded)  — primary leaderboard metric
//   AUPRC (macro, all classes)       — ranking quality per class
//   accuracy                         — diagnostic only
//
// Micro F1 pools counts over every class except no_relation:
//
//   tp          = #{ pred == label, label != no_relation }
//   pred_pos    = #{ pred  != no_relation }
//   actual_pos  = #{ label != no_relation }
//   F1          = 2·tp / (pred_pos + actual_pos)
//
// So predicting "no relation" correctly earns nothing, and
// predicting a relation where there is none is a false positive.
//
// AUPRC treats each class as its own one-vs-rest problem:
// sweep the threshold down through the distinct scores of that
// class's column, record (recall, precision) after each score
// group, close the curve at (recall 0, precision 1), and take the
// trapezoidal area. Scores are the raw logits, the same values
// the Hugging Face trainer hands to its metric callback; softmax
// probabilities can rank a column differently.
//
// Degenerate inputs (no positives at all, a class absent from
// the validation set) yield 0.0 with a warning rather than an
// error, so one bad evaluation never stops training.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::MetricError;

pub const MICRO_F1: &str = "micro f1 score";
pub const AUPRC: &str    = "auprc";
pub const ACCURACY: &str = "accuracy";

/// The three numbers reported for every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Percentage, 0..=100
    pub micro_f1: f64,
    /// Percentage, 0..=100
    pub auprc:    f64,
    /// Fraction, 0..=1
    pub accuracy: f64,
}

/// The metric that decides which checkpoint is "best".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMetric {
    MicroF1,
    Auprc,
    Accuracy,
    Loss,
}

impl FromStr for SelectionMetric {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("eval_").unwrap_or(s) {
            MICRO_F1 => Ok(Self::MicroF1),
            AUPRC    => Ok(Self::Auprc),
            ACCURACY => Ok(Self::Accuracy),
            "loss"   => Ok(Self::Loss),
            _        => Err(MetricError::UnknownMetric(s.to_string())),
        }
    }
}

impl SelectionMetric {
    /// Losses improve downwards, everything else upwards.
    pub fn greater_is_better(&self) -> bool {
        !matches!(self, SelectionMetric::Loss)
    }

    pub fn value(&self, metrics: &EvalMetrics, eval_loss: f64) -> f64 {
        match self {
            SelectionMetric::MicroF1  => metrics.micro_f1,
            SelectionMetric::Auprc    => metrics.auprc,
            SelectionMetric::Accuracy => metrics.accuracy,
            SelectionMetric::Loss     => eval_loss,
        }
    }

    /// True if `candidate` beats `best` (or there is no best yet).
    pub fn improves(&self, candidate: f64, best: Option<f64>) -> bool {
        match best {
            None => true,
            Some(best) if self.greater_is_better() => candidate > best,
            Some(best) => candidate < best,
        }
    }
}

fn check_lengths(predictions: usize, labels: usize) -> Result<(), MetricError> {
    if predictions != labels {
        return Err(MetricError::LengthMismatch { predictions, labels });
    }
    Ok(())
}

/// Micro-averaged F1 over every class except `excluded`, as a percentage.
pub fn micro_f1_excluding(
    predictions: &[usize],
    labels:      &[usize],
    excluded:    usize,
) -> Result<f64, MetricError> {
    check_lengths(predictions.len(), labels.len())?;

    let mut tp         = 0usize;
    let mut pred_pos   = 0usize;
    let mut actual_pos = 0usize;
    for (&p, &l) in predictions.iter().zip(labels) {
        if p != excluded {
            pred_pos += 1;
        }
        if l != excluded {
            actual_pos += 1;
            if p == l {
                tp += 1;
            }
        }
    }

    let denom = pred_pos + actual_pos;
    if denom == 0 {
        tracing::warn!("micro F1 is ill-defined: no relation predicted or present; reporting 0");
        return Ok(0.0);
    }
    Ok(2.0 * tp as f64 / denom as f64 * 100.0)
}

/// Fraction of exact matches, over all classes.
pub fn accuracy(predictions: &[usize], labels: &[usize]) -> Result<f64, MetricError> {
    check_lengths(predictions.len(), labels.len())?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Row count of a flat `[rows × num_classes]` score matrix.
fn rows_of(scores: &[f32], num_classes: usize) -> Result<usize, MetricError> {
    if num_classes == 0 || scores.len() % num_classes != 0 {
        return Err(MetricError::RaggedScores { len: scores.len(), num_classes });
    }
    Ok(scores.len() / num_classes)
}

/// Arg-max per row of a flat score matrix; the first maximum wins.
pub fn argmax_rows(scores: &[f32], num_classes: usize) -> Result<Vec<usize>, MetricError> {
    rows_of(scores, num_classes)?;
    Ok(scores
        .chunks(num_classes)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv { (i, v) } else { (bi, bv) }
                })
                .0
        })
        .collect())
}

/// Area under the one-vs-rest precision-recall curve of one class.
/// `None` when the class has no positive example.
fn pr_curve_area(scores: &[f64], positive: &[bool]) -> Option<f64> {
    let n_pos = positive.iter().filter(|&&p| p).count();
    if n_pos == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    // Curve starts at (recall 0, precision 1)
    let (mut prev_recall, mut prev_precision) = (0.0f64, 1.0f64);
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut area = 0.0;

    for (k, &i) in order.iter().enumerate() {
        if positive[i] { tp += 1 } else { fp += 1 }

        // Emit a point only at the end of a group of tied scores
        let group_ends = order
            .get(k + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if !group_ends {
            continue;
        }

        let recall    = tp as f64 / n_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        area += (recall - prev_recall) * (precision + prev_precision) / 2.0;
        prev_recall    = recall;
        prev_precision = precision;
    }
    Some(area)
}

/// Macro-averaged area under the precision-recall curve over
/// `num_classes` classes (no_relation included), as a percentage.
pub fn auprc(scores: &[f32], labels: &[usize], num_classes: usize) -> Result<f64, MetricError> {
    let rows = rows_of(scores, num_classes)?;
    check_lengths(rows, labels.len())?;

    let mut total = 0.0;
    for c in 0..num_classes {
        let column: Vec<f64>    = scores.chunks(num_classes).map(|row| row[c] as f64).collect();
        let positive: Vec<bool> = labels.iter().map(|&l| l == c).collect();
        match pr_curve_area(&column, &positive) {
            Some(area) => total += area,
            None => tracing::warn!("class {} has no positive example; its AUPRC counts as 0", c),
        }
    }
    Ok(total / num_classes as f64 * 100.0)
}

/// Score one evaluation pass from raw per-class scores.
pub fn compute_metrics(
    scores:      &[f32],
    labels:      &[usize],
    num_classes: usize,
    no_relation: usize,
) -> Result<EvalMetrics, MetricError> {
    let predictions = argmax_rows(scores, num_classes)?;
    Ok(EvalMetrics {
        micro_f1: micro_f1_excluding(&predictions, labels, no_relation)?,
        auprc:    auprc(scores, labels, num_classes)?,
        accuracy: accuracy(&predictions, labels)?,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_perfect_predictor_scores_100() {
        let labels = vec![0, 3, 7, 3, 29];
        assert!(close(micro_f1_excluding(&labels, &labels, 0).unwrap(), 100.0));
    }

    #[test]
    fn test_always_no_relation_scores_0() {
        let labels = vec![0, 3, 7, 0];
        let preds  = vec![0; 4];
        assert!(close(micro_f1_excluding(&preds, &labels, 0).unwrap(), 0.0));
    }

    #[test]
    fn test_false_positive_on_no_relation_example() {
        // labels [0,0,1], preds [0,1,1]: tp 1, predicted positives 2, actual positives 1
        let f1 = micro_f1_excluding(&[0, 1, 1], &[0, 0, 1], 0).unwrap();
        assert!(close(f1, 200.0 / 3.0));
    }

    #[test]
    fn test_all_no_relation_is_zero_not_nan() {
        let f1 = micro_f1_excluding(&[0, 0], &[0, 0], 0).unwrap();
        assert_eq!(f1, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            micro_f1_excluding(&[0, 1], &[0], 0),
            Err(MetricError::LengthMismatch { predictions: 2, labels: 1 })
        ));
    }

    #[test]
    fn test_accuracy_counts_every_class() {
        let acc = accuracy(&[0, 1, 2, 0], &[0, 1, 1, 1]).unwrap();
        assert!(close(acc, 0.5));
        assert_eq!(accuracy(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_auprc_perfect_separation() {
        let scores = vec![
            0.9, 0.05, 0.05,
            0.1, 0.8,  0.1,
            0.2, 0.1,  0.7,
        ];
        let value = auprc(&scores, &[0, 1, 2], 3).unwrap();
        assert!(close(value, 100.0));
    }

    #[test]
    fn test_auprc_invariant_to_monotonic_rescaling() {
        let scores: Vec<f32> = vec![
            0.6, 0.3, 0.1,
            0.2, 0.5, 0.3,
            0.4, 0.4, 0.2,
            0.1, 0.2, 0.7,
            0.3, 0.3, 0.4,
        ];
        let labels = vec![0, 1, 1, 2, 0];
        let rescaled: Vec<f32> = scores.iter().map(|s| s * 10.0 + 3.0).collect();

        let a = auprc(&scores, &labels, 3).unwrap();
        let b = auprc(&rescaled, &labels, 3).unwrap();
        assert!(close(a, b));
        assert!(a > 0.0 && a < 100.0);
    }

    #[test]
    fn test_pr_curve_area_known_value() {
        // Sorted: +, -, +  → points (0.5, 1), (0.5, 0.5), (1, 2/3)
        // Area: 0.5·(1+1)/2 + 0 + 0.5·(0.5+2/3)/2 = 0.5 + 0.291666...
        let area = pr_curve_area(&[0.9, 0.8, 0.7], &[true, false, true]).unwrap();
        assert!(close(area, 0.5 + 0.5 * (0.5 + 2.0 / 3.0) / 2.0));
    }

    #[test]
    fn test_tied_scores_form_one_point() {
        // All tied: a single point (1, 0.5) → area 0.5·(1+0.5)... over recall 0→1
        let area = pr_curve_area(&[0.5, 0.5], &[true, false]).unwrap();
        assert!(close(area, 0.75));
    }

    #[test]
    fn test_absent_class_counts_as_zero() {
        // Class 2 never appears as a label
        let scores = vec![0.9, 0.1, 0.0, 0.2, 0.8, 0.0];
        let value  = auprc(&scores, &[0, 1], 3).unwrap();
        assert!(close(value, 200.0 / 3.0));
    }

    #[test]
    fn test_ragged_scores_rejected() {
        assert!(matches!(
            auprc(&[0.1, 0.2, 0.3], &[0], 2),
            Err(MetricError::RaggedScores { .. })
        ));
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        assert_eq!(argmax_rows(&[0.2, 0.5, 0.5, 1.0, 0.0, 0.0], 3).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_compute_metrics_and_lookup() {
        let scores = vec![
            0.9, 0.05, 0.05,
            0.1, 0.8,  0.1,
            0.2, 0.1,  0.7,
        ];
        let m = compute_metrics(&scores, &[0, 1, 2], 3, 0).unwrap();
        assert!(close(m.micro_f1, 100.0));
        assert!(close(m.accuracy, 1.0));
        assert_eq!(SelectionMetric::Auprc.value(&m, 0.5), m.auprc);
        assert_eq!(SelectionMetric::Loss.value(&m, 0.5), 0.5);
    }

    #[test]
    fn test_selection_metric_parsing() {
        assert_eq!("eval_micro f1 score".parse::<SelectionMetric>().unwrap(), SelectionMetric::MicroF1);
        assert_eq!("eval_loss".parse::<SelectionMetric>().unwrap(), SelectionMetric::Loss);
        assert!("eval_bleu".parse::<SelectionMetric>().is_err());

        assert!(SelectionMetric::MicroF1.improves(71.0, Some(70.0)));
        assert!(!SelectionMetric::Loss.improves(0.9, Some(0.8)));
        assert!(SelectionMetric::Loss.improves(0.9, None));
    }
}
