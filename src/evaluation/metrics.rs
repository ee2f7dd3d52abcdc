//! Classification Metrics
//!
//! Accuracy, log loss, confusion matrix, per-class scores and
//! confidence-threshold coverage for 3-class outcome predictions.

use serde::{Deserialize, Serialize};

use crate::models::Outcome;
use crate::predictor::argmax;

/// Confidence levels reported by `threshold_analysis`
pub const DEFAULT_THRESHOLDS: [f64; 4] = [0.50, 0.55, 0.60, 0.65];

/// Clip applied to probabilities before taking logs
const LOG_LOSS_EPS: f64 = 1e-15;

/// One evaluated match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    /// Class index of the actual result
    pub actual: usize,
    pub probabilities: [f64; 3],
}

impl ScoredPrediction {
    pub fn predicted(&self) -> usize {
        argmax(&self.probabilities)
    }

    pub fn confidence(&self) -> f64 {
        self.probabilities[self.predicted()]
    }

    pub fn is_correct(&self) -> bool {
        self.predicted() == self.actual
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub outcome: Outcome,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Accuracy of the predictions at or above a confidence level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdAnalysis {
    pub threshold: f64,
    pub bets: usize,
    /// Share of all predictions that clear the threshold
    pub coverage: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    /// Rows are actual classes, columns predicted classes
    pub confusion: [[usize; 3]; 3],
    pub per_class: Vec<ClassMetrics>,
}

/// Calculate metrics from scored predictions
pub fn calculate_metrics(predictions: &[ScoredPrediction]) -> ClassificationMetrics {
    if predictions.is_empty() {
        return ClassificationMetrics::default();
    }

    let total = predictions.len();
    let correct = predictions.iter().filter(|p| p.is_correct()).count();
    let confusion = confusion_matrix(predictions);

    let per_class = Outcome::ALL
        .iter()
        .map(|&outcome| {
            let k = outcome.index();
            let tp = confusion[k][k];
            let predicted: usize = (0..3).map(|a| confusion[a][k]).sum();
            let support: usize = confusion[k].iter().sum();

            let precision = if predicted > 0 {
                tp as f64 / predicted as f64
            } else {
                0.0
            };
            let recall = if support > 0 {
                tp as f64 / support as f64
            } else {
                0.0
            };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ClassMetrics {
                outcome,
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    ClassificationMetrics {
        total,
        correct,
        accuracy: correct as f64 / total as f64,
        log_loss: log_loss(predictions),
        confusion,
        per_class,
    }
}

pub fn confusion_matrix(predictions: &[ScoredPrediction]) -> [[usize; 3]; 3] {
    let mut matrix = [[0usize; 3]; 3];
    for p in predictions {
        matrix[p.actual][p.predicted()] += 1;
    }
    matrix
}

/// Mean negative log-likelihood of the actual class
pub fn log_loss(predictions: &[ScoredPrediction]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let total: f64 = predictions
        .iter()
        .map(|p| {
            let prob = p.probabilities[p.actual].clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            -prob.ln()
        })
        .sum();
    total / predictions.len() as f64
}

/// Coverage and accuracy of predictions whose confidence reaches each threshold
///
/// Thresholds that no prediction reaches are omitted.
pub fn threshold_analysis(
    predictions: &[ScoredPrediction],
    thresholds: &[f64],
) -> Vec<ThresholdAnalysis> {
    if predictions.is_empty() {
        return Vec::new();
    }

    thresholds
        .iter()
        .filter_map(|&threshold| {
            let bets: Vec<&ScoredPrediction> = predictions
                .iter()
                .filter(|p| p.confidence() >= threshold)
                .collect();
            if bets.is_empty() {
                return None;
            }
            let correct = bets.iter().filter(|p| p.is_correct()).count();
            Some(ThresholdAnalysis {
                threshold,
                bets: bets.len(),
                coverage: bets.len() as f64 / predictions.len() as f64,
                accuracy: correct as f64 / bets.len() as f64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(actual: usize, probabilities: [f64; 3]) -> ScoredPrediction {
        ScoredPrediction {
            actual,
            probabilities,
        }
    }

    fn create_test_predictions() -> Vec<ScoredPrediction> {
        vec![
            scored(0, [0.70, 0.20, 0.10]), // home, correct
            scored(0, [0.30, 0.50, 0.20]), // home, predicted draw
            scored(1, [0.20, 0.56, 0.24]), // draw, correct
            scored(2, [0.45, 0.15, 0.40]), // away, predicted home
        ]
    }

    #[test]
    fn test_calculate_metrics() {
        let metrics = calculate_metrics(&create_test_predictions());

        assert_eq!(metrics.total, 4);
        assert_eq!(metrics.correct, 2);
        assert!((metrics.accuracy - 0.5).abs() < 1e-12);
        assert_eq!(metrics.confusion, [[1, 1, 0], [0, 1, 0], [1, 0, 0]]);

        let home = &metrics.per_class[0];
        assert_eq!(home.support, 2);
        assert!((home.precision - 0.5).abs() < 1e-12);
        assert!((home.recall - 0.5).abs() < 1e-12);
        assert!((home.f1 - 0.5).abs() < 1e-12);

        let away = &metrics.per_class[2];
        assert_eq!(away.support, 1);
        assert_eq!(away.precision, 0.0);
        assert_eq!(away.f1, 0.0);
    }

    #[test]
    fn test_calculate_metrics_empty() {
        let metrics = calculate_metrics(&[]);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.accuracy, 0.0);
        assert!(metrics.per_class.is_empty());
    }

    #[test]
    fn test_log_loss() {
        let perfect = [scored(1, [0.0, 1.0, 0.0])];
        assert!(log_loss(&perfect) < 1e-9);

        let even = [scored(2, [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0])];
        assert!((log_loss(&even) - 3.0_f64.ln()).abs() < 1e-9);

        // A zero probability on the actual class is clipped, not infinite
        let wrong = [scored(0, [0.0, 1.0, 0.0])];
        assert!(log_loss(&wrong).is_finite());
    }

    #[test]
    fn test_threshold_analysis() {
        let analysis = threshold_analysis(&create_test_predictions(), &DEFAULT_THRESHOLDS);

        // Confidences: 0.70, 0.50, 0.56, 0.45
        assert_eq!(analysis.len(), 4);
        assert_eq!(analysis[0].threshold, 0.50);
        assert_eq!(analysis[0].bets, 3);
        assert!((analysis[0].coverage - 0.75).abs() < 1e-12);
        assert!((analysis[0].accuracy - 2.0 / 3.0).abs() < 1e-12);

        assert_eq!(analysis[1].bets, 2);
        assert_eq!(analysis[3].bets, 1);
        assert_eq!(analysis[3].accuracy, 1.0);
    }

    #[test]
    fn test_threshold_analysis_skips_empty_levels() {
        let predictions = [scored(0, [0.52, 0.28, 0.20])];
        let analysis = threshold_analysis(&predictions, &DEFAULT_THRESHOLDS);
        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis[0].threshold, 0.50);
    }
}
