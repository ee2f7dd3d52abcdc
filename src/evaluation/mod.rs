//! Offline evaluation of trained models on a chronological hold-out

pub mod metrics;

pub use metrics::{
    calculate_metrics, threshold_analysis, ClassMetrics, ClassificationMetrics, ScoredPrediction,
    ThresholdAnalysis, DEFAULT_THRESHOLDS,
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::merge::{FeatureTable, MatchFeatureRow};
use crate::error::{PredictError, Result};
use crate::predictor::{EnsemblePredictor, ProbabilityModel};

/// Default share of the most recent matches held out for testing
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Split rows by time: the oldest `1 - test_size` for training, the rest for testing
pub fn chronological_split(
    table: &FeatureTable,
    test_size: f64,
) -> Result<(&[MatchFeatureRow], &[MatchFeatureRow])> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PredictError::Config(format!(
            "test_size must be between 0 and 1, got {}",
            test_size
        )));
    }
    let rows = table.rows();
    let split_idx = (rows.len() as f64 * (1.0 - test_size)) as usize;
    Ok(rows.split_at(split_idx))
}

/// Metrics for one model (or the blend)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub model: String,
    pub metrics: ClassificationMetrics,
    pub thresholds: Vec<ThresholdAnalysis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub rows: usize,
    pub models: Vec<ModelEvaluation>,
    /// Model with the highest accuracy; earlier entries win ties
    pub best_model: String,
}

fn score_rows(
    rows: &[MatchFeatureRow],
    predict: impl Fn(&[f32]) -> Result<[f64; 3]>,
) -> Result<Vec<ScoredPrediction>> {
    rows.iter()
        .map(|row| {
            let features: Vec<f32> = row.values.iter().map(|&v| v as f32).collect();
            Ok(ScoredPrediction {
                actual: row.result.class_index(),
                probabilities: predict(&features)?,
            })
        })
        .collect()
}

fn evaluate_scores(model: &str, scores: &[ScoredPrediction]) -> ModelEvaluation {
    let metrics = calculate_metrics(scores);
    info!(
        "{}: accuracy {:.4}, log loss {:.4} on {} matches",
        model, metrics.accuracy, metrics.log_loss, metrics.total
    );
    ModelEvaluation {
        model: model.to_string(),
        metrics,
        thresholds: threshold_analysis(scores, &DEFAULT_THRESHOLDS),
    }
}

/// Evaluate each model alone and, when a secondary exists, the weighted blend
pub fn evaluate(
    ensemble: &EnsemblePredictor,
    rows: &[MatchFeatureRow],
) -> Result<EvaluationReport> {
    if rows.is_empty() {
        return Err(PredictError::data_integrity("evaluation", "no rows to evaluate"));
    }

    let mut models = Vec::new();
    let primary: &dyn ProbabilityModel = ensemble.primary();
    let scores = score_rows(rows, |f| primary.predict_proba(f))?;
    models.push(evaluate_scores(primary.name(), &scores));

    if let Some(secondary) = ensemble.secondary() {
        let scores = score_rows(rows, |f| secondary.predict_proba(f))?;
        models.push(evaluate_scores(secondary.name(), &scores));

        let scores = score_rows(rows, |f| Ok(ensemble.predict(f, true)?.probabilities))?;
        models.push(evaluate_scores("ensemble", &scores));
    }

    let mut best = &models[0];
    for m in &models[1..] {
        if m.metrics.accuracy > best.metrics.accuracy {
            best = m;
        }
    }
    let best_model = best.model.clone();

    Ok(EvaluationReport {
        rows: rows.len(),
        models,
        best_model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleConfig;
    use crate::data::test_support::{build_table, small_league};

    /// Always predicts a home win
    struct HomeBias;

    impl ProbabilityModel for HomeBias {
        fn name(&self) -> &str {
            "home_bias"
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<[f64; 3]> {
            Ok([0.6, 0.25, 0.15])
        }
    }

    /// Always predicts a draw
    struct DrawBias;

    impl ProbabilityModel for DrawBias {
        fn name(&self) -> &str {
            "draw_bias"
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<[f64; 3]> {
            Ok([0.1, 0.8, 0.1])
        }
    }

    #[test]
    fn test_chronological_split() {
        let (table, _) = build_table(&small_league());
        let (train, test) = chronological_split(&table, 0.2).unwrap();

        // int(6 * 0.8) = 4
        assert_eq!(train.len(), 4);
        assert_eq!(test.len(), 2);
        assert!(train.last().unwrap().date <= test[0].date);
    }

    #[test]
    fn test_chronological_split_rejects_bad_size() {
        let (table, _) = build_table(&small_league());
        assert!(chronological_split(&table, 0.0).is_err());
        assert!(chronological_split(&table, 1.0).is_err());
    }

    #[test]
    fn test_evaluate_models() {
        let (table, _) = build_table(&small_league());
        let secondary: Box<dyn ProbabilityModel> = Box::new(DrawBias);
        let ensemble =
            EnsemblePredictor::new(Box::new(HomeBias), Some(secondary), EnsembleConfig::default())
                .unwrap();

        let report = evaluate(&ensemble, table.rows()).unwrap();
        assert_eq!(report.rows, 6);
        assert_eq!(report.models.len(), 3);

        // Results: H, D, A, H, D, A
        let home = &report.models[0];
        assert_eq!(home.model, "home_bias");
        assert_eq!(home.metrics.correct, 2);
        let draw = &report.models[1];
        assert_eq!(draw.metrics.correct, 2);
        // Blend [0.40, 0.47, 0.13] picks draw
        assert_eq!(report.models[2].metrics.correct, 2);
        assert_eq!(report.best_model, "home_bias");
    }

    #[test]
    fn test_evaluate_single_model() {
        let (table, _) = build_table(&small_league());
        let ensemble =
            EnsemblePredictor::new(Box::new(HomeBias), None, EnsembleConfig::default()).unwrap();
        let report = evaluate(&ensemble, table.rows()).unwrap();
        assert_eq!(report.models.len(), 1);
        assert!(evaluate(&ensemble, &[]).is_err());
    }
}
