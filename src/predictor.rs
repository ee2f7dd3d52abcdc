use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{EnsembleConfig, ServingConfig};
use crate::data::feature_store::read_feature_table;
use crate::data::merge::FeatureTable;
use crate::error::{PredictError, Result};
use crate::inference::InferenceFeatureBuilder;
use crate::models::{MatchPrediction, ModelProbabilities, Outcome, OutcomeProbabilities, Signal};
use crate::schema::{FeatureSchema, SCHEMA_FILE};

/// Gradient-boosted model exported from training
pub const PRIMARY_MODEL_FILE: &str = "primary.onnx";
/// Random-forest model exported from training
pub const SECONDARY_MODEL_FILE: &str = "secondary.onnx";

/// A trained 3-class classifier (home win, draw, away win)
pub trait ProbabilityModel: Send + Sync {
    fn name(&self) -> &str;

    /// Class probabilities for one schema-ordered feature row
    fn predict_proba(&self, features: &[f32]) -> Result<[f64; 3]>;
}

/// ONNX classifier exported with a probability tensor output
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_index: usize,
}

impl OnnxClassifier {
    pub fn load<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PredictError::artifact(path, "model file not found"));
        }
        info!("Loading model: {:?}", path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| PredictError::artifact(path, "model has no inputs"))?;

        // Classifiers export (label, probabilities); prefer the named output
        let output_index = match session.outputs.iter().position(|o| o.name == "probabilities") {
            Some(i) => i,
            None if !session.outputs.is_empty() => session.outputs.len() - 1,
            None => return Err(PredictError::artifact(path, "model has no outputs")),
        };

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_index,
        })
    }
}

impl ProbabilityModel for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &[f32]) -> Result<[f64; 3]> {
        let input_tensor = Tensor::from_array(([1usize, features.len()], features.to_vec()))?;

        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;
        let (_, output_data) = outputs[self.output_index].try_extract_tensor::<f32>()?;

        if output_data.len() < 3 {
            return Err(PredictError::SchemaMismatch(format!(
                "model '{}' returned {} values, expected 3 class probabilities",
                self.name,
                output_data.len()
            )));
        }

        Ok(normalize([
            f64::from(output_data[0]),
            f64::from(output_data[1]),
            f64::from(output_data[2]),
        ]))
    }
}

/// Rescale to sum to 1 when a model's float output drifts
fn normalize(p: [f64; 3]) -> [f64; 3] {
    let sum: f64 = p.iter().sum();
    if sum > 0.0 && (sum - 1.0).abs() > 1e-6 {
        [p[0] / sum, p[1] / sum, p[2] / sum]
    } else {
        p
    }
}

/// Index of the largest probability; ties go to the earliest class
pub fn argmax(p: &[f64; 3]) -> usize {
    let mut best = 0;
    for i in 1..p.len() {
        if p[i] > p[best] {
            best = i;
        }
    }
    best
}

/// Blended output of one or two models
#[derive(Debug, Clone)]
pub struct EnsembleOutput {
    pub probabilities: [f64; 3],
    pub model: String,
    pub components: Vec<ModelProbabilities>,
}

/// Weighted blend of a primary and an optional secondary model
pub struct EnsemblePredictor {
    primary: Box<dyn ProbabilityModel>,
    secondary: Option<Box<dyn ProbabilityModel>>,
    config: EnsembleConfig,
}

impl EnsemblePredictor {
    pub fn new(
        primary: Box<dyn ProbabilityModel>,
        secondary: Option<Box<dyn ProbabilityModel>>,
        config: EnsembleConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            primary,
            secondary,
            config,
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn primary(&self) -> &dyn ProbabilityModel {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&dyn ProbabilityModel> {
        self.secondary.as_deref()
    }

    /// Blend both models when `use_ensemble` is set and a secondary exists,
    /// otherwise return the primary model's probabilities
    pub fn predict(&self, features: &[f32], use_ensemble: bool) -> Result<EnsembleOutput> {
        let primary = self.primary.predict_proba(features)?;

        let secondary = match (&self.secondary, use_ensemble) {
            (Some(model), true) => Some((model, model.predict_proba(features)?)),
            _ => None,
        };

        let Some((secondary_model, secondary_p)) = secondary else {
            return Ok(EnsembleOutput {
                probabilities: primary,
                model: self.primary.name().to_string(),
                components: Vec::new(),
            });
        };

        let w1 = self.config.primary_weight;
        let w2 = self.config.secondary_weight;
        let blended: [f64; 3] = std::array::from_fn(|i| w1 * primary[i] + w2 * secondary_p[i]);

        Ok(EnsembleOutput {
            probabilities: blended,
            model: "ensemble".to_string(),
            components: vec![
                ModelProbabilities {
                    model: self.primary.name().to_string(),
                    probabilities: OutcomeProbabilities::from_array(primary),
                },
                ModelProbabilities {
                    model: secondary_model.name().to_string(),
                    probabilities: OutcomeProbabilities::from_array(secondary_p),
                },
            ],
        })
    }
}

/// Fixture prediction service over a loaded feature table and models
pub struct MatchPredictor {
    table: FeatureTable,
    schema: FeatureSchema,
    ensemble: EnsemblePredictor,
    serving: ServingConfig,
}

impl MatchPredictor {
    pub fn new(
        table: FeatureTable,
        schema: FeatureSchema,
        ensemble: EnsemblePredictor,
        serving: ServingConfig,
    ) -> Result<Self> {
        schema.validate_table(&table)?;
        Ok(Self {
            table,
            schema,
            ensemble,
            serving,
        })
    }

    /// Load schema and models from `model_dir` and the feature table from `features_path`
    ///
    /// A missing secondary model downgrades to single-model predictions.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        model_dir: P,
        features_path: Q,
        serving: ServingConfig,
    ) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        serving.ensemble.validate()?;

        let schema = FeatureSchema::load(model_dir.join(SCHEMA_FILE))?;
        let table = read_feature_table(features_path)?;

        let primary = OnnxClassifier::load(model_dir.join(PRIMARY_MODEL_FILE), "primary")?;
        let secondary_path: PathBuf = model_dir.join(SECONDARY_MODEL_FILE);
        let secondary: Option<Box<dyn ProbabilityModel>> = if secondary_path.exists() {
            Some(Box::new(OnnxClassifier::load(&secondary_path, "secondary")?))
        } else {
            if serving.ensemble.use_ensemble {
                warn!("{:?} not found; predictions use the primary model only", secondary_path);
            }
            None
        };

        let ensemble =
            EnsemblePredictor::new(Box::new(primary), secondary, serving.ensemble.clone())?;
        info!(
            "Predictor ready: {} teams, {} features, ensemble={}",
            table.teams().len(),
            schema.len(),
            ensemble.has_secondary()
        );

        Self::new(table, schema, ensemble, serving)
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn ensemble(&self) -> &EnsemblePredictor {
        &self.ensemble
    }

    pub fn teams(&self) -> Vec<String> {
        self.table.teams()
    }

    /// Predict one fixture; `use_ensemble` overrides the configured default
    pub fn predict(
        &self,
        home_team: &str,
        away_team: &str,
        use_ensemble: Option<bool>,
    ) -> Result<MatchPrediction> {
        let policy = self.serving.differential_policy;
        let builder = InferenceFeatureBuilder::new(&self.table, &self.schema, policy);
        let vector = builder.build(home_team, away_team)?;

        let use_ensemble = use_ensemble.unwrap_or(self.serving.ensemble.use_ensemble);
        let output = self.ensemble.predict(&vector.to_f32(), use_ensemble)?;

        let index = argmax(&output.probabilities);
        let predicted_outcome = Outcome::from_index(index).unwrap_or(Outcome::HomeWin);
        let confidence = output.probabilities[index];

        debug!(
            "{} vs {}: {} ({:.3}) via {}",
            home_team,
            away_team,
            predicted_outcome.label(),
            confidence,
            output.model
        );

        Ok(MatchPrediction {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            predicted_outcome,
            confidence,
            probabilities: OutcomeProbabilities::from_array(output.probabilities),
            signal: Signal::from_confidence(confidence),
            model: output.model,
            components: output.components,
        })
    }

    /// Predict several fixtures in parallel, keeping input order
    pub fn predict_many(
        &self,
        fixtures: &[(String, String)],
        use_ensemble: Option<bool>,
    ) -> Vec<Result<MatchPrediction>> {
        fixtures
            .par_iter()
            .map(|(home, away)| self.predict(home, away, use_ensemble))
            .collect()
    }
}
