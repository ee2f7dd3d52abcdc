//! EPL Predictor - Premier League match outcome prediction
//!
//! This library provides:
//! - A leakage-safe feature pipeline over historical results (rolling form,
//!   EWMA momentum, streaks, rest days, head-to-head, differentials)
//! - A versioned feature schema shared by training and serving
//! - Home win / draw / away win prediction with a weighted ONNX ensemble
//! - Chronological evaluation and team context helpers
//!
//! # Example
//!
//! ```no_run
//! use epl_predictor::config::{PipelineConfig, ServingConfig};
//! use epl_predictor::pipeline::FeaturePipeline;
//! use epl_predictor::predictor::MatchPredictor;
//!
//! let pipeline = FeaturePipeline::new(PipelineConfig::default())?;
//! let output = pipeline.run_files(&[("data/E0_2324.csv", "2023-24")])?;
//! FeaturePipeline::write(&output, "data/features.csv", "models/feature_schema.json")?;
//!
//! let predictor = MatchPredictor::load("models", "data/features.csv", ServingConfig::default())?;
//! let prediction = predictor.predict("Arsenal", "Chelsea", None)?;
//! println!("{} ({:.1}%)", prediction.predicted_outcome.label(), prediction.confidence * 100.0);
//! # Ok::<(), epl_predictor::error::PredictError>(())
//! ```

pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod predictor;
pub mod schema;

// Re-export commonly used types
pub use config::{AppConfig, DifferentialPolicy, EnsembleConfig, PipelineConfig, ServingConfig};
pub use data::{FeatureTable, MatchRecord, MatchTable};
pub use error::{PredictError, Result};
pub use models::{MatchPrediction, Outcome, OutcomeProbabilities, Signal};
pub use pipeline::{FeaturePipeline, PipelineOutput, PipelineReport};
pub use predictor::{EnsemblePredictor, MatchPredictor, OnnxClassifier, ProbabilityModel};
pub use schema::FeatureSchema;
