//! Pipeline, ensemble and serving configuration
//!
//! Every knob has a default matching the trained models; a JSON file can
//! override any subset of fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PredictError, Result};

/// Feature pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rolling window sizes, in matches
    pub windows: Vec<usize>,
    /// EWMA span for momentum features
    pub ewm_span: usize,
    /// Window used by the goal trend features
    pub trend_window: usize,
    /// Minimum observations per trend window before a trend is reported
    pub trend_min_periods: usize,
    /// Head-to-head window, in prior meetings
    pub h2h_window: usize,
    /// Rest days assumed for a team's first match
    pub default_rest_days: f64,
    /// Rows with a larger missing-value fraction are dropped
    pub nan_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            windows: vec![3, 5, 10],
            ewm_span: 5,
            trend_window: 5,
            trend_min_periods: 3,
            h2h_window: 3,
            default_rest_days: 7.0,
            nan_threshold: 0.3,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.windows.is_empty() {
            return Err(PredictError::Config("at least one window is required".into()));
        }
        if self.windows.iter().any(|&w| w == 0) {
            return Err(PredictError::Config("window sizes must be positive".into()));
        }
        let mut sorted = self.windows.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.windows.len() {
            return Err(PredictError::Config("window sizes must be unique".into()));
        }
        if self.ewm_span == 0 || self.trend_window == 0 || self.h2h_window == 0 {
            return Err(PredictError::Config(
                "ewm_span, trend_window and h2h_window must be positive".into(),
            ));
        }
        if self.trend_min_periods == 0 || self.trend_min_periods > self.trend_window {
            return Err(PredictError::Config(format!(
                "trend_min_periods must be in 1..={}, got {}",
                self.trend_window, self.trend_min_periods
            )));
        }
        if !(0.0..=1.0).contains(&self.nan_threshold) {
            return Err(PredictError::Config(format!(
                "nan_threshold must be between 0 and 1, got {}",
                self.nan_threshold
            )));
        }
        Ok(())
    }
}

/// Ensemble blend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub primary_weight: f64,
    pub secondary_weight: f64,
    /// When false only the primary model is consulted
    pub use_ensemble: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            primary_weight: 0.6,
            secondary_weight: 0.4,
            use_ensemble: true,
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.primary_weight < 0.0 || self.secondary_weight < 0.0 {
            return Err(PredictError::Config("ensemble weights must be non-negative".into()));
        }
        let total = self.primary_weight + self.secondary_weight;
        if (total - 1.0).abs() > 1e-9 {
            return Err(PredictError::Config(format!(
                "ensemble weights must sum to 1, got {}",
                total
            )));
        }
        Ok(())
    }
}

/// How serving fills columns that are neither home- nor away-sided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferentialPolicy {
    /// Fill with 0, matching how the deployed models were served so far
    #[default]
    Zero,
    /// Recompute from the two teams' latest rows
    Recompute,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    pub differential_policy: DifferentialPolicy,
    pub ensemble: EnsembleConfig,
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub serving: ServingConfig,
}

impl AppConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.serving.ensemble.validate()
    }
}
