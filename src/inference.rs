//! Serving-time feature construction
//!
//! Builds one schema-ordered feature vector for a fixture from the latest
//! historical rows of the two teams.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use crate::config::DifferentialPolicy;
use crate::data::merge::{
    differential_features, DifferentialFeature, FeatureTable, MatchFeatureRow, AWAY_SUFFIX,
    HOME_SUFFIX,
};
use crate::error::{validate_fixture, PredictError, Result, Side};
use crate::schema::{sanitize_feature_name, ColumnKind, FeatureSchema};

/// A model-ready row for one fixture
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub home_team: String,
    pub away_team: String,
    /// Date of the home team's latest home match
    pub home_as_of: NaiveDate,
    /// Date of the away team's latest away match
    pub away_as_of: NaiveDate,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// Looks up team rows in an immutable table; safe to share across threads
pub struct InferenceFeatureBuilder<'a> {
    table: &'a FeatureTable,
    schema: &'a FeatureSchema,
    policy: DifferentialPolicy,
    table_index: HashMap<String, usize>,
    differentials: HashMap<String, DifferentialFeature>,
}

impl<'a> InferenceFeatureBuilder<'a> {
    pub fn new(
        table: &'a FeatureTable,
        schema: &'a FeatureSchema,
        policy: DifferentialPolicy,
    ) -> Self {
        let table_index = table
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (sanitize_feature_name(c), i))
            .collect();
        let differentials = differential_features(&schema.pipeline)
            .into_iter()
            .map(|d| (sanitize_feature_name(&d.name), d))
            .collect();

        Self {
            table,
            schema,
            policy,
            table_index,
            differentials,
        }
    }

    /// Value of a training column in `row`
    fn lookup(&self, row: &MatchFeatureRow, name: &str) -> Result<f64> {
        let index = self.table_index.get(name).ok_or_else(|| {
            PredictError::SchemaMismatch(format!(
                "training column '{}' is not in the feature table",
                name
            ))
        })?;
        Ok(row.values[*index])
    }

    pub fn build(&self, home_team: &str, away_team: &str) -> Result<FeatureVector> {
        validate_fixture(home_team, away_team)?;

        let home_row = self
            .table
            .latest_home_row(home_team)
            .ok_or_else(|| PredictError::TeamNotFound {
                team: home_team.to_string(),
                side: Side::Home,
            })?;
        let away_row = self
            .table
            .latest_away_row(away_team)
            .ok_or_else(|| PredictError::TeamNotFound {
                team: away_team.to_string(),
                side: Side::Away,
            })?;

        let mut values = Vec::with_capacity(self.schema.len());
        for column in &self.schema.columns {
            let value = match column.kind {
                ColumnKind::Home => self.lookup(home_row, &column.name)?,
                ColumnKind::Away => self.lookup(away_row, &column.name)?,
                ColumnKind::Differential => match self.policy {
                    DifferentialPolicy::Zero => 0.0,
                    DifferentialPolicy::Recompute => {
                        self.recompute(&column.name, home_row, away_row)?
                    }
                },
            };
            values.push(if value.is_finite() { value } else { 0.0 });
        }

        debug!(
            "Built {} features for {} vs {} (as of {} / {})",
            values.len(),
            home_team,
            away_team,
            home_row.date,
            away_row.date
        );

        Ok(FeatureVector {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            home_as_of: home_row.date,
            away_as_of: away_row.date,
            values,
        })
    }

    /// Differential from the home row's home-side and the away row's away-side statistic
    fn recompute(
        &self,
        name: &str,
        home_row: &MatchFeatureRow,
        away_row: &MatchFeatureRow,
    ) -> Result<f64> {
        let Some(diff) = self.differentials.get(name) else {
            return Ok(0.0);
        };
        let home_name = sanitize_feature_name(&format!("{}{}", diff.source, HOME_SUFFIX));
        let away_name = sanitize_feature_name(&format!("{}{}", diff.source, AWAY_SUFFIX));
        let home = self.lookup(home_row, &home_name)?;
        let away = self.lookup(away_row, &away_name)?;
        Ok(diff.compute(Some(home), Some(away)).unwrap_or(0.0))
    }
}
