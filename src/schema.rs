//! Training feature schema
//!
//! The ordered column list recorded when the feature table is built. Both
//! training and serving must reproduce it exactly; it is persisted as JSON
//! next to the models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::merge::{FeatureTable, AWAY_SUFFIX, HOME_SUFFIX};
use crate::error::{PredictError, Result};

pub const SCHEMA_FILE: &str = "feature_schema.json";
pub const SCHEMA_VERSION: u32 = 1;

/// Make a column name safe for gradient-boosting libraries
///
/// `[` and `]` become `_`, `<` becomes `_lt_`, `>` becomes `_gt_`.
pub fn sanitize_feature_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '[' | ']' => out.push('_'),
            '<' => out.push_str("_lt_"),
            '>' => out.push_str("_gt_"),
            _ => out.push(c),
        }
    }
    out
}

/// Where a column's value comes from at serving time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Home,
    Away,
    Differential,
}

impl ColumnKind {
    pub fn classify(name: &str) -> Self {
        if name.contains(HOME_SUFFIX) {
            ColumnKind::Home
        } else if name.contains(AWAY_SUFFIX) {
            ColumnKind::Away
        } else {
            ColumnKind::Differential
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
    /// Element type fed to the models
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Pipeline settings the table was built with
    pub pipeline: PipelineConfig,
    pub columns: Vec<ColumnDescriptor>,
}

impl FeatureSchema {
    pub fn from_columns(columns: &[String], pipeline: &PipelineConfig) -> Self {
        let columns = columns
            .iter()
            .map(|c| {
                let name = sanitize_feature_name(c);
                ColumnDescriptor {
                    kind: ColumnKind::classify(&name),
                    name,
                    dtype: "float32".to_string(),
                }
            })
            .collect();

        Self {
            version: SCHEMA_VERSION,
            created_at: Utc::now(),
            pipeline: pipeline.clone(),
            columns,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn count_kind(&self, kind: ColumnKind) -> usize {
        self.columns.iter().filter(|c| c.kind == kind).count()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved feature schema ({} columns) to {:?}", self.len(), path);
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PredictError::artifact(path, format!("cannot read schema: {}", e)))?;
        let schema: FeatureSchema = serde_json::from_str(&content)
            .map_err(|e| PredictError::artifact(path, format!("invalid schema JSON: {}", e)))?;

        if schema.version != SCHEMA_VERSION {
            return Err(PredictError::artifact(
                path,
                format!(
                    "schema version {} not supported (expected {})",
                    schema.version, SCHEMA_VERSION
                ),
            ));
        }
        if schema.is_empty() {
            return Err(PredictError::artifact(path, "schema has no columns"));
        }
        schema
            .pipeline
            .validate()
            .map_err(|e| {
                PredictError::artifact(path, format!("invalid pipeline settings: {}", e))
            })?;
        Ok(schema)
    }

    /// Check that `columns` are exactly this schema's columns, in order
    pub fn validate_columns(&self, columns: &[String]) -> Result<()> {
        if columns.len() != self.columns.len() {
            return Err(PredictError::SchemaMismatch(format!(
                "expected {} columns, got {}",
                self.columns.len(),
                columns.len()
            )));
        }
        for (i, (expected, actual)) in self.columns.iter().zip(columns).enumerate() {
            if expected.name != sanitize_feature_name(actual) {
                return Err(PredictError::SchemaMismatch(format!(
                    "column {}: expected '{}', got '{}'",
                    i, expected.name, actual
                )));
            }
        }
        Ok(())
    }

    pub fn validate_table(&self, table: &FeatureTable) -> Result<()> {
        self.validate_columns(table.columns())
    }
}
