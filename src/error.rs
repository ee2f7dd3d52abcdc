use std::path::PathBuf;
use thiserror::Error;

#[cfg(feature = "api")]
use actix_web::{http::StatusCode, HttpResponse, ResponseError};

#[cfg(feature = "api")]
use crate::models::ErrorResponse;

/// Which side of a fixture a team was requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Home => write!(f, "home"),
            Side::Away => write!(f, "away"),
        }
    }
}

/// Errors raised by the feature pipeline and the serving layer
#[derive(Debug, Error)]
pub enum PredictError {
    /// Raw input unusable: missing columns or nothing left after parsing
    #[error("Data integrity error in {stage}: {message}")]
    DataIntegrity { stage: &'static str, message: String },

    /// Requested team has no historical rows
    #[error("Team '{team}' not found in historical data (as {side} team)")]
    TeamNotFound { team: String, side: Side },

    /// Feature vector or table disagrees with the persisted training schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Model or schema artifact missing or unreadable
    #[error("Artifact error at {path:?}: {reason}")]
    Artifact { path: PathBuf, reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("ONNX runtime error: {0}")]
    Model(#[from] ort::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PredictError {
    pub fn data_integrity(stage: &'static str, message: impl Into<String>) -> Self {
        PredictError::DataIntegrity {
            stage,
            message: message.into(),
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PredictError::Artifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the caller can fix the request (e.g. pick another team).
    /// Everything else needs the offline pipeline re-run or an operator.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, PredictError::TeamNotFound { .. })
    }

    /// Stable machine-readable code used in error responses
    pub fn code(&self) -> &'static str {
        match self {
            PredictError::TeamNotFound { .. } => "team_not_found",
            PredictError::SchemaMismatch(_) => "schema_mismatch",
            PredictError::Artifact { .. } => "artifact_error",
            PredictError::Config(_) => "validation_error",
            PredictError::DataIntegrity { .. } => "data_integrity_error",
            _ => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;

#[cfg(feature = "api")]
impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::TeamNotFound { .. } => StatusCode::NOT_FOUND,
            PredictError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        })
    }
}

/// Reject empty or identical team names before touching the table
pub fn validate_fixture(home_team: &str, away_team: &str) -> Result<()> {
    if home_team.trim().is_empty() || away_team.trim().is_empty() {
        return Err(PredictError::Config(
            "Both home and away team names are required".to_string(),
        ));
    }
    if home_team == away_team {
        return Err(PredictError::Config(format!(
            "A team cannot play itself: {}",
            home_team
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_fixture_valid() {
        assert!(validate_fixture("Arsenal", "Chelsea").is_ok());
    }

    #[test]
    fn test_validate_fixture_invalid() {
        assert!(validate_fixture("", "Chelsea").is_err());
        assert!(validate_fixture("Arsenal", "  ").is_err());
        assert!(validate_fixture("Arsenal", "Arsenal").is_err());
    }

    #[test]
    fn test_error_display() {
        let err = PredictError::TeamNotFound {
            team: "Nonexistent FC".to_string(),
            side: Side::Home,
        };
        assert!(err.to_string().contains("Nonexistent FC"));
        assert!(err.to_string().contains("home"));
    }

    #[test]
    fn test_caller_error_classification() {
        let not_found = PredictError::TeamNotFound {
            team: "X".to_string(),
            side: Side::Away,
        };
        assert!(not_found.is_caller_error());
        assert!(!PredictError::SchemaMismatch("x".to_string()).is_caller_error());
        assert!(!PredictError::artifact("models/primary.onnx", "missing").is_caller_error());
        assert_eq!(not_found.code(), "team_not_found");
        assert_eq!(PredictError::Config("x".to_string()).code(), "validation_error");
    }

    #[cfg(feature = "api")]
    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            PredictError::TeamNotFound {
                team: "".to_string(),
                side: Side::Home
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PredictError::SchemaMismatch("".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
