use serde::{Deserialize, Serialize};

/// Match outcome classes, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::HomeWin, Outcome::Draw, Outcome::AwayWin];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            Outcome::HomeWin => 0,
            Outcome::Draw => 1,
            Outcome::AwayWin => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::HomeWin => "Home Win",
            Outcome::Draw => "Draw",
            Outcome::AwayWin => "Away Win",
        }
    }
}

/// Betting signal strength derived from the winning probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Strong,
    Moderate,
    Weak,
    NoEdge,
}

impl Signal {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.65 {
            Signal::Strong
        } else if confidence >= 0.55 {
            Signal::Moderate
        } else if confidence >= 0.45 {
            Signal::Weak
        } else {
            Signal::NoEdge
        }
    }

    pub fn describe(&self, outcome: Outcome) -> String {
        match self {
            Signal::Strong => format!("Strong bet on {}", outcome.label()),
            Signal::Moderate => format!("Moderate bet on {}", outcome.label()),
            Signal::Weak => "Weak signal - consider avoiding".to_string(),
            Signal::NoEdge => "No clear prediction - avoid betting".to_string(),
        }
    }
}

/// Class probabilities for one fixture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl OutcomeProbabilities {
    pub fn from_array(p: [f64; 3]) -> Self {
        Self {
            home_win: p[0],
            draw: p[1],
            away_win: p[2],
        }
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.home_win, self.draw, self.away_win]
    }
}

/// Per-model probabilities behind an ensemble prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProbabilities {
    pub model: String,
    pub probabilities: OutcomeProbabilities,
}

/// Prediction for one fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPrediction {
    pub home_team: String,
    pub away_team: String,
    pub predicted_outcome: Outcome,
    pub confidence: f64,
    pub probabilities: OutcomeProbabilities,
    pub signal: Signal,
    /// "ensemble" or the single model consulted
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ModelProbabilities>,
}

/// Fixture prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub home_team: String,
    pub away_team: String,
    /// Overrides the configured ensemble setting for this request
    #[serde(default)]
    pub use_ensemble: Option<bool>,
}

/// Batch prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictRequest {
    pub fixtures: Vec<PredictRequest>,
    /// Applies to every fixture; per-fixture settings are ignored
    #[serde(default)]
    pub use_ensemble: Option<bool>,
}

/// Batch prediction response; failed fixtures carry an error instead
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPredictResponse {
    pub predictions: Vec<MatchPrediction>,
    pub errors: Vec<ErrorResponse>,
}

/// Known teams
#[derive(Debug, Serialize, Deserialize)]
pub struct TeamsResponse {
    pub count: usize,
    pub teams: Vec<String>,
}

/// Last results of a team, most recent first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamForm {
    pub team: String,
    /// "W", "D" or "L" per match
    pub results: Vec<String>,
    pub points: u32,
}

/// Aggregate record over a team's recent matches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamSummary {
    pub team: String,
    pub played: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
    pub points: u32,
    /// Percentage of matches won
    pub win_rate: f64,
}

/// Recent meetings between two teams from `team`'s point of view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadToHead {
    pub team: String,
    pub opponent: String,
    /// "W", "D" or "L" per meeting, most recent first
    pub results: Vec<String>,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub teams: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
