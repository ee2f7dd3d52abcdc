//! Match-level feature table
//!
//! Joins each match with its home team's and away team's feature rows,
//! adds differential columns, then drops or zero-fills incomplete rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::data::csv_loader::{FullTimeResult, MatchRecord};
use crate::data::features::{FeatureLayout, TeamFeatureRow};
use crate::error::{PredictError, Result};

pub const HOME_SUFFIX: &str = "_home";
pub const AWAY_SUFFIX: &str = "_away";

/// Which side is subtracted from which
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    HomeMinusAway,
    /// Used where a lower raw value is better (conceding, volatility)
    AwayMinusHome,
}

/// A column derived from the same statistic on both sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferentialFeature {
    pub name: String,
    /// Per-team statistic the differential is taken over
    pub source: String,
    pub direction: Direction,
}

impl DifferentialFeature {
    fn new(name: impl Into<String>, source: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            direction,
        }
    }

    pub fn compute(&self, home: Option<f64>, away: Option<f64>) -> Option<f64> {
        let (h, a) = home.zip(away)?;
        Some(match self.direction {
            Direction::HomeMinusAway => h - a,
            Direction::AwayMinusHome => a - h,
        })
    }
}

/// Window used by the single-window differentials
///
/// The trend window when it is configured, else the middle window. An empty
/// window list falls back to the trend window.
fn reference_window(config: &PipelineConfig) -> usize {
    if config.windows.contains(&config.trend_window) {
        return config.trend_window;
    }
    config
        .windows
        .get(config.windows.len() / 2)
        .copied()
        .unwrap_or(config.trend_window)
}

/// (name prefix, source statistic prefix, direction), repeated for each window
const WINDOWED_DIFFERENTIALS: [(&str, &str, Direction); 5] = [
    ("form_diff", "points_avg", Direction::HomeMinusAway),
    ("goal_diff_form", "goal_diff_avg", Direction::HomeMinusAway),
    ("win_ratio_diff", "win_ratio", Direction::HomeMinusAway),
    ("attack_diff", "goals_for_avg", Direction::HomeMinusAway),
    ("defense_diff", "goals_against_avg", Direction::AwayMinusHome),
];

/// Differential columns in table order
pub fn differential_features(config: &PipelineConfig) -> Vec<DifferentialFeature> {
    use Direction::*;

    let mut diffs = Vec::new();
    for &w in &config.windows {
        for (name, source, direction) in WINDOWED_DIFFERENTIALS {
            diffs.push(DifferentialFeature::new(
                format!("{}_{}", name, w),
                format!("{}_{}", source, w),
                direction,
            ));
        }
    }

    let rw = reference_window(config);
    let tw = config.trend_window;
    let singles = [
        (format!("consistency_diff_{}", rw), format!("points_std_{}", rw), AwayMinusHome),
        ("momentum_diff".into(), format!("points_ewm_{}", config.ewm_span), HomeMinusAway),
        ("rest_advantage".into(), "days_rest".into(), HomeMinusAway),
        ("win_streak_diff".into(), "win_streak".into(), HomeMinusAway),
        ("unbeaten_streak_diff".into(), "unbeaten_streak".into(), HomeMinusAway),
        (format!("clean_sheet_diff_{}", rw), format!("clean_sheet_ratio_{}", rw), HomeMinusAway),
        ("h2h_advantage".into(), format!("h2h_win_pct_{}", config.h2h_window), HomeMinusAway),
        ("attack_trend_diff".into(), format!("goals_for_trend_{}", tw), HomeMinusAway),
        ("defense_trend_diff".into(), format!("goals_against_trend_{}", tw), AwayMinusHome),
    ];
    diffs.extend(
        singles
            .into_iter()
            .map(|(name, source, direction): (String, String, Direction)| {
                DifferentialFeature::new(name, source, direction)
            }),
    );
    diffs
}

/// One match with its model-ready feature values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFeatureRow {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub result: FullTimeResult,
    /// Aligned with `FeatureTable::columns`
    pub values: Vec<f64>,
}

impl MatchFeatureRow {
    pub fn home_win(&self) -> u8 {
        u8::from(self.result == FullTimeResult::Home)
    }

    pub fn away_win(&self) -> u8 {
        u8::from(self.result == FullTimeResult::Away)
    }

    pub fn draw(&self) -> u8 {
        u8::from(self.result == FullTimeResult::Draw)
    }

    pub fn home_points(&self) -> u8 {
        self.result.home_points()
    }

    pub fn away_points(&self) -> u8 {
        self.result.away_points()
    }
}

/// Chronological match rows sharing one ordered feature column list
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<MatchFeatureRow>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<MatchFeatureRow>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.values.len() != columns.len()) {
            return Err(PredictError::SchemaMismatch(format!(
                "row {} vs {} on {} has {} values, expected {}",
                bad.home_team,
                bad.away_team,
                bad.date,
                bad.values.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[MatchFeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| r.values[col])
    }

    /// Every team appearing on either side, sorted
    pub fn teams(&self) -> Vec<String> {
        let teams: BTreeSet<&str> = self
            .rows
            .iter()
            .flat_map(|r| [r.home_team.as_str(), r.away_team.as_str()])
            .collect();
        teams.into_iter().map(String::from).collect()
    }

    /// Most recent row where `team` played at home
    pub fn latest_home_row(&self, team: &str) -> Option<&MatchFeatureRow> {
        self.rows.iter().rev().find(|r| r.home_team == team)
    }

    /// Most recent row where `team` played away
    pub fn latest_away_row(&self, team: &str) -> Option<&MatchFeatureRow> {
        self.rows.iter().rev().find(|r| r.away_team == team)
    }
}

/// Row accounting from one merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub input_matches: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    /// Kept rows that had at least one value filled with 0
    pub partial_rows: usize,
    pub filled_values: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell {
    Value(f64),
    /// No history yet for this side (first match, or first meeting)
    ColdStart,
    Missing,
}

impl Cell {
    fn from_team(value: Option<f64>, cold_start: bool) -> Self {
        match value {
            Some(v) => Cell::Value(v),
            None if cold_start => Cell::ColdStart,
            None => Cell::Missing,
        }
    }

    fn value(self) -> Option<f64> {
        match self {
            Cell::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Builds the `FeatureTable` from matches and team feature rows
pub struct FeatureMerger {
    layout: FeatureLayout,
    differentials: Vec<DifferentialFeature>,
    nan_threshold: f64,
}

impl FeatureMerger {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            layout: FeatureLayout::new(config),
            differentials: differential_features(config),
            nan_threshold: config.nan_threshold,
        }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn differentials(&self) -> &[DifferentialFeature] {
        &self.differentials
    }

    /// Home columns, then away columns, then differentials
    pub fn feature_columns(&self) -> Vec<String> {
        let names = self.layout.names();
        names
            .iter()
            .map(|n| format!("{}{}", n, HOME_SUFFIX))
            .chain(names.iter().map(|n| format!("{}{}", n, AWAY_SUFFIX)))
            .chain(self.differentials.iter().map(|d| d.name.clone()))
            .collect()
    }

    fn team_cells<'a>(&'a self, row: &'a TeamFeatureRow) -> impl Iterator<Item = Cell> + 'a {
        row.values.iter().enumerate().map(move |(i, v)| {
            let cold = if self.layout.is_head_to_head(i) {
                row.prior_meetings == 0
            } else {
                row.prior_matches == 0
            };
            Cell::from_team(*v, cold)
        })
    }

    /// Differential values from two sides' statistics, looked up by name
    pub fn compute_differentials<H, A>(&self, home: H, away: A) -> Vec<Option<f64>>
    where
        H: Fn(&str) -> Option<f64>,
        A: Fn(&str) -> Option<f64>,
    {
        self.differentials
            .iter()
            .map(|d| d.compute(home(&d.source), away(&d.source)))
            .collect()
    }

    pub fn merge(
        &self,
        matches: &[MatchRecord],
        team_rows: &[TeamFeatureRow],
    ) -> Result<(FeatureTable, MergeReport)> {
        let by_side: HashMap<(usize, u8), &TeamFeatureRow> = team_rows
            .iter()
            .map(|r| ((r.match_index, r.is_home), r))
            .collect();

        let columns = self.feature_columns();
        let n_cols = columns.len();
        let mut report = MergeReport {
            input_matches: matches.len(),
            ..Default::default()
        };
        let mut rows = Vec::with_capacity(matches.len());

        for m in matches {
            let home = by_side.get(&(m.index, 1)).ok_or_else(|| {
                PredictError::data_integrity(
                    "merge",
                    format!("no home feature row for {} on {}", m.home_team, m.date),
                )
            })?;
            let away = by_side.get(&(m.index, 0)).ok_or_else(|| {
                PredictError::data_integrity(
                    "merge",
                    format!("no away feature row for {} on {}", m.away_team, m.date),
                )
            })?;

            let mut cells: Vec<Cell> = Vec::with_capacity(n_cols);
            cells.extend(self.team_cells(home));
            cells.extend(self.team_cells(away));

            let home_cells = &cells[..self.layout.len()];
            let away_cells = &cells[self.layout.len()..];
            let diffs: Vec<Cell> = self
                .differentials
                .iter()
                .map(|d| {
                    let pos = self.layout.position(&d.source);
                    let h = pos.map_or(Cell::Missing, |p| home_cells[p]);
                    let a = pos.map_or(Cell::Missing, |p| away_cells[p]);
                    match (h, a) {
                        (Cell::Value(hv), Cell::Value(av)) => d
                            .compute(Some(hv), Some(av))
                            .map_or(Cell::Missing, Cell::Value),
                        (Cell::Missing, _) | (_, Cell::Missing) => Cell::Missing,
                        _ => Cell::ColdStart,
                    }
                })
                .collect();
            cells.extend(diffs);

            let missing = cells.iter().filter(|c| **c == Cell::Missing).count();
            if missing as f64 / n_cols as f64 > self.nan_threshold {
                debug!(
                    "Dropping {} vs {} on {}: {}/{} values missing",
                    m.home_team, m.away_team, m.date, missing, n_cols
                );
                report.rows_dropped += 1;
                continue;
            }

            let filled = cells.iter().filter(|c| c.value().is_none()).count();
            if filled > 0 {
                report.partial_rows += 1;
                report.filled_values += filled;
            }

            rows.push(MatchFeatureRow {
                date: m.date,
                home_team: m.home_team.clone(),
                away_team: m.away_team.clone(),
                home_goals: m.home_goals,
                away_goals: m.away_goals,
                result: m.result,
                values: cells.iter().map(|c| c.value().unwrap_or(0.0)).collect(),
            });
        }

        report.rows_kept = rows.len();

        if report.partial_rows > 0 {
            warn!(
                "Partial data: {} of {} rows had {} values filled with 0",
                report.partial_rows, report.rows_kept, report.filled_values
            );
        }
        info!(
            "Merged {} matches into {} rows ({} dropped, {} columns)",
            report.input_matches, report.rows_kept, report.rows_dropped, n_cols
        );

        Ok((FeatureTable::new(columns, rows)?, report))
    }
}
