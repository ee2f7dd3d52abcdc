//! Feature Engineering
//!
//! Rolling form, streak, momentum and head-to-head statistics per team.
//!
//! Every value attached to a record is computed from strictly earlier
//! records of the same team (or the same team-opponent pair): each group is
//! scanned once, oldest first, and the state is read *before* the current
//! record is folded in.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::data::history::{group_by_pair, group_by_team, TeamMatchRecord};

/// Statistics computed for every configured window, in column order
pub const WINDOW_STATS: [&str; 11] = [
    "goals_for_avg",
    "goals_against_avg",
    "points_avg",
    "goal_diff_avg",
    "win_ratio",
    "draw_ratio",
    "clean_sheet_ratio",
    "failed_to_score_ratio",
    "points_std",
    "max_goals_scored",
    "max_goals_conceded",
];

/// Number of head-to-head columns at the end of each row
const H2H_COLUMNS: usize = 4;

/// Ordered per-team column names and their positions
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    pub windows: Vec<usize>,
    pub ewm_span: usize,
    pub trend_window: usize,
    pub h2h_window: usize,
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FeatureLayout {
    pub fn new(config: &PipelineConfig) -> Self {
        let mut names = Vec::new();

        for &w in &config.windows {
            for stat in WINDOW_STATS {
                names.push(format!("{}_{}", stat, w));
            }
        }

        let span = config.ewm_span;
        names.push(format!("points_ewm_{}", span));
        names.push(format!("goals_for_ewm_{}", span));
        names.push(format!("goals_against_ewm_{}", span));
        names.push("win_streak".to_string());
        names.push("unbeaten_streak".to_string());
        names.push("days_rest".to_string());

        for &w in &config.windows {
            names.push(format!("points_sum_{}", w));
        }

        names.push(format!("goals_for_trend_{}", config.trend_window));
        names.push(format!("goals_against_trend_{}", config.trend_window));

        let h = config.h2h_window;
        names.push(format!("h2h_win_pct_{}", h));
        names.push(format!("h2h_goals_for_avg_{}", h));
        names.push(format!("h2h_goals_against_avg_{}", h));
        names.push("h2h_last_result".to_string());

        let positions = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        Self {
            windows: config.windows.clone(),
            ewm_span: config.ewm_span,
            trend_window: config.trend_window,
            h2h_window: config.h2h_window,
            names,
            positions,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// First head-to-head column; everything before it is team form
    fn h2h_offset(&self) -> usize {
        self.names.len() - H2H_COLUMNS
    }

    /// Whether the column at `position` depends on prior meetings rather than prior matches
    pub fn is_head_to_head(&self, position: usize) -> bool {
        position >= self.h2h_offset()
    }
}

/// A team's view of one match plus statistics from its earlier matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFeatureRow {
    pub match_index: usize,
    pub date: NaiveDate,
    pub team: String,
    pub opponent: String,
    pub is_home: u8,
    /// Matches of this team before this one
    pub prior_matches: usize,
    /// Meetings with this opponent before this one
    pub prior_meetings: usize,
    /// Values aligned with `FeatureLayout::names`; `None` means no data
    pub values: Vec<Option<f64>>,
}

impl TeamFeatureRow {
    pub fn get(&self, layout: &FeatureLayout, name: &str) -> Option<f64> {
        layout.position(name).and_then(|i| self.values[i])
    }
}

/// Trailing window over the last `size` observations
#[derive(Debug, Clone)]
struct RollingWindow {
    size: usize,
    values: VecDeque<Option<f64>>,
    sum: f64,
    count: usize,
}

impl RollingWindow {
    fn new(size: usize) -> Self {
        Self {
            size,
            values: VecDeque::with_capacity(size + 1),
            sum: 0.0,
            count: 0,
        }
    }

    fn push(&mut self, value: Option<f64>) {
        self.values.push_back(value);
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
        if self.values.len() > self.size {
            if let Some(Some(old)) = self.values.pop_front() {
                self.sum -= old;
                self.count -= 1;
            }
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    fn sum(&self) -> Option<f64> {
        (self.count > 0).then_some(self.sum)
    }

    fn max(&self) -> Option<f64> {
        self.values.iter().flatten().copied().reduce(f64::max)
    }

    /// Sample standard deviation; 0 below two observations
    fn std(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let mean = self.sum / self.count as f64;
        let ss: f64 = self.values.iter().flatten().map(|v| (v - mean).powi(2)).sum();
        (ss / (self.count - 1) as f64).sqrt()
    }
}

/// Exponentially weighted mean with adjusted weights over the full history
#[derive(Debug, Clone)]
struct Ewma {
    decay: f64,
    numerator: f64,
    denominator: f64,
}

impl Ewma {
    fn with_span(span: usize) -> Self {
        let alpha = 2.0 / (span as f64 + 1.0);
        Self {
            decay: 1.0 - alpha,
            numerator: 0.0,
            denominator: 0.0,
        }
    }

    fn push(&mut self, value: Option<f64>) {
        self.numerator *= self.decay;
        self.denominator *= self.decay;
        if let Some(v) = value {
            self.numerator += v;
            self.denominator += 1.0;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.denominator > 0.0).then(|| self.numerator / self.denominator)
    }
}

/// Per-window accumulators
#[derive(Debug, Clone)]
struct WindowState {
    goals_for: RollingWindow,
    goals_against: RollingWindow,
    points: RollingWindow,
    won: RollingWindow,
    drawn: RollingWindow,
    clean_sheet: RollingWindow,
    failed_to_score: RollingWindow,
}

impl WindowState {
    fn new(size: usize) -> Self {
        Self {
            goals_for: RollingWindow::new(size),
            goals_against: RollingWindow::new(size),
            points: RollingWindow::new(size),
            won: RollingWindow::new(size),
            drawn: RollingWindow::new(size),
            clean_sheet: RollingWindow::new(size),
            failed_to_score: RollingWindow::new(size),
        }
    }

    fn push(&mut self, record: &TeamMatchRecord) {
        let gf = record.goals_for.map(f64::from);
        let ga = record.goals_against.map(f64::from);
        self.goals_for.push(gf);
        self.goals_against.push(ga);
        self.points.push(Some(f64::from(record.points)));
        self.won.push(Some(f64::from(record.won)));
        self.drawn.push(Some(indicator(record.points == 1)));
        self.clean_sheet.push(record.goals_against.map(|g| indicator(g == 0)));
        self.failed_to_score.push(record.goals_for.map(|g| indicator(g == 0)));
    }

    /// Values in `WINDOW_STATS` order
    fn snapshot(&self, out: &mut Vec<Option<f64>>) {
        let gf = self.goals_for.mean();
        let ga = self.goals_against.mean();
        out.push(gf);
        out.push(ga);
        out.push(self.points.mean());
        out.push(gf.zip(ga).map(|(f, a)| f - a));
        out.push(self.won.mean());
        out.push(self.drawn.mean());
        out.push(self.clean_sheet.mean());
        out.push(self.failed_to_score.mean());
        out.push(Some(self.points.std()));
        out.push(self.goals_for.max());
        out.push(self.goals_against.max());
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Mean of present values, if at least `min_periods` are present
fn mean_with_min_periods<'a>(
    values: impl Iterator<Item = &'a Option<f64>>,
    min_periods: usize,
) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count >= min_periods && count > 0).then(|| sum / count as f64)
}

/// Everything carried across one team's chronological scan
#[derive(Debug, Clone)]
struct TeamState {
    windows: Vec<WindowState>,
    points_ewm: Ewma,
    goals_for_ewm: Ewma,
    goals_against_ewm: Ewma,
    win_streak: u32,
    unbeaten_streak: u32,
    last_date: Option<NaiveDate>,
    /// Last `2 * trend_window` goals for / against, oldest first
    goals_for_history: VecDeque<Option<f64>>,
    goals_against_history: VecDeque<Option<f64>>,
    matches_seen: usize,
}

impl TeamState {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            windows: config.windows.iter().map(|&w| WindowState::new(w)).collect(),
            points_ewm: Ewma::with_span(config.ewm_span),
            goals_for_ewm: Ewma::with_span(config.ewm_span),
            goals_against_ewm: Ewma::with_span(config.ewm_span),
            win_streak: 0,
            unbeaten_streak: 0,
            last_date: None,
            goals_for_history: VecDeque::with_capacity(config.trend_window * 2 + 1),
            goals_against_history: VecDeque::with_capacity(config.trend_window * 2 + 1),
            matches_seen: 0,
        }
    }

    /// Statistics as of just before a match on `date`
    fn snapshot(&self, date: NaiveDate, config: &PipelineConfig, out: &mut Vec<Option<f64>>) {
        for window in &self.windows {
            window.snapshot(out);
        }

        out.push(self.points_ewm.value());
        out.push(self.goals_for_ewm.value());
        out.push(self.goals_against_ewm.value());
        out.push(Some(f64::from(self.win_streak)));
        out.push(Some(f64::from(self.unbeaten_streak)));

        let days_rest = match self.last_date {
            Some(last) => (date - last).num_days() as f64,
            None => config.default_rest_days,
        };
        out.push(Some(days_rest));

        for window in &self.windows {
            out.push(window.points.sum());
        }

        out.push(Some(Self::trend(&self.goals_for_history, config)));
        out.push(Some(Self::trend(&self.goals_against_history, config)));
    }

    /// Mean of the latest window minus mean of the window before it, or 0
    fn trend(history: &VecDeque<Option<f64>>, config: &PipelineConfig) -> f64 {
        let tw = config.trend_window;
        let split = history.len().saturating_sub(tw);
        let recent = mean_with_min_periods(history.range(split..), config.trend_min_periods);
        let older = mean_with_min_periods(history.range(..split), config.trend_min_periods);
        match (recent, older) {
            (Some(r), Some(o)) => r - o,
            _ => 0.0,
        }
    }

    fn update(&mut self, record: &TeamMatchRecord, config: &PipelineConfig) {
        for window in &mut self.windows {
            window.push(record);
        }

        let gf = record.goals_for.map(f64::from);
        let ga = record.goals_against.map(f64::from);
        self.points_ewm.push(Some(f64::from(record.points)));
        self.goals_for_ewm.push(gf);
        self.goals_against_ewm.push(ga);

        self.win_streak = if record.won == 1 { self.win_streak + 1 } else { 0 };
        self.unbeaten_streak = if record.points > 0 {
            self.unbeaten_streak + 1
        } else {
            0
        };
        self.last_date = Some(record.date);

        let cap = config.trend_window * 2;
        self.goals_for_history.push_back(gf);
        self.goals_against_history.push_back(ga);
        while self.goals_for_history.len() > cap {
            self.goals_for_history.pop_front();
        }
        while self.goals_against_history.len() > cap {
            self.goals_against_history.pop_front();
        }

        self.matches_seen += 1;
    }
}

/// Head-to-head accumulators for one (team, opponent) pair
#[derive(Debug, Clone)]
struct PairState {
    won: RollingWindow,
    goals_for: RollingWindow,
    goals_against: RollingWindow,
    last_points: Option<u8>,
}

impl PairState {
    fn new(window: usize) -> Self {
        Self {
            won: RollingWindow::new(window),
            goals_for: RollingWindow::new(window),
            goals_against: RollingWindow::new(window),
            last_points: None,
        }
    }

    fn snapshot(&self) -> [Option<f64>; H2H_COLUMNS] {
        [
            self.won.mean(),
            self.goals_for.mean(),
            self.goals_against.mean(),
            // No prior meeting reads as a draw
            Some(self.last_points.map_or(1.0, f64::from)),
        ]
    }

    fn update(&mut self, record: &TeamMatchRecord) {
        self.won.push(Some(f64::from(record.won)));
        self.goals_for.push(record.goals_for.map(f64::from));
        self.goals_against.push(record.goals_against.map(f64::from));
        self.last_points = Some(record.points);
    }
}

/// Computes `TeamFeatureRow`s from team-perspective records
pub struct RollingFeatureEngine {
    config: PipelineConfig,
    layout: FeatureLayout,
}

impl RollingFeatureEngine {
    pub fn new(config: PipelineConfig) -> Self {
        let layout = FeatureLayout::new(&config);
        Self { config, layout }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Compute feature rows aligned one-to-one with `records`
    ///
    /// `records` must be sorted by (team, date) as produced by
    /// `to_team_perspective`. Teams and pairs are scanned in parallel; each
    /// scan is sequential and oldest-first.
    pub fn compute(&self, records: &[TeamMatchRecord]) -> Vec<TeamFeatureRow> {
        let groups = group_by_team(records);
        debug!("Scanning {} teams", groups.len());

        let form: Vec<(usize, Vec<Option<f64>>)> = groups
            .par_iter()
            .map(|group| self.scan_team(group))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        let pairs: Vec<Vec<usize>> = group_by_pair(records).into_values().collect();
        debug!("Scanning {} head-to-head pairs", pairs.len());

        let h2h_by_pair: Vec<Vec<(usize, usize, [Option<f64>; H2H_COLUMNS])>> = pairs
            .par_iter()
            .map(|indices| self.scan_pair(records, indices))
            .collect();

        let mut h2h: Vec<(usize, [Option<f64>; H2H_COLUMNS])> =
            vec![(0, [None; H2H_COLUMNS]); records.len()];
        for (idx, meetings, values) in h2h_by_pair.into_iter().flatten() {
            h2h[idx] = (meetings, values);
        }

        records
            .iter()
            .zip(form)
            .zip(h2h)
            .map(|((record, (prior_matches, mut values)), (prior_meetings, h2h_values))| {
                values.extend(h2h_values);
                debug_assert_eq!(values.len(), self.layout.len());
                TeamFeatureRow {
                    match_index: record.match_index,
                    date: record.date,
                    team: record.team.clone(),
                    opponent: record.opponent.clone(),
                    is_home: record.is_home,
                    prior_matches,
                    prior_meetings,
                    values,
                }
            })
            .collect()
    }

    fn scan_team(&self, group: &[TeamMatchRecord]) -> Vec<(usize, Vec<Option<f64>>)> {
        let mut state = TeamState::new(&self.config);
        let mut rows = Vec::with_capacity(group.len());

        for record in group {
            let mut values = Vec::with_capacity(self.layout.len());
            state.snapshot(record.date, &self.config, &mut values);
            debug_assert_eq!(values.len(), self.layout.h2h_offset());
            rows.push((state.matches_seen, values));
            state.update(record, &self.config);
        }

        rows
    }

    fn scan_pair(
        &self,
        records: &[TeamMatchRecord],
        indices: &[usize],
    ) -> Vec<(usize, usize, [Option<f64>; H2H_COLUMNS])> {
        let mut state = PairState::new(self.config.h2h_window);
        indices
            .iter()
            .enumerate()
            .map(|(meetings, &idx)| {
                let values = state.snapshot();
                state.update(&records[idx]);
                (idx, meetings, values)
            })
            .collect()
    }
}
