//! Match table loading: raw result CSVs to a date-ordered match sequence

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{PredictError, Result};

/// Columns every raw results file must carry
pub const REQUIRED_COLUMNS: [&str; 6] = ["Date", "HomeTeam", "AwayTeam", "FTHG", "FTAG", "FTR"];

/// Day-first formats are tried before ISO ones
const DATE_FORMATS: [&str; 5] = ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// `%Y` happily reads "23" as year 23, so two-digit years get their own pass
const SHORT_YEAR_FORMATS: [&str; 3] = ["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

/// Full-time result code (FTR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FullTimeResult {
    Home,
    Draw,
    Away,
}

impl FullTimeResult {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "H" => Some(FullTimeResult::Home),
            "D" => Some(FullTimeResult::Draw),
            "A" => Some(FullTimeResult::Away),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FullTimeResult::Home => "H",
            FullTimeResult::Draw => "D",
            FullTimeResult::Away => "A",
        }
    }

    /// Class index used by the classifiers: H=0, D=1, A=2
    pub fn class_index(&self) -> usize {
        match self {
            FullTimeResult::Home => 0,
            FullTimeResult::Draw => 1,
            FullTimeResult::Away => 2,
        }
    }

    pub fn home_points(&self) -> u8 {
        match self {
            FullTimeResult::Home => 3,
            FullTimeResult::Draw => 1,
            FullTimeResult::Away => 0,
        }
    }

    pub fn away_points(&self) -> u8 {
        match self {
            FullTimeResult::Home => 0,
            FullTimeResult::Draw => 1,
            FullTimeResult::Away => 3,
        }
    }
}

/// One row as read from a results file, before validation
#[derive(Debug, Clone, Default)]
pub struct RawMatchRow {
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub result: String,
    pub season: Option<String>,
}

/// A validated match, immutable once the table is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Position in the date-ordered table
    pub index: usize,
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub result: FullTimeResult,
    pub season: Option<String>,
}

impl MatchRecord {
    pub fn home_points(&self) -> u8 {
        self.result.home_points()
    }

    pub fn away_points(&self) -> u8 {
        self.result.away_points()
    }

    pub fn home_win(&self) -> u8 {
        (self.result == FullTimeResult::Home) as u8
    }

    pub fn away_win(&self) -> u8 {
        (self.result == FullTimeResult::Away) as u8
    }

    pub fn draw(&self) -> u8 {
        (self.result == FullTimeResult::Draw) as u8
    }
}

/// Parse a match date, tolerating day-first and mixed formats
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let short_year = s.rsplit(['/', '-', '.']).next().is_some_and(|y| y.len() == 2);
    if short_year {
        if let Some(date) = SHORT_YEAR_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        {
            return Some(date);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Date-ordered, validated match table
#[derive(Debug, Clone)]
pub struct MatchTable {
    matches: Vec<MatchRecord>,
    dropped_dates: usize,
    dropped_results: usize,
}

impl MatchTable {
    /// Load and prepare a single results CSV
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self> {
        let rows = Self::read_raw_rows(csv_path, None)?;
        Self::prepare(rows)
    }

    /// Load several season files, tagging each row with its season label
    pub fn load_seasons<P: AsRef<Path>>(files: &[(P, &str)]) -> Result<Self> {
        let mut rows = Vec::new();
        for (path, season) in files {
            let season_rows = Self::read_raw_rows(path, Some(*season))?;
            info!(
                "Loaded {} rows for season {} from {:?}",
                season_rows.len(),
                season,
                path.as_ref()
            );
            rows.extend(season_rows);
        }
        Self::prepare(rows)
    }

    /// Read raw rows without any validation beyond required columns
    pub fn read_raw_rows<P: AsRef<Path>>(
        csv_path: P,
        season: Option<&str>,
    ) -> Result<Vec<RawMatchRow>> {
        let df = CsvReadOptions::default()
            .with_infer_schema_length(Some(10_000))
            .try_into_reader_with_file_path(Some(csv_path.as_ref().to_path_buf()))?
            .finish()?;

        Self::dataframe_to_rows(&df, season)
    }

    /// Convert a raw results DataFrame to rows
    pub fn dataframe_to_rows(df: &DataFrame, season: Option<&str>) -> Result<Vec<RawMatchRow>> {
        for column in REQUIRED_COLUMNS {
            if df.column(column).is_err() {
                return Err(PredictError::data_integrity(
                    "match table",
                    format!("required column '{}' is missing", column),
                ));
            }
        }

        let date_owned = df.column("Date")?.cast(&DataType::String)?;
        let home_owned = df.column("HomeTeam")?.cast(&DataType::String)?;
        let away_owned = df.column("AwayTeam")?.cast(&DataType::String)?;
        let fthg_owned = df.column("FTHG")?.cast(&DataType::Int64)?;
        let ftag_owned = df.column("FTAG")?.cast(&DataType::Int64)?;
        let ftr_owned = df.column("FTR")?.cast(&DataType::String)?;

        let date_col = date_owned.str()?;
        let home_col = home_owned.str()?;
        let away_col = away_owned.str()?;
        let fthg_col = fthg_owned.i64()?;
        let ftag_col = ftag_owned.i64()?;
        let ftr_col = ftr_owned.str()?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            rows.push(RawMatchRow {
                date: date_col.get(i).unwrap_or("").to_string(),
                home_team: home_col.get(i).unwrap_or("").trim().to_string(),
                away_team: away_col.get(i).unwrap_or("").trim().to_string(),
                home_goals: fthg_col.get(i).and_then(|g| u32::try_from(g).ok()),
                away_goals: ftag_col.get(i).and_then(|g| u32::try_from(g).ok()),
                result: ftr_col.get(i).unwrap_or("").to_string(),
                season: season.map(str::to_string),
            });
        }

        Ok(rows)
    }

    /// Validate, sort by date (stable) and index raw rows
    ///
    /// Rows with unparseable dates or result codes are dropped; an empty
    /// result is a data integrity error.
    pub fn prepare(rows: Vec<RawMatchRow>) -> Result<Self> {
        let total = rows.len();
        let mut dropped_dates = 0;
        let mut dropped_results = 0;
        let mut matches = Vec::with_capacity(total);

        for row in rows {
            let Some(date) = parse_match_date(&row.date) else {
                dropped_dates += 1;
                continue;
            };
            let Some(result) = FullTimeResult::from_code(&row.result) else {
                dropped_results += 1;
                continue;
            };
            if row.home_team.is_empty() || row.away_team.is_empty() {
                dropped_results += 1;
                continue;
            }

            matches.push(MatchRecord {
                index: 0,
                date,
                home_team: row.home_team,
                away_team: row.away_team,
                home_goals: row.home_goals,
                away_goals: row.away_goals,
                result,
                season: row.season,
            });
        }

        if dropped_dates > 0 {
            warn!("Dropped {} rows with unparseable dates", dropped_dates);
        }
        if dropped_results > 0 {
            warn!("Dropped {} rows with invalid result codes or team names", dropped_results);
        }

        if matches.is_empty() {
            return Err(PredictError::data_integrity(
                "match table",
                format!("no usable rows out of {}", total),
            ));
        }

        // Vec::sort_by_key is stable, so same-day matches keep input order
        matches.sort_by_key(|m| m.date);
        for (i, m) in matches.iter_mut().enumerate() {
            m.index = i;
        }

        info!(
            "Prepared {} matches ({} to {})",
            matches.len(),
            matches[0].date,
            matches[matches.len() - 1].date
        );

        Ok(Self {
            matches,
            dropped_dates,
            dropped_results,
        })
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    /// Rows dropped for unparseable dates
    pub fn dropped_dates(&self) -> usize {
        self.dropped_dates
    }

    /// Rows dropped for invalid result codes or empty team names
    pub fn dropped_results(&self) -> usize {
        self.dropped_results
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}
