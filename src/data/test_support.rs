//! Shared fixtures for unit tests

use chrono::NaiveDate;

use crate::config::PipelineConfig;
use crate::data::csv_loader::{FullTimeResult, MatchRecord};
use crate::data::features::RollingFeatureEngine;
use crate::data::history::to_team_perspective;
use crate::data::merge::{FeatureMerger, FeatureTable};
use crate::schema::FeatureSchema;

pub fn fixture(index: usize, day: u32, home: &str, away: &str, hg: u32, ag: u32) -> MatchRecord {
    let result = match hg.cmp(&ag) {
        std::cmp::Ordering::Greater => FullTimeResult::Home,
        std::cmp::Ordering::Less => FullTimeResult::Away,
        std::cmp::Ordering::Equal => FullTimeResult::Draw,
    };
    MatchRecord {
        index,
        date: NaiveDate::from_ymd_opt(2023, 8, day).unwrap(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_goals: Some(hg),
        away_goals: Some(ag),
        result,
        season: None,
    }
}

/// Three rounds between four teams
pub fn small_league() -> Vec<MatchRecord> {
    vec![
        fixture(0, 5, "Arsenal", "Brentford", 2, 0),
        fixture(1, 5, "Chelsea", "Everton", 1, 1),
        fixture(2, 12, "Brentford", "Chelsea", 0, 3),
        fixture(3, 12, "Everton", "Arsenal", 2, 1),
        fixture(4, 19, "Arsenal", "Chelsea", 1, 1),
        fixture(5, 19, "Everton", "Brentford", 0, 2),
    ]
}

pub fn build_table(matches: &[MatchRecord]) -> (FeatureTable, FeatureSchema) {
    let config = PipelineConfig::default();
    let rows = RollingFeatureEngine::new(config.clone()).compute(&to_team_perspective(matches));
    let (table, _) = FeatureMerger::new(&config).merge(matches, &rows).unwrap();
    let schema = FeatureSchema::from_columns(table.columns(), &config);
    (table, schema)
}
