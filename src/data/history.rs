//! Team perspective
//!
//! Unpivots match-centric rows into one chronological record per team per
//! match, and groups those records by team and by (team, opponent) pair.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::csv_loader::MatchRecord;

/// One team's view of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMatchRecord {
    /// Index of the originating match in the match table
    pub match_index: usize,
    pub date: NaiveDate,
    pub team: String,
    pub opponent: String,
    pub goals_for: Option<u32>,
    pub goals_against: Option<u32>,
    pub points: u8,
    pub won: u8,
    pub is_home: u8,
}

/// Emit a home and an away record per match, sorted by (team, date, match)
pub fn to_team_perspective(matches: &[MatchRecord]) -> Vec<TeamMatchRecord> {
    let mut records = Vec::with_capacity(matches.len() * 2);

    for m in matches {
        records.push(TeamMatchRecord {
            match_index: m.index,
            date: m.date,
            team: m.home_team.clone(),
            opponent: m.away_team.clone(),
            goals_for: m.home_goals,
            goals_against: m.away_goals,
            points: m.home_points(),
            won: m.home_win(),
            is_home: 1,
        });
        records.push(TeamMatchRecord {
            match_index: m.index,
            date: m.date,
            team: m.away_team.clone(),
            opponent: m.home_team.clone(),
            goals_for: m.away_goals,
            goals_against: m.home_goals,
            points: m.away_points(),
            won: m.away_win(),
            is_home: 0,
        });
    }

    records.sort_by(|a, b| {
        a.team
            .cmp(&b.team)
            .then(a.date.cmp(&b.date))
            .then(a.match_index.cmp(&b.match_index))
    });

    records
}

/// Split team-sorted records into per-team chronological slices
pub fn group_by_team(records: &[TeamMatchRecord]) -> Vec<&[TeamMatchRecord]> {
    records.chunk_by(|a, b| a.team == b.team).collect()
}

/// Indices of each (team, opponent) pair's records, chronological within the pair
///
/// `records` must be sorted the way `to_team_perspective` sorts them.
pub fn group_by_pair(records: &[TeamMatchRecord]) -> BTreeMap<(&str, &str), Vec<usize>> {
    let mut pairs: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        pairs
            .entry((r.team.as_str(), r.opponent.as_str()))
            .or_default()
            .push(i);
    }
    pairs
}
