//! Team context for display: recent form, season record, head-to-head

use crate::data::csv_loader::FullTimeResult;
use crate::data::merge::{FeatureTable, MatchFeatureRow};
use crate::error::{PredictError, Result, Side};
use crate::models::{HeadToHead, TeamForm, TeamSummary};

/// Matches counted by `team_summary` (one league season)
pub const SUMMARY_MATCHES: usize = 38;
/// Meetings returned by `head_to_head`
pub const HEAD_TO_HEAD_MEETINGS: usize = 5;

/// "W", "D" or "L" for `team` in `row`
fn result_for(row: &MatchFeatureRow, team: &str) -> &'static str {
    let home = row.home_team == team;
    match (row.result, home) {
        (FullTimeResult::Draw, _) => "D",
        (FullTimeResult::Home, true) | (FullTimeResult::Away, false) => "W",
        _ => "L",
    }
}

/// Rows involving `team`, most recent first
fn recent_rows<'a>(
    table: &'a FeatureTable,
    team: &'a str,
) -> impl Iterator<Item = &'a MatchFeatureRow> + 'a {
    table
        .rows()
        .iter()
        .rev()
        .filter(move |r| r.home_team == team || r.away_team == team)
}

fn ensure_known(table: &FeatureTable, team: &str) -> Result<()> {
    if recent_rows(table, team).next().is_none() {
        return Err(PredictError::TeamNotFound {
            team: team.to_string(),
            side: Side::Home,
        });
    }
    Ok(())
}

/// Last `n` results of `team`, most recent first
pub fn recent_form(table: &FeatureTable, team: &str, n: usize) -> Result<TeamForm> {
    ensure_known(table, team)?;
    let results: Vec<String> = recent_rows(table, team)
        .take(n)
        .map(|r| result_for(r, team).to_string())
        .collect();
    let points = results
        .iter()
        .map(|r| match r.as_str() {
            "W" => 3,
            "D" => 1,
            _ => 0,
        })
        .sum();

    Ok(TeamForm {
        team: team.to_string(),
        results,
        points,
    })
}

/// Record over the team's last `SUMMARY_MATCHES` matches
pub fn team_summary(table: &FeatureTable, team: &str) -> Result<TeamSummary> {
    ensure_known(table, team)?;
    let mut summary = TeamSummary {
        team: team.to_string(),
        ..Default::default()
    };

    for row in recent_rows(table, team).take(SUMMARY_MATCHES) {
        summary.played += 1;
        match result_for(row, team) {
            "W" => summary.wins += 1,
            "D" => summary.draws += 1,
            _ => summary.losses += 1,
        }
        let (scored, conceded) = if row.home_team == team {
            (row.home_goals, row.away_goals)
        } else {
            (row.away_goals, row.home_goals)
        };
        summary.goals_for += scored.unwrap_or(0);
        summary.goals_against += conceded.unwrap_or(0);
    }

    summary.points = (summary.wins * 3 + summary.draws) as u32;
    summary.goal_difference = i64::from(summary.goals_for) - i64::from(summary.goals_against);
    if summary.played > 0 {
        summary.win_rate = summary.wins as f64 / summary.played as f64 * 100.0;
    }
    Ok(summary)
}

/// Summaries for every team in the table, alphabetically
pub fn league_summary(table: &FeatureTable) -> Result<Vec<TeamSummary>> {
    table
        .teams()
        .iter()
        .map(|team| team_summary(table, team))
        .collect()
}

/// Last `HEAD_TO_HEAD_MEETINGS` meetings at either venue, from `team`'s side
pub fn head_to_head(table: &FeatureTable, team: &str, opponent: &str) -> HeadToHead {
    let results: Vec<String> = recent_rows(table, team)
        .filter(|r| r.home_team == opponent || r.away_team == opponent)
        .take(HEAD_TO_HEAD_MEETINGS)
        .map(|r| result_for(r, team).to_string())
        .collect();
    let count = |code: &str| results.iter().filter(|r| *r == code).count();

    HeadToHead {
        team: team.to_string(),
        opponent: opponent.to_string(),
        wins: count("W"),
        draws: count("D"),
        losses: count("L"),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::feature_store::{read_feature_table, write_feature_table};
    use crate::data::test_support::{build_table, small_league};
    use tempfile::tempdir;

    #[test]
    fn test_recent_form() {
        let (table, _) = build_table(&small_league());
        // Arsenal: W vs Brentford, L at Everton, D vs Chelsea
        let form = recent_form(&table, "Arsenal", 5).unwrap();
        assert_eq!(form.results, vec!["D", "L", "W"]);
        assert_eq!(form.points, 4);

        let form = recent_form(&table, "Arsenal", 2).unwrap();
        assert_eq!(form.results, vec!["D", "L"]);
    }

    #[test]
    fn test_unknown_team() {
        let (table, _) = build_table(&small_league());
        let err = recent_form(&table, "Fulham", 5).unwrap_err();
        assert!(matches!(err, PredictError::TeamNotFound { .. }));
        assert!(team_summary(&table, "Fulham").is_err());
    }

    #[test]
    fn test_team_summary() {
        let (table, _) = build_table(&small_league());
        let summary = team_summary(&table, "Chelsea").unwrap();
        assert_eq!(summary.played, 3);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.draws, 2);
        assert_eq!(summary.losses, 0);
        assert_eq!(summary.goals_for, 5);
        assert_eq!(summary.goals_against, 2);
        assert_eq!(summary.goal_difference, 3);
        assert_eq!(summary.points, 5);
        assert!((summary.win_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_league_summary_from_stored_table() {
        let (table, _) = build_table(&small_league());
        let dir = tempdir().unwrap();
        let path = dir.path().join("features.csv");
        write_feature_table(&table, &path).unwrap();

        // Only the feature table is needed, no model artifacts
        let stored = read_feature_table(&path).unwrap();
        let summaries = league_summary(&stored).unwrap();
        assert_eq!(summaries.len(), table.teams().len());

        let chelsea = summaries.iter().find(|s| s.team == "Chelsea").unwrap();
        assert_eq!(chelsea.points, 5);
        assert_eq!(chelsea.played, 3);
    }

    #[test]
    fn test_head_to_head() {
        let (table, _) = build_table(&small_league());
        let h2h = head_to_head(&table, "Everton", "Arsenal");
        assert_eq!(h2h.results, vec!["W"]);
        assert_eq!(h2h.wins, 1);

        let reverse = head_to_head(&table, "Arsenal", "Everton");
        assert_eq!(reverse.results, vec!["L"]);

        let brentford = head_to_head(&table, "Brentford", "Everton");
        assert_eq!(brentford.results, vec!["W"]);
        assert!(head_to_head(&table, "Arsenal", "Fulham").results.is_empty());
    }
}
