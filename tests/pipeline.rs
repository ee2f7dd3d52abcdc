//! End-to-end checks across the pipeline and the serving layer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use epl_predictor::config::{EnsembleConfig, PipelineConfig, ServingConfig};
use epl_predictor::data::{FeatureMerger, MatchTable, RawMatchRow};
use epl_predictor::error::{PredictError, Result, Side};
use epl_predictor::pipeline::{FeaturePipeline, PipelineOutput};
use epl_predictor::predictor::{EnsemblePredictor, MatchPredictor, ProbabilityModel};
use epl_predictor::schema::FeatureSchema;
use tempfile::tempdir;

const EPS: f64 = 1e-9;

fn raw(date: &str, home: &str, away: &str, hg: u32, ag: u32) -> RawMatchRow {
    let result = match hg.cmp(&ag) {
        std::cmp::Ordering::Greater => "H",
        std::cmp::Ordering::Less => "A",
        std::cmp::Ordering::Equal => "D",
    };
    RawMatchRow {
        date: date.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_goals: Some(hg),
        away_goals: Some(ag),
        result: result.to_string(),
        season: Some("2023-24".to_string()),
    }
}

/// Four teams, six rounds, two matches per round
fn six_rounds() -> Vec<RawMatchRow> {
    vec![
        raw("05/08/2023", "Arsenal", "Brentford", 2, 0),
        raw("05/08/2023", "Chelsea", "Everton", 1, 1),
        raw("12/08/2023", "Chelsea", "Arsenal", 2, 1),
        raw("12/08/2023", "Everton", "Brentford", 0, 2),
        raw("19/08/2023", "Arsenal", "Everton", 3, 1),
        raw("19/08/2023", "Brentford", "Chelsea", 0, 0),
        raw("26/08/2023", "Brentford", "Arsenal", 1, 1),
        raw("26/08/2023", "Everton", "Chelsea", 2, 3),
        raw("02/09/2023", "Arsenal", "Chelsea", 0, 0),
        raw("02/09/2023", "Brentford", "Everton", 2, 1),
        raw("09/09/2023", "Everton", "Arsenal", 1, 2),
        raw("09/09/2023", "Chelsea", "Brentford", 3, 0),
    ]
}

fn run(rows: Vec<RawMatchRow>) -> PipelineOutput {
    let table = MatchTable::prepare(rows).unwrap();
    FeaturePipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&table)
        .unwrap()
}

fn value(output: &PipelineOutput, row: usize, column: &str) -> f64 {
    output
        .table
        .value(row, column)
        .unwrap_or_else(|| panic!("no column {}", column))
}

struct CountingModel {
    name: &'static str,
    probs: [f64; 3],
    calls: Arc<AtomicUsize>,
}

impl ProbabilityModel for CountingModel {
    fn name(&self) -> &str {
        self.name
    }

    fn predict_proba(&self, _features: &[f32]) -> Result<[f64; 3]> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probs)
    }
}

fn counting(
    name: &'static str,
    probs: [f64; 3],
) -> (Box<dyn ProbabilityModel>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = CountingModel {
        name,
        probs,
        calls: calls.clone(),
    };
    (Box::new(model), calls)
}

#[test]
fn test_end_to_end_four_teams_six_rounds() {
    let output = run(six_rounds());

    assert_eq!(output.report.matches, 12);
    assert_eq!(output.report.team_records, 24);
    assert_eq!(output.table.len(), 12);
    assert_eq!(output.report.merge.rows_dropped, 0);
    assert_eq!(output.table.columns().len(), 120);

    // Row 8: Arsenal v Chelsea on 2 Sep, after four rounds each
    let row = &output.table.rows()[8];
    assert_eq!(row.home_team, "Arsenal");
    assert_eq!(row.away_team, "Chelsea");

    // Arsenal: W 2-0, L 1-2, W 3-1, D 1-1
    assert!((value(&output, 8, "win_ratio_3_home") - 1.0 / 3.0).abs() < EPS);
    assert!((value(&output, 8, "goal_diff_avg_5_home") - 0.75).abs() < EPS);
    assert!((value(&output, 8, "points_sum_3_home") - 4.0).abs() < EPS);
    assert_eq!(value(&output, 8, "win_streak_home"), 0.0);
    assert_eq!(value(&output, 8, "unbeaten_streak_home"), 1.0);
    assert_eq!(value(&output, 8, "days_rest_home"), 7.0);

    // Chelsea: D 1-1, W 2-1, D 0-0, W 3-2
    assert!((value(&output, 8, "win_ratio_3_away") - 2.0 / 3.0).abs() < EPS);
    assert!((value(&output, 8, "goal_diff_avg_5_away") - 0.5).abs() < EPS);
    assert_eq!(value(&output, 8, "win_streak_away"), 1.0);
    assert_eq!(value(&output, 8, "unbeaten_streak_away"), 4.0);

    // Differentials
    assert!((value(&output, 8, "win_ratio_diff_3") + 1.0 / 3.0).abs() < EPS);
    assert!((value(&output, 8, "goal_diff_form_5") - 0.25).abs() < EPS);
    assert!((value(&output, 8, "defense_diff_3") + 1.0 / 3.0).abs() < EPS);

    // Chelsea beat Arsenal in the only earlier meeting
    assert_eq!(value(&output, 8, "h2h_win_pct_3_home"), 0.0);
    assert_eq!(value(&output, 8, "h2h_win_pct_3_away"), 1.0);
    assert_eq!(value(&output, 8, "h2h_last_result_home"), 0.0);
    assert_eq!(value(&output, 8, "h2h_advantage"), -1.0);
}

#[test]
fn test_first_match_defaults() {
    let output = run(six_rounds());

    assert_eq!(value(&output, 0, "days_rest_home"), 7.0);
    assert_eq!(value(&output, 0, "days_rest_away"), 7.0);
    assert_eq!(value(&output, 0, "win_streak_home"), 0.0);
    // No prior meeting reads as a draw
    assert_eq!(value(&output, 0, "h2h_last_result_home"), 1.0);
    // First-round rows are kept and zero-filled
    assert_eq!(value(&output, 0, "goals_for_avg_3_home"), 0.0);
    assert!(output.report.merge.partial_rows >= 2);
}

#[test]
fn test_no_look_ahead() {
    let full = run(six_rounds());

    // Dropping the last two rounds leaves earlier rows untouched
    let truncated = run(six_rounds().into_iter().take(8).collect());
    assert_eq!(truncated.table.len(), 8);
    assert_eq!(&full.table.rows()[..8], truncated.table.rows());

    // So does rewriting the final round's scores
    let mut rewritten = six_rounds();
    rewritten[10] = raw("09/09/2023", "Everton", "Arsenal", 5, 0);
    rewritten[11] = raw("09/09/2023", "Chelsea", "Brentford", 0, 4);
    let rewritten = run(rewritten);
    assert_eq!(&full.table.rows()[..10], &rewritten.table.rows()[..10]);
}

#[test]
fn test_streak_scenario() {
    // Hull: L, W, W, W, D, then a sixth match
    let rows = vec![
        raw("05/08/2023", "Hull", "Leeds", 0, 1),
        raw("12/08/2023", "Hull", "Stoke", 2, 0),
        raw("19/08/2023", "Hull", "Millwall", 1, 0),
        raw("26/08/2023", "Hull", "Watford", 3, 1),
        raw("02/09/2023", "Hull", "Preston", 1, 1),
        raw("09/09/2023", "Hull", "Coventry", 2, 2),
    ];
    let output = run(rows);

    // Before the draw: [L, W, W, W]
    assert_eq!(value(&output, 4, "win_streak_home"), 3.0);
    assert_eq!(value(&output, 4, "unbeaten_streak_home"), 3.0);
    // After it: [L, W, W, W, D]
    assert_eq!(value(&output, 5, "win_streak_home"), 0.0);
    assert_eq!(value(&output, 5, "unbeaten_streak_home"), 4.0);
}

#[test]
fn test_schema_stability() {
    let first = run(six_rounds());
    let second = run(six_rounds().into_iter().take(6).collect());
    assert_eq!(first.table.columns(), second.table.columns());
    assert_eq!(first.schema.names(), second.schema.names());

    let dir = tempdir().unwrap();
    let features = dir.path().join("features.csv");
    let schema_path = dir.path().join("feature_schema.json");
    FeaturePipeline::write(&first, &features, &schema_path).unwrap();

    let schema = FeatureSchema::load(&schema_path).unwrap();
    assert_eq!(schema.names(), first.schema.names());
    schema.validate_table(&second.table).unwrap();
}

#[test]
fn test_differential_symmetry() {
    let output = run(six_rounds());
    let merger = FeatureMerger::new(&PipelineConfig::default());
    let table = &output.table;

    let home = |source: &str| table.value(8, &format!("{}_home", source));
    let away = |source: &str| table.value(8, &format!("{}_away", source));

    let forward = merger.compute_differentials(home, away);
    let swapped = merger.compute_differentials(away, home);
    assert_eq!(forward.len(), 24);

    for (i, (f, s)) in forward.iter().zip(&swapped).enumerate() {
        let (f, s) = (f.unwrap(), s.unwrap());
        assert!((f + s).abs() < EPS, "differential {} not antisymmetric", i);

        let name = &merger.differentials()[i].name;
        assert!((f - value(&output, 8, name)).abs() < EPS, "{} differs from table", name);
    }
}

#[test]
fn test_mirrored_fixtures_swap_sides() {
    let original = run(six_rounds());
    let mirrored = run(
        six_rounds()
            .into_iter()
            .map(|r| {
                let (hg, ag) = (r.home_goals.unwrap(), r.away_goals.unwrap());
                raw(&r.date, &r.away_team, &r.home_team, ag, hg)
            })
            .collect(),
    );
    assert_eq!(original.table.len(), mirrored.table.len());
    assert_eq!(original.table.columns(), mirrored.table.columns());

    let close = |a: f64, b: f64| (a - b).abs() < EPS;
    let merger = FeatureMerger::new(&PipelineConfig::default());

    for (i, (o, m)) in original.table.rows().iter().zip(mirrored.table.rows()).enumerate() {
        assert_eq!(o.home_team, m.away_team);
        assert_eq!(o.away_team, m.home_team);

        for column in original.table.columns() {
            let Some(stem) = column.strip_suffix("_home") else {
                continue;
            };
            let away = format!("{}_away", stem);
            assert!(
                close(value(&original, i, column), value(&mirrored, i, &away)),
                "row {}: {} does not match mirrored {}",
                i,
                column,
                away
            );
            assert!(
                close(value(&original, i, &away), value(&mirrored, i, column)),
                "row {}: {} does not match mirrored {}",
                i,
                away,
                column
            );
        }

        for diff in merger.differentials() {
            assert!(
                close(value(&original, i, &diff.name), -value(&mirrored, i, &diff.name)),
                "row {}: {} does not flip sign",
                i,
                diff.name
            );
        }
    }
}

#[test]
fn test_ensemble_linearity() {
    let (primary, _) = counting("primary", [0.5, 0.3, 0.2]);
    let (secondary, _) = counting("secondary", [0.2, 0.3, 0.5]);
    let ensemble =
        EnsemblePredictor::new(primary, Some(secondary), EnsembleConfig::default()).unwrap();

    let output = ensemble.predict(&[0.0; 120], true).unwrap();
    let expected = [0.38, 0.30, 0.32];
    for (p, e) in output.probabilities.iter().zip(expected) {
        assert!((p - e).abs() < EPS);
    }
    assert!((output.probabilities.iter().sum::<f64>() - 1.0).abs() < EPS);
    assert_eq!(output.components.len(), 2);
}

#[test]
fn test_team_not_found_skips_models() {
    let output = run(six_rounds());
    let (primary, calls) = counting("primary", [0.5, 0.3, 0.2]);
    let ensemble = EnsemblePredictor::new(primary, None, EnsembleConfig::default()).unwrap();
    let serving = ServingConfig::default();
    let predictor = MatchPredictor::new(output.table, output.schema, ensemble, serving).unwrap();

    let err = predictor.predict("Fulham", "Arsenal", None).unwrap_err();
    assert!(matches!(
        err,
        PredictError::TeamNotFound { ref team, side: Side::Home } if team == "Fulham"
    ));
    assert!(err.is_caller_error());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let fixtures = vec![
        ("Arsenal".to_string(), "Chelsea".to_string()),
        ("Arsenal".to_string(), "Fulham".to_string()),
    ];
    let results = predictor.predict_many(&fixtures, None);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(PredictError::TeamNotFound { side: Side::Away, .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
