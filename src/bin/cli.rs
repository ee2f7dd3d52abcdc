//! EPL CLI - Command-line interface for Premier League match predictions

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use epl_predictor::context::{head_to_head, league_summary, recent_form};
use epl_predictor::data::read_feature_table;
use epl_predictor::evaluation::{chronological_split, evaluate, EvaluationReport, DEFAULT_TEST_SIZE};
use epl_predictor::models::{MatchPrediction, Outcome, Signal};
use epl_predictor::pipeline::FeaturePipeline;
use epl_predictor::schema::SCHEMA_FILE;
use epl_predictor::{AppConfig, DifferentialPolicy, FeatureTable, MatchPredictor};

const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_FEATURES_PATH: &str = "data/features.csv";
const FORM_MATCHES: usize = 5;

#[derive(Parser)]
#[command(name = "epl")]
#[command(author, version, about = "Premier League match prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Directory holding the ONNX models and feature schema
    #[arg(long, default_value = DEFAULT_MODEL_DIR)]
    model_dir: PathBuf,

    /// Feature table CSV
    #[arg(long, default_value = DEFAULT_FEATURES_PATH)]
    features: PathBuf,

    /// JSON configuration file (pipeline and serving settings)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log pipeline progress (RUST_LOG overrides the level)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the feature table and schema from results CSVs
    BuildFeatures {
        /// Results CSV files, oldest season first
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Season label per input file (defaults to the file name)
        #[arg(short, long)]
        season: Vec<String>,
    },

    /// List teams with historical data
    Teams {
        /// Show each team's recent record
        #[arg(long)]
        summary: bool,
    },

    /// Predict a single fixture
    Predict {
        /// Home team
        #[arg(long)]
        home: String,

        /// Away team
        #[arg(long)]
        away: String,

        /// Use the primary model only
        #[arg(long)]
        single_model: bool,

        /// Recompute differential features from the latest team rows
        #[arg(long)]
        recompute_differentials: bool,

        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate the models on the most recent matches
    Evaluate {
        /// Share of matches held out for testing
        #[arg(long, default_value_t = DEFAULT_TEST_SIZE)]
        test_size: f64,
    },
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => AppConfig::from_json_file(p)
            .with_context(|| format!("Failed to load config from {:?}", p)),
        None => Ok(AppConfig::default()),
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    Ok(pb)
}

fn load_predictor(cli: &Cli, config: &AppConfig) -> Result<MatchPredictor> {
    let pb = spinner("Loading models and feature table...")?;
    let predictor = MatchPredictor::load(&cli.model_dir, &cli.features, config.serving.clone())
        .with_context(|| {
            format!(
                "Failed to load predictor (models: {:?}, features: {:?})",
                cli.model_dir, cli.features
            )
        });
    pb.finish_and_clear();
    predictor
}

fn load_feature_table(cli: &Cli) -> Result<FeatureTable> {
    let pb = spinner("Loading feature table...")?;
    let table = read_feature_table(&cli.features)
        .with_context(|| format!("Failed to load feature table {:?}", cli.features));
    pb.finish_and_clear();
    table
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    println!("{}", "EPL Predictor CLI v0.3.0".cyan().bold());
    println!();

    let mut config = load_config(cli.config.as_deref())?;

    if cli.interactive {
        let predictor = load_predictor(&cli, &config)?;
        run_interactive(&predictor)?;
    } else if let Some(command) = &cli.command {
        match command {
            Commands::BuildFeatures { input, season } => {
                build_features(&cli, &config, input, season)?;
            }
            Commands::Teams { summary } => {
                let table = load_feature_table(&cli)?;
                list_teams(&table, *summary)?;
            }
            Commands::Predict {
                home,
                away,
                single_model,
                recompute_differentials,
                json,
            } => {
                if *recompute_differentials {
                    config.serving.differential_policy = DifferentialPolicy::Recompute;
                }
                let predictor = load_predictor(&cli, &config)?;
                let use_ensemble = single_model.then_some(false);
                predict_fixture(&predictor, home, away, use_ensemble, *json)?;
            }
            Commands::Evaluate { test_size } => {
                let predictor = load_predictor(&cli, &config)?;
                run_evaluation(&predictor, *test_size)?;
            }
        }
    } else {
        println!("Use --help for usage information or --interactive for interactive mode.");
    }

    Ok(())
}

fn build_features(
    cli: &Cli,
    config: &AppConfig,
    inputs: &[PathBuf],
    seasons: &[String],
) -> Result<()> {
    if !seasons.is_empty() && seasons.len() != inputs.len() {
        bail!(
            "{} season labels given for {} input files",
            seasons.len(),
            inputs.len()
        );
    }

    let labels: Vec<String> = inputs
        .iter()
        .enumerate()
        .map(|(i, path)| {
            seasons.get(i).cloned().unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("season_{}", i + 1))
            })
        })
        .collect();
    let files: Vec<(&Path, &str)> = inputs
        .iter()
        .map(PathBuf::as_path)
        .zip(labels.iter().map(String::as_str))
        .collect();

    println!("{}", "Building features...".green());
    for (path, label) in &files {
        println!("  {} {:?}", format!("[{}]", label).dimmed(), path);
    }
    println!();

    let pipeline =
        FeaturePipeline::new(config.pipeline.clone()).context("Invalid pipeline config")?;

    let pb = spinner("Computing rolling features...")?;
    let output = pipeline.run_files(&files).context("Feature pipeline failed");
    pb.finish_and_clear();
    let output = output?;

    let schema_path = cli.model_dir.join(SCHEMA_FILE);
    FeaturePipeline::write(&output, &cli.features, &schema_path)
        .context("Failed to write pipeline outputs")?;

    let report = &output.report;
    println!("{}", "Pipeline Summary:".yellow().bold());
    println!("{}", "-".repeat(40));
    println!("{:<24} {:>10}", "Matches", report.matches);
    println!("{:<24} {:>10}", "Dropped (bad date)", report.dropped_dates);
    println!("{:<24} {:>10}", "Dropped (bad result)", report.dropped_results);
    println!("{:<24} {:>10}", "Team records", report.team_records);
    println!("{:<24} {:>10}", "Rows kept", report.merge.rows_kept);
    println!("{:<24} {:>10}", "Rows dropped (missing)", report.merge.rows_dropped);
    println!("{:<24} {:>10}", "Rows zero-filled", report.merge.partial_rows);
    println!("{:<24} {:>10}", "Feature columns", output.schema.len());
    println!();
    println!("Features: {:?}", cli.features);
    println!("Schema:   {:?}", schema_path);

    Ok(())
}

fn list_teams(table: &FeatureTable, summary: bool) -> Result<()> {
    let teams = table.teams();
    println!("{} ({})", "Teams:".yellow().bold(), teams.len());

    if !summary {
        for team in &teams {
            println!("  {}", team);
        }
        return Ok(());
    }

    println!(
        "{:<20} {:>4} {:>4} {:>4} {:>4} {:>5} {:>5} {:>5} {:>5} {:>7}",
        "Team", "P", "W", "D", "L", "GF", "GA", "GD", "Pts", "Win %"
    );
    println!("{}", "-".repeat(76));
    for s in league_summary(table)? {
        println!(
            "{:<20} {:>4} {:>4} {:>4} {:>4} {:>5} {:>5} {:>+5} {:>5} {:>6.1}%",
            s.team, s.played, s.wins, s.draws, s.losses, s.goals_for, s.goals_against,
            s.goal_difference, s.points, s.win_rate
        );
    }
    Ok(())
}

fn colored_result(code: &str) -> String {
    match code {
        "W" => code.green().bold().to_string(),
        "D" => code.yellow().to_string(),
        _ => code.red().to_string(),
    }
}

fn signal_line(prediction: &MatchPrediction) -> String {
    let text = prediction.signal.describe(prediction.predicted_outcome);
    match prediction.signal {
        Signal::Strong => text.green().bold().to_string(),
        Signal::Moderate => text.green().to_string(),
        Signal::Weak => text.yellow().to_string(),
        Signal::NoEdge => text.red().to_string(),
    }
}

fn print_prediction(predictor: &MatchPredictor, prediction: &MatchPrediction) -> Result<()> {
    println!(
        "{}: {} vs {}",
        "Predicting".green(),
        prediction.home_team.bold(),
        prediction.away_team.bold()
    );
    println!();

    println!("{}", "Probabilities:".yellow().bold());
    let probs = prediction.probabilities.to_array();
    for outcome in Outcome::ALL {
        let p = probs[outcome.index()];
        let bar = "#".repeat((p * 40.0).round() as usize);
        let line = format!("  {:<10} {:>6.1}%  {}", outcome.label(), p * 100.0, bar);
        if outcome == prediction.predicted_outcome {
            println!("{}", line.cyan().bold());
        } else {
            println!("{}", line);
        }
    }
    println!();

    if !prediction.components.is_empty() {
        println!("{}", "Model Breakdown:".yellow().bold());
        println!(
            "{:<12} {:>10} {:>10} {:>10}",
            "Model", "Home", "Draw", "Away"
        );
        println!("{}", "-".repeat(45));
        for c in &prediction.components {
            println!(
                "{:<12} {:>9.1}% {:>9.1}% {:>9.1}%",
                c.model,
                c.probabilities.home_win * 100.0,
                c.probabilities.draw * 100.0,
                c.probabilities.away_win * 100.0
            );
        }
        println!();
    }

    println!(
        "Prediction: {} ({:.1}%) via {}",
        prediction.predicted_outcome.label().bold(),
        prediction.confidence * 100.0,
        prediction.model
    );
    println!("Signal:     {}", signal_line(prediction));
    println!();

    let table = predictor.table();
    println!("{}", format!("Recent Form (last {}):", FORM_MATCHES).yellow().bold());
    for team in [&prediction.home_team, &prediction.away_team] {
        let form = recent_form(table, team, FORM_MATCHES)?;
        let results: Vec<String> = form.results.iter().map(|r| colored_result(r)).collect();
        println!("  {:<20} {}  ({} pts)", team, results.join(" "), form.points);
    }
    println!();

    let h2h = head_to_head(table, &prediction.home_team, &prediction.away_team);
    println!("{}", "Head to Head:".yellow().bold());
    if h2h.results.is_empty() {
        println!("  No previous meetings");
    } else {
        let results: Vec<String> = h2h.results.iter().map(|r| colored_result(r)).collect();
        println!(
            "  {} vs {}: {}  (W{} D{} L{})",
            h2h.team,
            h2h.opponent,
            results.join(" "),
            h2h.wins,
            h2h.draws,
            h2h.losses
        );
    }

    Ok(())
}

fn predict_fixture(
    predictor: &MatchPredictor,
    home: &str,
    away: &str,
    use_ensemble: Option<bool>,
    json: bool,
) -> Result<()> {
    let prediction = predictor
        .predict(home, away, use_ensemble)
        .with_context(|| format!("Failed to predict {} vs {}", home, away))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }
    print_prediction(predictor, &prediction)
}

fn print_evaluation(report: &EvaluationReport) {
    println!("{}", "Model Comparison:".yellow().bold());
    println!("{:<12} {:>10} {:>10} {:>10}", "Model", "Accuracy", "Log Loss", "Correct");
    println!("{}", "-".repeat(45));
    for m in &report.models {
        let line = format!(
            "{:<12} {:>9.1}% {:>10.4} {:>10}",
            m.model,
            m.metrics.accuracy * 100.0,
            m.metrics.log_loss,
            m.metrics.correct
        );
        if m.model == report.best_model {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }

    let Some(best) = report.models.iter().find(|m| m.model == report.best_model) else {
        return;
    };

    println!("\n{} ({})", "Confusion Matrix:".yellow().bold(), best.model);
    println!("{:<12} {:>10} {:>10} {:>10}", "Actual", "Home", "Draw", "Away");
    println!("{}", "-".repeat(45));
    for outcome in Outcome::ALL {
        let row = best.metrics.confusion[outcome.index()];
        println!("{:<12} {:>10} {:>10} {:>10}", outcome.label(), row[0], row[1], row[2]);
    }

    println!("\n{}", "Per-Class Scores:".yellow().bold());
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10}",
        "Outcome", "Precision", "Recall", "F1", "Support"
    );
    println!("{}", "-".repeat(56));
    for c in &best.metrics.per_class {
        println!(
            "{:<12} {:>10.3} {:>10.3} {:>10.3} {:>10}",
            c.outcome.label(),
            c.precision,
            c.recall,
            c.f1,
            c.support
        );
    }

    println!("\n{}", "Confidence Thresholds:".yellow().bold());
    println!("{:>10} {:>8} {:>10} {:>10}", "Threshold", "Bets", "Coverage", "Accuracy");
    println!("{}", "-".repeat(42));
    for t in &best.thresholds {
        println!(
            "{:>10.2} {:>8} {:>9.1}% {:>9.1}%",
            t.threshold,
            t.bets,
            t.coverage * 100.0,
            t.accuracy * 100.0
        );
    }
}

fn run_evaluation(predictor: &MatchPredictor, test_size: f64) -> Result<()> {
    println!("{}", "Running evaluation...".green());

    let (train, test) = chronological_split(predictor.table(), test_size)?;
    println!("Train matches: {}", train.len());
    println!("Test matches:  {}", test.len());
    if let (Some(first), Some(last)) = (test.first(), test.last()) {
        println!("Test period:   {} to {}", first.date, last.date);
    }
    println!();

    let pb = spinner("Scoring test matches...")?;
    let report = evaluate(predictor.ensemble(), test);
    pb.finish_and_clear();

    print_evaluation(&report.context("Evaluation failed")?);
    Ok(())
}

fn select_team(
    theme: &ColorfulTheme,
    prompt: &str,
    teams: &[String],
    exclude: Option<&str>,
) -> Result<String> {
    let options: Vec<&String> = teams.iter().filter(|t| Some(t.as_str()) != exclude).collect();
    let selection = Select::with_theme(theme)
        .with_prompt(prompt)
        .items(&options)
        .default(0)
        .interact()?;
    Ok(options[selection].clone())
}

fn run_interactive(predictor: &MatchPredictor) -> Result<()> {
    println!("{}", "Interactive mode".green().bold());
    println!("Choose 'Quit' to exit.\n");

    let theme = ColorfulTheme::default();
    let teams = predictor.teams();

    loop {
        let options = vec!["Predict a fixture", "List teams", "Team form", "Evaluate", "Quit"];

        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => {
                let home = select_team(&theme, "Home team", &teams, None)?;
                let away = select_team(&theme, "Away team", &teams, Some(home.as_str()))?;

                let use_ensemble = Select::with_theme(&theme)
                    .with_prompt("Use ensemble?")
                    .items(&["Yes", "No (primary model only)"])
                    .default(0)
                    .interact()?
                    == 0;

                println!();
                predict_fixture(predictor, &home, &away, Some(use_ensemble), false)?;
                println!();
            }
            1 => {
                println!();
                list_teams(predictor.table(), true)?;
                println!();
            }
            2 => {
                let team = select_team(&theme, "Team", &teams, None)?;
                let n: usize = Input::with_theme(&theme)
                    .with_prompt("Matches")
                    .default(FORM_MATCHES)
                    .interact_text()?;

                let form = recent_form(predictor.table(), &team, n)?;
                let results: Vec<String> = form.results.iter().map(|r| colored_result(r)).collect();
                println!("\n  {:<20} {}  ({} pts)\n", team, results.join(" "), form.points);
            }
            3 => {
                let test_size: f64 = Input::with_theme(&theme)
                    .with_prompt("Test size")
                    .default(DEFAULT_TEST_SIZE)
                    .interact_text()?;

                println!();
                run_evaluation(predictor, test_size)?;
                println!();
            }
            _ => {
                println!("Goodbye!");
                break;
            }
        }
    }

    Ok(())
}
