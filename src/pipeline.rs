//! Offline feature pipeline: results CSV -> feature table + schema
//!
//! Stages run in order: prepare matches, split into team perspectives,
//! rolling statistics per team and per pair, then the per-match merge.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::csv_loader::MatchTable;
use crate::data::feature_store::write_feature_table;
use crate::data::features::RollingFeatureEngine;
use crate::data::history::to_team_perspective;
use crate::data::merge::{FeatureMerger, FeatureTable, MergeReport};
use crate::error::Result;
use crate::schema::FeatureSchema;

/// Counters collected while building the table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Matches left after date and result validation
    pub matches: usize,
    pub dropped_dates: usize,
    pub dropped_results: usize,
    /// Team-perspective rows (two per match)
    pub team_records: usize,
    pub merge: MergeReport,
}

pub struct PipelineOutput {
    pub table: FeatureTable,
    pub schema: FeatureSchema,
    pub report: PipelineReport,
}

pub struct FeaturePipeline {
    config: PipelineConfig,
    engine: RollingFeatureEngine,
    merger: FeatureMerger,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: RollingFeatureEngine::new(config.clone()),
            merger: FeatureMerger::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build features for an already prepared match table
    pub fn run(&self, matches: &MatchTable) -> Result<PipelineOutput> {
        let records = to_team_perspective(matches.matches());
        info!(
            "Computing rolling features for {} team records ({} features per side)",
            records.len(),
            self.engine.layout().len()
        );
        let team_rows = self.engine.compute(&records);

        let (table, merge) = self.merger.merge(matches.matches(), &team_rows)?;
        let schema = FeatureSchema::from_columns(table.columns(), &self.config);

        info!(
            "Feature table: {} rows kept, {} dropped, {} partial",
            merge.rows_kept, merge.rows_dropped, merge.partial_rows
        );

        Ok(PipelineOutput {
            table,
            schema,
            report: PipelineReport {
                matches: matches.len(),
                dropped_dates: matches.dropped_dates(),
                dropped_results: matches.dropped_results(),
                team_records: records.len(),
                merge,
            },
        })
    }

    /// Load season files (path, season label) and build features
    pub fn run_files<P: AsRef<Path>>(&self, files: &[(P, &str)]) -> Result<PipelineOutput> {
        let matches = MatchTable::load_seasons(files)?;
        self.run(&matches)
    }

    /// Persist the table and its schema
    pub fn write<P: AsRef<Path>, Q: AsRef<Path>>(
        output: &PipelineOutput,
        features_path: P,
        schema_path: Q,
    ) -> Result<()> {
        write_feature_table(&output.table, features_path)?;
        output.schema.save(schema_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::csv_loader::RawMatchRow;
    use crate::data::feature_store::read_feature_table;
    use crate::schema::ColumnKind;
    use std::fs;
    use tempfile::tempdir;

    fn raw(date: &str, home: &str, away: &str, hg: u32, ag: u32, ftr: &str) -> RawMatchRow {
        RawMatchRow {
            date: date.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: Some(hg),
            away_goals: Some(ag),
            result: ftr.to_string(),
            season: None,
        }
    }

    fn league() -> MatchTable {
        MatchTable::prepare(vec![
            raw("05/08/2023", "Arsenal", "Brentford", 2, 0, "H"),
            raw("05/08/2023", "Chelsea", "Everton", 1, 1, "D"),
            raw("12/08/2023", "Brentford", "Chelsea", 0, 3, "A"),
            raw("12/08/2023", "Everton", "Arsenal", 2, 1, "H"),
            raw("not a date", "Everton", "Chelsea", 0, 0, "D"),
        ])
        .unwrap()
    }

    #[test]
    fn test_run_reports_counts() {
        let pipeline = FeaturePipeline::new(PipelineConfig::default()).unwrap();
        let output = pipeline.run(&league()).unwrap();

        assert_eq!(output.report.matches, 4);
        assert_eq!(output.report.dropped_dates, 1);
        assert_eq!(output.report.team_records, 8);
        assert_eq!(output.report.merge.input_matches, 4);
        assert_eq!(output.table.len(), output.report.merge.rows_kept);
        assert_eq!(output.schema.len(), output.table.columns().len());
        assert_eq!(output.schema.count_kind(ColumnKind::Differential), 24);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            windows: vec![],
            ..Default::default()
        };
        assert!(FeaturePipeline::new(config).is_err());
    }

    #[test]
    fn test_run_files_and_write() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("E0_2324.csv");
        fs::write(
            &csv,
            "Div,Date,HomeTeam,AwayTeam,FTHG,FTAG,FTR\n\
             E0,05/08/2023,Arsenal,Brentford,2,0,H\n\
             E0,05/08/2023,Chelsea,Everton,1,1,D\n\
             E0,12/08/2023,Brentford,Chelsea,0,3,A\n",
        )
        .unwrap();

        let pipeline = FeaturePipeline::new(PipelineConfig::default()).unwrap();
        let output = pipeline.run_files(&[(&csv, "2023-24")]).unwrap();
        assert_eq!(output.report.matches, 3);

        let features = dir.path().join("data/features.csv");
        let schema_path = dir.path().join("models/feature_schema.json");
        FeaturePipeline::write(&output, &features, &schema_path).unwrap();

        let table = read_feature_table(&features).unwrap();
        let schema = FeatureSchema::load(&schema_path).unwrap();
        assert_eq!(table.len(), output.table.len());
        schema.validate_table(&table).unwrap();
    }
}
