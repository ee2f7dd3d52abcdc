//! Persisted feature table
//!
//! The CSV written here is the hand-off between the offline pipeline and
//! serving: identifier and outcome columns first, then every feature column
//! in schema order.

use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

use crate::data::csv_loader::{parse_match_date, FullTimeResult};
use crate::data::merge::{FeatureTable, MatchFeatureRow};
use crate::error::{PredictError, Result};

/// Non-feature columns, in file order
pub const IDENTIFIER_COLUMNS: [&str; 11] = [
    "Date",
    "HomeTeam",
    "AwayTeam",
    "FTHG",
    "FTAG",
    "FTR",
    "home_win",
    "away_win",
    "draw",
    "home_points",
    "away_points",
];

fn to_dataframe(table: &FeatureTable) -> Result<DataFrame> {
    let rows = table.rows();
    let mut columns: Vec<Column> =
        Vec::with_capacity(IDENTIFIER_COLUMNS.len() + table.columns().len());

    columns.push(Column::new(
        "Date".into(),
        rows.iter()
            .map(|r| r.date.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        "HomeTeam".into(),
        rows.iter().map(|r| r.home_team.as_str()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        "AwayTeam".into(),
        rows.iter().map(|r| r.away_team.as_str()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        "FTHG".into(),
        rows.iter().map(|r| r.home_goals.map(i64::from)).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        "FTAG".into(),
        rows.iter().map(|r| r.away_goals.map(i64::from)).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        "FTR".into(),
        rows.iter().map(|r| r.result.code()).collect::<Vec<_>>(),
    ));

    let flags: [(&str, fn(&MatchFeatureRow) -> u8); 5] = [
        ("home_win", MatchFeatureRow::home_win),
        ("away_win", MatchFeatureRow::away_win),
        ("draw", MatchFeatureRow::draw),
        ("home_points", MatchFeatureRow::home_points),
        ("away_points", MatchFeatureRow::away_points),
    ];
    for (name, get) in flags {
        columns.push(Column::new(
            name.into(),
            rows.iter().map(|r| i64::from(get(r))).collect::<Vec<_>>(),
        ));
    }

    for (j, name) in table.columns().iter().enumerate() {
        columns.push(Column::new(
            name.as_str().into(),
            rows.iter().map(|r| r.values[j]).collect::<Vec<f64>>(),
        ));
    }

    Ok(DataFrame::new(columns)?)
}

/// Write the table as CSV, creating parent directories as needed
pub fn write_feature_table<P: AsRef<Path>>(table: &FeatureTable, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut df = to_dataframe(table)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;

    info!(
        "Wrote {} rows x {} features to {:?}",
        table.len(),
        table.columns().len(),
        path
    );
    Ok(())
}

/// Load a table written by `write_feature_table`
pub fn read_feature_table<P: AsRef<Path>>(path: P) -> Result<FeatureTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PredictError::artifact(path, "feature table not found"));
    }

    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    for column in IDENTIFIER_COLUMNS {
        if df.column(column).is_err() {
            return Err(PredictError::SchemaMismatch(format!(
                "feature table {:?} has no '{}' column",
                path, column
            )));
        }
    }

    let feature_columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| !IDENTIFIER_COLUMNS.contains(&name.as_str()))
        .collect();

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

    let mut feature_values: Vec<Vec<Option<f64>>> = Vec::with_capacity(feature_columns.len());
    for name in &feature_columns {
        let owned = df.column(name)?.cast(&DataType::Float64)?;
        feature_values.push(owned.f64()?.into_iter().collect());
    }

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let raw_date = date_col.get(i).unwrap_or("");
        let date = parse_match_date(raw_date).ok_or_else(|| {
            let reason = format!("row {}: bad date '{}'", i, raw_date);
            PredictError::data_integrity("feature table", reason)
        })?;
        let raw_result = ftr_col.get(i).unwrap_or("");
        let result = FullTimeResult::from_code(raw_result).ok_or_else(|| {
            PredictError::data_integrity(
                "feature table",
                format!("row {}: bad result '{}'", i, raw_result),
            )
        })?;

        rows.push(MatchFeatureRow {
            date,
            home_team: home_col.get(i).unwrap_or("").to_string(),
            away_team: away_col.get(i).unwrap_or("").to_string(),
            home_goals: fthg_col.get(i).and_then(|g| u32::try_from(g).ok()),
            away_goals: ftag_col.get(i).and_then(|g| u32::try_from(g).ok()),
            result,
            values: feature_values.iter().map(|col| col[i].unwrap_or(0.0)).collect(),
        });
    }

    info!("Loaded feature table: {} rows, {} features", rows.len(), feature_columns.len());
    FeatureTable::new(feature_columns, rows)
}
