//! Data loading and feature engineering modules

pub mod csv_loader;
pub mod feature_store;
pub mod features;
pub mod history;
pub mod merge;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use csv_loader::{parse_match_date, FullTimeResult, MatchRecord, MatchTable, RawMatchRow};
pub use feature_store::{read_feature_table, write_feature_table, IDENTIFIER_COLUMNS};
pub use features::{FeatureLayout, RollingFeatureEngine, TeamFeatureRow};
pub use history::{to_team_perspective, TeamMatchRecord};
pub use merge::{
    differential_features, DifferentialFeature, Direction, FeatureMerger, FeatureTable,
    MatchFeatureRow, MergeReport, AWAY_SUFFIX, HOME_SUFFIX,
};
