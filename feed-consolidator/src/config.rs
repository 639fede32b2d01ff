//! Pipeline configuration.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::domain::TrafficMode;
use crate::identity::DEFAULT_LOOKBACK_DAYS;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the daily identity snapshots.
    pub identity_dir: PathBuf,

    /// How many days back to look for a previous snapshot.
    pub lookback_days: u32,

    /// Upper bound (exclusive) on the layover between two trips chained
    /// by block inference (seconds).
    pub max_block_gap_secs: u32,

    /// Traffic modes whose blocks are inferred rather than taken from the
    /// source.
    pub inferred_block_modes: Vec<TrafficMode>,

    /// Generation date. Defaults to the feed start date.
    pub today: Option<NaiveDate>,
}

impl PipelineConfig {
    /// Create a configuration with default tuning and the given snapshot
    /// directory.
    pub fn new(identity_dir: impl Into<PathBuf>) -> Self {
        Self {
            identity_dir: identity_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_max_block_gap_secs(mut self, secs: u32) -> Self {
        self.max_block_gap_secs = secs;
        self
    }

    pub fn with_inferred_block_modes(mut self, modes: Vec<TrafficMode>) -> Self {
        self.inferred_block_modes = modes;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identity_dir: PathBuf::from("trip_ids"),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_block_gap_secs: 300, // 5 minutes
            inferred_block_modes: vec![TrafficMode::Tram],
            today: None,
        }
    }
}
