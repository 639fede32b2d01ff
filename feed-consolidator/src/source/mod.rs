//! Reading the scheduling database export.
//!
//! The export is a JSON document (see [`SourceSchedule`]). Loading it
//! parses every value into domain types and builds the schedule arena.

mod convert;
mod dto;

use std::path::{Path, PathBuf};

pub use dto::{CirculationDto, PeriodDto, RouteDto, RunDto, SourceSchedule, StopDto, TripDto};

use crate::domain::DomainError;
use crate::schedule::Schedule;
use crate::versioned::VersionError;

/// Errors loading a source export.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed export: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("route {route}: {source}")]
    RouteVersion {
        route: String,
        #[source]
        source: VersionError,
    },

    #[error("invalid feed start date: {0:?}")]
    InvalidDate(String),

    #[error("trip {trip} refers to unknown route {route}")]
    UnknownRoute { trip: String, route: String },

    #[error("duplicate trip id {0}")]
    DuplicateTrip(String),
}

/// Parse an export from JSON text.
pub fn parse_source(json: &str) -> Result<Schedule, SourceError> {
    let export: SourceSchedule = serde_json::from_str(json)?;
    export.into_schedule()
}

/// Read and parse an export file.
pub fn load_source(path: impl AsRef<Path>) -> Result<Schedule, SourceError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_source(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_are_reported() {
        assert!(matches!(parse_source("{"), Err(SourceError::Json(_))));
        assert!(matches!(
            parse_source(r#"{"feed_start": "2021-01-04"}"#),
            Err(SourceError::Json(_))
        ));
    }

    #[test]
    fn overlapping_route_versions_are_rejected() {
        let json = r#"{
            "feed_start": "2021-01-04",
            "horizon": 3,
            "routes": [
                {"number": "5", "agency": "DP", "mode": "bus", "name": "a", "days": "110"},
                {"number": "5", "agency": "DP", "mode": "bus", "name": "b", "days": "011"}
            ]
        }"#;
        let err = parse_source(json).unwrap_err();
        assert!(matches!(err, SourceError::RouteVersion { ref route, .. } if route == "5"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_source(dir.path().join("missing.json")),
            Err(SourceError::Io { .. })
        ));
    }
}
