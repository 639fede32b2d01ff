//! Persistent trip identifiers.
//!
//! Identifiers survive daily regeneration of the feed: each run loads the
//! previous run's snapshot, matches trips against it by fingerprint and
//! saves an updated snapshot for the next run.

mod db;
mod fingerprint;
mod snapshot;
mod store;

use std::path::PathBuf;

pub use db::{
    AssignedId, IdentityRequest, IdentitySlot, IdentityStats, PersistentIdentityDb, Ticket, TripData,
    format_id,
};
pub use fingerprint::TripFingerprint;
pub use snapshot::{parse_snapshot, render_snapshot};
pub use store::{DEFAULT_LOOKBACK_DAYS, SnapshotStore};

/// Errors reading or writing identity snapshots.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("snapshot line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("snapshot I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IdentityError {
    fn parse(line: usize, reason: impl Into<String>) -> Self {
        IdentityError::Parse {
            line,
            reason: reason.into(),
        }
    }
}
