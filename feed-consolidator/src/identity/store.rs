//! Daily identity snapshots on disk.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use tracing::info;

use crate::domain::{FeedCalendar, format_short_date};

use super::snapshot::{parse_snapshot, render_snapshot};
use super::{IdentityError, PersistentIdentityDb};

/// Default number of days to look back for a previous snapshot.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

/// A directory of `trip_ids_yyMMdd.txt` snapshots, one per generation date.
///
/// Snapshot bitmaps are indexed from the date in the file name.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    lookback_days: u32,
}

impl SnapshotStore {
    /// Create a store over `dir` with the default lookback (14 days).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    /// Set a custom lookback.
    pub fn with_lookback(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot written on `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("trip_ids_{}.txt", format_short_date(date)))
    }

    /// The newest snapshot at most `lookback_days` before `today`, with
    /// its age in days.
    pub fn find_latest(&self, today: NaiveDate) -> Option<(usize, PathBuf)> {
        (0..=self.lookback_days).find_map(|gap| {
            let path = self.path_for(today - Duration::days(gap as i64));
            path.is_file().then_some((gap as usize, path))
        })
    }

    /// Load the newest snapshot for a feed starting today.
    ///
    /// Stored days are re-based onto the feed start and slots left with no
    /// day are dropped. Without any snapshot in range, returns an empty
    /// database.
    pub fn load(&self, feed: FeedCalendar) -> Result<PersistentIdentityDb, IdentityError> {
        let Some((gap, path)) = self.find_latest(feed.start()) else {
            info!(dir = %self.dir.display(), "no identity snapshot found, starting fresh");
            return Ok(PersistentIdentityDb::new(feed));
        };

        let text = std::fs::read_to_string(&path).map_err(|source| IdentityError::Io {
            path: path.clone(),
            source,
        })?;
        let mut db = parse_snapshot(&text, feed, gap)?;
        let pruned = db.prune_empty();

        info!(
            path = %path.display(),
            gap,
            fingerprints = db.len(),
            pruned,
            "identity snapshot loaded"
        );
        Ok(db)
    }

    /// Write the snapshot for the database's feed start date.
    ///
    /// Unoccupied slots starting after `today` are dropped first. The file
    /// is written to a temporary name and renamed into place.
    pub fn save(&self, db: &mut PersistentIdentityDb, today: NaiveDate) -> Result<PathBuf, IdentityError> {
        let pruned = db.prune_for_save(today);

        std::fs::create_dir_all(&self.dir).map_err(|source| IdentityError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(db.feed().start());
        let tmp = path.with_extension("txt.tmp");
        std::fs::write(&tmp, render_snapshot(db)).map_err(|source| IdentityError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| IdentityError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), fingerprints = db.len(), pruned, "identity snapshot saved");
        Ok(path)
    }
}
