//! End-to-end consolidation of one source export.
//!
//! The stages run in a fixed order: block inference, run resolution,
//! trip merging, calendar synthesis and identifier assignment. Each stage
//! only sees the schedule as left by the previous one.

use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::blocks::{RunStats, infer_blocks, resolve_runs};
use crate::calendar::{CalendarError, CalendarId, CalendarRegistry, CalendarSynthesizer, periods_of};
use crate::config::PipelineConfig;
use crate::domain::ServiceDaysBitmap;
use crate::identity::{AssignedId, IdentityError, IdentityRequest, IdentityStats, SnapshotStore, TripFingerprint};
use crate::merge::{GroupId, MergeStats, MergedTrips, merge_trips};
use crate::schedule::{RunId, Schedule, TimetablePeriod};
use crate::source::{SourceError, load_source};

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Everything the feed writer needs from one run.
#[derive(Debug)]
pub struct FeedOutput {
    /// The schedule after block inference and run resolution; group
    /// members and runs index into it.
    pub schedule: Schedule,
    pub groups: MergedTrips,
    /// Calendar of each group, indexed by [`GroupId`]. `None` for groups
    /// with no active day.
    pub group_calendars: Vec<Option<CalendarId>>,
    /// Calendar of each run, indexed by [`RunId`].
    pub run_calendars: Vec<Option<CalendarId>>,
    pub calendars: CalendarRegistry,
    /// External identifier of each group, indexed by [`GroupId`]. `None`
    /// for groups without a public stop.
    pub group_ids: Vec<Option<AssignedId>>,
    pub run_stats: RunStats,
    pub identity_stats: IdentityStats,
}

impl FeedOutput {
    pub fn group_calendar(&self, group: GroupId) -> Option<CalendarId> {
        self.group_calendars[group.0]
    }

    pub fn run_calendar(&self, run: RunId) -> Option<CalendarId> {
        self.run_calendars[run.0]
    }

    pub fn group_id(&self, group: GroupId) -> Option<&AssignedId> {
        self.group_ids[group.0].as_ref()
    }

    pub fn merge_stats(&self) -> MergeStats {
        self.groups.stats
    }
}

/// Runs the consolidation stages with one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load an export from `path` and consolidate it.
    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<FeedOutput, PipelineError> {
        let schedule = load_source(path)?;
        self.run(schedule)
    }

    /// Consolidate a schedule and persist the updated identity snapshot.
    pub fn run(&self, mut schedule: Schedule) -> Result<FeedOutput, PipelineError> {
        let feed = *schedule.feed();
        let today = generation_date(&self.config, feed.start());

        let links = infer_blocks(
            &mut schedule,
            &self.config.inferred_block_modes,
            self.config.max_block_gap_secs,
        );
        info!(links, "block inference done");

        let run_stats = resolve_runs(&mut schedule);
        info!(
            resolved = run_stats.resolved,
            splits = run_stats.splits,
            missing = run_stats.missing,
            "runs resolved"
        );
        schedule.report_unused_route_versions();

        let groups = merge_trips(&schedule);
        info!(
            trips = schedule.trip_count(),
            groups = groups.len(),
            merged = groups.stats.merged,
            duplicates = groups.stats.duplicates,
            conflicts = groups.stats.conflicts,
            "trips merged"
        );

        let synthesizer = CalendarSynthesizer::new(feed);
        let mut calendars = CalendarRegistry::new();
        let mut group_calendars = Vec::with_capacity(groups.len());
        for group in &groups.groups {
            let periods = periods_of(&schedule, group.members.iter().copied());
            let id = calendar_for(&synthesizer, &mut calendars, &group.days, &periods)?;
            if id.is_none() {
                warn!(group = %group.id, trip = %schedule.trip(group.reference).source_id, "group has no service day");
            }
            group_calendars.push(id);
        }

        let mut run_calendars = Vec::new();
        for run_id in schedule.run_ids() {
            let run = schedule.run(run_id);
            let periods = periods_of(&schedule, run.trips.iter().copied());
            let id = calendar_for(&synthesizer, &mut calendars, &run.days, &periods)?;
            if id.is_none() {
                warn!(run = %run.key, "run has no service day");
            }
            run_calendars.push(id);
        }
        info!(calendars = calendars.len(), "calendars synthesized");

        let store = SnapshotStore::new(&self.config.identity_dir).with_lookback(self.config.lookback_days);
        let mut db = store.load(feed)?;

        let mut requested: Vec<GroupId> = Vec::new();
        let mut requests: Vec<IdentityRequest> = Vec::new();
        for group in &groups.groups {
            let reference = schedule.trip(group.reference);
            let Some(fingerprint) = TripFingerprint::of(reference) else {
                warn!(group = %group.id, trip = %reference.source_id, "trip has no public stop, no identifier assigned");
                continue;
            };
            let run_index = reference
                .runs
                .first()
                .map(|r| schedule.run(*r).key.run_number)
                .unwrap_or(0);
            requested.push(group.id);
            requests.push(IdentityRequest {
                fingerprint,
                days: group.days.clone(),
                run_index,
            });
        }

        let mut group_ids = vec![None; groups.len()];
        for (group, id) in requested.into_iter().zip(db.assign_all(&requests)) {
            group_ids[group.0] = Some(id);
        }
        store.save(&mut db, today)?;

        let identity_stats = db.stats();
        info!(
            reused = identity_stats.reused,
            new = identity_stats.new,
            conflicts = identity_stats.conflicts,
            temporary = identity_stats.temporary,
            pruned = identity_stats.pruned,
            "identifiers assigned"
        );

        Ok(FeedOutput {
            schedule,
            groups,
            group_calendars,
            run_calendars,
            calendars,
            group_ids,
            run_stats,
            identity_stats,
        })
    }
}

/// Synthesize and intern a calendar. Bitmaps with no active day have none.
fn calendar_for(
    synthesizer: &CalendarSynthesizer,
    registry: &mut CalendarRegistry,
    days: &ServiceDaysBitmap,
    periods: &[&TimetablePeriod],
) -> Result<Option<CalendarId>, CalendarError> {
    match synthesizer.synthesize(days, periods) {
        Ok(record) => Ok(Some(registry.intern(record))),
        Err(CalendarError::EmptyBitmap) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Generation date of a run: the configured date, else the feed start.
pub fn generation_date(config: &PipelineConfig, feed_start: NaiveDate) -> NaiveDate {
    config.today.unwrap_or(feed_start)
}
