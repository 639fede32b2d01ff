//! Resolution of circulation trip references.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::schedule::{RunId, Schedule, TripId};

use super::split::{SplitOutcome, split_by_calendar_mask};

/// Counters from a run resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Trip references bound to a trip.
    pub resolved: usize,
    /// Trips split because a circulation covered only part of their days.
    pub splits: usize,
    /// References that matched no trip published on the run's days.
    pub missing: usize,
}

/// Bind every run's trip references to trips, splitting trips whose days
/// the run only partly covers.
///
/// Runs are processed in arena order. A split invalidates the original
/// trip for the days it no longer covers; membership already recorded on
/// other runs is moved to the sibling before the next reference is read.
pub fn resolve_runs(schedule: &mut Schedule) -> RunStats {
    let mut index: HashMap<String, Vec<TripId>> = HashMap::new();
    for id in schedule.trip_ids() {
        index
            .entry(schedule.trip(id).source_id.clone())
            .or_default()
            .push(id);
    }

    let mut stats = RunStats::default();
    for run_id in schedule.run_ids() {
        let refs = schedule.run(run_id).trip_refs.clone();
        for trip_ref in &refs {
            resolve_reference(schedule, &mut index, run_id, trip_ref, &mut stats);
        }
        register_known_links(schedule, run_id);
        debug!(
            run = %schedule.run(run_id).key,
            trips = schedule.run(run_id).trips.len(),
            "run resolved"
        );
    }
    stats
}

fn resolve_reference(
    schedule: &mut Schedule,
    index: &mut HashMap<String, Vec<TripId>>,
    run_id: RunId,
    trip_ref: &str,
    stats: &mut RunStats,
) {
    let run_days = schedule.run(run_id).days.clone();
    let candidates: Vec<TripId> = index
        .get(trip_ref)
        .into_iter()
        .flatten()
        .copied()
        .filter(|id| schedule.trip(*id).days.intersects(&run_days))
        .collect();

    if candidates.is_empty() {
        warn!(
            run = %schedule.run(run_id).key,
            trip = trip_ref,
            "run references a trip that is not published on its days"
        );
        stats.missing += 1;
        return;
    }

    for candidate in candidates {
        let before = schedule.trip_count();
        let outcome = split_by_calendar_mask(schedule, candidate, &run_days);
        if matches!(outcome, SplitOutcome::Split { .. }) {
            stats.splits += 1;
            for id in (before..schedule.trip_count()).map(TripId) {
                index
                    .entry(schedule.trip(id).source_id.clone())
                    .or_default()
                    .push(id);
            }
        }

        let Some(inside) = outcome.inside() else {
            continue;
        };
        let run = schedule.run_mut(run_id);
        if !run.trips.contains(&inside) {
            run.trips.push(inside);
        }
        let trip = schedule.trip_mut(inside);
        if !trip.runs.contains(&run_id) {
            trip.runs.push(run_id);
        }
        stats.resolved += 1;
    }
}

/// Record block links between trips the run now holds.
fn register_known_links(schedule: &mut Schedule, run_id: RunId) {
    let trips = schedule.run(run_id).trips.clone();
    for &prev in &trips {
        if let Some(next) = schedule.trip(prev).next_in_block
            && trips.contains(&next)
        {
            schedule.run_mut(run_id).register_link(prev, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        FeedCalendar, RouteNumber, RunKey, ServiceDaysBitmap, TrafficMode,
    };
    use crate::schedule::{Run, Trip};
    use chrono::NaiveDate;

    fn bits(s: &str) -> ServiceDaysBitmap {
        s.parse().unwrap()
    }

    fn schedule() -> Schedule {
        Schedule::new(FeedCalendar::new(
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
            7,
        ))
    }

    fn add(s: &mut Schedule, id: &str, days: &str) -> TripId {
        s.add_trip(Trip::new(
            id,
            RouteNumber::parse("9").unwrap(),
            TrafficMode::Bus,
            bits(days),
            vec![],
        ))
    }

    fn run(s: &mut Schedule, n: u32, days: &str, refs: &[&str]) -> RunId {
        s.add_run(Run::new(
            RunKey::new(RouteNumber::parse("9").unwrap(), n),
            bits(days),
            refs.iter().map(|r| r.to_string()).collect(),
        ))
    }

    #[test]
    fn covering_run_takes_trip_as_is() {
        let mut s = schedule();
        let t = add(&mut s, "T", "1111100");
        let r = run(&mut s, 1, "1111111", &["T"]);

        let stats = resolve_runs(&mut s);
        assert_eq!(stats, RunStats { resolved: 1, splits: 0, missing: 0 });
        assert_eq!(s.run(r).trips, vec![t]);
        assert_eq!(s.trip(t).runs, vec![r]);
    }

    #[test]
    fn partial_runs_split_the_trip() {
        let mut s = schedule();
        let t = add(&mut s, "T", "1111111");
        let weekday = run(&mut s, 1, "1111100", &["T"]);
        let weekend = run(&mut s, 2, "0000011", &["T"]);

        let stats = resolve_runs(&mut s);
        assert_eq!(stats.splits, 1);
        assert_eq!(stats.resolved, 2);
        assert_eq!(s.trip_count(), 2);

        let weekday_trip = s.run(weekday).trips[0];
        let weekend_trip = s.run(weekend).trips[0];
        assert_ne!(weekday_trip, weekend_trip);
        assert_eq!(s.trip(weekday_trip).days, bits("1111100"));
        assert_eq!(s.trip(weekend_trip).days, bits("0000011"));
        assert_eq!(weekend_trip, t);
        assert_eq!(s.trip(weekday_trip).runs, vec![weekday]);
        assert_eq!(s.trip(weekend_trip).runs, vec![weekend]);
    }

    #[test]
    fn unknown_or_unpublished_reference_is_skipped() {
        let mut s = schedule();
        add(&mut s, "T", "1111100");
        let r = run(&mut s, 1, "0000011", &["T", "X"]);

        let stats = resolve_runs(&mut s);
        assert_eq!(stats.missing, 2);
        assert!(s.run(r).trips.is_empty());
    }

    #[test]
    fn explicit_links_are_recorded_in_run() {
        let mut s = schedule();
        let a = add(&mut s, "A", "1111111");
        let b = add(&mut s, "B", "1111111");
        s.link_block(a, b);
        let r = run(&mut s, 1, "1111111", &["A", "B"]);

        resolve_runs(&mut s);
        assert_eq!(s.run(r).block_fragments, vec![vec![a, b]]);
    }

    #[test]
    fn split_reaches_whole_block() {
        let mut s = schedule();
        let a = add(&mut s, "A", "1111111");
        let b = add(&mut s, "B", "1111111");
        s.link_block(a, b);
        let r = run(&mut s, 1, "1111100", &["A", "B"]);

        let stats = resolve_runs(&mut s);
        // Splitting A split B as well; B's weekday sibling is then taken as is
        assert_eq!(stats.splits, 1);
        assert_eq!(s.trip_count(), 4);

        let held = &s.run(r).trips;
        assert_eq!(held.len(), 2);
        assert_eq!(s.trip(held[0]).next_in_block, Some(held[1]));
        assert_eq!(s.run(r).block_fragments, vec![held.clone()]);
        for id in held {
            assert_eq!(s.trip(*id).days, bits("1111100"));
        }
    }
}
