//! Block inference and block link validation.
//!
//! Some traffic modes (historically trams) are exported without explicit
//! "continues as" links. For those, consecutive trips of one circulation
//! are chained when they meet end to end on the same days.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::domain::{RunKey, TrafficMode};
use crate::schedule::{RunId, Schedule, TripId};

/// Result of validating the times of a block link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Times were consistent; link stored.
    Linked,
    /// The next trip arrived before the previous trip departed; its arrival
    /// was pulled up to the departure and the link stored.
    ArrivalAdjusted,
    /// The next trip both arrives and departs before the previous trip
    /// departs; no link stored.
    Rejected,
}

/// Link `prev` to `next`, correcting or refusing inconsistent times at the
/// shared stop.
pub fn connect_trips(schedule: &mut Schedule, prev: TripId, next: TripId) -> LinkOutcome {
    let Some(prev_departure) = schedule.trip(prev).last_public_visit().map(|v| v.departure) else {
        warn!(prev = %schedule.trip(prev).source_id, "block link from trip without public stops");
        return LinkOutcome::Rejected;
    };

    let next_trip = schedule.trip_mut(next);
    let Some(first) = next_trip.visits.iter_mut().find(|v| v.public) else {
        warn!(next = %next_trip.source_id, "block link to trip without public stops");
        return LinkOutcome::Rejected;
    };

    let outcome = if first.arrival >= prev_departure {
        LinkOutcome::Linked
    } else if first.departure >= prev_departure {
        first.arrival = prev_departure;
        LinkOutcome::ArrivalAdjusted
    } else {
        LinkOutcome::Rejected
    };

    match outcome {
        LinkOutcome::Linked => {}
        LinkOutcome::ArrivalAdjusted => {
            warn!(
                prev = %schedule.trip(prev).source_id,
                next = %schedule.trip(next).source_id,
                time = %prev_departure,
                "next trip arrives before previous departs, arrival adjusted"
            );
        }
        LinkOutcome::Rejected => {
            warn!(
                prev = %schedule.trip(prev).source_id,
                next = %schedule.trip(next).source_id,
                "next trip departs before previous trip, block link dropped"
            );
            return outcome;
        }
    }

    schedule.link_block(prev, next);
    outcome
}

/// Infer block links for trips of the given traffic modes.
///
/// Trips are grouped by circulation and walked in departure order. A trip
/// is chained to the first later trip of its circulation that runs on the
/// same route and days, starts at the stop where it ends, and departs
/// within `[0, max_gap_secs)` seconds of its arrival.
///
/// Returns the number of links added.
pub fn infer_blocks(schedule: &mut Schedule, modes: &[TrafficMode], max_gap_secs: u32) -> usize {
    let mut groups: BTreeMap<(TrafficMode, RunKey), Vec<TripId>> = BTreeMap::new();
    for id in schedule.trip_ids() {
        let trip = schedule.trip(id);
        if !modes.contains(&trip.mode) || trip.first_departure().is_none() {
            continue;
        }
        if let Some(key) = &trip.circulation {
            groups.entry((trip.mode, key.clone())).or_default().push(id);
        }
    }

    let mut links = 0;
    for ((mode, key), mut trips) in groups {
        trips.sort_by_key(|id| schedule.trip(*id).first_departure());

        for (i, &prev) in trips.iter().enumerate() {
            if schedule.trip(prev).next_in_block.is_some() {
                continue;
            }
            let candidate = trips[i + 1..]
                .iter()
                .copied()
                .take_while(|next| gap_secs(schedule, prev, *next).is_none_or(|g| g < max_gap_secs as i64))
                .find(|next| continues(schedule, prev, *next, max_gap_secs));

            if let Some(next) = candidate
                && connect_trips(schedule, prev, next) != LinkOutcome::Rejected
            {
                register_in_runs(schedule, &key, prev, next);
                links += 1;
            }
        }
        debug!(mode = %mode, circulation = %key, "block inference done for circulation");
    }

    links
}

fn gap_secs(schedule: &Schedule, prev: TripId, next: TripId) -> Option<i64> {
    let arrival = schedule.trip(prev).last_arrival()?;
    let departure = schedule.trip(next).first_departure()?;
    Some(departure.seconds_since(arrival))
}

fn continues(schedule: &Schedule, prev: TripId, next: TripId, max_gap_secs: u32) -> bool {
    let a = schedule.trip(prev);
    let b = schedule.trip(next);

    if b.previous_in_block.is_some() || a.mode != b.mode || a.route != b.route || a.days != b.days {
        return false;
    }

    let same_stop = match (a.last_public_visit(), b.first_public_visit()) {
        (Some(end), Some(start)) => end.location == start.location,
        _ => false,
    };
    if !same_stop {
        return false;
    }

    gap_secs(schedule, prev, next).is_some_and(|g| (0..max_gap_secs as i64).contains(&g))
}

/// Record the link in every circulation both trips belong to.
fn register_in_runs(schedule: &mut Schedule, key: &RunKey, prev: TripId, next: TripId) {
    let days = schedule.trip(prev).days.clone();
    let mut runs: Vec<RunId> = schedule
        .run_ids()
        .filter(|r| {
            let run = schedule.run(*r);
            &run.key == key && run.days.intersects(&days)
        })
        .collect();
    for r in &schedule.trip(prev).runs {
        if schedule.trip(next).runs.contains(r) && !runs.contains(r) {
            runs.push(*r);
        }
    }

    for r in runs {
        schedule.run_mut(r).register_link(prev, next);
    }
}
