//! Consolidation of structurally identical trips into merged trip groups.
//!
//! Trips are compared block by block: a chain of trips operated by one
//! vehicle is merged with another chain only as a whole, and every chain
//! position becomes its own [`MergedTripGroup`] linked to its neighbours.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::domain::{RouteNumber, RunKey, ServiceDaysBitmap};
use crate::schedule::{Schedule, TripId};

/// Index of a merged group in [`MergedTrips::groups`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// One or more structurally identical trips with (normally) disjoint days.
#[derive(Debug, Clone)]
pub struct MergedTripGroup {
    pub id: GroupId,
    pub route: RouteNumber,
    /// The first trip of the group in input order. Its itinerary, runs and
    /// periods stand for the whole group.
    pub reference: TripId,
    pub members: Vec<TripId>,
    /// Union of the members' days.
    pub days: ServiceDaysBitmap,
    pub previous: Option<GroupId>,
    pub next: Option<GroupId>,
}

/// How a structurally equal candidate relates to an existing group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Calendars are disjoint; the candidate joins the group.
    Merged,
    /// Same days and a shared run; a duplicate that joins the group.
    TotallyDuplicate,
    /// Same days on different runs; kept apart.
    SameItineraryDifferentRun,
    /// Days overlap without being equal; kept apart.
    Conflict,
}

impl MergeOutcome {
    /// Whether the candidate is absorbed by the group.
    pub fn absorbs(self) -> bool {
        matches!(self, MergeOutcome::Merged | MergeOutcome::TotallyDuplicate)
    }
}

/// Counters from a merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub merged: usize,
    pub duplicates: usize,
    pub different_runs: usize,
    pub conflicts: usize,
}

/// Result of merging a whole schedule.
#[derive(Debug, Clone, Default)]
pub struct MergedTrips {
    pub groups: Vec<MergedTripGroup>,
    pub stats: MergeStats,
    by_trip: HashMap<TripId, GroupId>,
}

impl MergedTrips {
    pub fn group(&self, id: GroupId) -> &MergedTripGroup {
        &self.groups[id.0]
    }

    /// Group a trip was merged into.
    pub fn group_of(&self, trip: TripId) -> Option<GroupId> {
        self.by_trip.get(&trip).copied()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Block chains accumulated into one equivalence class.
struct ChainClass {
    /// Members at each chain position; index 0 of each holds the reference.
    positions: Vec<Vec<TripId>>,
    /// Union of days at each chain position.
    days: Vec<ServiceDaysBitmap>,
}

impl ChainClass {
    fn new(schedule: &Schedule, chain: Vec<TripId>) -> Self {
        Self {
            days: chain.iter().map(|t| schedule.trip(*t).days.clone()).collect(),
            positions: chain.into_iter().map(|t| vec![t]).collect(),
        }
    }

    fn head(&self) -> TripId {
        self.positions[0][0]
    }

    fn absorb(&mut self, schedule: &Schedule, chain: &[TripId]) {
        for (i, t) in chain.iter().enumerate() {
            self.positions[i].push(*t);
            self.days[i] = self.days[i].union(&schedule.trip(*t).days);
        }
    }
}

/// Merge the trips of every route.
///
/// Routes are processed in order and trips in source order, so the first
/// trip of each class is always the same for the same input.
pub fn merge_trips(schedule: &Schedule) -> MergedTrips {
    let mut result = MergedTrips::default();
    let mut seen: HashSet<TripId> = HashSet::new();

    for route in schedule.route_numbers() {
        let heads: Vec<TripId> = schedule
            .trips_of_route(route)
            .iter()
            .copied()
            .filter(|t| schedule.trip(*t).previous_in_block.is_none())
            .collect();

        let mut classes: Vec<ChainClass> = Vec::new();
        for head in heads {
            let chain = schedule.block_chain(head);
            seen.extend(chain.iter().copied());
            place_chain(schedule, &mut classes, chain, &mut result.stats);
        }

        debug!(route = %route, classes = classes.len(), "route merged");
        for class in classes {
            emit_class(schedule, &mut result, class);
        }
    }

    for id in schedule.trip_ids() {
        if !seen.contains(&id) {
            warn!(trip = %schedule.trip(id).source_id, "trip has no block head, kept unmerged");
            emit_class(schedule, &mut result, ChainClass::new(schedule, vec![id]));
        }
    }

    result
}

/// Add a block chain to the first class that absorbs it, or start a new
/// class. Outcomes that keep the chain apart are logged and the search
/// continues with later classes.
fn place_chain(
    schedule: &Schedule,
    classes: &mut Vec<ChainClass>,
    chain: Vec<TripId>,
    stats: &mut MergeStats,
) {
    let head = chain[0];
    let head_trip = schedule.trip(head);

    for class in classes.iter_mut() {
        if class.positions.len() != chain.len() || !equivalent_chains(schedule, class.head(), head) {
            continue;
        }
        let outcome = classify_chain(schedule, class, &chain);
        let reference = &schedule.trip(class.head()).source_id;

        match outcome {
            MergeOutcome::Merged => stats.merged += 1,
            MergeOutcome::TotallyDuplicate => {
                stats.duplicates += 1;
                warn!(trip = %head_trip.source_id, duplicate_of = %reference, "duplicate trip on the same run");
            }
            MergeOutcome::SameItineraryDifferentRun => {
                stats.different_runs += 1;
                info!(trip = %head_trip.source_id, other = %reference, "same itinerary operated by another run");
            }
            MergeOutcome::Conflict => {
                stats.conflicts += 1;
                warn!(
                    trip = %head_trip.source_id,
                    other = %reference,
                    days = %head_trip.days,
                    "identical trips with overlapping days, not merged"
                );
            }
        }

        if outcome.absorbs() {
            class.absorb(schedule, &chain);
            return;
        }
    }

    classes.push(ChainClass::new(schedule, chain));
}

/// Relate every position of a candidate chain to a class.
///
/// The chain is absorbed only when all positions agree on an absorbing
/// outcome. Mixed disjoint and overlapping positions count as a conflict.
fn classify_chain(schedule: &Schedule, class: &ChainClass, chain: &[TripId]) -> MergeOutcome {
    let outcomes: Vec<MergeOutcome> = chain
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let runs = run_keys(schedule, *t);
            let share_run = class.positions[i]
                .iter()
                .any(|m| !run_keys(schedule, *m).is_disjoint(&runs));
            classify(&class.days[i], &schedule.trip(*t).days, share_run)
        })
        .collect();
    combine_outcomes(&outcomes)
}

fn combine_outcomes(outcomes: &[MergeOutcome]) -> MergeOutcome {
    match outcomes.split_first() {
        None => MergeOutcome::Merged,
        Some((first, rest)) if rest.iter().all(|o| o == first) => *first,
        Some(_) if outcomes
            .iter()
            .any(|o| matches!(o, MergeOutcome::Merged | MergeOutcome::Conflict)) =>
        {
            MergeOutcome::Conflict
        }
        Some(_) => MergeOutcome::SameItineraryDifferentRun,
    }
}

/// Compare two block chains position by position.
///
/// Uses an explicit worklist so chain length does not bound stack depth.
pub fn equivalent_chains(schedule: &Schedule, x: TripId, y: TripId) -> bool {
    let mut pending = vec![(x, y)];
    let mut steps = 0;
    while let Some((a, b)) = pending.pop() {
        steps += 1;
        if steps > schedule.trip_count() || !structurally_equal(schedule, a, b) {
            return false;
        }
        if let (Some(na), Some(nb)) = (schedule.trip(a).next_in_block, schedule.trip(b).next_in_block) {
            pending.push((na, nb));
        }
    }
    true
}

fn structurally_equal(schedule: &Schedule, a: TripId, b: TripId) -> bool {
    let (x, y) = (schedule.trip(a), schedule.trip(b));
    x.route == y.route
        && x.agency == y.agency
        && x.direction == y.direction
        && x.wheelchair_accessible == y.wheelchair_accessible
        && x.next_in_block.is_some() == y.next_in_block.is_some()
        && x.same_public_itinerary(y)
}

/// Circulations a trip is known to run in.
fn run_keys(schedule: &Schedule, trip: TripId) -> HashSet<RunKey> {
    let t = schedule.trip(trip);
    t.runs
        .iter()
        .map(|r| schedule.run(*r).key.clone())
        .chain(t.circulation.clone())
        .collect()
}

/// Relate a candidate's days to a class's days.
pub fn classify(
    class_days: &ServiceDaysBitmap,
    candidate_days: &ServiceDaysBitmap,
    share_run: bool,
) -> MergeOutcome {
    if !class_days.intersects(candidate_days) {
        MergeOutcome::Merged
    } else if class_days == candidate_days && share_run {
        MergeOutcome::TotallyDuplicate
    } else if class_days == candidate_days {
        MergeOutcome::SameItineraryDifferentRun
    } else {
        MergeOutcome::Conflict
    }
}

fn emit_class(schedule: &Schedule, result: &mut MergedTrips, class: ChainClass) {
    let first = result.groups.len();
    let count = class.positions.len();
    for (i, (members, days)) in class.positions.into_iter().zip(class.days).enumerate() {
        let id = GroupId(first + i);
        let reference = members[0];
        for m in &members {
            result.by_trip.insert(*m, id);
        }
        result.groups.push(MergedTripGroup {
            id,
            route: schedule.trip(reference).route.clone(),
            reference,
            members,
            days,
            previous: (i > 0).then(|| GroupId(first + i - 1)),
            next: (i + 1 < count).then(|| GroupId(first + i + 1)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedCalendar, LocationCode, ScheduleTime, TrafficMode};
    use crate::schedule::{StopVisit, Trip};
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

    fn at(code: &str, h: u32, m: u32) -> StopVisit {
        StopVisit::new(
            LocationCode::parse(code).unwrap(),
            ScheduleTime::from_hms(h, m, 0),
            ScheduleTime::from_hms(h, m, 0),
        )
    }

    fn trip(id: &str, days: &str, start: u32) -> Trip {
        Trip::new(
            id,
            RouteNumber::parse("100").unwrap(),
            TrafficMode::Bus,
            bits(days),
            vec![at("S1", 8, start), at("S2", 8, start + 10)],
        )
    }

    fn on_run(mut t: Trip, run: u32) -> Trip {
        t.circulation = Some(RunKey::new(RouteNumber::parse("100").unwrap(), run));
        t
    }

    #[test]
    fn weekday_and_weekend_variants_merge() {
        let mut s = schedule();
        let t1 = s.add_trip(trip("T1", "1111100", 0));
        let t2 = s.add_trip(trip("T2", "0000011", 0));

        let merged = merge_trips(&s);
        assert_eq!(merged.len(), 1);
        let group = &merged.groups[0];
        assert_eq!(group.days, bits("1111111"));
        assert_eq!(group.members, vec![t1, t2]);
        assert_eq!(group.reference, t1);
        assert_eq!(merged.group_of(t2), Some(group.id));
        assert_eq!(merged.stats.merged, 1);
    }

    #[test]
    fn different_times_stay_apart() {
        let mut s = schedule();
        s.add_trip(trip("T1", "1111100", 0));
        s.add_trip(trip("T2", "0000011", 5));
        assert_eq!(merge_trips(&s).len(), 2);
    }

    #[test]
    fn overlapping_days_conflict() {
        let mut s = schedule();
        s.add_trip(trip("T1", "1111100", 0));
        s.add_trip(trip("T2", "0000111", 0));

        let merged = merge_trips(&s);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.stats.conflicts, 1);
    }

    #[test]
    fn duplicate_on_same_run_is_absorbed() {
        let mut s = schedule();
        s.add_trip(on_run(trip("T1", "1111100", 0), 3));
        s.add_trip(on_run(trip("T2", "1111100", 0), 3));

        let merged = merge_trips(&s);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.groups[0].members.len(), 2);
        assert_eq!(merged.stats.duplicates, 1);
    }

    #[test]
    fn same_days_on_different_runs_stay_apart() {
        let mut s = schedule();
        s.add_trip(on_run(trip("T1", "1111100", 0), 3));
        s.add_trip(on_run(trip("T2", "1111100", 0), 4));

        let merged = merge_trips(&s);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.stats.different_runs, 1);
    }

    #[test]
    fn kept_apart_candidate_can_join_later_group() {
        let mut s = schedule();
        s.add_trip(on_run(trip("A", "1111100", 0), 3));
        s.add_trip(on_run(trip("B", "1111100", 0), 4));
        let c = s.add_trip(on_run(trip("C", "0000011", 0), 4));

        let merged = merge_trips(&s);
        // C is disjoint from the first class and joins it
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.groups[0].members.len(), 2);
        assert_eq!(merged.group_of(c), Some(GroupId(0)));
    }

    #[test]
    fn blocks_merge_as_a_whole() {
        let mut s = schedule();
        let a1 = s.add_trip(trip("A1", "1111100", 0));
        let a2 = s.add_trip(trip("A2", "1111100", 30));
        s.link_block(a1, a2);
        let b1 = s.add_trip(trip("B1", "0000011", 0));
        let b2 = s.add_trip(trip("B2", "0000011", 30));
        s.link_block(b1, b2);

        let merged = merge_trips(&s);
        assert_eq!(merged.len(), 2);
        let first = merged.group(merged.group_of(a1).unwrap());
        let second = merged.group(merged.group_of(a2).unwrap());
        assert_eq!(first.members, vec![a1, b1]);
        assert_eq!(second.members, vec![a2, b2]);
        assert_eq!(first.next, Some(second.id));
        assert_eq!(second.previous, Some(first.id));
        assert_eq!(second.days, bits("1111111"));
    }

    #[test]
    fn blocks_overlapping_later_stay_apart() {
        let mut s = schedule();
        let a1 = s.add_trip(trip("A1", "1111100", 0));
        let a2 = s.add_trip(trip("A2", "1111111", 30));
        s.link_block(a1, a2);
        let b1 = s.add_trip(trip("B1", "0000011", 0));
        let b2 = s.add_trip(trip("B2", "0000011", 30));
        s.link_block(b1, b2);

        let merged = merge_trips(&s);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.stats.merged, 0);
        assert_eq!(merged.stats.conflicts, 1);
        assert_ne!(merged.group_of(a1), merged.group_of(b1));
        assert_ne!(merged.group_of(a2), merged.group_of(b2));

        for group in &merged.groups {
            for (i, x) in group.members.iter().enumerate() {
                for y in &group.members[i + 1..] {
                    assert!(!s.trip(*x).days.intersects(&s.trip(*y).days));
                }
            }
        }
    }

    #[test]
    fn chain_outcomes_combine_to_the_worst() {
        use MergeOutcome::*;
        assert_eq!(combine_outcomes(&[Merged, Merged]), Merged);
        assert_eq!(combine_outcomes(&[TotallyDuplicate, TotallyDuplicate]), TotallyDuplicate);
        assert_eq!(combine_outcomes(&[Merged, TotallyDuplicate]), Conflict);
        assert_eq!(combine_outcomes(&[Merged, SameItineraryDifferentRun]), Conflict);
        assert_eq!(combine_outcomes(&[TotallyDuplicate, SameItineraryDifferentRun]), SameItineraryDifferentRun);
        assert_eq!(combine_outcomes(&[SameItineraryDifferentRun, Conflict]), Conflict);
    }

    #[test]
    fn blocks_differing_later_stay_apart() {
        let mut s = schedule();
        let a1 = s.add_trip(trip("A1", "1111100", 0));
        let a2 = s.add_trip(trip("A2", "1111100", 30));
        s.link_block(a1, a2);
        let b1 = s.add_trip(trip("B1", "0000011", 0));
        let b2 = s.add_trip(trip("B2", "0000011", 35));
        s.link_block(b1, b2);
        let lone = s.add_trip(trip("L", "0000011", 0));

        let merged = merge_trips(&s);
        assert_eq!(merged.len(), 5);
        assert!(!equivalent_chains(&s, a1, b1));
        // A lone trip differs from a chain head by its following trip
        assert!(!equivalent_chains(&s, a1, lone));
        assert_ne!(merged.group_of(a1), merged.group_of(b1));
    }

    #[test]
    fn classify_covers_all_relations() {
        let a = bits("1110000");
        assert_eq!(classify(&a, &bits("0001111"), false), MergeOutcome::Merged);
        assert_eq!(classify(&a, &a, true), MergeOutcome::TotallyDuplicate);
        assert_eq!(classify(&a, &a, false), MergeOutcome::SameItineraryDifferentRun);
        assert_eq!(classify(&a, &bits("0011000"), true), MergeOutcome::Conflict);
    }
}
