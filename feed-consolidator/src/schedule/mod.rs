//! The in-memory source schedule.
//!
//! Trips, runs and timetable periods live in arenas and refer to each other
//! by index (`TripId`, `RunId`, `PeriodId`). Calendar splitting appends new
//! trips and rewrites indices in place, so handles held elsewhere stay valid.

mod run;
mod trip;

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::domain::{FeedCalendar, RouteNumber, ServiceDaysBitmap};
use crate::versioned::VersionedStore;

pub use run::{RouteVersion, Run, TimetablePeriod};
pub use trip::{StopVisit, Trip};

/// Index of a trip in the schedule arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TripId(pub usize);

/// Index of a run in the schedule arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub usize);

/// Index of a timetable period in the schedule arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodId(pub usize);

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fully cross-referenced source schedule for one feed.
#[derive(Debug, Clone)]
pub struct Schedule {
    feed: FeedCalendar,
    pub routes: VersionedStore<RouteNumber, RouteVersion>,
    trips: Vec<Trip>,
    runs: Vec<Run>,
    periods: Vec<TimetablePeriod>,
    /// Trips of each route, in source order. Split siblings sit right after
    /// the trip they were split from.
    route_trips: BTreeMap<RouteNumber, Vec<TripId>>,
}

impl Schedule {
    pub fn new(feed: FeedCalendar) -> Self {
        Self {
            feed,
            routes: VersionedStore::new(),
            trips: Vec::new(),
            runs: Vec::new(),
            periods: Vec::new(),
            route_trips: BTreeMap::new(),
        }
    }

    pub fn feed(&self) -> &FeedCalendar {
        &self.feed
    }

    pub fn add_trip(&mut self, trip: Trip) -> TripId {
        let id = TripId(self.trips.len());
        self.route_trips
            .entry(trip.route.clone())
            .or_default()
            .push(id);
        self.trips.push(trip);
        id
    }

    /// Add a trip and list it directly after `original` under its route.
    pub fn add_trip_after(&mut self, original: TripId, trip: Trip) -> TripId {
        let id = TripId(self.trips.len());
        let list = self.route_trips.entry(trip.route.clone()).or_default();
        match list.iter().position(|t| *t == original) {
            Some(pos) => list.insert(pos + 1, id),
            None => list.push(id),
        }
        self.trips.push(trip);
        id
    }

    pub fn add_run(&mut self, run: Run) -> RunId {
        let id = RunId(self.runs.len());
        self.runs.push(run);
        id
    }

    pub fn add_period(&mut self, period: TimetablePeriod) -> PeriodId {
        let id = PeriodId(self.periods.len());
        self.periods.push(period);
        id
    }

    pub fn trip(&self, id: TripId) -> &Trip {
        &self.trips[id.0]
    }

    pub fn trip_mut(&mut self, id: TripId) -> &mut Trip {
        &mut self.trips[id.0]
    }

    pub fn run(&self, id: RunId) -> &Run {
        &self.runs[id.0]
    }

    pub fn run_mut(&mut self, id: RunId) -> &mut Run {
        &mut self.runs[id.0]
    }

    pub fn period(&self, id: PeriodId) -> &TimetablePeriod {
        &self.periods[id.0]
    }

    pub fn trip_ids(&self) -> impl Iterator<Item = TripId> + use<> {
        (0..self.trips.len()).map(TripId)
    }

    pub fn run_ids(&self) -> impl Iterator<Item = RunId> + use<> {
        (0..self.runs.len()).map(RunId)
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    /// Route numbers with at least one trip, in order.
    pub fn route_numbers(&self) -> impl Iterator<Item = &RouteNumber> {
        self.route_trips.keys()
    }

    /// Trips of a route, in source order.
    pub fn trips_of_route(&self, route: &RouteNumber) -> &[TripId] {
        self.route_trips
            .get(route)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Link two trips as consecutive in one vehicle block.
    pub fn link_block(&mut self, prev: TripId, next: TripId) {
        self.trips[prev.0].next_in_block = Some(next);
        self.trips[next.0].previous_in_block = Some(prev);
    }

    /// Remove the block link leaving `prev`, if any.
    pub fn unlink_next(&mut self, prev: TripId) {
        if let Some(next) = self.trips[prev.0].next_in_block.take()
            && self.trips[next.0].previous_in_block == Some(prev)
        {
            self.trips[next.0].previous_in_block = None;
        }
    }

    /// The whole block containing `id`, from its first trip to its last.
    ///
    /// Stops early if the links contain a cycle.
    pub fn block_chain(&self, id: TripId) -> Vec<TripId> {
        let mut head = id;
        let mut steps = 0;
        while let Some(prev) = self.trips[head.0].previous_in_block {
            head = prev;
            steps += 1;
            if steps > self.trips.len() {
                break;
            }
        }

        let mut chain = vec![head];
        let mut current = head;
        while let Some(next) = self.trips[current.0].next_in_block {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Log route versions that no trip uses.
    pub fn report_unused_route_versions(&self) {
        for (route, entity) in self.routes.iter() {
            let route_days = self
                .trips_of_route(route)
                .iter()
                .map(|id| &self.trips[id.0].days);
            let used = ServiceDaysBitmap::union_all(self.feed.horizon(), route_days);
            for version in entity.versions() {
                if !version.days.intersects(&used) {
                    info!(route = %route, name = %version.value.name, "route version has no trips");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrafficMode;
    use chrono::NaiveDate;

    fn schedule() -> Schedule {
        Schedule::new(FeedCalendar::new(
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            7,
        ))
    }

    fn trip(id: &str, route: &str) -> Trip {
        Trip::new(
            id,
            RouteNumber::parse(route).unwrap(),
            TrafficMode::Tram,
            ServiceDaysBitmap::all(7),
            vec![],
        )
    }

    #[test]
    fn trips_grouped_by_route() {
        let mut s = schedule();
        let a = s.add_trip(trip("a", "1"));
        let b = s.add_trip(trip("b", "2"));
        let c = s.add_trip(trip("c", "1"));
        let one = RouteNumber::parse("1").unwrap();
        assert_eq!(s.trips_of_route(&one), &[a, c]);
        assert_eq!(s.trips_of_route(&RouteNumber::parse("2").unwrap()), &[b]);
        assert!(s.trips_of_route(&RouteNumber::parse("3").unwrap()).is_empty());

        let d = s.add_trip_after(a, trip("a", "1"));
        assert_eq!(s.trips_of_route(&one), &[a, d, c]);
        assert_eq!(s.route_numbers().count(), 2);
    }

    #[test]
    fn block_chain_walks_both_directions() {
        let mut s = schedule();
        let a = s.add_trip(trip("a", "1"));
        let b = s.add_trip(trip("b", "1"));
        let c = s.add_trip(trip("c", "1"));
        s.link_block(a, b);
        s.link_block(b, c);
        assert_eq!(s.block_chain(b), vec![a, b, c]);
        assert_eq!(s.block_chain(c), vec![a, b, c]);

        s.unlink_next(a);
        assert_eq!(s.block_chain(c), vec![b, c]);
        assert_eq!(s.block_chain(a), vec![a]);
    }

    #[test]
    fn block_chain_survives_cycles() {
        let mut s = schedule();
        let a = s.add_trip(trip("a", "1"));
        let b = s.add_trip(trip("b", "1"));
        s.link_block(a, b);
        s.link_block(b, a);
        let chain = s.block_chain(a);
        assert!(chain.len() <= 2);
    }
}
