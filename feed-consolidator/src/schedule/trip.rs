//! Trip and stop-visit types.

use crate::domain::{LocationCode, RouteNumber, RunKey, ScheduleTime, ServiceDaysBitmap, TrafficMode};

use super::{PeriodId, RunId, TripId};

/// A stop on a trip's itinerary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopVisit {
    pub location: LocationCode,
    pub arrival: ScheduleTime,
    pub departure: ScheduleTime,
    /// Whether the stop is served publicly. Non-public visits (depot
    /// movements, timing points) are ignored by equivalence and identity.
    pub public: bool,
}

impl StopVisit {
    pub fn new(location: LocationCode, arrival: ScheduleTime, departure: ScheduleTime) -> Self {
        Self {
            location,
            arrival,
            departure,
            public: true,
        }
    }

    /// Mark the visit as not served publicly.
    pub fn non_public(mut self) -> Self {
        self.public = false;
        self
    }
}

/// An itinerary instance operating on a set of days.
///
/// Block links and run membership refer to other arena entries by index;
/// see [`Schedule`](super::Schedule).
#[derive(Debug, Clone)]
pub struct Trip {
    /// Identifier local to the source export. Trips produced by calendar
    /// splitting share the identifier of the trip they were split from.
    pub source_id: String,
    pub route: RouteNumber,
    pub agency: String,
    pub mode: TrafficMode,
    pub direction: u8,
    pub wheelchair_accessible: bool,
    pub days: ServiceDaysBitmap,
    pub visits: Vec<StopVisit>,
    /// Circulation the source export planned this trip under, if any.
    pub circulation: Option<RunKey>,
    pub previous_in_block: Option<TripId>,
    pub next_in_block: Option<TripId>,
    pub runs: Vec<RunId>,
    pub periods: Vec<PeriodId>,
}

impl Trip {
    /// Create a trip with no block links, runs or periods.
    pub fn new(
        source_id: impl Into<String>,
        route: RouteNumber,
        mode: TrafficMode,
        days: ServiceDaysBitmap,
        visits: Vec<StopVisit>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            route,
            agency: String::new(),
            mode,
            direction: 0,
            wheelchair_accessible: false,
            days,
            visits,
            circulation: None,
            previous_in_block: None,
            next_in_block: None,
            runs: Vec::new(),
            periods: Vec::new(),
        }
    }

    /// Publicly served visits, in itinerary order.
    pub fn public_visits(&self) -> impl Iterator<Item = &StopVisit> {
        self.visits.iter().filter(|v| v.public)
    }

    pub fn first_public_visit(&self) -> Option<&StopVisit> {
        self.visits.iter().find(|v| v.public)
    }

    pub fn last_public_visit(&self) -> Option<&StopVisit> {
        self.visits.iter().rev().find(|v| v.public)
    }

    /// Departure time from the first public stop.
    pub fn first_departure(&self) -> Option<ScheduleTime> {
        self.first_public_visit().map(|v| v.departure)
    }

    /// Arrival time at the last public stop.
    pub fn last_arrival(&self) -> Option<ScheduleTime> {
        self.last_public_visit().map(|v| v.arrival)
    }

    /// Compare public itineraries.
    ///
    /// Each position must visit the same location at the same times, except
    /// for the arrival at the first stop and the departure from the last,
    /// which are not compared.
    pub fn same_public_itinerary(&self, other: &Trip) -> bool {
        let mine: Vec<&StopVisit> = self.public_visits().collect();
        let theirs: Vec<&StopVisit> = other.public_visits().collect();
        if mine.len() != theirs.len() {
            return false;
        }
        let last = mine.len().saturating_sub(1);
        mine.iter().zip(&theirs).enumerate().all(|(i, (a, b))| {
            a.location == b.location
                && (i == 0 || a.arrival == b.arrival)
                && (i == last || a.departure == b.departure)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(code: &str, arr: (u32, u32), dep: (u32, u32)) -> StopVisit {
        StopVisit::new(
            LocationCode::parse(code).unwrap(),
            ScheduleTime::from_hms(arr.0, arr.1, 0),
            ScheduleTime::from_hms(dep.0, dep.1, 0),
        )
    }

    fn trip(visits: Vec<StopVisit>) -> Trip {
        Trip::new(
            "t",
            RouteNumber::parse("100").unwrap(),
            TrafficMode::Bus,
            "1111111".parse().unwrap(),
            visits,
        )
    }

    #[test]
    fn boundary_times_are_not_compared() {
        let a = trip(vec![visit("S1", (7, 55), (8, 0)), visit("S2", (8, 10), (8, 10))]);
        let b = trip(vec![visit("S1", (7, 58), (8, 0)), visit("S2", (8, 10), (8, 20))]);
        assert!(a.same_public_itinerary(&b));
    }

    #[test]
    fn inner_times_are_compared() {
        let a = trip(vec![
            visit("S1", (8, 0), (8, 0)),
            visit("S2", (8, 5), (8, 6)),
            visit("S3", (8, 10), (8, 10)),
        ]);
        let b = trip(vec![
            visit("S1", (8, 0), (8, 0)),
            visit("S2", (8, 5), (8, 7)),
            visit("S3", (8, 10), (8, 10)),
        ]);
        assert!(!a.same_public_itinerary(&b));
    }

    #[test]
    fn non_public_visits_are_ignored() {
        let a = trip(vec![
            visit("DEPOT", (7, 40), (7, 40)).non_public(),
            visit("S1", (8, 0), (8, 0)),
            visit("S2", (8, 10), (8, 10)),
        ]);
        let b = trip(vec![visit("S1", (8, 0), (8, 0)), visit("S2", (8, 10), (8, 10))]);
        assert!(a.same_public_itinerary(&b));
        assert_eq!(a.first_departure(), Some(ScheduleTime::from_hms(8, 0, 0)));
        assert_eq!(a.last_arrival(), Some(ScheduleTime::from_hms(8, 10, 0)));
    }

    #[test]
    fn different_locations_differ() {
        let a = trip(vec![visit("S1", (8, 0), (8, 0)), visit("S2", (8, 10), (8, 10))]);
        let b = trip(vec![visit("S1", (8, 0), (8, 0)), visit("S3", (8, 10), (8, 10))]);
        let c = trip(vec![visit("S1", (8, 0), (8, 0))]);
        assert!(!a.same_public_itinerary(&b));
        assert!(!a.same_public_itinerary(&c));
    }
}
