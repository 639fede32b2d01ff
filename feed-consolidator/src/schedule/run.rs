//! Circulations, timetable periods and route metadata.

use crate::domain::{RunKey, ServiceDaysBitmap, TrafficMode, WeekdayPattern};

use super::TripId;

/// A named vehicle circulation.
#[derive(Debug, Clone)]
pub struct Run {
    pub key: RunKey,
    pub days: ServiceDaysBitmap,
    /// Source-local trip identifiers, in running order, as exported.
    pub trip_refs: Vec<String>,
    /// Resolved trips, in running order.
    pub trips: Vec<TripId>,
    /// Block chains known to run within this circulation.
    pub block_fragments: Vec<Vec<TripId>>,
}

impl Run {
    pub fn new(key: RunKey, days: ServiceDaysBitmap, trip_refs: Vec<String>) -> Self {
        Self {
            key,
            days,
            trip_refs,
            trips: Vec::new(),
            block_fragments: Vec::new(),
        }
    }

    /// Record that `next` follows `prev` in this circulation.
    ///
    /// Joins or extends any fragment already ending in `prev` or starting
    /// with `next`. A link already recorded is left alone.
    pub fn register_link(&mut self, prev: TripId, next: TripId) {
        if self
            .block_fragments
            .iter()
            .any(|f| f.windows(2).any(|w| w == [prev, next]))
        {
            return;
        }
        let ending = self
            .block_fragments
            .iter()
            .position(|f| f.last() == Some(&prev));
        let starting = self
            .block_fragments
            .iter()
            .position(|f| f.first() == Some(&next));

        match (ending, starting) {
            (Some(e), Some(s)) if e != s => {
                let tail = self.block_fragments[s].clone();
                self.block_fragments[e].extend(tail);
                self.block_fragments.remove(s);
            }
            (Some(_), Some(_)) => {}
            (Some(e), None) => self.block_fragments[e].push(next),
            (None, Some(s)) => self.block_fragments[s].insert(0, prev),
            (None, None) => self.block_fragments.push(vec![prev, next]),
        }
    }

    /// Replace every reference to `old` with `new`.
    pub fn replace_trip(&mut self, old: TripId, new: TripId) {
        for id in self
            .trips
            .iter_mut()
            .chain(self.block_fragments.iter_mut().flatten())
        {
            if *id == old {
                *id = new;
            }
        }
    }

    /// Insert `sibling` immediately after each occurrence of `original`.
    pub fn add_sibling(&mut self, original: TripId, sibling: TripId) {
        if let Some(pos) = self.trips.iter().position(|t| *t == original) {
            self.trips.insert(pos + 1, sibling);
        }
    }
}

/// A timetable period ("grafikon"): the date range and weekday pattern
/// under which a group of trips nominally operates.
#[derive(Debug, Clone)]
pub struct TimetablePeriod {
    pub id: String,
    /// Days of the feed horizon the period is valid on.
    pub days: ServiceDaysBitmap,
    pub weekdays: WeekdayPattern,
}

/// Route metadata valid over part of the feed horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteVersion {
    pub agency: String,
    pub mode: TrafficMode,
    pub name: String,
}
