//! Calendar synthesis from service-day bitmaps.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, error};

use crate::domain::{FeedCalendar, ServiceDaysBitmap, WeekdayPattern};
use crate::schedule::{PeriodId, Schedule, TimetablePeriod, TripId};

use super::{CalendarError, CalendarException, CalendarRecord};

/// Builds calendar records for bitmaps of one feed.
#[derive(Debug, Clone, Copy)]
pub struct CalendarSynthesizer {
    feed: FeedCalendar,
}

impl CalendarSynthesizer {
    pub fn new(feed: FeedCalendar) -> Self {
        Self { feed }
    }

    /// Synthesize a calendar for `bitmap`, guided by the timetable periods
    /// its trips were planned under.
    ///
    /// When the periods or the bitmap reach the end of the feed, the
    /// calendar is treated as open-ended: it runs to the feed end and takes
    /// its weekdays only from periods that do too. Otherwise it ends on the
    /// last active day and takes the weekdays of every period. Without any
    /// period, weekdays are derived from the bitmap itself.
    ///
    /// The result is checked by replaying it against `bitmap`.
    pub fn synthesize(
        &self,
        bitmap: &ServiceDaysBitmap,
        periods: &[&TimetablePeriod],
    ) -> Result<CalendarRecord, CalendarError> {
        let horizon = self.feed.horizon();
        if bitmap.len() != horizon {
            return Err(CalendarError::HorizonMismatch {
                expected: horizon,
                found: bitmap.len(),
            });
        }
        let (Some(first), Some(last)) = (bitmap.first_day(), bitmap.last_day()) else {
            return Err(CalendarError::EmptyBitmap);
        };

        let covered = ServiceDaysBitmap::union_all(horizon, periods.iter().map(|p| &p.days)).union(bitmap);
        let open_ended = covered.get(horizon - 1);

        let mut weekdays = periods
            .iter()
            .filter(|p| !open_ended || p.days.get(horizon - 1))
            .fold(WeekdayPattern::NONE, |acc, p| acc.union(&p.weekdays));
        if weekdays.is_empty() {
            weekdays = WeekdayPattern::from_bitmap_majority(bitmap, &self.feed);
        }

        let end_day = if open_ended { horizon - 1 } else { last };

        let mut exceptions = BTreeMap::new();
        for day in first..=end_day {
            let predicted = weekdays.get(self.feed.weekday_of(day));
            match (predicted, bitmap.get(day)) {
                (false, true) => {
                    exceptions.insert(self.feed.date_of(day), CalendarException::Added);
                }
                (true, false) => {
                    exceptions.insert(self.feed.date_of(day), CalendarException::Removed);
                }
                _ => {}
            }
        }

        let record = CalendarRecord {
            weekdays,
            start: self.feed.date_of(first),
            end: self.feed.date_of(end_day),
            exceptions,
        };

        let replayed = record.replay(&self.feed);
        if &replayed != bitmap {
            error!(expected = %bitmap, found = %replayed, "calendar does not reproduce its days");
            return Err(CalendarError::RoundTripMismatch {
                expected: bitmap.clone(),
                found: replayed,
            });
        }

        debug!(days = %bitmap, calendar = %record, open_ended, "calendar synthesized");
        Ok(record)
    }
}

/// Timetable periods the given trips were planned under, without repeats.
pub fn periods_of(schedule: &Schedule, trips: impl IntoIterator<Item = TripId>) -> Vec<&TimetablePeriod> {
    let mut ids: Vec<PeriodId> = Vec::new();
    for trip in trips {
        for p in &schedule.trip(trip).periods {
            if !ids.contains(p) {
                ids.push(*p);
            }
        }
    }
    ids.into_iter().map(|id| schedule.period(id)).collect()
}

/// Identifier of a deduplicated calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CalendarId(pub usize);

impl fmt::Display for CalendarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Calendar records keyed by content; equal records share one id.
#[derive(Debug, Clone, Default)]
pub struct CalendarRegistry {
    records: Vec<CalendarRecord>,
    index: HashMap<CalendarRecord, CalendarId>,
}

impl CalendarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, returning the id of an equal record if one exists.
    pub fn intern(&mut self, record: CalendarRecord) -> CalendarId {
        if let Some(id) = self.index.get(&record) {
            return *id;
        }
        let id = CalendarId(self.records.len());
        self.index.insert(record.clone(), id);
        self.records.push(record);
        id
    }

    pub fn get(&self, id: CalendarId) -> &CalendarRecord {
        &self.records[id.0]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CalendarId, &CalendarRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (CalendarId(i), r))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn arb_period(horizon: usize) -> impl Strategy<Value = TimetablePeriod> {
        (
            prop::collection::vec(any::<bool>(), horizon),
            any::<[bool; 7]>(),
        )
            .prop_map(|(days, weekdays)| TimetablePeriod {
                id: "P".into(),
                days: ServiceDaysBitmap::from_bools(days),
                weekdays: WeekdayPattern::new(weekdays),
            })
    }

    proptest! {
        /// Replaying a synthesized calendar gives back the bitmap,
        /// with nothing outside its own range
        #[test]
        fn synthesis_round_trips(
            days in prop::collection::vec(any::<bool>(), 21),
            periods in prop::collection::vec(arb_period(21), 0..3),
            offset in 0i64..7,
        ) {
            let bitmap = ServiceDaysBitmap::from_bools(days);
            prop_assume!(!bitmap.is_empty());

            let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap() + chrono::Duration::days(offset);
            let feed = FeedCalendar::new(start, 21);
            let refs: Vec<&TimetablePeriod> = periods.iter().collect();
            let record = CalendarSynthesizer::new(feed).synthesize(&bitmap, &refs).unwrap();

            prop_assert_eq!(record.replay(&feed), bitmap.clone());
            prop_assert_eq!(feed.index_of(record.start), bitmap.first_day());
            for day in 0..21 {
                let date = feed.date_of(day);
                if date < record.start || date > record.end {
                    prop_assert!(!record.operates_on(date));
                }
            }
        }
    }
}
