//! Weekday-pattern calendars with dated exceptions.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::domain::{FeedCalendar, ServiceDaysBitmap, WeekdayPattern};

/// Whether an exception adds or removes service on its date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalendarException {
    Added,
    Removed,
}

impl fmt::Display for CalendarException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarException::Added => write!(f, "add"),
            CalendarException::Removed => write!(f, "remove"),
        }
    }
}

/// A service calendar: a weekday pattern over a date range plus exceptions.
///
/// Two records are equal only when pattern, range and every exception
/// agree, so equal records describe the same days.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalendarRecord {
    pub weekdays: WeekdayPattern,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub exceptions: BTreeMap<NaiveDate, CalendarException>,
}

impl CalendarRecord {
    /// Whether service operates on `date`.
    pub fn operates_on(&self, date: NaiveDate) -> bool {
        if date < self.start || date > self.end {
            return false;
        }
        match self.exceptions.get(&date) {
            Some(CalendarException::Added) => true,
            Some(CalendarException::Removed) => false,
            None => self.weekdays.get(date.weekday()),
        }
    }

    /// Expand the record onto a feed's days.
    pub fn replay(&self, feed: &FeedCalendar) -> ServiceDaysBitmap {
        ServiceDaysBitmap::from_days(
            feed.horizon(),
            (0..feed.horizon()).filter(|d| self.operates_on(feed.date_of(*d))),
        )
    }

    pub fn added_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates_with(CalendarException::Added)
    }

    pub fn removed_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates_with(CalendarException::Removed)
    }

    fn dates_with(&self, kind: CalendarException) -> impl Iterator<Item = NaiveDate> + '_ {
        self.exceptions
            .iter()
            .filter(move |(_, k)| **k == kind)
            .map(|(d, _)| *d)
    }
}

impl fmt::Display for CalendarRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}..{}",
            self.weekdays,
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )?;
        for (date, kind) in &self.exceptions {
            write!(f, " {kind}:{}", date.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}
