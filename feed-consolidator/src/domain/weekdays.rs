//! Weekday operating patterns.

use std::fmt;

use chrono::Weekday;

use super::{FeedCalendar, ServiceDaysBitmap};

/// Seven weekday flags, Monday first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekdayPattern([bool; 7]);

impl WeekdayPattern {
    /// A pattern with no operating weekdays.
    pub const NONE: Self = Self([false; 7]);

    /// A pattern operating every day.
    pub const DAILY: Self = Self([true; 7]);

    /// Create from flags ordered Monday to Sunday.
    pub fn new(flags: [bool; 7]) -> Self {
        Self(flags)
    }

    /// Parse a seven-character `0`/`1` string ordered Monday to Sunday.
    ///
    /// ```
    /// use feed_consolidator::domain::WeekdayPattern;
    /// use chrono::Weekday;
    ///
    /// let pattern = WeekdayPattern::parse("1111100").unwrap();
    /// assert!(pattern.get(Weekday::Fri));
    /// assert!(!pattern.get(Weekday::Sat));
    /// assert!(WeekdayPattern::parse("11111").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 7 {
            return None;
        }
        let mut flags = [false; 7];
        for (flag, b) in flags.iter_mut().zip(bytes) {
            *flag = match b {
                b'1' => true,
                b'0' => false,
                _ => return None,
            };
        }
        Some(Self(flags))
    }

    pub fn get(&self, weekday: Weekday) -> bool {
        self.0[weekday.num_days_from_monday() as usize]
    }

    pub fn with(mut self, weekday: Weekday, on: bool) -> Self {
        self.0[weekday.num_days_from_monday() as usize] = on;
        self
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut flags = self.0;
        for (flag, o) in flags.iter_mut().zip(other.0) {
            *flag |= o;
        }
        Self(flags)
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|f| *f)
    }

    /// Derive a pattern from a bitmap when no timetable period describes it.
    ///
    /// A weekday is on when the bitmap is active on at least half of that
    /// weekday's occurrences between its first and last active day.
    pub fn from_bitmap_majority(bitmap: &ServiceDaysBitmap, feed: &FeedCalendar) -> Self {
        let (Some(first), Some(last)) = (bitmap.first_day(), bitmap.last_day()) else {
            return Self::NONE;
        };

        let mut active = [0usize; 7];
        let mut total = [0usize; 7];
        for day in first..=last {
            let wd = feed.weekday_of(day).num_days_from_monday() as usize;
            total[wd] += 1;
            if bitmap.get(day) {
                active[wd] += 1;
            }
        }

        let mut flags = [false; 7];
        for wd in 0..7 {
            flags[wd] = total[wd] > 0 && active[wd] * 2 >= total[wd];
        }
        Self(flags)
    }

    /// Flags ordered Monday to Sunday.
    pub fn flags(&self) -> [bool; 7] {
        self.0
    }
}

impl IntoIterator for &WeekdayPattern {
    type Item = bool;
    type IntoIter = std::array::IntoIter<bool, 7>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Debug for WeekdayPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeekdayPattern({})", self)
    }
}

impl fmt::Display for WeekdayPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for on in self {
            f.write_str(if on { "1" } else { "0" })?;
        }
        Ok(())
    }
}
