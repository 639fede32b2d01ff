//! Service-day bitmaps and the feed calendar they are indexed against.
//!
//! Every calendar in the engine is a `ServiceDaysBitmap`: one flag per day
//! of the feed horizon, with index 0 being the feed start date. All
//! operations are pure and return new values.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Error returned when parsing an invalid bitmap string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid service-day bitmap: unexpected character {found:?} at position {position}")]
pub struct ParseBitmapError {
    position: usize,
    found: char,
}

/// A fixed-length, day-indexed service calendar.
///
/// Binary operators require both operands to have the same length. Mixing
/// bitmaps from different feeds is a programming error and panics.
///
/// # Examples
///
/// ```
/// use feed_consolidator::domain::ServiceDaysBitmap;
///
/// let weekdays: ServiceDaysBitmap = "1111100".parse().unwrap();
/// let weekend: ServiceDaysBitmap = "0000011".parse().unwrap();
///
/// assert_eq!(weekdays.union(&weekend).to_string(), "1111111");
/// assert!(weekdays.intersect(&weekend).is_empty());
/// assert_eq!(weekdays.first_day(), Some(0));
/// assert_eq!(weekend.last_day(), Some(6));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceDaysBitmap {
    days: Vec<bool>,
}

impl ServiceDaysBitmap {
    /// A bitmap of the given length with no service on any day.
    pub fn none(len: usize) -> Self {
        Self {
            days: vec![false; len],
        }
    }

    /// A bitmap of the given length with service on every day.
    pub fn all(len: usize) -> Self {
        Self {
            days: vec![true; len],
        }
    }

    /// Build a bitmap from explicit per-day flags.
    pub fn from_bools(days: Vec<bool>) -> Self {
        Self { days }
    }

    /// Build a bitmap with service on the given day indices.
    ///
    /// Indices outside `0..len` are ignored.
    pub fn from_days(len: usize, active: impl IntoIterator<Item = usize>) -> Self {
        let mut days = vec![false; len];
        for idx in active {
            if let Some(day) = days.get_mut(idx) {
                *day = true;
            }
        }
        Self { days }
    }

    /// Union of a collection of bitmaps.
    ///
    /// An empty collection yields an all-false bitmap of length `len`.
    pub fn union_all<'a>(len: usize, bitmaps: impl IntoIterator<Item = &'a Self>) -> Self {
        bitmaps
            .into_iter()
            .fold(Self::none(len), |acc, b| acc.union(b))
    }

    /// Number of days in the horizon.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Whether the service runs on the given day. Out-of-range days are `false`.
    pub fn get(&self, day: usize) -> bool {
        self.days.get(day).copied().unwrap_or(false)
    }

    /// Number of active days.
    pub fn count(&self) -> usize {
        self.days.iter().filter(|d| **d).count()
    }

    /// Returns true if the service never runs.
    pub fn is_empty(&self) -> bool {
        !self.days.iter().any(|d| *d)
    }

    /// Iterate over the indices of active days, in ascending order.
    pub fn iter_days(&self) -> impl Iterator<Item = usize> + '_ {
        self.days
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(|(idx, _)| idx)
    }

    pub fn union(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a || b)
    }

    pub fn intersect(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a && b)
    }

    /// Days active in `self` but not in `other`.
    pub fn subtract(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a && !b)
    }

    /// Returns true if the two bitmaps share at least one active day.
    pub fn intersects(&self, other: &Self) -> bool {
        assert_eq!(self.len(), other.len(), "bitmap length mismatch");
        self.days.iter().zip(&other.days).any(|(a, b)| *a && *b)
    }

    /// Returns true if every active day of `self` is active in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        assert_eq!(self.len(), other.len(), "bitmap length mismatch");
        self.days.iter().zip(&other.days).all(|(a, b)| !*a || *b)
    }

    /// Index of the first active day.
    pub fn first_day(&self) -> Option<usize> {
        self.days.iter().position(|d| *d)
    }

    /// Index of the last active day.
    pub fn last_day(&self) -> Option<usize> {
        self.days.iter().rposition(|d| *d)
    }

    /// Drop the first `n` days and pad the end with inactive days.
    ///
    /// Used to re-base a bitmap written `n` days ago onto today's feed start.
    pub fn shift_left(&self, n: usize) -> Self {
        let len = self.len();
        let mut days: Vec<bool> = self.days.iter().skip(n).copied().collect();
        days.resize(len, false);
        Self { days }
    }

    /// Truncate or pad (with inactive days) to a new horizon length.
    pub fn resized(&self, len: usize) -> Self {
        let mut days = self.days.clone();
        days.resize(len, false);
        Self { days }
    }

    fn zip_with(&self, other: &Self, f: impl Fn(bool, bool) -> bool) -> Self {
        assert_eq!(self.len(), other.len(), "bitmap length mismatch");
        Self {
            days: self
                .days
                .iter()
                .zip(&other.days)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        }
    }
}

impl fmt::Debug for ServiceDaysBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceDaysBitmap({})", self)
    }
}

impl fmt::Display for ServiceDaysBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for day in &self.days {
            f.write_str(if *day { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for ServiceDaysBitmap {
    type Err = ParseBitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let days = s
            .chars()
            .enumerate()
            .map(|(position, c)| match c {
                '1' => Ok(true),
                '0' => Ok(false),
                found => Err(ParseBitmapError { position, found }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { days })
    }
}

/// Error returned when parsing a `yyMMdd` date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid short date: {0:?}")]
pub struct InvalidShortDate(String);

/// Format a date as `yyMMdd`, the form used inside external identifiers.
pub fn format_short_date(date: NaiveDate) -> String {
    date.format("%y%m%d").to_string()
}

/// Parse a `yyMMdd` date.
pub fn parse_short_date(s: &str) -> Result<NaiveDate, InvalidShortDate> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidShortDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%y%m%d").map_err(|_| InvalidShortDate(s.to_string()))
}

/// The date range a feed covers: its start date and horizon length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCalendar {
    start: NaiveDate,
    horizon: usize,
}

impl FeedCalendar {
    pub fn new(start: NaiveDate, horizon: usize) -> Self {
        Self { start, horizon }
    }

    /// The date of bitmap index 0.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Number of days covered.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Last covered date.
    pub fn end(&self) -> NaiveDate {
        self.date_of(self.horizon.saturating_sub(1))
    }

    /// The date of a bitmap index.
    pub fn date_of(&self, day: usize) -> NaiveDate {
        self.start + Duration::days(day as i64)
    }

    /// The bitmap index of a date, if it falls inside the horizon.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let offset = (date - self.start).num_days();
        if offset < 0 || offset as usize >= self.horizon {
            return None;
        }
        Some(offset as usize)
    }

    /// Weekday of a bitmap index.
    pub fn weekday_of(&self, day: usize) -> Weekday {
        self.date_of(day).weekday()
    }

    /// An all-false bitmap of this feed's length.
    pub fn empty_bitmap(&self) -> ServiceDaysBitmap {
        ServiceDaysBitmap::none(self.horizon)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_pair() -> impl Strategy<Value = (ServiceDaysBitmap, ServiceDaysBitmap)> {
        (1usize..60).prop_flat_map(|len| {
            (
                prop::collection::vec(any::<bool>(), len),
                prop::collection::vec(any::<bool>(), len),
            )
                .prop_map(|(a, b)| {
                    (
                        ServiceDaysBitmap::from_bools(a),
                        ServiceDaysBitmap::from_bools(b),
                    )
                })
        })
    }

    proptest! {
        /// Absorption: (a ∪ b) ∩ a = a
        #[test]
        fn union_then_intersect_is_identity((a, b) in arb_pair()) {
            prop_assert_eq!(a.union(&b).intersect(&a), a);
        }

        /// Self-difference is empty
        #[test]
        fn subtract_self_is_empty((a, _b) in arb_pair()) {
            prop_assert!(a.subtract(&a).is_empty());
        }

        /// String encoding is lossless
        #[test]
        fn string_roundtrip((a, _b) in arb_pair()) {
            let parsed: ServiceDaysBitmap = a.to_string().parse().unwrap();
            prop_assert_eq!(parsed, a);
        }

        /// Difference and intersection partition the original
        #[test]
        fn subtract_and_intersect_partition((a, b) in arb_pair()) {
            let inside = a.intersect(&b);
            let outside = a.subtract(&b);
            prop_assert!(!inside.intersects(&outside));
            prop_assert_eq!(inside.union(&outside), a);
        }

        /// Subset agrees with intersection
        #[test]
        fn subset_iff_intersection_is_self((a, b) in arb_pair()) {
            prop_assert_eq!(a.is_subset_of(&b), a.intersect(&b) == a);
        }

        /// Shifting never adds service and preserves length
        #[test]
        fn shift_left_preserves_length((a, _b) in arb_pair(), n in 0usize..80) {
            let shifted = a.shift_left(n);
            prop_assert_eq!(shifted.len(), a.len());
            prop_assert!(shifted.count() <= a.count());
        }
    }
}
