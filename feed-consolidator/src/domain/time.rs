//! Timetable times.
//!
//! Source schedules express stop times relative to the start of the service
//! day, so a trip leaving at 23:50 reaches its terminus at "24:20" rather
//! than wrapping to 00:20. `ScheduleTime` keeps that representation.

use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an invalid time string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time: {reason}")]
pub struct TimeError {
    reason: &'static str,
}

impl TimeError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// Seconds since the start of the service day.
///
/// # Examples
///
/// ```
/// use feed_consolidator::domain::ScheduleTime;
///
/// let t: ScheduleTime = "8:05".parse().unwrap();
/// assert_eq!(t.to_string(), "08:05:00");
///
/// // Past-midnight times stay on the same service day
/// let late: ScheduleTime = "24:20:30".parse().unwrap();
/// assert!(late > t);
/// assert_eq!(late.seconds(), 24 * 3600 + 20 * 60 + 30);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleTime(u32);

impl ScheduleTime {
    /// Create from a number of seconds since service-day start.
    pub fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    /// Create from hours, minutes and seconds.
    ///
    /// Hours may exceed 23.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn seconds(&self) -> u32 {
        self.0
    }

    /// Signed difference `self - earlier`, in seconds.
    pub fn seconds_since(&self, earlier: ScheduleTime) -> i64 {
        self.0 as i64 - earlier.0 as i64
    }
}

impl FromStr for ScheduleTime {
    type Err = TimeError;

    /// Parse `H:MM`, `HH:MM` or `HH:MM:SS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');

        let hours = parts
            .next()
            .filter(|h| !h.is_empty() && h.len() <= 2)
            .and_then(|h| h.parse::<u32>().ok())
            .ok_or_else(|| TimeError::new("invalid hour digits"))?;

        let minutes = parts
            .next()
            .and_then(|m| parse_two_digits(m.as_bytes()))
            .ok_or_else(|| TimeError::new("invalid minute digits"))?;
        if minutes > 59 {
            return Err(TimeError::new("minute must be 0-59"));
        }

        let seconds = match parts.next() {
            Some(sec) => parse_two_digits(sec.as_bytes())
                .ok_or_else(|| TimeError::new("invalid second digits"))?,
            None => 0,
        };
        if seconds > 59 {
            return Err(TimeError::new("second must be 0-59"));
        }

        if parts.next().is_some() {
            return Err(TimeError::new("expected H:MM or HH:MM:SS format"));
        }

        Ok(Self::from_hms(hours, minutes, seconds))
    }
}

impl fmt::Debug for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScheduleTime({})", self)
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

/// Parse two ASCII digit bytes into a u32.
fn parse_two_digits(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 2 {
        return None;
    }
    let d1 = (bytes[0] as char).to_digit(10)?;
    let d2 = (bytes[1] as char).to_digit(10)?;
    Some(d1 * 10 + d2)
}
