//! Stop location code type.

use std::fmt;

/// Error returned when parsing an invalid location code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid location code: {reason}")]
pub struct InvalidLocationCode {
    reason: &'static str,
}

/// A code identifying a stop location in the source schedule.
///
/// Codes are joined with `-` inside identity fingerprints, so only ASCII
/// letters, digits, `.` and `:` are accepted.
///
/// # Examples
///
/// ```
/// use feed_consolidator::domain::LocationCode;
///
/// let code = LocationCode::parse("U1072Z1").unwrap();
/// assert_eq!(code.as_str(), "U1072Z1");
///
/// assert!(LocationCode::parse("A-B").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationCode(String);

impl LocationCode {
    /// Parse a location code from a string.
    pub fn parse(s: &str) -> Result<Self, InvalidLocationCode> {
        if s.is_empty() {
            return Err(InvalidLocationCode {
                reason: "location code cannot be empty",
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b':')
        {
            return Err(InvalidLocationCode {
                reason: "must be ASCII letters, digits, '.' or ':'",
            });
        }
        Ok(LocationCode(s.to_string()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationCode({})", self.0)
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
