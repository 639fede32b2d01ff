//! Route number type.

use std::fmt;

/// Error returned when parsing an invalid route number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid route number: {reason}")]
pub struct InvalidRouteNumber {
    reason: &'static str,
}

/// A public route (line) number, such as "100", "22" or "S9".
///
/// Route numbers are embedded in external trip identifiers and in the
/// identity snapshot, so they are restricted to ASCII letters and digits.
///
/// # Examples
///
/// ```
/// use feed_consolidator::domain::RouteNumber;
///
/// let route = RouteNumber::parse("S9").unwrap();
/// assert_eq!(route.as_str(), "S9");
///
/// // Separators used by identifiers are rejected
/// assert!(RouteNumber::parse("100_1").is_err());
/// assert!(RouteNumber::parse("").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteNumber(String);

impl RouteNumber {
    /// Parse a route number from a string.
    pub fn parse(s: &str) -> Result<Self, InvalidRouteNumber> {
        if s.is_empty() {
            return Err(InvalidRouteNumber {
                reason: "route number cannot be empty",
            });
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidRouteNumber {
                reason: "must be ASCII letters and digits",
            });
        }
        Ok(RouteNumber(s.to_string()))
    }

    /// Returns the route number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RouteNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteNumber({})", self.0)
    }
}

impl fmt::Display for RouteNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Roundtrip: parse then as_str returns the original
        #[test]
        fn roundtrip(s in "[A-Za-z0-9]{1,8}") {
            let r = RouteNumber::parse(&s).unwrap();
            prop_assert_eq!(r.as_str(), s.as_str());
        }

        /// Anything containing a non-alphanumeric byte is rejected
        #[test]
        fn punctuation_rejected(s in "[A-Z0-9]{0,3}[_,|: -][A-Z0-9]{0,3}") {
            prop_assert!(RouteNumber::parse(&s).is_err());
        }
    }
}
