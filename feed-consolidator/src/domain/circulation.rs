//! Vehicle circulation keys and traffic modes.

use std::fmt;

use serde::Deserialize;

use super::RouteNumber;

/// Identifies a vehicle circulation (a "run"): the root line it is planned
/// under plus its run number on that line.
///
/// # Examples
///
/// ```
/// use feed_consolidator::domain::{RouteNumber, RunKey};
///
/// let key = RunKey::new(RouteNumber::parse("22").unwrap(), 7);
/// assert_eq!(key.to_string(), "22/7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunKey {
    pub root_line: RouteNumber,
    pub run_number: u32,
}

impl RunKey {
    pub fn new(root_line: RouteNumber, run_number: u32) -> Self {
        Self {
            root_line,
            run_number,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.root_line, self.run_number)
    }
}

/// Traffic mode of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficMode {
    Tram,
    Metro,
    Rail,
    Bus,
    Trolleybus,
    Ferry,
    Funicular,
}

impl fmt::Display for TrafficMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrafficMode::Tram => "tram",
            TrafficMode::Metro => "metro",
            TrafficMode::Rail => "rail",
            TrafficMode::Bus => "bus",
            TrafficMode::Trolleybus => "trolleybus",
            TrafficMode::Ferry => "ferry",
            TrafficMode::Funicular => "funicular",
        };
        f.write_str(name)
    }
}
