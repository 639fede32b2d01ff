//! Calendar-independent trip identity keys.

use std::fmt;
use std::str::FromStr;

use crate::domain::{DomainError, LocationCode, RouteNumber, ScheduleTime};
use crate::schedule::Trip;

/// What makes two trips from different exports "the same trip": route,
/// boundary times and the public stops visited. Days are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TripFingerprint {
    pub route: RouteNumber,
    pub first_departure: ScheduleTime,
    pub last_arrival: ScheduleTime,
    pub locations: Vec<LocationCode>,
}

impl TripFingerprint {
    /// Fingerprint of a trip, or `None` if it has no public stop.
    pub fn of(trip: &Trip) -> Option<Self> {
        Some(Self {
            route: trip.route.clone(),
            first_departure: trip.first_departure()?,
            last_arrival: trip.last_arrival()?,
            locations: trip.public_visits().map(|v| v.location.clone()).collect(),
        })
    }
}

/// Formats as `route,departure,arrival,loc-loc-...`.
impl fmt::Display for TripFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},", self.route, self.first_departure, self.last_arrival)?;
        for (i, loc) in self.locations.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            f.write_str(loc.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for TripFingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, ',');
        let route = RouteNumber::parse(parts.next().unwrap_or_default())?;
        let first_departure = parts.next().unwrap_or_default().parse()?;
        let last_arrival = parts.next().unwrap_or_default().parse()?;
        let locations = match parts.next() {
            Some("") | None => Vec::new(),
            Some(list) => list
                .split('-')
                .map(LocationCode::parse)
                .collect::<Result<_, _>>()?,
        };
        Ok(Self {
            route,
            first_departure,
            last_arrival,
            locations,
        })
    }
}
