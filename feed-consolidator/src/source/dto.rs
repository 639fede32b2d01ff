//! Source schedule DTOs.
//!
//! These types map directly to the JSON form of the scheduling database
//! export. Optional fields fall back to route-level values during
//! conversion.

use serde::Deserialize;

use crate::domain::TrafficMode;

/// A whole export.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSchedule {
    /// First day of the feed (`YYYY-MM-DD`).
    pub feed_start: String,

    /// Number of days covered; every bitmap string has this length.
    pub horizon: usize,

    #[serde(default)]
    pub routes: Vec<RouteDto>,

    /// Timetable periods ("grafikons").
    #[serde(default)]
    pub periods: Vec<PeriodDto>,

    #[serde(default)]
    pub trips: Vec<TripDto>,

    /// Vehicle circulations.
    #[serde(default)]
    pub runs: Vec<RunDto>,
}

/// One validity version of a route.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteDto {
    pub number: String,
    pub agency: String,
    pub mode: TrafficMode,
    #[serde(default)]
    pub name: String,
    /// Days this version is valid on, as a `0`/`1` string.
    pub days: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodDto {
    pub id: String,
    pub days: String,
    /// Seven `0`/`1` flags, Monday first.
    pub weekdays: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripDto {
    pub id: String,
    pub route: String,

    /// Serving agency; defaults to the route's.
    pub agency: Option<String>,

    #[serde(default)]
    pub direction: u8,

    #[serde(default)]
    pub wheelchair_accessible: bool,

    pub days: String,

    /// Circulation the trip was planned under.
    pub circulation: Option<CirculationDto>,

    /// Timetable periods the trip belongs to.
    #[serde(default)]
    pub periods: Vec<String>,

    /// Trip the same vehicle continues as.
    pub next_in_block: Option<String>,

    pub stops: Vec<StopDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CirculationDto {
    pub line: String,
    pub run: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopDto {
    pub location: String,
    pub arrival: String,
    pub departure: String,
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunDto {
    pub line: String,
    pub run: u32,
    pub days: String,
    /// Trip ids in running order.
    pub trips: Vec<String>,
}
