//! Domain types for the feed consolidation engine.
//!
//! This module contains validated value types shared by every stage of the
//! pipeline. All types enforce their invariants at construction time, so
//! code that receives these types can trust their validity.

mod circulation;
mod days;
mod error;
mod location;
mod route;
mod time;
mod weekdays;

pub use circulation::{RunKey, TrafficMode};
pub use days::{
    FeedCalendar, InvalidShortDate, ParseBitmapError, ServiceDaysBitmap, format_short_date,
    parse_short_date,
};
pub use error::DomainError;
pub use location::{InvalidLocationCode, LocationCode};
pub use route::{InvalidRouteNumber, RouteNumber};
pub use time::{ScheduleTime, TimeError};
pub use weekdays::WeekdayPattern;
