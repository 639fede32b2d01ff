//! Domain error types.
//!
//! These errors represent validation failures in source values. They are
//! distinct from I/O and snapshot errors.

use super::{InvalidLocationCode, InvalidRouteNumber, ParseBitmapError, TimeError};

/// Domain-level errors for validation and data consistency.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DomainError {
    #[error(transparent)]
    Route(#[from] InvalidRouteNumber),

    #[error(transparent)]
    Location(#[from] InvalidLocationCode),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Bitmap(#[from] ParseBitmapError),

    /// A bitmap does not cover the feed horizon
    #[error("bitmap has {found} days but the feed horizon is {expected}")]
    HorizonMismatch { expected: usize, found: usize },

    /// A weekday pattern string is malformed
    #[error("invalid weekday pattern: {0:?}")]
    WeekdayPattern(String),
}
