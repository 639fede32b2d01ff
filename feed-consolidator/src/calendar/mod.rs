//! Service calendars: synthesis from bitmaps and deduplication.

mod record;
mod synthesizer;

pub use record::{CalendarException, CalendarRecord};
pub use synthesizer::{CalendarId, CalendarRegistry, CalendarSynthesizer, periods_of};

use crate::domain::ServiceDaysBitmap;

/// Errors from calendar synthesis.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CalendarError {
    #[error("cannot build a calendar for a bitmap with no active day")]
    EmptyBitmap,

    #[error("bitmap has {found} days but the feed horizon is {expected}")]
    HorizonMismatch { expected: usize, found: usize },

    /// The synthesized calendar does not describe the days it was built from
    #[error("calendar replays as {found} instead of {expected}")]
    RoundTripMismatch {
        expected: ServiceDaysBitmap,
        found: ServiceDaysBitmap,
    },
}
