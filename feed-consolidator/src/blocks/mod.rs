//! Vehicle continuity: block inference, circulation resolution and the
//! calendar splitting both rely on.

mod inference;
mod runs;
mod split;

pub use inference::{LinkOutcome, connect_trips, infer_blocks};
pub use runs::{RunStats, resolve_runs};
pub use split::{SplitOutcome, split_by_calendar_mask};
