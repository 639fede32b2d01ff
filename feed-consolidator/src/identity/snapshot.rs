//! Text form of the identity database.
//!
//! ```text
//! 1|100,08:00:00,08:10:00,S1-S2
//! -210101,1111111,100_1_210101
//! -210106,0000011,100_1_210106+100_1_210106_4
//! ```
//!
//! A header line per fingerprint (`sequence|fingerprint`) is followed by
//! one `-` line per slot: first occurrence, days and identifiers.

use std::fmt::Write;

use crate::domain::{FeedCalendar, ServiceDaysBitmap, format_short_date, parse_short_date};

use super::{IdentityError, IdentitySlot, PersistentIdentityDb, TripData, TripFingerprint};

/// Render the database in snapshot form.
pub fn render_snapshot(db: &PersistentIdentityDb) -> String {
    let mut out = String::new();
    for (fingerprint, data) in &db.trips {
        // Writing into a String cannot fail
        let _ = writeln!(out, "{}|{}", data.sequence, fingerprint);
        for slot in &data.slots {
            let _ = writeln!(
                out,
                "-{},{},{}",
                format_short_date(slot.first_occurrence),
                slot.days,
                db.slot_ids(slot).join("+")
            );
        }
    }
    out
}

/// Parse a snapshot written `gap` days before the start of `feed`.
///
/// Slot days are moved `gap` days to the left and fitted to the feed's
/// horizon.
pub fn parse_snapshot(text: &str, feed: FeedCalendar, gap: usize) -> Result<PersistentIdentityDb, IdentityError> {
    let mut db = PersistentIdentityDb::new(feed);
    let mut current: Option<(TripFingerprint, TripData)> = None;

    for (n, line) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('-') {
            let Some((_, data)) = current.as_mut() else {
                return Err(IdentityError::parse(line_no, "slot line before any fingerprint"));
            };
            let slot = parse_slot(rest, feed.horizon(), gap).map_err(|reason| IdentityError::parse(line_no, reason))?;
            data.slots.push(slot);
            continue;
        }

        if let Some((fingerprint, data)) = current.take() {
            db.insert_loaded(fingerprint, data);
        }
        let (sequence, fingerprint) = line
            .split_once('|')
            .ok_or_else(|| IdentityError::parse(line_no, "expected sequence|fingerprint"))?;
        let sequence: u32 = sequence
            .parse()
            .map_err(|_| IdentityError::parse(line_no, format!("invalid sequence number {sequence:?}")))?;
        let fingerprint: TripFingerprint = fingerprint
            .parse()
            .map_err(|e| IdentityError::parse(line_no, format!("{e}")))?;
        current = Some((
            fingerprint,
            TripData {
                sequence,
                slots: Vec::new(),
            },
        ));
    }

    if let Some((fingerprint, data)) = current {
        db.insert_loaded(fingerprint, data);
    }
    Ok(db)
}

fn parse_slot(s: &str, horizon: usize, gap: usize) -> Result<IdentitySlot, String> {
    let mut parts = s.splitn(3, ',');
    let date = parse_short_date(parts.next().unwrap_or_default()).map_err(|e| e.to_string())?;
    let days = parts
        .next()
        .ok_or("missing slot days")?
        .parse::<ServiceDaysBitmap>()
        .map_err(|e| e.to_string())?;
    let ids = parts
        .next()
        .unwrap_or_default()
        .split('+')
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    Ok(IdentitySlot::stored(date, days.shift_left(gap).resized(horizon), ids))
}
