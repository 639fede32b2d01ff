//! Calendar splitting of trips and their blocks.

use crate::domain::ServiceDaysBitmap;
use crate::schedule::{Schedule, TripId};

/// Result of splitting a trip by a calendar mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The trip never runs on a masked day; nothing changed.
    NoSplit,
    /// The trip runs only on masked days; nothing changed.
    Unchanged(TripId),
    /// A sibling now holds the masked days and the original keeps the rest.
    Split { inside: TripId, remainder: TripId },
}

impl SplitOutcome {
    /// The trip operating on the masked days, if any.
    pub fn inside(&self) -> Option<TripId> {
        match self {
            SplitOutcome::NoSplit => None,
            SplitOutcome::Unchanged(id) => Some(*id),
            SplitOutcome::Split { inside, .. } => Some(*inside),
        }
    }
}

/// Partition a trip's calendar by `mask`.
///
/// When the trip is split, its whole block is split on the same mask so
/// that the masked side and the remaining side each form consistent
/// chains. Runs are moved to whichever sibling shares days with them.
/// After a split the original `TripId` denotes only the remaining days.
pub fn split_by_calendar_mask(
    schedule: &mut Schedule,
    trip: TripId,
    mask: &ServiceDaysBitmap,
) -> SplitOutcome {
    let days = &schedule.trip(trip).days;
    let target = days.intersect(mask);
    if target.is_empty() {
        return SplitOutcome::NoSplit;
    }
    if &target == days {
        return SplitOutcome::Unchanged(trip);
    }

    let chain = schedule.block_chain(trip);

    // (inside, remainder) for each chain position
    let mut sides: Vec<(Option<TripId>, Option<TripId>)> = Vec::with_capacity(chain.len());
    let mut inside_of_trip = trip;

    for &member in &chain {
        let member_days = schedule.trip(member).days.clone();
        let member_target = member_days.intersect(mask);

        if member_target.is_empty() {
            sides.push((None, Some(member)));
        } else if member_target == member_days {
            sides.push((Some(member), None));
        } else {
            let sibling = split_member(schedule, member, member_target, member_days.subtract(mask));
            if member == trip {
                inside_of_trip = sibling;
            }
            sides.push((Some(sibling), Some(member)));
        }
    }

    for &member in &chain {
        let t = schedule.trip_mut(member);
        t.previous_in_block = None;
        t.next_in_block = None;
    }

    for pair in sides.windows(2) {
        let ((in_a, rest_a), (in_b, rest_b)) = (pair[0], pair[1]);
        if let (Some(a), Some(b)) = (in_a, in_b) {
            schedule.link_block(a, b);
        }
        if let (Some(a), Some(b)) = (rest_a, rest_b) {
            schedule.link_block(a, b);
        }
    }

    SplitOutcome::Split {
        inside: inside_of_trip,
        remainder: trip,
    }
}

/// Create a sibling of `member` holding `inside` days, shrink `member` to
/// `remainder`, and hand runs over to whichever side they cover.
fn split_member(
    schedule: &mut Schedule,
    member: TripId,
    inside: ServiceDaysBitmap,
    remainder: ServiceDaysBitmap,
) -> TripId {
    let mut sibling = schedule.trip(member).clone();
    sibling.days = inside;
    sibling.previous_in_block = None;
    sibling.next_in_block = None;
    sibling.runs = Vec::new();

    let original_runs = std::mem::take(&mut schedule.trip_mut(member).runs);
    schedule.trip_mut(member).days = remainder;
    let sibling_id = schedule.add_trip_after(member, sibling);

    let mut kept = Vec::new();
    for run_id in original_runs {
        let run_days = schedule.run(run_id).days.clone();
        let covers_sibling = run_days.intersects(&schedule.trip(sibling_id).days);
        let covers_original = run_days.intersects(&schedule.trip(member).days);

        match (covers_sibling, covers_original) {
            (true, false) => {
                schedule.run_mut(run_id).replace_trip(member, sibling_id);
                schedule.trip_mut(sibling_id).runs.push(run_id);
            }
            (true, true) => {
                schedule.run_mut(run_id).add_sibling(member, sibling_id);
                schedule.trip_mut(sibling_id).runs.push(run_id);
                kept.push(run_id);
            }
            (false, _) => kept.push(run_id),
        }
    }
    schedule.trip_mut(member).runs = kept;

    sibling_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedCalendar, RouteNumber, RunKey, TrafficMode};
    use crate::schedule::{Run, Trip};
    use chrono::NaiveDate;

    fn bits(s: &str) -> ServiceDaysBitmap {
        s.parse().unwrap()
    }

    fn schedule() -> Schedule {
        Schedule::new(FeedCalendar::new(
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
            7,
        ))
    }

    fn add(s: &mut Schedule, id: &str, days: &str) -> TripId {
        s.add_trip(Trip::new(
            id,
            RouteNumber::parse("9").unwrap(),
            TrafficMode::Tram,
            bits(days),
            vec![],
        ))
    }

    #[test]
    fn disjoint_mask_does_nothing() {
        let mut s = schedule();
        let t = add(&mut s, "t", "1111100");
        assert_eq!(split_by_calendar_mask(&mut s, t, &bits("0000011")), SplitOutcome::NoSplit);
        assert_eq!(s.trip(t).days, bits("1111100"));
        assert_eq!(s.trip_count(), 1);
    }

    #[test]
    fn covering_mask_returns_same_trip() {
        let mut s = schedule();
        let t = add(&mut s, "t", "1111100");
        assert_eq!(
            split_by_calendar_mask(&mut s, t, &bits("1111110")),
            SplitOutcome::Unchanged(t)
        );
        assert_eq!(s.trip(t).days, bits("1111100"));
        assert_eq!(s.trip_count(), 1);
    }

    #[test]
    fn partial_mask_creates_sibling() {
        let mut s = schedule();
        let t = add(&mut s, "t", "1111111");
        let other = add(&mut s, "u", "1111111");

        let outcome = split_by_calendar_mask(&mut s, t, &bits("0000011"));
        let SplitOutcome::Split { inside, remainder } = outcome else {
            panic!("expected split, got {outcome:?}");
        };
        assert_eq!(remainder, t);
        assert_eq!(s.trip(inside).days, bits("0000011"));
        assert_eq!(s.trip(t).days, bits("1111100"));
        assert_eq!(s.trip(inside).source_id, "t");

        // Registered next to the original under its route
        let route = RouteNumber::parse("9").unwrap();
        assert_eq!(s.trips_of_route(&route), &[t, inside, other]);
    }

    #[test]
    fn split_propagates_through_block() {
        let mut s = schedule();
        let a = add(&mut s, "a", "1111111");
        let b = add(&mut s, "b", "1111111");
        let c = add(&mut s, "c", "1111111");
        s.link_block(a, b);
        s.link_block(b, c);

        let outcome = split_by_calendar_mask(&mut s, b, &bits("1111100"));
        let inside = outcome.inside().unwrap();

        // Masked side forms its own complete chain
        let masked_chain = s.block_chain(inside);
        assert_eq!(masked_chain.len(), 3);
        for id in &masked_chain {
            assert_eq!(s.trip(*id).days, bits("1111100"));
        }

        // Remaining side keeps the original handles
        assert_eq!(s.block_chain(b), vec![a, b, c]);
        for id in [a, b, c] {
            assert_eq!(s.trip(id).days, bits("0000011"));
        }
    }

    #[test]
    fn predecessor_wholly_inside_mask_links_to_sibling() {
        let mut s = schedule();
        let a = add(&mut s, "a", "1111100");
        let b = add(&mut s, "b", "1111111");
        s.link_block(a, b);

        let outcome = split_by_calendar_mask(&mut s, b, &bits("1111100"));
        let inside = outcome.inside().unwrap();
        assert_ne!(inside, b);
        assert_eq!(s.trip(inside).previous_in_block, Some(a));
        assert_eq!(s.trip(a).next_in_block, Some(inside));
        assert_eq!(s.trip(b).previous_in_block, None);
    }

    #[test]
    fn runs_follow_their_days() {
        let mut s = schedule();
        let t = add(&mut s, "t", "1111111");
        let key = RunKey::new(RouteNumber::parse("9").unwrap(), 1);
        let weekday = s.add_run(Run::new(key.clone(), bits("1111100"), vec![]));
        let daily = s.add_run(Run::new(key, bits("1111111"), vec![]));
        for r in [weekday, daily] {
            s.run_mut(r).trips.push(t);
            s.trip_mut(t).runs.push(r);
        }

        let inside = split_by_calendar_mask(&mut s, t, &bits("1111100"))
            .inside()
            .unwrap();

        assert_eq!(s.run(weekday).trips, vec![inside]);
        assert_eq!(s.run(daily).trips, vec![t, inside]);
        assert_eq!(s.trip(t).runs, vec![daily]);
        assert_eq!(s.trip(inside).runs, vec![weekday, daily]);
    }
}
