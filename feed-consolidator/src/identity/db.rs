//! Stable identifier assignment across pipeline runs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, error, info};

use crate::domain::{FeedCalendar, RouteNumber, ServiceDaysBitmap, format_short_date};

use super::TripFingerprint;

/// A trip (or merged trip group) asking for an identifier.
#[derive(Debug, Clone)]
pub struct IdentityRequest {
    pub fingerprint: TripFingerprint,
    pub days: ServiceDaysBitmap,
    /// Run number used to tell apart reinforcement trips sharing a slot.
    pub run_index: u32,
}

/// An external identifier handed out for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssignedId {
    /// Stable across runs while the trip keeps running.
    Stable(String),
    /// Surrogate handed out after an identity conflict; not persisted.
    Temporary(String),
}

impl AssignedId {
    pub fn as_str(&self) -> &str {
        match self {
            AssignedId::Stable(id) | AssignedId::Temporary(id) => id,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, AssignedId::Temporary(_))
    }
}

impl fmt::Display for AssignedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters describing one run's identifier assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityStats {
    /// Identifiers carried over from the previous snapshot.
    pub reused: usize,
    /// Identifiers handed out for the first time.
    pub new: usize,
    pub conflicts: usize,
    pub temporary: usize,
    /// Slots dropped on load or before saving.
    pub pruned: usize,
}

/// Handle for a request placed with [`PersistentIdentityDb::assign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(usize);

#[derive(Debug, Clone)]
pub(super) struct Occupant {
    pub(super) ticket: Ticket,
    pub(super) days: ServiceDaysBitmap,
}

/// One `(sequence, first occurrence)` identity and the trips holding it in
/// the current run, keyed by run index.
#[derive(Debug, Clone)]
pub struct IdentitySlot {
    pub first_occurrence: NaiveDate,
    /// Days the slot's primary trip runs on.
    pub days: ServiceDaysBitmap,
    pub(super) occupants: BTreeMap<u32, Occupant>,
    pub(super) primary: Option<u32>,
    /// Identifiers read from the snapshot, written back while unoccupied.
    pub(super) stored_ids: Vec<String>,
}

impl IdentitySlot {
    pub(super) fn stored(first_occurrence: NaiveDate, days: ServiceDaysBitmap, stored_ids: Vec<String>) -> Self {
        Self {
            first_occurrence,
            days,
            occupants: BTreeMap::new(),
            primary: None,
            stored_ids,
        }
    }

    pub fn is_occupied(&self) -> bool {
        !self.occupants.is_empty()
    }

    pub fn stored_ids(&self) -> &[String] {
        &self.stored_ids
    }

    fn primary_days(&self) -> Option<&ServiceDaysBitmap> {
        self.primary
            .and_then(|p| self.occupants.get(&p))
            .map(|o| &o.days)
    }
}

/// All slots of one fingerprint, ordered by first occurrence.
#[derive(Debug, Clone)]
pub struct TripData {
    pub sequence: u32,
    pub slots: Vec<IdentitySlot>,
}

#[derive(Debug, Clone)]
enum TicketState {
    Placed {
        fingerprint: TripFingerprint,
        sequence: u32,
        slot_date: NaiveDate,
        run_index: u32,
    },
    Temporary(String),
}

/// How a request is resolved against the existing slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Reuse(usize),
    Reinforce(usize),
    Promote(usize),
    IndexConflict(usize),
    Fresh,
}

/// What placing a request did to the slots.
enum Applied {
    Placed {
        slot_date: NaiveDate,
        reused: bool,
        /// Occupant pushed out of the slot by the new trip.
        displaced: Option<Ticket>,
    },
    IndexConflict {
        slot_date: NaiveDate,
    },
    DateTaken,
}

/// Identity state for one run: the slots loaded from the previous
/// snapshot plus everything assigned so far.
#[derive(Debug, Clone)]
pub struct PersistentIdentityDb {
    feed: FeedCalendar,
    pub(super) trips: BTreeMap<TripFingerprint, TripData>,
    next_sequence: BTreeMap<RouteNumber, u32>,
    tickets: Vec<TicketState>,
    temporary_count: u32,
    stats: IdentityStats,
}

impl PersistentIdentityDb {
    /// An empty database for a feed.
    pub fn new(feed: FeedCalendar) -> Self {
        Self {
            feed,
            trips: BTreeMap::new(),
            next_sequence: BTreeMap::new(),
            tickets: Vec::new(),
            temporary_count: 0,
            stats: IdentityStats::default(),
        }
    }

    pub fn feed(&self) -> &FeedCalendar {
        &self.feed
    }

    pub fn stats(&self) -> IdentityStats {
        self.stats
    }

    /// Number of fingerprints known.
    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    pub fn trip_data(&self, fingerprint: &TripFingerprint) -> Option<&TripData> {
        self.trips.get(fingerprint)
    }

    /// Add a fingerprint read from a snapshot.
    pub(super) fn insert_loaded(&mut self, fingerprint: TripFingerprint, mut data: TripData) {
        let next = self
            .next_sequence
            .entry(fingerprint.route.clone())
            .or_insert(1);
        *next = (*next).max(data.sequence + 1);

        match self.trips.get_mut(&fingerprint) {
            Some(existing) => existing.slots.append(&mut data.slots),
            None => {
                self.trips.insert(fingerprint.clone(), data);
            }
        }
        if let Some(entry) = self.trips.get_mut(&fingerprint) {
            entry.slots.sort_by_key(|s| s.first_occurrence);
        }
    }

    /// Assign identifiers to a batch, in order of first occurrence.
    ///
    /// Requests starting earlier are placed first so that today's trip
    /// wins a contested identifier over a variant that only runs later.
    /// Returns identifiers in the order of `requests`.
    pub fn assign_all(&mut self, requests: &[IdentityRequest]) -> Vec<AssignedId> {
        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by_key(|i| requests[*i].days.first_day());

        let mut tickets = vec![None; requests.len()];
        for i in order {
            tickets[i] = Some(self.assign(requests[i].clone()));
        }

        tickets
            .into_iter()
            .flatten()
            .map(|t| self.resolve(t))
            .collect()
    }

    /// Place one request. The identifier is final only once every request
    /// of the run is placed, since a later trip may demote this one.
    pub fn assign(&mut self, request: IdentityRequest) -> Ticket {
        let ticket = Ticket(self.tickets.len());
        let state = self.place(ticket, request);
        self.tickets.push(state);
        ticket
    }

    /// The identifier currently held by a ticket.
    pub fn resolve(&self, ticket: Ticket) -> AssignedId {
        match &self.tickets[ticket.0] {
            TicketState::Temporary(id) => AssignedId::Temporary(id.clone()),
            TicketState::Placed {
                fingerprint,
                sequence,
                slot_date,
                run_index,
            } => {
                let secondary = self
                    .trips
                    .get(fingerprint)
                    .and_then(|d| d.slots.iter().find(|s| s.first_occurrence == *slot_date))
                    .is_some_and(|s| s.primary != Some(*run_index));
                AssignedId::Stable(format_id(
                    &fingerprint.route,
                    *sequence,
                    *slot_date,
                    secondary.then_some(*run_index),
                ))
            }
        }
    }

    fn place(&mut self, ticket: Ticket, request: IdentityRequest) -> TicketState {
        let IdentityRequest {
            fingerprint,
            days,
            run_index,
        } = request;

        let Some(first_day) = days.first_day() else {
            error!(fingerprint = %fingerprint, "trip without service days cannot hold an identifier");
            self.stats.conflicts += 1;
            return self.temporary(&fingerprint.route);
        };
        let first = self.feed.date_of(first_day);

        if !self.trips.contains_key(&fingerprint) {
            let sequence = self.allocate_sequence(&fingerprint.route);
            self.trips.insert(
                fingerprint.clone(),
                TripData {
                    sequence,
                    slots: Vec::new(),
                },
            );
        }
        let Some(data) = self.trips.get_mut(&fingerprint) else {
            return self.temporary(&fingerprint.route);
        };

        let sequence = data.sequence;
        let placement = decide(data, first, &days, run_index);
        debug!(fingerprint = %fingerprint, ?placement, "identity placement");

        match apply(data, placement, first, run_index, Occupant { ticket, days }) {
            Applied::Placed {
                slot_date,
                reused,
                displaced,
            } => {
                if let Some(previous) = displaced {
                    error!(
                        fingerprint = %fingerprint,
                        run = run_index,
                        "trip displaced from its identifier by a trip covering its days"
                    );
                    self.stats.conflicts += 1;
                    let surrogate = self.temporary(&fingerprint.route);
                    self.tickets[previous.0] = surrogate;
                }
                if reused {
                    self.stats.reused += 1;
                    info!(
                        id = %format_id(&fingerprint.route, sequence, slot_date, None),
                        "identifier reused"
                    );
                } else {
                    self.stats.new += 1;
                }
                TicketState::Placed {
                    fingerprint,
                    sequence,
                    slot_date,
                    run_index,
                }
            }
            Applied::IndexConflict { slot_date } => {
                error!(
                    fingerprint = %fingerprint,
                    run = run_index,
                    slot = %format_short_date(slot_date),
                    "reinforcement trip collides with another trip of the same run"
                );
                self.stats.conflicts += 1;
                self.temporary(&fingerprint.route)
            }
            Applied::DateTaken => {
                error!(
                    fingerprint = %fingerprint,
                    date = %format_short_date(first),
                    "overlapping trips share a fingerprint and first day"
                );
                self.stats.conflicts += 1;
                self.temporary(&fingerprint.route)
            }
        }
    }

    fn allocate_sequence(&mut self, route: &RouteNumber) -> u32 {
        let next = self.next_sequence.entry(route.clone()).or_insert(1);
        let sequence = *next;
        *next += 1;
        sequence
    }

    fn temporary(&mut self, route: &RouteNumber) -> TicketState {
        self.temporary_count += 1;
        self.stats.temporary += 1;
        TicketState::Temporary(format!("{}_TMP{}", route, self.temporary_count))
    }

    /// Identifiers to persist for a slot.
    pub(super) fn slot_ids(&self, slot: &IdentitySlot) -> Vec<String> {
        if !slot.is_occupied() {
            return slot.stored_ids.clone();
        }
        slot.occupants
            .values()
            .map(|o| self.resolve(o.ticket))
            .filter_map(|id| match id {
                AssignedId::Stable(id) => Some(id),
                AssignedId::Temporary(_) => None,
            })
            .collect()
    }

    /// Drop unoccupied slots with no remaining day.
    pub fn prune_empty(&mut self) -> usize {
        self.prune(|slot| slot.is_occupied() || !slot.days.is_empty())
    }

    /// Drop unoccupied slots that start after `today` or have no day left.
    pub fn prune_for_save(&mut self, today: NaiveDate) -> usize {
        self.prune(|slot| slot.is_occupied() || (slot.first_occurrence <= today && !slot.days.is_empty()))
    }

    fn prune(&mut self, keep: impl Fn(&IdentitySlot) -> bool) -> usize {
        let mut pruned = 0;
        for data in self.trips.values_mut() {
            let before = data.slots.len();
            data.slots.retain(&keep);
            pruned += before - data.slots.len();
        }
        self.trips.retain(|_, data| !data.slots.is_empty());
        self.stats.pruned += pruned;
        pruned
    }
}

/// Pick the slot a request lands in, newest slot first.
fn decide(data: &TripData, first: NaiveDate, days: &ServiceDaysBitmap, run_index: u32) -> Placement {
    let candidates = data
        .slots
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, s)| s.first_occurrence <= first)
        .filter(|(_, s)| s.days.intersects(days) || s.first_occurrence == first);

    for (i, slot) in candidates {
        let Some(primary_days) = slot.primary_days() else {
            return Placement::Reuse(i);
        };

        if days.is_subset_of(primary_days) {
            return match slot.occupants.get(&run_index) {
                None => Placement::Reinforce(i),
                Some(o) if o.days.intersects(days) => Placement::IndexConflict(i),
                Some(_) => Placement::Fresh,
            };
        }

        if slot.occupants.values().all(|o| o.days.is_subset_of(days)) {
            return Placement::Promote(i);
        }
    }
    Placement::Fresh
}

fn apply(
    data: &mut TripData,
    placement: Placement,
    first: NaiveDate,
    run_index: u32,
    occupant: Occupant,
) -> Applied {
    match placement {
        Placement::Reuse(i) | Placement::Promote(i) => {
            let slot = &mut data.slots[i];
            slot.days = occupant.days.clone();
            let displaced = slot.occupants.insert(run_index, occupant).map(|o| o.ticket);
            slot.primary = Some(run_index);
            Applied::Placed {
                slot_date: slot.first_occurrence,
                reused: matches!(placement, Placement::Reuse(_)),
                displaced,
            }
        }
        Placement::Reinforce(i) => {
            let slot = &mut data.slots[i];
            slot.occupants.insert(run_index, occupant);
            Applied::Placed {
                slot_date: slot.first_occurrence,
                reused: false,
                displaced: None,
            }
        }
        Placement::IndexConflict(i) => Applied::IndexConflict {
            slot_date: data.slots[i].first_occurrence,
        },
        Placement::Fresh => {
            if data.slots.iter().any(|s| s.first_occurrence == first) {
                return Applied::DateTaken;
            }
            let mut slot = IdentitySlot::stored(first, occupant.days.clone(), Vec::new());
            slot.occupants.insert(run_index, occupant);
            slot.primary = Some(run_index);
            let pos = data.slots.partition_point(|s| s.first_occurrence < first);
            data.slots.insert(pos, slot);
            Applied::Placed {
                slot_date: first,
                reused: false,
                displaced: None,
            }
        }
    }
}

/// `{route}_{sequence}_{yyMMdd}`, suffixed with `_{run}` for a secondary
/// occupant.
pub fn format_id(route: &RouteNumber, sequence: u32, first_occurrence: NaiveDate, run: Option<u32>) -> String {
    let base = format!("{}_{}_{}", route, sequence, format_short_date(first_occurrence));
    match run {
        Some(run) => format!("{base}_{run}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, d).unwrap()
    }

    fn db() -> PersistentIdentityDb {
        PersistentIdentityDb::new(FeedCalendar::new(date(1), 7))
    }

    fn fingerprint(departure: &str) -> TripFingerprint {
        format!("100,{departure},08:10,S1-S2").parse().unwrap()
    }

    fn request(departure: &str, days: &str, run_index: u32) -> IdentityRequest {
        IdentityRequest {
            fingerprint: fingerprint(departure),
            days: days.parse().unwrap(),
            run_index,
        }
    }

    fn stable(id: &str) -> AssignedId {
        AssignedId::Stable(id.to_string())
    }

    #[test]
    fn first_trip_gets_sequence_one() {
        let mut db = db();
        let ids = db.assign_all(&[
            request("08:00", "1111111", 0),
            request("09:00", "0011111", 0),
        ]);
        assert_eq!(ids, vec![stable("100_1_210101"), stable("100_2_210103")]);
        assert_eq!(db.stats().new, 2);
        assert_eq!(db.stats().reused, 0);
    }

    #[test]
    fn loaded_slot_is_reused() {
        let mut db = db();
        db.insert_loaded(
            fingerprint("08:00"),
            TripData {
                sequence: 4,
                slots: vec![IdentitySlot::stored(
                    date(1),
                    "1111110".parse().unwrap(),
                    vec!["100_4_210101".into()],
                )],
            },
        );

        let ids = db.assign_all(&[request("08:00", "0111111", 0)]);
        assert_eq!(ids, vec![stable("100_4_210101")]);
        assert_eq!(db.stats().reused, 1);

        // New fingerprints continue after the loaded sequence
        let ids = db.assign_all(&[request("09:00", "1111111", 0)]);
        assert_eq!(ids, vec![stable("100_5_210101")]);
    }

    #[test]
    fn reinforcement_gets_run_suffix() {
        let mut db = db();
        let ids = db.assign_all(&[
            request("08:00", "1111111", 1),
            request("08:00", "1111100", 2),
        ]);
        assert_eq!(ids, vec![stable("100_1_210101"), stable("100_1_210101_2")]);
        assert_eq!(db.stats().new, 2);
    }

    #[test]
    fn reinforcement_on_same_run_with_overlap_is_temporary() {
        let mut db = db();
        let ids = db.assign_all(&[
            request("08:00", "1111111", 1),
            request("08:00", "1111100", 1),
        ]);
        assert_eq!(ids[0], stable("100_1_210101"));
        assert_eq!(ids[1], AssignedId::Temporary("100_TMP1".into()));
        assert_eq!(db.stats().conflicts, 1);
        assert_eq!(db.stats().temporary, 1);
    }

    #[test]
    fn reinforcement_on_same_run_without_overlap_opens_slot() {
        let mut db = db();
        let ids = db.assign_all(&[
            request("08:00", "1111111", 1),
            request("08:00", "1100000", 2),
            request("08:00", "0000011", 2),
        ]);
        assert_eq!(
            ids,
            vec![
                stable("100_1_210101"),
                stable("100_1_210101_2"),
                stable("100_1_210106"),
            ]
        );
        assert_eq!(db.trip_data(&fingerprint("08:00")).unwrap().slots.len(), 2);
    }

    #[test]
    fn wider_trip_takes_over_slot() {
        let mut db = db();
        let ids = db.assign_all(&[
            request("08:00", "1111100", 1),
            request("08:00", "1111111", 2),
        ]);
        // The first trip is demoted to a secondary occupant
        assert_eq!(ids, vec![stable("100_1_210101_1"), stable("100_1_210101")]);
        assert_eq!(db.stats().conflicts, 0);
    }

    #[test]
    fn displaced_trip_gets_temporary_id() {
        let mut db = db();
        let ids = db.assign_all(&[
            request("08:00", "1111100", 1),
            request("08:00", "1111111", 1),
        ]);
        assert!(ids[0].is_temporary());
        assert_eq!(ids[1], stable("100_1_210101"));
        assert_eq!(db.stats().conflicts, 1);
    }

    #[test]
    fn todays_trip_wins_over_future_variant() {
        let mut db = db();
        db.insert_loaded(
            fingerprint("08:00"),
            TripData {
                sequence: 1,
                slots: vec![IdentitySlot::stored(
                    date(1),
                    "1111111".parse().unwrap(),
                    vec!["100_1_210101".into()],
                )],
            },
        );

        // The future variant is listed first but placed second
        let ids = db.assign_all(&[
            request("08:00", "0000011", 0),
            request("08:00", "1111100", 0),
        ]);
        assert_eq!(ids, vec![stable("100_1_210106"), stable("100_1_210101")]);
        assert_eq!(db.stats().reused, 1);
    }

    #[test]
    fn partial_overlap_on_same_day_is_temporary() {
        let mut db = db();
        let ids = db.assign_all(&[
            request("08:00", "1110000", 1),
            request("08:00", "1001100", 2),
        ]);
        assert_eq!(ids[0], stable("100_1_210101"));
        assert!(ids[1].is_temporary());
    }

    #[test]
    fn pruning_drops_future_and_empty_slots() {
        let mut db = db();
        db.insert_loaded(
            fingerprint("08:00"),
            TripData {
                sequence: 1,
                slots: vec![
                    IdentitySlot::stored(date(1), "0000000".parse().unwrap(), vec![]),
                    IdentitySlot::stored(date(2), "0110000".parse().unwrap(), vec![]),
                    IdentitySlot::stored(date(5), "0000110".parse().unwrap(), vec![]),
                ],
            },
        );
        assert_eq!(db.prune_empty(), 1);
        assert_eq!(db.prune_for_save(date(3)), 1);

        let slots = &db.trip_data(&fingerprint("08:00")).unwrap().slots;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].first_occurrence, date(2));
        assert_eq!(db.stats().pruned, 2);
    }

    #[test]
    fn format_id_suffix() {
        let route = RouteNumber::parse("22").unwrap();
        assert_eq!(format_id(&route, 3, date(31), None), "22_3_210131");
        assert_eq!(format_id(&route, 3, date(31), Some(7)), "22_3_210131_7");
    }
}
