//! Conversion from source DTOs to the schedule arena.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::blocks::connect_trips;
use crate::domain::{
    DomainError, FeedCalendar, LocationCode, RouteNumber, RunKey, ServiceDaysBitmap, WeekdayPattern,
};
use crate::schedule::{PeriodId, RouteVersion, Run, Schedule, StopVisit, TimetablePeriod, Trip, TripId};

use super::SourceError;
use super::dto::{RouteDto, SourceSchedule, StopDto, TripDto};

impl SourceSchedule {
    /// Build the cross-referenced schedule.
    ///
    /// Malformed values fail the whole export. Dangling references between
    /// records (unknown periods, continuation trips) are logged and skipped.
    pub fn into_schedule(self) -> Result<Schedule, SourceError> {
        let start = NaiveDate::parse_from_str(&self.feed_start, "%Y-%m-%d")
            .map_err(|_| SourceError::InvalidDate(self.feed_start.clone()))?;
        let feed = FeedCalendar::new(start, self.horizon);
        let mut schedule = Schedule::new(feed);

        for route in &self.routes {
            add_route(&mut schedule, route)?;
        }

        let mut periods: HashMap<&str, PeriodId> = HashMap::new();
        for period in &self.periods {
            let id = schedule.add_period(TimetablePeriod {
                id: period.id.clone(),
                days: parse_days(&period.days, &feed)?,
                weekdays: WeekdayPattern::parse(&period.weekdays)
                    .ok_or_else(|| DomainError::WeekdayPattern(period.weekdays.clone()))?,
            });
            periods.insert(&period.id, id);
        }

        let mut trips: HashMap<&str, TripId> = HashMap::new();
        for dto in &self.trips {
            let trip = convert_trip(&schedule, dto, &periods)?;
            let id = schedule.add_trip(trip);
            if trips.insert(&dto.id, id).is_some() {
                return Err(SourceError::DuplicateTrip(dto.id.clone()));
            }
        }

        for dto in &self.trips {
            let Some(next_ref) = &dto.next_in_block else {
                continue;
            };
            let (Some(&prev), Some(&next)) = (trips.get(dto.id.as_str()), trips.get(next_ref.as_str())) else {
                warn!(trip = %dto.id, next = %next_ref, "continuation trip not in export");
                continue;
            };
            if schedule.trip(next).previous_in_block.is_some() {
                warn!(trip = %dto.id, next = %next_ref, "continuation trip already has a predecessor");
                continue;
            }
            connect_trips(&mut schedule, prev, next);
        }

        for run in &self.runs {
            let key = RunKey::new(RouteNumber::parse(&run.line).map_err(DomainError::from)?, run.run);
            let days = parse_days(&run.days, &feed)?;
            schedule.add_run(Run::new(key, days, run.trips.clone()));
        }

        info!(
            routes = schedule.routes.len(),
            trips = schedule.trip_count(),
            runs = self.runs.len(),
            "source schedule loaded"
        );
        Ok(schedule)
    }
}

fn add_route(schedule: &mut Schedule, dto: &RouteDto) -> Result<(), SourceError> {
    let number = RouteNumber::parse(&dto.number).map_err(DomainError::from)?;
    let days = parse_days(&dto.days, schedule.feed())?;
    let version = RouteVersion {
        agency: dto.agency.clone(),
        mode: dto.mode,
        name: dto.name.clone(),
    };

    schedule
        .routes
        .add_or_merge_version(number, days, version, |a, b| a == b, |a, _| a)
        .map_err(|source| SourceError::RouteVersion {
            route: dto.number.clone(),
            source,
        })?;
    Ok(())
}

fn convert_trip(
    schedule: &Schedule,
    dto: &TripDto,
    periods: &HashMap<&str, PeriodId>,
) -> Result<Trip, SourceError> {
    let route = RouteNumber::parse(&dto.route).map_err(DomainError::from)?;
    let days = parse_days(&dto.days, schedule.feed())?;

    let (exact, version) = schedule
        .routes
        .find_tolerant(&route, &days)
        .ok_or_else(|| SourceError::UnknownRoute {
            trip: dto.id.clone(),
            route: dto.route.clone(),
        })?;
    if !exact {
        warn!(trip = %dto.id, route = %route, "no route version covers all trip days");
    }

    let visits = dto
        .stops
        .iter()
        .map(convert_stop)
        .collect::<Result<Vec<_>, DomainError>>()?;

    let mut trip = Trip::new(dto.id.clone(), route, version.mode, days, visits);
    trip.agency = dto.agency.clone().unwrap_or_else(|| version.agency.clone());
    trip.direction = dto.direction;
    trip.wheelchair_accessible = dto.wheelchair_accessible;

    if let Some(c) = &dto.circulation {
        let line = RouteNumber::parse(&c.line).map_err(DomainError::from)?;
        trip.circulation = Some(RunKey::new(line, c.run));
    }

    for period in &dto.periods {
        match periods.get(period.as_str()) {
            Some(id) => trip.periods.push(*id),
            None => warn!(trip = %dto.id, period = %period, "trip refers to unknown timetable period"),
        }
    }

    Ok(trip)
}

fn convert_stop(dto: &StopDto) -> Result<StopVisit, DomainError> {
    let visit = StopVisit::new(
        LocationCode::parse(&dto.location)?,
        dto.arrival.parse()?,
        dto.departure.parse()?,
    );
    Ok(if dto.public { visit } else { visit.non_public() })
}

fn parse_days(s: &str, feed: &FeedCalendar) -> Result<ServiceDaysBitmap, DomainError> {
    let days: ServiceDaysBitmap = s.parse()?;
    if days.len() != feed.horizon() {
        return Err(DomainError::HorizonMismatch {
            expected: feed.horizon(),
            found: days.len(),
        });
    }
    Ok(days)
}
