//! Service calendars and busiest-day selection.
//!
//! Implements GTFS calendar.txt and calendar_dates.txt logic, reduced to the
//! question the report needs answered: which single day carries the most trips.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::gtfs;

/// Compact representation of which weekdays a service runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeekdayFlags {
    flags: u8,
}

impl WeekdayFlags {
    pub fn set(&mut self, weekday: Weekday) {
        self.flags |= 1 << weekday.number_from_monday();
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        (self.flags & (1 << weekday.number_from_monday())) != 0
    }
}

/// Determines which days a transit service operates
#[derive(Clone, Debug, Default)]
pub struct ServiceCalendar {
    pub range: Option<(NaiveDate, NaiveDate)>,
    pub weekdays: WeekdayFlags,
    pub added_dates: HashSet<NaiveDate>,
    pub removed_dates: HashSet<NaiveDate>,
}

impl ServiceCalendar {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        if self.added_dates.contains(&date) {
            return true;
        }
        if self.removed_dates.contains(&date) {
            return false;
        }
        match self.range {
            Some((start, end)) => start <= date && date <= end && self.weekdays.contains(date.weekday()),
            None => false,
        }
    }
}

pub fn parse_gtfs_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .with_context(|| format!("Invalid GTFS date {value:?}"))
}

/// Builds one calendar per service id from both calendar tables.
pub fn build_calendars(
    calendar: &[gtfs::Calendar],
    calendar_dates: &[gtfs::CalendarDate],
) -> Result<HashMap<String, ServiceCalendar>> {
    let mut calendars: HashMap<String, ServiceCalendar> = HashMap::new();

    for row in calendar {
        let mut weekdays = WeekdayFlags::default();
        let days = [
            (row.monday, Weekday::Mon),
            (row.tuesday, Weekday::Tue),
            (row.wednesday, Weekday::Wed),
            (row.thursday, Weekday::Thu),
            (row.friday, Weekday::Fri),
            (row.saturday, Weekday::Sat),
            (row.sunday, Weekday::Sun),
        ];
        for (flag, weekday) in days {
            if flag == 1 {
                weekdays.set(weekday);
            }
        }

        let entry = calendars.entry(row.service_id.clone()).or_default();
        entry.range = Some((parse_gtfs_date(&row.start_date)?, parse_gtfs_date(&row.end_date)?));
        entry.weekdays = weekdays;
    }

    for row in calendar_dates {
        let date = parse_gtfs_date(&row.date)?;
        let entry = calendars.entry(row.service_id.clone()).or_default();
        match row.exception_type {
            1 => {
                entry.added_dates.insert(date);
            }
            2 => {
                entry.removed_dates.insert(date);
            }
            _ => {}
        }
    }

    Ok(calendars)
}

/// Finds the date on which the most trips run and the services active that day.
///
/// Ties go to the earliest date. Returns `None` when no service runs on any date.
pub fn busiest_service_date(
    calendars: &HashMap<String, ServiceCalendar>,
    trips: &[gtfs::Trip],
) -> Option<(NaiveDate, HashSet<String>)> {
    let mut trips_per_service: HashMap<&str, usize> = HashMap::new();
    for trip in trips {
        *trips_per_service.entry(trip.service_id.as_str()).or_default() += 1;
    }

    let mut candidates: BTreeSet<NaiveDate> = BTreeSet::new();
    for calendar in calendars.values() {
        candidates.extend(calendar.added_dates.iter().copied());
        if let Some((start, end)) = calendar.range {
            candidates.extend(start.iter_days().take_while(|date| *date <= end));
        }
    }

    let mut best: Option<(NaiveDate, usize)> = None;
    for date in candidates {
        let count: usize = calendars
            .iter()
            .filter(|(_, calendar)| calendar.runs_on(date))
            .map(|(service_id, _)| trips_per_service.get(service_id.as_str()).copied().unwrap_or(0))
            .sum();
        if count > 0 && best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((date, count));
        }
    }

    let (date, _) = best?;
    let services = calendars
        .iter()
        .filter(|(_, calendar)| calendar.runs_on(date))
        .map(|(service_id, _)| service_id.clone())
        .collect();

    Some((date, services))
}
