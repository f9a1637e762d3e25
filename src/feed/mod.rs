//! Feed normalization.
//!
//! Loads each agency's GTFS feed, restricts it to its busiest service day and
//! combines every agency into one set of [`FeedTables`] keyed by
//! agency-scoped ids.

pub mod calendar;
pub mod gtfs;
pub mod source;
pub mod time;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::PipelineError;
use crate::model::{Coordinate, Route, ScopedId, Seconds, Stop, StopTime, Trip};
use source::FeedSource;
use time::parse_gtfs_time;

/// One agency's raw tables, already restricted to a single service day.
#[derive(Debug, Clone, Default)]
pub struct AgencyFeed {
    pub agency: String,
    pub service_date: Option<NaiveDate>,
    pub stops: Vec<gtfs::Stop>,
    pub routes: Vec<gtfs::Route>,
    pub trips: Vec<gtfs::Trip>,
    pub stop_times: Vec<gtfs::StopTime>,
}

impl AgencyFeed {
    /// Reads a feed and keeps only the trips of its busiest service day.
    #[tracing::instrument(skip_all, fields(feed = %source.path().display()))]
    pub fn load(source: &FeedSource) -> Result<Self> {
        let agencies: Vec<gtfs::Agency> = source.read_table("agency.txt")?.unwrap_or_default();
        let agency = agency_discriminator(&agencies).unwrap_or_else(|| source.stem());

        let stops = required_table(source, "stops.txt")?;
        let routes = required_table(source, "routes.txt")?;
        let trips: Vec<gtfs::Trip> = required_table(source, "trips.txt")?;
        let stop_times: Vec<gtfs::StopTime> = required_table(source, "stop_times.txt")?;

        let calendar: Vec<gtfs::Calendar> = source.read_table("calendar.txt")?.unwrap_or_default();
        let calendar_dates: Vec<gtfs::CalendarDate> =
            source.read_table("calendar_dates.txt")?.unwrap_or_default();
        let calendars = calendar::build_calendars(&calendar, &calendar_dates)?;

        let total_trips = trips.len();
        let (service_date, trips) = match calendar::busiest_service_date(&calendars, &trips) {
            Some((date, services)) => {
                let trips: Vec<_> = trips
                    .into_iter()
                    .filter(|trip| services.contains(&trip.service_id))
                    .collect();
                (Some(date), trips)
            }
            None => {
                warn!(agency = %agency, "No service calendar found, keeping every trip");
                (None, trips)
            }
        };

        let kept: HashSet<&str> = trips.iter().map(|trip| trip.trip_id.as_str()).collect();
        let stop_times: Vec<_> = stop_times
            .into_iter()
            .filter(|stop_time| kept.contains(stop_time.trip_id.as_str()))
            .collect();

        info!(
            agency = %agency,
            service_date = ?service_date,
            trips = trips.len(),
            total_trips,
            stop_times = stop_times.len(),
            "Selected busiest service day"
        );

        Ok(Self {
            agency,
            service_date,
            stops,
            routes,
            trips,
            stop_times,
        })
    }
}

/// Finds the configured feeds under `gtfs_dir`, or every feed there when none
/// are configured. Configured feeds that are not on disk are skipped.
pub fn resolve_sources(gtfs_dir: &Path, feeds: &[FeedConfig]) -> Result<Vec<FeedSource>> {
    if feeds.is_empty() {
        return FeedSource::discover(gtfs_dir);
    }

    let mut sources = Vec::with_capacity(feeds.len());
    for feed in feeds {
        match FeedSource::locate(gtfs_dir, &feed.name) {
            Some(source) => sources.push(source),
            None => warn!(feed = %feed.name, gtfs_dir = %gtfs_dir.display(), "Feed not found, skipping"),
        }
    }
    Ok(sources)
}

fn required_table<T: serde::de::DeserializeOwned>(
    source: &FeedSource,
    table: &'static str,
) -> Result<Vec<T>> {
    source.read_table(table)?.ok_or_else(|| {
        PipelineError::MissingTable {
            feed: source.stem(),
            table,
        }
        .into()
    })
}

/// The first agency's id when it is at least two characters, else its name.
pub fn agency_discriminator(agencies: &[gtfs::Agency]) -> Option<String> {
    let first = agencies.first()?;
    match first.agency_id.as_deref().map(str::trim) {
        Some(id) if id.chars().count() >= 2 => Some(id.to_string()),
        _ => first
            .agency_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
    }
}

/// Stops, trips, routes and stop times of every agency in one run.
///
/// Read-only once built; each station evaluation derives its own working
/// state from it.
#[derive(Debug, Default)]
pub struct FeedTables {
    stops: Vec<Stop>,
    stop_index: HashMap<ScopedId, usize>,
    trips: HashMap<ScopedId, Trip>,
    routes: HashMap<ScopedId, Route>,
    stop_times: Vec<StopTime>,
}

impl FeedTables {
    pub fn from_feeds(feeds: impl IntoIterator<Item = AgencyFeed>) -> Result<Self, PipelineError> {
        let mut tables = Self::default();
        for feed in feeds {
            tables.add_feed(feed)?;
        }
        Ok(tables)
    }

    /// Loads and merges every feed in `sources`.
    #[tracing::instrument(skip_all, fields(feeds = sources.len()))]
    pub fn load(sources: &[FeedSource]) -> Result<Self> {
        let mut tables = Self::default();
        for source in sources {
            let feed = AgencyFeed::load(source)?;
            let agency = feed.agency.clone();
            tables
                .add_feed(feed)
                .with_context(|| format!("Failed to merge feed {agency}"))?;
        }
        info!(
            stops = tables.stops.len(),
            trips = tables.trips.len(),
            stop_times = tables.stop_times.len(),
            "Feeds loaded"
        );
        Ok(tables)
    }

    /// Tags a feed's rows with its agency and merges them in.
    ///
    /// # Errors
    ///
    /// Fails on a stop, trip or route id that repeats within the agency, and on
    /// a malformed stop time.
    pub fn add_feed(&mut self, feed: AgencyFeed) -> Result<(), PipelineError> {
        let agency = feed.agency;

        for row in feed.stops {
            let key = ScopedId::new(agency.clone(), row.stop_id);
            if self.stop_index.contains_key(&key) {
                return Err(duplicate("stops", key));
            }
            let location = match (row.stop_lat, row.stop_lon) {
                (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
                _ => None,
            };
            self.stop_index.insert(key.clone(), self.stops.len());
            self.stops.push(Stop {
                key,
                name: row.stop_name,
                location,
            });
        }

        for row in feed.routes {
            let key = ScopedId::new(agency.clone(), row.route_id);
            if self.routes.contains_key(&key) {
                return Err(duplicate("routes", key));
            }
            let short_name = row
                .route_short_name
                .filter(|name| !name.is_empty())
                .or(row.route_long_name)
                .unwrap_or_default();
            self.routes.insert(key.clone(), Route { key, short_name });
        }

        for row in feed.trips {
            let key = ScopedId::new(agency.clone(), row.trip_id);
            if self.trips.contains_key(&key) {
                return Err(duplicate("trips", key));
            }
            self.trips.insert(
                key.clone(),
                Trip {
                    key,
                    route_id: row.route_id,
                    headsign: row.trip_headsign.unwrap_or_default(),
                    short_name: row.trip_short_name.unwrap_or_default(),
                    stops: Vec::new(),
                },
            );
        }

        let mut by_trip: HashMap<String, Vec<gtfs::StopTime>> = HashMap::new();
        for row in feed.stop_times {
            by_trip.entry(row.trip_id.clone()).or_default().push(row);
        }

        let mut orphaned = 0usize;
        for (trip_id, mut rows) in by_trip {
            let key = ScopedId::new(agency.clone(), trip_id);
            let Some(trip) = self.trips.get_mut(&key) else {
                orphaned += rows.len();
                continue;
            };
            rows.sort_by_key(|row| row.stop_sequence);

            let raw_times = rows
                .iter()
                .map(|row| {
                    Ok((
                        parse_gtfs_time(&row.arrival_time, &agency, &key.id)?,
                        parse_gtfs_time(&row.departure_time, &agency, &key.id)?,
                    ))
                })
                .collect::<Result<Vec<_>, PipelineError>>()?;

            let Some(times) = fill_untimed(&raw_times) else {
                warn!(agency = %agency, trip_id = %key.id, "Trip has no timed stops, dropping its stop times");
                continue;
            };

            trip.stops = rows.iter().map(|row| row.stop_id.clone()).collect();
            for (index, (row, (arrival, departure))) in rows.into_iter().zip(times).enumerate() {
                self.stop_times.push(StopTime {
                    trip: key.clone(),
                    stop_id: row.stop_id,
                    position: stop_position(index + 1, &key)?,
                    arrival,
                    departure,
                });
            }
        }

        if orphaned > 0 {
            debug!(agency = %agency, orphaned, "Ignored stop times of unknown trips");
        }

        Ok(())
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn stop(&self, key: &ScopedId) -> Option<&Stop> {
        self.stop_index.get(key).map(|&index| &self.stops[index])
    }

    pub fn trip(&self, key: &ScopedId) -> Option<&Trip> {
        self.trips.get(key)
    }

    pub fn route(&self, key: &ScopedId) -> Option<&Route> {
        self.routes.get(key)
    }

    pub fn stop_times(&self) -> &[StopTime] {
        &self.stop_times
    }

    /// Stops of any agency whose name is exactly `name`.
    pub fn stops_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Stop> + 'a {
        self.stops.iter().filter(move |stop| stop.name == name)
    }
}

/// A 1-based stop position or trip length as stored on events.
pub fn stop_position(count: usize, trip: &ScopedId) -> Result<u32, PipelineError> {
    u32::try_from(count).map_err(|_| PipelineError::TripTooLong {
        agency: trip.agency.clone(),
        trip_id: trip.id.clone(),
        stops: count,
    })
}

fn duplicate(table: &'static str, key: ScopedId) -> PipelineError {
    PipelineError::DuplicateKey {
        table,
        agency: key.agency,
        key: key.id,
    }
}

/// Fills untimed points: a missing arrival or departure takes its pair, a stop
/// with neither carries the previous departure forward, and leading untimed
/// stops take the first timed value. `None` when no stop is timed.
fn fill_untimed(times: &[(Option<Seconds>, Option<Seconds>)]) -> Option<Vec<(Seconds, Seconds)>> {
    let first = times.iter().find_map(|&(arrival, departure)| arrival.or(departure))?;
    let mut previous = first;

    Some(
        times
            .iter()
            .map(|&(arrival, departure)| {
                let arrival = arrival.or(departure).unwrap_or(previous);
                let departure = departure.unwrap_or(arrival);
                previous = departure;
                (arrival, departure)
            })
            .collect(),
    )
}
