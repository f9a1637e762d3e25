//! Event consolidation: one nearest stop event per trip, joined with trip and
//! route metadata and put in canonical order.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

use crate::error::PipelineError;
use crate::feed::{FeedTables, stop_position};
use crate::model::{ScopedId, StopEvent, StopTime};
use crate::proximity::{NearbyStop, NearbyStops};

/// Builds the sorted event list for one station.
///
/// A trip touching several nearby stops (a loop passing the station twice, a
/// route serving two bays) keeps only its visit closest to the station; equal
/// distances keep the earlier stop of the trip.
///
/// # Errors
///
/// Returns [`PipelineError::MissingKey`] when a surviving event has no trip or
/// route metadata.
pub fn consolidate(
    tables: &FeedTables,
    nearby: &NearbyStops<'_>,
) -> Result<Vec<StopEvent>, PipelineError> {
    let lookup: HashMap<(&str, &str), &NearbyStop<'_>> = nearby
        .stops
        .iter()
        .map(|(key, stop)| ((key.agency.as_str(), key.id.as_str()), stop))
        .collect();

    let mut nearest: HashMap<&ScopedId, (&StopTime, &NearbyStop<'_>)> = HashMap::new();
    for stop_time in tables.stop_times() {
        let Some(&near) = lookup.get(&(stop_time.trip.agency.as_str(), stop_time.stop_id.as_str()))
        else {
            continue;
        };

        match nearest.entry(&stop_time.trip) {
            Entry::Vacant(entry) => {
                entry.insert((stop_time, near));
            }
            Entry::Occupied(mut entry) => {
                let (current, current_near) = *entry.get();
                let closer = near
                    .distance
                    .total_cmp(&current_near.distance)
                    .then(stop_time.position.cmp(&current.position))
                    .is_lt();
                if closer {
                    entry.insert((stop_time, near));
                }
            }
        }
    }

    let mut events = nearest
        .into_values()
        .map(|(stop_time, near)| join_metadata(tables, stop_time, near))
        .collect::<Result<Vec<_>, _>>()?;

    sort_canonical(&mut events);

    debug!(events = events.len(), "Consolidated nearby stop events");
    Ok(events)
}

fn join_metadata(
    tables: &FeedTables,
    stop_time: &StopTime,
    near: &NearbyStop<'_>,
) -> Result<StopEvent, PipelineError> {
    let agency = &stop_time.trip.agency;

    let trip = tables
        .trip(&stop_time.trip)
        .ok_or_else(|| PipelineError::MissingKey {
            join: "trips",
            agency: agency.clone(),
            key: stop_time.trip.id.clone(),
        })?;

    let route_key = ScopedId::new(agency.clone(), trip.route_id.clone());
    let route = tables
        .route(&route_key)
        .ok_or_else(|| PipelineError::MissingKey {
            join: "routes",
            agency: agency.clone(),
            key: trip.route_id.clone(),
        })?;

    Ok(StopEvent {
        agency: agency.clone(),
        trip_id: trip.key.id.clone(),
        route_id: route.key.id.clone(),
        route_short_name: route.short_name.clone(),
        stop_id: stop_time.stop_id.clone(),
        stop_name: near.stop.name.clone(),
        stop_sequence: stop_time.position,
        trip_length: stop_position(trip.stops.len(), &trip.key)?,
        arrival: stop_time.arrival,
        departure: stop_time.departure,
        headsign: trip.headsign.clone(),
        trip_short_name: trip.short_name.clone(),
        connection_distance: near.distance,
    })
}

/// Orders events by arrival then departure `HH:MM`, falling back to agency and
/// trip id so equal minutes still sort deterministically.
pub fn sort_canonical(events: &mut [StopEvent]) {
    events.sort_by(|a, b| {
        (a.arrival / 60, a.departure / 60, &a.agency, &a.trip_id).cmp(&(
            b.arrival / 60,
            b.departure / 60,
            &b.agency,
            &b.trip_id,
        ))
    });
}
