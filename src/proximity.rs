//! Proximity matching between a station and every stop in the run.
//!
//! Uses the haversine formula for great-circle distances on Earth's surface.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::feed::FeedTables;
use crate::model::{Coordinate, ScopedId, Station, Stop};

pub const EARTH_RADIUS_METRES: f64 = 6_371_000.0;

/// Calculate haversine distance between two points in metres
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METRES * c
}

/// Minimum distance from `location` to any reference point.
///
/// Stops without coordinates, or stations without reference points, are
/// infinitely far away.
pub fn connection_distance(location: Option<Coordinate>, references: &[Coordinate]) -> f64 {
    let Some(location) = location else {
        return f64::INFINITY;
    };
    references
        .iter()
        .map(|reference| haversine_distance(location, *reference))
        .fold(f64::INFINITY, f64::min)
}

/// The station's own stop coordinates, or its overrides when any are configured.
pub fn reference_points(station_stops: &[&Stop], overrides: &[Coordinate]) -> Vec<Coordinate> {
    if !overrides.is_empty() {
        return overrides.to_vec();
    }
    station_stops.iter().filter_map(|stop| stop.location).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct NearbyStop<'a> {
    pub stop: &'a Stop,
    pub distance: f64,
}

/// Stops near one station, with distances valid for this station only.
#[derive(Debug)]
pub struct NearbyStops<'a> {
    /// Stops whose name is the station name.
    pub station_stops: HashSet<ScopedId>,
    pub stops: HashMap<ScopedId, NearbyStop<'a>>,
}

impl<'a> NearbyStops<'a> {
    pub fn get(&self, key: &ScopedId) -> Option<&NearbyStop<'a>> {
        self.stops.get(key)
    }

    pub fn is_station_stop(&self, key: &ScopedId) -> bool {
        self.station_stops.contains(key)
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Nearest first; ties ordered by agency then stop id.
    pub fn sorted_by_distance(&self) -> Vec<NearbyStop<'a>> {
        let mut stops: Vec<_> = self.stops.values().copied().collect();
        stops.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.stop.key.cmp(&b.stop.key))
        });
        stops
    }
}

/// Selects every stop within `max_distance` metres of the station, plus the
/// station's own stops regardless of distance.
///
/// Returns `None` when no stop in any feed carries the station's name.
pub fn match_nearby<'a>(
    tables: &'a FeedTables,
    station: &Station,
    max_distance: f64,
) -> Option<NearbyStops<'a>> {
    let station_stops: Vec<&Stop> = tables.stops_named(&station.name).collect();
    if station_stops.is_empty() {
        return None;
    }

    let references = reference_points(&station_stops, &station.overrides);
    let station_keys: HashSet<ScopedId> = station_stops.iter().map(|stop| stop.key.clone()).collect();

    let stops: HashMap<ScopedId, NearbyStop<'a>> = tables
        .stops()
        .iter()
        .filter_map(|stop| {
            let distance = connection_distance(stop.location, &references);
            (distance <= max_distance || station_keys.contains(&stop.key))
                .then(|| (stop.key.clone(), NearbyStop { stop, distance }))
        })
        .collect();

    debug!(
        station = %station.name,
        station_stops = station_keys.len(),
        references = references.len(),
        nearby = stops.len(),
        "Matched nearby stops"
    );

    Some(NearbyStops {
        station_stops: station_keys,
        stops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::*;
    use crate::model::CorridorSpec;

    fn station(name: &str, overrides: Vec<Coordinate>) -> Station {
        Station {
            name: name.to_string(),
            corridor: CorridorSpec::new(["LW"]),
            overrides,
        }
    }

    fn tables() -> FeedTables {
        let go = agency_feed(
            "GO",
            vec![
                stop("OA", "Oakville GO", 43.4553, -79.6821),
                stop("BR", "Bronte GO", 43.4176, -79.7240),
            ],
            vec![],
            vec![],
            vec![],
        );
        let oakville = agency_feed(
            "Oakville Transit",
            vec![
                // ~110 m east of the GO platform
                stop("1001", "Oakville GO Bay 3", 43.4553, -79.6807),
                // ~1.5 km north
                stop("2002", "Trafalgar at Cornwall", 43.4688, -79.6821),
            ],
            vec![],
            vec![],
            vec![],
        );
        FeedTables::from_feeds([go, oakville]).unwrap()
    }

    #[test]
    fn test_haversine_distance() {
        // Toronto Union Station to Hamilton GO Centre is roughly 59 km.
        let union = Coordinate::new(43.6453, -79.3806);
        let hamilton = Coordinate::new(43.2530, -79.8690);
        let dist = haversine_distance(union, hamilton);
        assert!((dist - 58_500.0).abs() < 2_000.0, "got {dist}");
        assert_eq!(haversine_distance(union, union), 0.0);
    }

    #[test]
    fn test_connection_distance_takes_minimum() {
        let here = Coordinate::new(43.0, -79.0);
        let refs = [Coordinate::new(44.0, -79.0), here];
        assert_eq!(connection_distance(Some(here), &refs), 0.0);
        assert_eq!(connection_distance(None, &refs), f64::INFINITY);
        assert_eq!(connection_distance(Some(here), &[]), f64::INFINITY);
    }

    #[test]
    fn test_match_nearby_selects_within_radius() {
        let tables = tables();
        let nearby = match_nearby(&tables, &station("Oakville GO", vec![]), 300.0).unwrap();

        let mut ids: Vec<_> = nearby.stops.keys().map(|key| key.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1001", "OA"]);

        let own = nearby.get(&ScopedId::new("GO", "OA")).unwrap();
        assert_eq!(own.distance, 0.0);
        assert!(nearby.is_station_stop(&ScopedId::new("GO", "OA")));
        assert!(!nearby.is_station_stop(&ScopedId::new("Oakville Transit", "1001")));
        assert!(nearby.stops.values().all(|stop| stop.distance >= 0.0));
    }

    #[test]
    fn test_overrides_replace_reference_points_but_keep_station_stops() {
        let tables = tables();
        // Override point sits on the Trafalgar stop, far from the platform.
        let overridden = station("Oakville GO", vec![Coordinate::new(43.4688, -79.6821)]);
        let nearby = match_nearby(&tables, &overridden, 300.0).unwrap();

        assert!(nearby.get(&ScopedId::new("Oakville Transit", "2002")).is_some());
        assert!(nearby.get(&ScopedId::new("Oakville Transit", "1001")).is_none());

        let own = nearby.get(&ScopedId::new("GO", "OA")).unwrap();
        assert!(own.distance > 300.0);
    }

    #[test]
    fn test_unknown_station_has_no_match() {
        let tables = tables();
        assert!(match_nearby(&tables, &station("Nowhere GO", vec![]), 300.0).is_none());
    }

    #[test]
    fn test_sorted_by_distance() {
        let tables = tables();
        let nearby = match_nearby(&tables, &station("Oakville GO", vec![]), 10_000.0).unwrap();
        let order: Vec<_> = nearby
            .sorted_by_distance()
            .iter()
            .map(|stop| stop.stop.key.id.clone())
            .collect();
        assert_eq!(order, vec!["OA", "1001", "2002", "BR"]);
    }
}
