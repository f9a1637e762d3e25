//! Normalized transit records shared by every stage of the pipeline.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::feed::time::format_hhmm;

/// Seconds since midnight of the service day. Values past 24:00 are kept as-is.
pub type Seconds = u32;

/// An identifier scoped to the agency that published it.
///
/// GTFS ids are only unique within one feed, so every stop, trip and route is
/// addressed by its agency discriminator plus the feed-local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopedId {
    pub agency: String,
    pub id: String,
}

impl ScopedId {
    pub fn new(agency: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            agency: agency.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agency, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone)]
pub struct Stop {
    pub key: ScopedId,
    pub name: String,
    pub location: Option<Coordinate>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub key: ScopedId,
    pub short_name: String,
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub key: ScopedId,
    pub route_id: String,
    pub headsign: String,
    pub short_name: String,
    /// Stop ids in travel order.
    pub stops: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StopTime {
    pub trip: ScopedId,
    pub stop_id: String,
    /// 1-based position of the stop within its trip.
    pub position: u32,
    pub arrival: Seconds,
    pub departure: Seconds,
}

impl StopTime {
    pub fn stop_key(&self) -> ScopedId {
        ScopedId::new(self.trip.agency.clone(), self.stop_id.clone())
    }
}

/// One trip's visit to a stop near a station, joined with its trip and route metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopEvent {
    pub agency: String,
    pub trip_id: String,
    pub route_id: String,
    pub route_short_name: String,
    pub stop_id: String,
    pub stop_name: String,
    pub stop_sequence: u32,
    pub trip_length: u32,
    pub arrival: Seconds,
    pub departure: Seconds,
    pub headsign: String,
    pub trip_short_name: String,
    /// Metres from the stop to the nearest reference point of the evaluated station.
    pub connection_distance: f64,
}

impl StopEvent {
    pub fn stop_key(&self) -> ScopedId {
        ScopedId::new(self.agency.clone(), self.stop_id.clone())
    }

    /// Headsign, or the trip short name when the feed leaves the headsign blank.
    pub fn direction(&self) -> &str {
        if self.headsign.trim().is_empty() {
            &self.trip_short_name
        } else {
            &self.headsign
        }
    }

    pub fn arrival_hhmm(&self) -> String {
        format_hhmm(self.arrival)
    }

    pub fn departure_hhmm(&self) -> String {
        format_hhmm(self.departure)
    }

    /// A trip departing its origin cannot feed a transfer into the corridor.
    pub fn is_first_stop(&self) -> bool {
        self.stop_sequence == 1
    }

    pub fn is_last_stop(&self) -> bool {
        self.stop_sequence == self.trip_length
    }
}

/// Route short names treated as the corridor service at one station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorridorSpec(BTreeSet<String>);

impl CorridorSpec {
    pub fn new<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(routes.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, route_short_name: &str) -> bool {
        self.0.contains(route_short_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    /// Matched against `stop_name` in every feed.
    pub name: String,
    pub corridor: CorridorSpec,
    /// Literal reference points replacing the matched stops' coordinates.
    pub overrides: Vec<Coordinate>,
}

/// Inclusive minute bounds for transfers to and from the corridor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferWindow {
    pub min_inbound: i64,
    pub max_inbound: i64,
    pub min_outbound: i64,
    pub max_outbound: i64,
}

impl TransferWindow {
    pub fn accepts_inbound(&self, minutes: i64) -> bool {
        (self.min_inbound..=self.max_inbound).contains(&minutes)
    }

    pub fn accepts_outbound(&self, minutes: i64) -> bool {
        (self.min_outbound..=self.max_outbound).contains(&minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_window_bounds_are_inclusive() {
        let window = TransferWindow {
            min_inbound: 5,
            max_inbound: 30,
            min_outbound: 2,
            max_outbound: 20,
        };

        assert!(window.accepts_inbound(5));
        assert!(window.accepts_inbound(30));
        assert!(!window.accepts_inbound(31));
        assert!(!window.accepts_inbound(4));
        assert!(window.accepts_outbound(2));
        assert!(window.accepts_outbound(20));
        assert!(!window.accepts_outbound(21));
    }

    #[test]
    fn test_corridor_spec_matches_short_names() {
        let corridor = CorridorSpec::new(["LW", "RH"]);
        assert!(corridor.contains("LW"));
        assert!(!corridor.contains("ST"));
        assert!(!CorridorSpec::default().contains("LW"));
    }

    #[test]
    fn test_direction_falls_back_to_short_name() {
        let mut event = StopEvent {
            agency: "GO".into(),
            trip_id: "t1".into(),
            route_id: "r1".into(),
            route_short_name: "LW".into(),
            stop_id: "s1".into(),
            stop_name: "Oakville GO".into(),
            stop_sequence: 1,
            trip_length: 5,
            arrival: 0,
            departure: 0,
            headsign: "".into(),
            trip_short_name: "LW 1234".into(),
            connection_distance: 0.0,
        };
        assert_eq!(event.direction(), "LW 1234");

        event.headsign = "Union Station".into();
        assert_eq!(event.direction(), "Union Station");
        assert!(event.is_first_stop());
        assert!(!event.is_last_stop());
    }
}
