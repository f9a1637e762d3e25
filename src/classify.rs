//! Connection classification.
//!
//! Every event near a station is labelled by how it relates to the station's
//! corridor service: the corridor itself, a feeder arriving before a corridor
//! departure (inbound), a distributor leaving after a corridor arrival
//! (outbound), both, or neither.
//!
//! Classification runs in two steps over the canonical event order. First
//! every corridor arrival is recorded per direction in a [`CorridorArrivals`]
//! accumulator owned by the current station. Then each non-corridor event is
//! checked against all recorded arrivals, so a feeder leaving at 07:40 still
//! finds the 08:00 train that comes later in the list.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::feed::time::hour_bucket;
use crate::model::{CorridorSpec, ScopedId, Seconds, StopEvent, TransferWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Connection {
    None,
    Inbound,
    Outbound,
    Both,
}

impl Connection {
    fn from_checks(inbound: bool, outbound: bool) -> Self {
        match (inbound, outbound) {
            (true, true) => Self::Both,
            (true, false) => Self::Inbound,
            (false, true) => Self::Outbound,
            (false, false) => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
            Self::Both => "Both",
        }
    }

    pub fn has_inbound(&self) -> bool {
        matches!(self, Self::Inbound | Self::Both)
    }

    pub fn has_outbound(&self) -> bool {
        matches!(self, Self::Outbound | Self::Both)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The label attached to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionLabel {
    Corridor,
    /// A corridor event in hourly-summary mode, tagged with its `HH:00` arrival hour.
    CorridorHour(String),
    /// A local event. `hub` is the result restricted to hub-bound corridor
    /// arrivals, or `None` when the refinement is off.
    Transfer { base: Connection, hub: Connection },
}

impl ConnectionLabel {
    pub fn is_corridor(&self) -> bool {
        matches!(self, Self::Corridor | Self::CorridorHour(_))
    }

    pub fn base(&self) -> Option<Connection> {
        match self {
            Self::Transfer { base, .. } => Some(*base),
            _ => None,
        }
    }

    pub fn hub(&self) -> Option<Connection> {
        match self {
            Self::Transfer { hub, .. } => Some(*hub),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corridor => f.write_str("Corridor"),
            Self::CorridorHour(hour) => f.write_str(hour),
            Self::Transfer {
                base,
                hub: Connection::None,
            } => write!(f, "{base}"),
            Self::Transfer { base, hub } => write!(f, "{base}-{hub}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Local service reaching the station before a corridor arrival.
    Inbound,
    /// Local service leaving the station after a corridor arrival.
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOptions {
    pub window: TransferWindow,
    /// Label corridor events by arrival hour instead of `Corridor`.
    pub hourly_summary: bool,
    /// Add the hub-direction suffix to every local label.
    pub hub_direction_is_inbound: bool,
    /// Substring identifying hub-bound corridor directions.
    pub hub_marker: String,
}

/// Corridor arrival times per direction label, for one station evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorridorArrivals {
    by_direction: BTreeMap<String, Vec<Seconds>>,
}

impl CorridorArrivals {
    pub fn record(&mut self, direction: &str, arrival: Seconds) {
        self.by_direction
            .entry(direction.to_string())
            .or_default()
            .push(arrival);
    }

    pub fn arrivals(&self, direction: &str) -> &[Seconds] {
        self.by_direction
            .get(direction)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_direction.is_empty()
    }

    /// Whether a local event at `time` makes a `kind` transfer with any
    /// recorded arrival, optionally only arrivals whose direction contains
    /// `hub_marker`. Window bounds are inclusive whole minutes, rounded down.
    pub fn has_connection(
        &self,
        time: Seconds,
        kind: TransferKind,
        hub_marker: Option<&str>,
        window: &TransferWindow,
    ) -> bool {
        self.by_direction
            .iter()
            .filter(|(direction, _)| hub_marker.is_none_or(|marker| direction.contains(marker)))
            .flat_map(|(_, arrivals)| arrivals.iter().copied())
            .any(|arrival| match kind {
                TransferKind::Outbound => window.accepts_outbound(minutes_between(arrival, time)),
                TransferKind::Inbound => window.accepts_inbound(minutes_between(time, arrival)),
            })
    }
}

/// Whole minutes from `from` to `to`, rounded toward negative infinity.
fn minutes_between(from: Seconds, to: Seconds) -> i64 {
    (i64::from(to) - i64::from(from)).div_euclid(60)
}

/// Decides which events belong to the corridor at one station.
#[derive(Debug, Clone, Copy)]
pub struct CorridorMatcher<'a> {
    station_stops: &'a HashSet<ScopedId>,
    corridor: &'a CorridorSpec,
}

impl<'a> CorridorMatcher<'a> {
    pub fn new(station_stops: &'a HashSet<ScopedId>, corridor: &'a CorridorSpec) -> Self {
        Self {
            station_stops,
            corridor,
        }
    }

    /// Served at one of the station's own stops by a corridor route.
    pub fn matches(&self, event: &StopEvent) -> bool {
        self.corridor.contains(&event.route_short_name) && self.station_stops.contains(&event.stop_key())
    }
}

/// Records the arrival of every corridor event under its direction.
pub fn collect_corridor_arrivals(events: &[StopEvent], matcher: &CorridorMatcher<'_>) -> CorridorArrivals {
    let mut arrivals = CorridorArrivals::default();
    for event in events.iter().filter(|event| matcher.matches(event)) {
        arrivals.record(event.direction(), event.arrival);
    }
    arrivals
}

/// Labels one local event against the recorded corridor arrivals.
///
/// The first stop of a trip is never checked for inbound transfers and the
/// last stop never for outbound ones. The event's departure time is compared
/// in both directions.
pub fn label_transfer(
    event: &StopEvent,
    arrivals: &CorridorArrivals,
    options: &ClassifierOptions,
) -> ConnectionLabel {
    let check = |hub_marker: Option<&str>| {
        let inbound = !event.is_first_stop()
            && arrivals.has_connection(event.departure, TransferKind::Inbound, hub_marker, &options.window);
        let outbound = !event.is_last_stop()
            && arrivals.has_connection(event.departure, TransferKind::Outbound, hub_marker, &options.window);
        Connection::from_checks(inbound, outbound)
    };

    let base = check(None);
    let hub = if options.hub_direction_is_inbound {
        check(Some(options.hub_marker.as_str()))
    } else {
        Connection::None
    };

    ConnectionLabel::Transfer { base, hub }
}

/// Labels every event of one station, in the order given.
///
/// A fresh accumulator is built on each call, so nothing carries over from a
/// previously evaluated station.
pub fn classify(
    events: &[StopEvent],
    matcher: &CorridorMatcher<'_>,
    options: &ClassifierOptions,
) -> Vec<ConnectionLabel> {
    let arrivals = collect_corridor_arrivals(events, matcher);

    events
        .iter()
        .map(|event| {
            if !matcher.matches(event) {
                label_transfer(event, &arrivals, options)
            } else if options.hourly_summary {
                ConnectionLabel::CorridorHour(hour_bucket(event.arrival))
            } else {
                ConnectionLabel::Corridor
            }
        })
        .collect()
}
