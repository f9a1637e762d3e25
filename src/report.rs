//! Report assembly: one column per trip pattern, one sparse row per event.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::classify::ConnectionLabel;
use crate::feed::time::format_hhmm;
use crate::model::{Seconds, StopEvent};

pub const ARRIVAL_TIME: &str = "Arrival Time";
pub const DEPARTURE_TIME: &str = "Departure Time";

const NOON: Seconds = 12 * 3600;

/// Identifies a trip pattern at a stop. Repeated trips on one pattern share a
/// column; different patterns never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ColumnKey {
    pub agency: String,
    pub route: String,
    pub direction: String,
    pub stop: String,
}

impl ColumnKey {
    pub fn for_event(event: &StopEvent) -> Self {
        Self {
            agency: event.agency.clone(),
            route: event.route_short_name.clone(),
            direction: event.direction().to_string(),
            stop: event.stop_name.clone(),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} at {}",
            self.agency, self.route, self.direction, self.stop
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub arrival: Seconds,
    pub departure: Seconds,
    pub column: ColumnKey,
    pub label: ConnectionLabel,
}

impl ReportRow {
    pub fn new(event: &StopEvent, label: ConnectionLabel) -> Self {
        Self {
            arrival: event.arrival,
            departure: event.departure,
            column: ColumnKey::for_event(event),
            label,
        }
    }

    pub fn arrival_hhmm(&self) -> String {
        format_hhmm(self.arrival)
    }

    pub fn departure_hhmm(&self) -> String {
        format_hhmm(self.departure)
    }

    pub fn is_corridor(&self) -> bool {
        self.label.is_corridor()
    }

    /// `Corridor` for corridor rows, otherwise the label without its hub suffix.
    pub fn connection(&self) -> &'static str {
        match self.label.base() {
            Some(base) => base.as_str(),
            None => "Corridor",
        }
    }

    /// Morning feeders into the corridor and afternoon distributors out of it.
    ///
    /// With `hub_direction_is_inbound`, a morning row must also connect to a
    /// hub-bound arrival, and an afternoon row must leave after one.
    pub fn is_peak_connection(&self, hub_direction_is_inbound: bool) -> bool {
        let ConnectionLabel::Transfer { base, hub } = &self.label else {
            return false;
        };
        let morning = base.has_inbound()
            && self.arrival < NOON
            && (!hub_direction_is_inbound || hub.has_inbound());
        let afternoon = base.has_outbound()
            && self.departure >= NOON
            && (!hub_direction_is_inbound || hub.has_outbound());
        morning || afternoon
    }

    /// The row as a sparse mapping: both times plus this row's own column,
    /// filed under `header`.
    pub fn to_sparse(&self, header: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ARRIVAL_TIME.to_string(), self.arrival_hhmm()),
            (DEPARTURE_TIME.to_string(), self.departure_hhmm()),
            (header.to_string(), self.label.to_string()),
        ])
    }
}

/// Labelled events of one station in canonical order.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReport {
    pub station: String,
    pub columns: Vec<ColumnKey>,
    /// Header text of each column, parallel to `columns` and unique.
    pub column_names: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl StationReport {
    /// The "no data for this station" result.
    pub fn empty(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            columns: Vec::new(),
            column_names: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Orders columns with corridor patterns first, each group sorted.
    pub fn assemble(station: impl Into<String>, rows: Vec<ReportRow>) -> Self {
        if rows.is_empty() {
            return Self::empty(station);
        }

        let corridor: BTreeSet<&ColumnKey> = rows
            .iter()
            .filter(|row| row.is_corridor())
            .map(|row| &row.column)
            .collect();
        let local: BTreeSet<&ColumnKey> = rows
            .iter()
            .filter(|row| !corridor.contains(&row.column))
            .map(|row| &row.column)
            .collect();

        let columns: Vec<ColumnKey> = corridor.into_iter().chain(local).cloned().collect();
        let column_names = unique_names(&columns);

        Self {
            station: station.into(),
            columns,
            column_names,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `Arrival Time`, `Departure Time`, then every column key; nothing at all
    /// for an empty report.
    pub fn headers(&self) -> Vec<String> {
        if self.is_empty() {
            return Vec::new();
        }
        [ARRIVAL_TIME.to_string(), DEPARTURE_TIME.to_string()]
            .into_iter()
            .chain(self.column_names.iter().cloned())
            .collect()
    }

    pub fn sparse_rows(&self) -> Vec<BTreeMap<String, String>> {
        let names: HashMap<&ColumnKey, &str> = self
            .columns
            .iter()
            .zip(&self.column_names)
            .map(|(column, name)| (column, name.as_str()))
            .collect();

        self.rows
            .iter()
            .filter_map(|row| names.get(&row.column).map(|name| row.to_sparse(name)))
            .collect()
    }
}

/// Renders each key, numbering later keys whose text repeats an earlier one
/// (`... at Stop (2)`), so distinct keys never share a header.
fn unique_names(columns: &[ColumnKey]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    columns
        .iter()
        .map(|column| {
            let base = column.to_string();
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{base} ({n})");
                n += 1;
            }
            name
        })
        .collect()
}
