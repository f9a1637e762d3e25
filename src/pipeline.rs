//! Per-station evaluation: proximity matching, consolidation, classification
//! and report assembly.
//!
//! Stations are independent. Each evaluation reads the shared [`FeedTables`]
//! and builds its own distances and corridor accumulator.

use tracing::{debug, info, warn};

use crate::classify::{ClassifierOptions, CorridorMatcher, classify};
use crate::consolidate::consolidate;
use crate::error::PipelineError;
use crate::feed::FeedTables;
use crate::model::{Station, StopEvent};
use crate::proximity::{NearbyStops, match_nearby};
use crate::report::{ReportRow, StationReport};

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Metres from a station reference point within which stops are included.
    pub connection_max_distance: f64,
    /// Drop non-corridor rows after labelling.
    pub only_show_corridors: bool,
    pub classifier: ClassifierOptions,
}

/// Nearby stops and the consolidated event list of one station.
#[derive(Debug)]
pub struct StationEvents<'a> {
    pub nearby: NearbyStops<'a>,
    pub events: Vec<StopEvent>,
}

/// Matches nearby stops and consolidates their events, or `None` when no stop
/// carries the station's name.
pub fn station_events<'a>(
    tables: &'a FeedTables,
    station: &Station,
    settings: &RunSettings,
) -> Result<Option<StationEvents<'a>>, PipelineError> {
    let Some(nearby) = match_nearby(tables, station, settings.connection_max_distance) else {
        warn!(station = %station.name, "No stop matches the station name");
        return Ok(None);
    };
    let events = consolidate(tables, &nearby)?;
    Ok(Some(StationEvents { nearby, events }))
}

/// Labels a station's events and assembles its report.
pub fn label_events(station: &Station, events: &StationEvents<'_>, settings: &RunSettings) -> StationReport {
    let matcher = CorridorMatcher::new(&events.nearby.station_stops, &station.corridor);
    let labels = classify(&events.events, &matcher, &settings.classifier);

    let rows: Vec<ReportRow> = events
        .events
        .iter()
        .zip(labels)
        .map(|(event, label)| ReportRow::new(event, label))
        .filter(|row| !settings.only_show_corridors || row.is_corridor())
        .collect();

    if rows.is_empty() {
        info!(
            station = %station.name,
            events = events.events.len(),
            "No events survived for station"
        );
    }

    StationReport::assemble(station.name.clone(), rows)
}

/// Runs the whole pipeline for one station.
///
/// # Errors
///
/// Only join failures are errors. A station without matching stops or without
/// surviving events yields an empty report.
#[tracing::instrument(skip_all, fields(station = %station.name))]
pub fn evaluate_station(
    tables: &FeedTables,
    station: &Station,
    settings: &RunSettings,
) -> Result<StationReport, PipelineError> {
    let Some(events) = station_events(tables, station, settings)? else {
        return Ok(StationReport::empty(station.name.clone()));
    };

    let report = label_events(station, &events, settings);
    debug!(
        nearby_stops = events.nearby.len(),
        events = events.events.len(),
        rows = report.rows.len(),
        columns = report.columns.len(),
        "Station evaluated"
    );
    Ok(report)
}

/// Evaluates every station in order, stopping at the first join failure.
pub fn evaluate_stations(
    tables: &FeedTables,
    stations: &[Station],
    settings: &RunSettings,
) -> Result<Vec<StationReport>, PipelineError> {
    stations
        .iter()
        .map(|station| evaluate_station(tables, station, settings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Connection;
    use crate::classify::ConnectionLabel;
    use crate::feed::testing::*;
    use crate::model::{CorridorSpec, TransferWindow};

    fn settings() -> RunSettings {
        RunSettings {
            connection_max_distance: 300.0,
            only_show_corridors: false,
            classifier: ClassifierOptions {
                window: TransferWindow {
                    min_inbound: 5,
                    max_inbound: 30,
                    min_outbound: 2,
                    max_outbound: 20,
                },
                hourly_summary: false,
                hub_direction_is_inbound: false,
                hub_marker: "Union Station".to_string(),
            },
        }
    }

    fn station(name: &str) -> Station {
        Station {
            name: name.to_string(),
            corridor: CorridorSpec::new(["LW"]),
            overrides: vec![],
        }
    }

    fn tables() -> FeedTables {
        let go = agency_feed(
            "GO",
            vec![
                stop("OA", "Oakville GO", 43.4553, -79.6821),
                stop("UN", "Union Station", 43.6453, -79.3806),
                stop("AL", "Aldershot GO", 43.3130, -79.8555),
            ],
            vec![route("09", "LW")],
            vec![trip("go-east", "09", "Union Station"), trip("go-west", "09", "Aldershot GO")],
            vec![
                stop_time("go-east", "AL", 1, "07:40:00"),
                stop_time("go-east", "OA", 2, "08:00:00"),
                stop_time("go-east", "UN", 3, "08:40:00"),
                stop_time("go-west", "UN", 1, "16:30:00"),
                stop_time("go-west", "OA", 2, "17:10:00"),
                stop_time("go-west", "AL", 3, "17:30:00"),
            ],
        );
        let bus = agency_feed(
            "Oakville Transit",
            vec![
                stop("bay", "Oakville GO Bay 3", 43.4553, -79.6807),
                stop("uptown", "Uptown Core", 43.5000, -79.7000),
            ],
            vec![route("r14", "14")],
            vec![trip("am", "r14", "Oakville GO"), trip("pm", "r14", "Uptown Core")],
            vec![
                stop_time("am", "uptown", 1, "07:20:00"),
                stop_time("am", "bay", 2, "07:40:00"),
                stop_time("pm", "bay", 1, "17:20:00"),
                stop_time("pm", "uptown", 2, "17:40:00"),
            ],
        );
        FeedTables::from_feeds([go, bus]).unwrap()
    }

    #[test]
    fn test_evaluate_station_labels_every_trip_once() {
        let tables = tables();
        let report = evaluate_station(&tables, &station("Oakville GO"), &settings()).unwrap();

        let labels: Vec<_> = report
            .rows
            .iter()
            .map(|row| (row.arrival_hhmm(), row.label.to_string()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("07:40".to_string(), "Inbound".to_string()),
                ("08:00".to_string(), "Corridor".to_string()),
                ("17:10".to_string(), "Corridor".to_string()),
                ("17:20".to_string(), "Outbound".to_string()),
            ]
        );
        assert_eq!(
            report.headers(),
            vec![
                "Arrival Time",
                "Departure Time",
                "GO LW Aldershot GO at Oakville GO",
                "GO LW Union Station at Oakville GO",
                "Oakville Transit 14 Oakville GO at Oakville GO Bay 3",
                "Oakville Transit 14 Uptown Core at Oakville GO Bay 3",
            ]
        );
    }

    #[test]
    fn test_unknown_station_is_empty_report() {
        let tables = tables();
        let report = evaluate_station(&tables, &station("Bronte GO"), &settings()).unwrap();
        assert_eq!(report, StationReport::empty("Bronte GO"));
        assert!(report.headers().is_empty());
    }

    #[test]
    fn test_only_show_corridors_filters_after_labelling() {
        let tables = tables();
        let mut settings = settings();
        settings.only_show_corridors = true;

        let report = evaluate_station(&tables, &station("Oakville GO"), &settings).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert!(report.rows.iter().all(ReportRow::is_corridor));
        assert_eq!(report.columns.len(), 2);
    }

    #[test]
    fn test_station_without_corridor_service_is_all_none() {
        let tables = tables();
        let mut lakeshore_east = station("Oakville GO");
        lakeshore_east.corridor = CorridorSpec::new(["LE"]);

        let report = evaluate_station(&tables, &lakeshore_east, &settings()).unwrap();
        assert!(report.rows.iter().all(|row| row.label.base() == Some(Connection::None)));
    }

    #[test]
    fn test_stations_do_not_share_state() {
        let tables = tables();
        let stations = vec![station("Oakville GO"), station("Aldershot GO"), station("Oakville GO")];

        let reports = evaluate_stations(&tables, &stations, &settings()).unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0], reports[2]);

        // Aldershot sees only the GO trips; the bus bay is kilometres away.
        assert!(reports[1].rows.iter().all(|row| row.label == ConnectionLabel::Corridor));
        assert_eq!(reports[1].rows.len(), 2);
    }
}
