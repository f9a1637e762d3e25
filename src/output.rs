//! Output formatting and persistence for station reports.
//!
//! Each station is written as a long-format CSV, one row per labelled event.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::model::StopEvent;
use crate::report::{ReportRow, StationReport};

/// One output row. Column order is consumed positionally by downstream
/// dashboards and must not change.
#[derive(Debug, Serialize)]
pub struct ConnectionRecord<'a> {
    #[serde(rename = "Arrival Time")]
    pub arrival_time: String,
    #[serde(rename = "Departure Time")]
    pub departure_time: String,
    #[serde(rename = "Connection")]
    pub connection: &'static str,
    #[serde(rename = "Agency")]
    pub agency: &'a str,
    #[serde(rename = "Route")]
    pub route: &'a str,
    #[serde(rename = "Direction")]
    pub direction: &'a str,
    #[serde(rename = "Stop")]
    pub stop: &'a str,
    #[serde(rename = "Peak Connection")]
    pub peak_connection: &'static str,
}

impl<'a> ConnectionRecord<'a> {
    pub fn from_row(row: &'a ReportRow, hub_direction_is_inbound: bool) -> Self {
        Self {
            arrival_time: row.arrival_hhmm(),
            departure_time: row.departure_hhmm(),
            connection: row.connection(),
            agency: &row.column.agency,
            route: &row.column.route,
            direction: &row.column.direction,
            stop: &row.column.stop,
            peak_connection: if row.is_peak_connection(hub_direction_is_inbound) {
                "TRUE"
            } else {
                "FALSE"
            },
        }
    }
}

/// File-system friendly version of a station name.
pub fn file_stem(station: &str) -> String {
    station
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn create(path: &Path, gzip: bool) -> Result<Box<dyn Write>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(if gzip {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(file)
    })
}

/// Writes report rows as CSV with a header line.
pub fn write_records<W: Write>(
    writer: W,
    report: &StationReport,
    hub_direction_is_inbound: bool,
) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for row in &report.rows {
        writer.serialize(ConnectionRecord::from_row(row, hub_direction_is_inbound))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `<dir>/<station>.csv` (or `.csv.gz`) and returns its path.
pub fn write_report(
    dir: &Path,
    report: &StationReport,
    hub_direction_is_inbound: bool,
    gzip: bool,
) -> Result<PathBuf> {
    let extension = if gzip { "csv.gz" } else { "csv" };
    let path = dir.join(format!("{}.{}", file_stem(&report.station), extension));
    debug!(path = %path.display(), rows = report.rows.len(), "Writing station report");

    let writer = create(&path, gzip)?;
    write_records(writer, report, hub_direction_is_inbound)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(station = %report.station, path = %path.display(), rows = report.rows.len(), "Station report written");
    Ok(path)
}

/// Dumps consolidated events before classification to `<dir>/<station>-raw.csv`.
pub fn write_raw_events(dir: &Path, station: &str, events: &[StopEvent]) -> Result<PathBuf> {
    let path = dir.join(format!("{}-raw.csv", file_stem(station)));
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;

    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;

    debug!(station, path = %path.display(), events = events.len(), "Raw events written");
    Ok(path)
}
