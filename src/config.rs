//! Run configuration and station lists.
//!
//! `config.json` holds the run-wide settings. Stations and their corridor
//! routes come from a headerless `Stations.csv`:
//! ```text
//! Oakville GO,LW
//! Bramalea GO,KI
//! ```
//! Optional coordinate overrides come from `Locations.csv`, one quoted
//! `lat,lon` pair per cell:
//! ```text
//! Oakville GO,"43.4553,-79.6821"
//! ```

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::classify::ClassifierOptions;
use crate::model::{Coordinate, CorridorSpec, Station, TransferWindow};
use crate::pipeline::RunSettings;

/// An agency feed to download and load, stored as `<gtfs_dir>/<name>.zip`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Directory holding `Stations.csv` and `Locations.csv`.
    pub input_path: PathBuf,
    #[serde(default = "default_gtfs_dir")]
    pub gtfs_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub connection_max_distance: f64,
    pub min_inbound_minutes: i64,
    pub max_inbound_minutes: i64,
    pub min_outbound_minutes: i64,
    pub max_outbound_minutes: i64,
    #[serde(default)]
    pub only_show_corridors: bool,
    #[serde(default)]
    pub hourly_summary: bool,
    #[serde(default, alias = "union_station_is_inbound")]
    pub hub_direction_is_inbound: bool,
    #[serde(default = "default_hub_marker")]
    pub hub_marker: String,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_gtfs_dir() -> PathBuf {
    PathBuf::from("gtfs")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_hub_marker() -> String {
    "Union Station".to_string()
}

impl RunConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        if config.connection_max_distance < 0.0 {
            return Err(anyhow!(
                "connection_max_distance must not be negative, got {}",
                config.connection_max_distance
            ));
        }
        Ok(config)
    }

    pub fn window(&self) -> TransferWindow {
        TransferWindow {
            min_inbound: self.min_inbound_minutes,
            max_inbound: self.max_inbound_minutes,
            min_outbound: self.min_outbound_minutes,
            max_outbound: self.max_outbound_minutes,
        }
    }

    pub fn settings(&self) -> RunSettings {
        RunSettings {
            connection_max_distance: self.connection_max_distance,
            only_show_corridors: self.only_show_corridors,
            classifier: ClassifierOptions {
                window: self.window(),
                hourly_summary: self.hourly_summary,
                hub_direction_is_inbound: self.hub_direction_is_inbound,
                hub_marker: self.hub_marker.clone(),
            },
        }
    }

    /// Reads `Stations.csv` and, when present, `Locations.csv` from `input_path`.
    pub fn load_stations(&self) -> Result<Vec<Station>> {
        let stations_path = self.input_path.join("Stations.csv");
        let stations = std::fs::File::open(&stations_path)
            .with_context(|| format!("Failed to open {}", stations_path.display()))?;
        let station_rows = read_rows(stations)
            .with_context(|| format!("Failed to parse {}", stations_path.display()))?;

        let locations_path = self.input_path.join("Locations.csv");
        let location_rows = if locations_path.is_file() {
            let locations = std::fs::File::open(&locations_path)
                .with_context(|| format!("Failed to open {}", locations_path.display()))?;
            read_rows(locations)
                .with_context(|| format!("Failed to parse {}", locations_path.display()))?
        } else {
            debug!(path = %locations_path.display(), "No location overrides");
            Vec::new()
        };

        build_stations(station_rows, location_rows)
    }

    /// The listed station called `name` with its overrides, or a bare station
    /// with no corridor routes when it is not listed.
    pub fn station_named(&self, name: &str) -> Result<Station> {
        let listed = self
            .load_stations()?
            .into_iter()
            .find(|station| station.name == name);
        Ok(listed.unwrap_or_else(|| {
            debug!(station = %name, "Station not listed, using its stops without overrides");
            Station {
                name: name.to_string(),
                corridor: CorridorSpec::default(),
                overrides: Vec::new(),
            }
        }))
    }
}

/// Reads headerless rows of `name, value, value...`, dropping blank names and blank values.
pub fn read_rows(reader: impl Read) -> Result<Vec<(String, Vec<String>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        let Some(name) = fields.next() else {
            continue;
        };
        let name = name.trim_start_matches('\u{feff}').trim();
        if name.is_empty() {
            continue;
        }
        let values = fields
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
        rows.push((name.to_string(), values));
    }
    Ok(rows)
}

/// Parses a `lat,lon` override cell.
pub fn parse_coordinate(value: &str) -> Option<Coordinate> {
    let (lat, lon) = value.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon))
        .then(|| Coordinate::new(lat, lon))
}

/// Pairs station rows with their overrides.
///
/// Stations without corridor routes are skipped with a warning, as are
/// repeated station names after the first. A malformed override is an error.
pub fn build_stations(
    station_rows: Vec<(String, Vec<String>)>,
    location_rows: Vec<(String, Vec<String>)>,
) -> Result<Vec<Station>> {
    let mut overrides: HashMap<String, Vec<Coordinate>> = HashMap::new();
    for (name, values) in location_rows {
        let points = values
            .iter()
            .map(|value| {
                parse_coordinate(value)
                    .ok_or_else(|| anyhow!("Invalid location override {value:?} for station {name:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        overrides.entry(name).or_default().extend(points);
    }

    let mut seen = HashSet::new();
    let mut stations = Vec::new();
    for (name, corridor) in station_rows {
        if !seen.insert(name.clone()) {
            warn!(station = %name, "Station listed more than once, keeping the first entry");
            continue;
        }
        if corridor.is_empty() {
            warn!(station = %name, "Station has no corridor routes, skipping");
            continue;
        }
        stations.push(Station {
            overrides: overrides.remove(&name).unwrap_or_default(),
            corridor: CorridorSpec::new(corridor),
            name,
        });
    }

    for name in overrides.keys() {
        debug!(station = %name, "Location override for unlisted station");
    }

    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "input_path": "./input",
        "connection_max_distance": 300,
        "min_inbound_minutes": 5,
        "max_inbound_minutes": 30,
        "min_outbound_minutes": 2,
        "max_outbound_minutes": 20,
        "only_show_corridors": false,
        "hourly_summary": true,
        "union_station_is_inbound": true,
        "feeds": [
            {"name": "GO", "source": "https://example.com/GO_GTFS.zip"},
            {"name": "Milton Transit"}
        ]
    }"#;

    #[test]
    fn test_config_defaults_and_alias() {
        let config = RunConfig::from_json(CONFIG).unwrap();

        assert_eq!(config.input_path, PathBuf::from("./input"));
        assert_eq!(config.gtfs_dir, PathBuf::from("gtfs"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.connection_max_distance, 300.0);
        assert!(config.hourly_summary);
        assert!(config.hub_direction_is_inbound);
        assert_eq!(config.hub_marker, "Union Station");
        assert_eq!(config.feeds[1].source, None);

        let settings = config.settings();
        assert_eq!(settings.classifier.window.max_inbound, 30);
        assert_eq!(settings.classifier.window.min_outbound, 2);
    }

    #[test]
    fn test_config_rejects_negative_distance() {
        let json = CONFIG.replace("\"connection_max_distance\": 300", "\"connection_max_distance\": -1");
        assert!(RunConfig::from_json(&json).is_err());
    }

    #[test]
    fn test_config_requires_window() {
        assert!(RunConfig::from_json(r#"{"input_path": ".", "connection_max_distance": 1}"#).is_err());
    }

    #[test]
    fn test_read_rows_handles_bom_and_ragged_rows() {
        let csv = "\u{feff}Oakville GO,LW,\nBramalea GO,KI\n,ignored\nAldershot GO,LW, LE \n";
        let rows = read_rows(csv.as_bytes()).unwrap();

        assert_eq!(
            rows,
            vec![
                ("Oakville GO".to_string(), vec!["LW".to_string()]),
                ("Bramalea GO".to_string(), vec!["KI".to_string()]),
                ("Aldershot GO".to_string(), vec!["LW".to_string(), "LE".to_string()]),
            ]
        );
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(
            parse_coordinate("43.4553, -79.6821"),
            Some(Coordinate::new(43.4553, -79.6821))
        );
        assert_eq!(parse_coordinate("43.4553"), None);
        assert_eq!(parse_coordinate("north,west"), None);
        assert_eq!(parse_coordinate("143.0,-79.0"), None);
    }

    #[test]
    fn test_build_stations_pairs_overrides_and_skips_bad_rows() {
        let stations = build_stations(
            vec![
                ("Oakville GO".into(), vec!["LW".into()]),
                ("Exhibition GO".into(), vec![]),
                ("Oakville GO".into(), vec!["LE".into()]),
                ("Bramalea GO".into(), vec!["KI".into()]),
            ],
            vec![(
                "Oakville GO".into(),
                vec!["43.4553,-79.6821".into(), "43.4560,-79.6800".into()],
            )],
        )
        .unwrap();

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].name, "Oakville GO");
        assert!(stations[0].corridor.contains("LW"));
        assert!(!stations[0].corridor.contains("LE"));
        assert_eq!(stations[0].overrides.len(), 2);
        assert!(stations[1].overrides.is_empty());
    }

    #[test]
    fn test_malformed_override_is_an_error() {
        let err = build_stations(
            vec![("Oakville GO".into(), vec!["LW".into()])],
            vec![("Oakville GO".into(), vec!["not a point".into()])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Oakville GO"));
    }

    fn input_dir(name: &str, stations: &str, locations: &str) -> RunConfig {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Stations.csv"), stations).unwrap();
        std::fs::write(dir.join("Locations.csv"), locations).unwrap();

        let mut config = RunConfig::from_json(CONFIG).unwrap();
        config.input_path = dir;
        config
    }

    #[test]
    fn test_station_named_keeps_overrides_and_falls_back() {
        let config = input_dir(
            "transit_connections_config_station_named",
            "Oakville GO,LW\n",
            "Oakville GO,\"43.4553,-79.6821\"\n",
        );

        let listed = config.station_named("Oakville GO").unwrap();
        assert_eq!(listed.overrides, vec![Coordinate::new(43.4553, -79.6821)]);
        assert!(listed.corridor.contains("LW"));

        let unlisted = config.station_named("Bronte GO").unwrap();
        assert!(unlisted.overrides.is_empty());
        assert!(unlisted.corridor.is_empty());

        std::fs::remove_dir_all(&config.input_path).unwrap();
    }

    #[test]
    fn test_station_named_surfaces_bad_overrides() {
        let config = input_dir(
            "transit_connections_config_station_named_bad",
            "Oakville GO,LW\n",
            "Oakville GO,somewhere\n",
        );

        let err = config.station_named("Oakville GO").unwrap_err();
        assert!(err.to_string().contains("Oakville GO"));

        std::fs::remove_dir_all(&config.input_path).unwrap();
    }

    #[test]
    fn test_read_quoted_override_cells() {
        let csv = "Oakville GO,\"43.4553,-79.6821\"\n";
        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].1, vec!["43.4553,-79.6821".to_string()]);
    }
}
