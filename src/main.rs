//! CLI entry point for the transit connections tool.
//!
//! Provides subcommands for downloading agency feeds, classifying the
//! connections at every configured station, and listing the stops near one
//! station.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_connections::{
    config::RunConfig,
    feed::{FeedTables, resolve_sources},
    fetch::{BasicClient, download_feeds},
    output::{write_raw_events, write_report},
    pipeline::{evaluate_station, label_events, station_events},
    proximity::match_nearby,
};

#[derive(Parser)]
#[command(name = "transit_connections")]
#[command(about = "Classify transfer connections between local transit and corridor rail", long_about = None)]
struct Cli {
    /// Path to the run configuration
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every configured feed into the GTFS directory
    Fetch,
    /// Classify connections at every station and write one CSV per station
    Classify {
        /// Directory to write reports to, overriding the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write each station's unlabelled events to this directory
        #[arg(long)]
        dev_dir: Option<PathBuf>,

        /// Gzip compress the station reports
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// List the stops within the connection distance of one station
    Nearby {
        /// Station name, as written in the stop names of the feeds
        #[arg(value_name = "STATION")]
        station: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/transit_connections.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_connections.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = RunConfig::load(&cli.config)?;

    match cli.command {
        Commands::Fetch => {
            let client = BasicClient::new()?;
            download_feeds(&client, &config.feeds, &config.gtfs_dir).await?;
        }
        Commands::Classify {
            output,
            dev_dir,
            gzip,
        } => {
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
            classify_all(&config, &output_dir, dev_dir.as_deref(), gzip)?;
        }
        Commands::Nearby { station } => {
            list_nearby(&config, &station)?;
        }
    }

    Ok(())
}

fn load_tables(config: &RunConfig) -> Result<FeedTables> {
    let sources = resolve_sources(&config.gtfs_dir, &config.feeds)?;
    if sources.is_empty() {
        return Err(anyhow!("No feeds found in {}", config.gtfs_dir.display()));
    }
    FeedTables::load(&sources)
}

/// Evaluates every station and writes its report.
#[tracing::instrument(skip(config), fields(output_dir = %output_dir.display()))]
fn classify_all(
    config: &RunConfig,
    output_dir: &Path,
    dev_dir: Option<&Path>,
    gzip: bool,
) -> Result<()> {
    let stations = config.load_stations()?;
    info!(stations = stations.len(), "Stations loaded");

    let tables = load_tables(config)?;
    let settings = config.settings();

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    if let Some(dev_dir) = dev_dir {
        std::fs::create_dir_all(dev_dir)
            .with_context(|| format!("Failed to create {}", dev_dir.display()))?;
    }

    let mut written = 0;
    for station in &stations {
        let report = match dev_dir {
            None => evaluate_station(&tables, station, &settings)?,
            Some(dev_dir) => match station_events(&tables, station, &settings)? {
                Some(events) => {
                    write_raw_events(dev_dir, &station.name, &events.events)?;
                    label_events(station, &events, &settings)
                }
                None => continue,
            },
        };

        if report.is_empty() {
            warn!(station = %station.name, "No connections found, no report written");
            continue;
        }
        write_report(output_dir, &report, config.hub_direction_is_inbound, gzip)?;
        written += 1;
    }

    info!(written, stations = stations.len(), "Finished classifying stations");
    Ok(())
}

/// Logs every stop within the connection distance of `name`, nearest first.
fn list_nearby(config: &RunConfig, name: &str) -> Result<()> {
    let station = config.station_named(name)?;

    let tables = load_tables(config)?;
    let Some(nearby) = match_nearby(&tables, &station, config.connection_max_distance) else {
        warn!(station = %name, "No stop matches the station name");
        return Ok(());
    };

    for stop in nearby.sorted_by_distance() {
        info!(
            agency = %stop.stop.key.agency,
            stop_id = %stop.stop.key.id,
            stop_name = %stop.stop.name,
            distance_m = stop.distance.round(),
            station_stop = nearby.is_station_stop(&stop.stop.key),
            "Nearby stop"
        );
    }
    info!(station = %name, nearby = nearby.len(), "Nearby stops listed");
    Ok(())
}
