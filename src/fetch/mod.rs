//! Downloading agency feeds.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::FeedConfig;

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Downloads every feed with a source URL to `<gtfs_dir>/<name>.zip`.
///
/// Feeds without a source are skipped with a warning. A failed download is
/// logged and does not stop the others. Returns the paths written.
#[tracing::instrument(skip(client, feeds), fields(gtfs_dir = %gtfs_dir.display(), feeds = feeds.len()))]
pub async fn download_feeds<C: HttpClient>(
    client: &C,
    feeds: &[FeedConfig],
    gtfs_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(gtfs_dir)
        .with_context(|| format!("Failed to create {}", gtfs_dir.display()))?;

    let mut written = Vec::new();
    for feed in feeds {
        let Some(source) = feed.source.as_deref() else {
            warn!(feed = %feed.name, "Feed has no source, skipping");
            continue;
        };

        let path = gtfs_dir.join(format!("{}.zip", feed.name));
        let fetch_start = std::time::Instant::now();
        match fetch_bytes(client, source).await {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, &bytes) {
                    error!(feed = %feed.name, path = %path.display(), error = %e, "Failed to save feed");
                    continue;
                }
                info!(
                    feed = %feed.name,
                    bytes = bytes.len(),
                    elapsed_ms = fetch_start.elapsed().as_millis() as u64,
                    "Feed downloaded"
                );
                written.push(path);
            }
            Err(e) => {
                error!(feed = %feed.name, source, error = %e, "Feed download failed");
            }
        }
    }

    info!(downloaded = written.len(), "Finished downloading feeds");
    Ok(written)
}
