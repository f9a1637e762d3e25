//! Locating and reading the text files of one GTFS feed.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A GTFS feed on disk, either as the published `.zip` or an extracted directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Zip(PathBuf),
    Directory(PathBuf),
}

impl FeedSource {
    /// Resolves `<dir>/<name>.zip` first, then `<dir>/<name>/`.
    pub fn locate(dir: &Path, name: &str) -> Option<Self> {
        let zip = dir.join(format!("{name}.zip"));
        if zip.is_file() {
            return Some(Self::Zip(zip));
        }
        let extracted = dir.join(name);
        if extracted.is_dir() {
            return Some(Self::Directory(extracted));
        }
        None
    }

    /// Every `.zip` file and subdirectory of `dir`, sorted by path.
    pub fn discover(dir: &Path) -> Result<Vec<Self>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list feeds in {}", dir.display()))?;

        let mut sources = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                sources.push(Self::Directory(path));
            } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zip")) {
                sources.push(Self::Zip(path));
            }
        }
        sources.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(sources)
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Zip(path) | Self::Directory(path) => path,
        }
    }

    /// File stem of the feed, used as the agency name of last resort.
    pub fn stem(&self) -> String {
        self.path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Deserializes every row of `file_name`, or `None` when the feed lacks that file.
    pub fn read_table<T: DeserializeOwned>(&self, file_name: &str) -> Result<Option<Vec<T>>> {
        let Some(bytes) = self.read_file(file_name)? else {
            return Ok(None);
        };
        debug!(feed = %self.path().display(), file_name, bytes = bytes.len(), "Reading table");

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(strip_bom(&bytes));

        let rows = reader
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .with_context(|| format!("Failed to parse {} in {}", file_name, self.path().display()))?;

        Ok(Some(rows))
    }

    fn read_file(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Directory(dir) => {
                let path = dir.join(file_name);
                if !path.is_file() {
                    return Ok(None);
                }
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(Some(bytes))
            }
            Self::Zip(path) => {
                let file =
                    File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
                let mut archive = zip::ZipArchive::new(file)
                    .with_context(|| format!("Failed to read archive {}", path.display()))?;

                // Some agencies nest the feed inside a single top-level folder.
                let Some(entry_name) = archive
                    .file_names()
                    .find(|entry| {
                        entry == &file_name || entry.rsplit('/').next() == Some(file_name)
                    })
                    .map(str::to_string)
                else {
                    return Ok(None);
                };

                let mut entry = archive.by_name(&entry_name)?;
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut bytes)
                    .with_context(|| format!("Failed to extract {entry_name} from {}", path.display()))?;
                Ok(Some(bytes))
            }
        }
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
