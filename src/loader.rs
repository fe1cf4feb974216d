//! Event-table loading.
//!
//! Parsing of instrument-native binary formats is delegated to external
//! [`Loader`] implementations; this module defines that seam and ships a
//! CSV-backed loader for the common exported-events case:
//!
//! - the CSV header row names the channels, every cell is an `f64` reading
//! - declared ranges and annotations come from an optional JSON sidecar next
//!   to the file (`sample.csv` -> `sample.meta.json`); without one, every
//!   channel gets the 18-bit machine default range
//!
//! [`load_measurement`] wraps a loader with identity assignment and optional
//! success/failure observer callbacks; [`load_collection`] glob-loads a
//! directory of samples into a keyed [`Collection`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::collection::Collection;
use crate::error::{FlowError, FlowResult};
use crate::frame::EventFrame;
use crate::measurement::Measurement;
use crate::meta::{Metadata, DEFAULT_RANGE};

/// Capability of producing a sample's metadata and event table from a path.
pub trait Loader {
    fn load(&self, path: &Path) -> FlowResult<(Metadata, EventFrame)>;
}

/// JSON sidecar carrying what a CSV export drops: per-channel declared
/// ranges (keyed by channel name) and free-form annotations.
#[derive(Debug, Default, Deserialize)]
struct Sidecar {
    #[serde(default)]
    ranges: BTreeMap<String, f64>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

/// Loads CSV event tables with an optional `*.meta.json` sidecar.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    /// Declared range assigned to channels the sidecar does not cover.
    pub default_range: f64,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self {
            default_range: DEFAULT_RANGE,
        }
    }
}

impl CsvLoader {
    /// Parse CSV event data from an existing reader.
    ///
    /// Rules:
    ///
    /// - the CSV must have a header row; headers are the channel names
    /// - every cell must parse as `f64`; empty cells are a parse error
    ///   (event tables have no missing readings)
    pub fn load_from_reader<R: std::io::Read>(
        &self,
        rdr: &mut csv::Reader<R>,
    ) -> FlowResult<(Metadata, EventFrame)> {
        let headers = rdr.headers()?.clone();
        let channels: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        if channels.is_empty() {
            return Err(FlowError::validation("event table has no channels"));
        }

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (row_idx0, result) in rdr.records().enumerate() {
            // Report 1-based row numbers; +1 again because the header is row 1.
            let user_row = row_idx0 + 2;
            let record = result?;

            let mut row = Vec::with_capacity(channels.len());
            for (channel, raw) in channels.iter().zip(record.iter()) {
                row.push(parse_reading(user_row, channel, raw)?);
            }
            rows.push(row);
        }

        let meta = Metadata::with_uniform_range(channels.clone(), self.default_range);
        let frame = EventFrame::new(channels, rows)?;
        Ok((meta, frame))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        path.with_extension("meta.json")
    }
}

fn parse_reading(row: usize, column: &str, raw: &str) -> FlowResult<f64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<f64>()
        .map_err(|e| FlowError::ParseError {
            row,
            column: column.to_owned(),
            raw: raw.to_owned(),
            message: e.to_string(),
        })
}

impl Loader for CsvLoader {
    fn load(&self, path: &Path) -> FlowResult<(Metadata, EventFrame)> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let (mut meta, frame) = self.load_from_reader(&mut rdr)?;
        meta.set_source(path);

        let sidecar_path = Self::sidecar_path(path);
        if sidecar_path.exists() {
            let text = fs::read_to_string(&sidecar_path)?;
            let sidecar: Sidecar = serde_json::from_str(&text)?;
            for (channel, range) in &sidecar.ranges {
                meta.set_declared_range(channel, *range)?;
            }
            for (field, value) in sidecar.annotations {
                meta.set_annotation(field, value);
            }
        }

        Ok((meta, frame))
    }
}

/// Context about one load attempt.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// The input path.
    pub path: PathBuf,
}

/// Minimal stats reported on successful loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Number of loaded events.
    pub rows: usize,
    /// Number of channels.
    pub channels: usize,
}

/// Observer interface for load outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait LoadObserver: Send + Sync {
    /// Called when a load succeeds.
    fn on_success(&self, _ctx: &LoadContext, _stats: LoadStats) {}

    /// Called when a load fails.
    fn on_failure(&self, _ctx: &LoadContext, _error: &FlowError) {}
}

/// Logs load events to stderr.
#[derive(Debug, Default)]
pub struct StdErrLoadObserver;

impl LoadObserver for StdErrLoadObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        eprintln!(
            "[load][ok] path={} rows={} channels={}",
            ctx.path.display(),
            stats.rows,
            stats.channels
        );
    }

    fn on_failure(&self, ctx: &LoadContext, error: &FlowError) {
        eprintln!("[load][err] path={} err={}", ctx.path.display(), error);
    }
}

/// Options controlling [`load_measurement`] / [`load_collection`].
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Optional observer for load outcomes.
    pub observer: Option<Arc<dyn LoadObserver>>,
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

/// Load one measurement from a path.
///
/// `id` defaults to the file stem. When an observer is configured,
/// success/failure is reported to it.
pub fn load_measurement(
    path: impl AsRef<Path>,
    id: Option<&str>,
    loader: &dyn Loader,
    options: &LoadOptions,
) -> FlowResult<Measurement> {
    let path = path.as_ref();
    let ctx = LoadContext {
        path: path.to_path_buf(),
    };

    let result = loader.load(path).and_then(|(meta, frame)| {
        let id = match id {
            Some(id) => id.to_string(),
            None => file_stem(path)?,
        };
        Measurement::new(id, frame, Arc::new(meta))
    });

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(m) => obs.on_success(
                &ctx,
                LoadStats {
                    rows: m.counts(),
                    channels: m.channel_names().len(),
                },
            ),
            Err(e) => obs.on_failure(&ctx, e),
        }
    }
    if let Ok(m) = &result {
        log::debug!(
            "loaded {} ({} events, {} channels)",
            path.display(),
            m.counts(),
            m.channel_names().len()
        );
    }

    result
}

/// Load every file in `dir` matching `pattern` (e.g. `"*.csv"`) into a
/// collection keyed by file stem.
///
/// The collection id is the directory name. A single file's failure aborts
/// the whole load.
pub fn load_collection(
    dir: impl AsRef<Path>,
    pattern: &str,
    loader: &dyn Loader,
    options: &LoadOptions,
) -> FlowResult<Collection> {
    let dir = dir.as_ref();
    let full = dir.join(pattern);
    let full = full.to_str().ok_or_else(|| {
        FlowError::invalid_argument(format!("non-UTF8 glob pattern: {}", full.display()))
    })?;

    let id = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut collection = Collection::new(id);

    let paths = glob::glob(full)
        .map_err(|e| FlowError::invalid_argument(format!("bad glob pattern '{pattern}': {e}")))?;
    for entry in paths {
        let path = entry.map_err(|e| FlowError::Io(e.into_error()))?;
        let key = file_stem(&path)?;
        let m = load_measurement(&path, Some(&key), loader, options)?;
        collection.insert(key, m);
    }
    Ok(collection)
}

fn file_stem(path: &Path) -> FlowResult<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| {
            FlowError::invalid_argument(format!(
                "cannot derive a sample id from path ({})",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::CsvLoader;

    fn reader(input: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input.as_bytes())
    }

    #[test]
    fn load_from_reader_happy_path() {
        let input = "FSC-A,SSC-A\n120.5,30\n99,42.25\n";
        let loader = CsvLoader::default();
        let (meta, frame) = loader.load_from_reader(&mut reader(input)).unwrap();

        assert_eq!(frame.channels(), &["FSC-A".to_string(), "SSC-A".to_string()]);
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.rows()[0], vec![120.5, 30.0]);
        assert_eq!(meta.declared_range("FSC-A").unwrap(), super::DEFAULT_RANGE);
    }

    #[test]
    fn load_from_reader_reports_bad_cells() {
        let input = "A,B\n1.0,not_a_number\n";
        let loader = CsvLoader::default();
        let err = loader.load_from_reader(&mut reader(input)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("row 2"));
        assert!(msg.contains("column 'B'"));
        assert!(msg.contains("not_a_number"));
    }

    #[test]
    fn load_from_reader_rejects_empty_cells() {
        let input = "A,B\n1.0,\n";
        let loader = CsvLoader::default();
        let err = loader.load_from_reader(&mut reader(input)).unwrap_err();
        assert!(err.to_string().contains("failed to parse value"));
    }

    #[test]
    fn sidecar_path_replaces_extension() {
        use std::path::Path;
        assert_eq!(
            CsvLoader::sidecar_path(Path::new("plate/A1.csv")),
            Path::new("plate/A1.meta.json")
        );
    }
}
