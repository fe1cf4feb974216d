//! Instrument metadata attached to a measurement.
//!
//! Instrument metadata indexes channels 1-based (the first channel's declared
//! range lives under key `1`) while the event table is 0-based. That
//! off-by-one mapping is owned entirely by [`Metadata::declared_range`]; no
//! other code in the crate should reason about it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

/// Default declared range used when a data source carries no range
/// information: the full scale of an 18-bit acquisition.
pub const DEFAULT_RANGE: f64 = (1u32 << 18) as f64;

/// Channel list, declared ranges and free-form annotations for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Originating data source, if any (used in diagnostics).
    source: Option<PathBuf>,
    /// Channel names in table order.
    channel_names: Vec<String>,
    /// Declared value range per channel, keyed by 1-based channel number.
    ranges: BTreeMap<usize, f64>,
    /// Arbitrary key/value annotations from the data source.
    annotations: BTreeMap<String, String>,
}

impl Metadata {
    /// Create metadata with the given channel names, giving every channel the
    /// same declared range.
    pub fn with_uniform_range(channel_names: Vec<String>, range: f64) -> Self {
        let ranges = (1..=channel_names.len()).map(|i| (i, range)).collect();
        Self {
            source: None,
            channel_names,
            ranges,
            annotations: BTreeMap::new(),
        }
    }

    /// Create metadata with per-channel declared ranges, `ranges` parallel to
    /// `channel_names` (i.e. 0-based; keys are stored 1-based).
    pub fn with_ranges(channel_names: Vec<String>, ranges: &[f64]) -> FlowResult<Self> {
        if ranges.len() != channel_names.len() {
            return Err(FlowError::validation(format!(
                "{} range entries for {} channels",
                ranges.len(),
                channel_names.len()
            )));
        }
        let ranges = ranges.iter().enumerate().map(|(i, &r)| (i + 1, r)).collect();
        Ok(Self {
            source: None,
            channel_names,
            ranges,
            annotations: BTreeMap::new(),
        })
    }

    /// Record the data source this metadata came from.
    pub fn set_source(&mut self, path: impl AsRef<Path>) {
        self.source = Some(path.as_ref().to_path_buf());
    }

    /// Originating data source, if known.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn source_display(&self) -> String {
        match &self.source {
            Some(p) => p.display().to_string(),
            None => "<in-memory>".to_string(),
        }
    }

    /// Channel names in table order.
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Declared range for a channel, by name.
    ///
    /// The table position of `channel` is 0-based; the range table is keyed
    /// 1-based, so position *i* maps to range entry *i + 1*.
    pub fn declared_range(&self, channel: &str) -> FlowResult<f64> {
        let pos = self
            .channel_names
            .iter()
            .position(|c| c == channel)
            .ok_or_else(|| FlowError::UnknownChannel {
                channel: channel.to_string(),
            })?;
        self.ranges
            .get(&(pos + 1))
            .copied()
            .ok_or_else(|| FlowError::MissingMetadata {
                field: format!("range for channel {} (entry {})", channel, pos + 1),
                origin: self.source_display(),
            })
    }

    /// Set the declared range for a channel, by name.
    pub fn set_declared_range(&mut self, channel: &str, range: f64) -> FlowResult<()> {
        let pos = self
            .channel_names
            .iter()
            .position(|c| c == channel)
            .ok_or_else(|| FlowError::UnknownChannel {
                channel: channel.to_string(),
            })?;
        self.ranges.insert(pos + 1, range);
        Ok(())
    }

    /// Look up an annotation, failing with a descriptive error naming the
    /// field and the originating data source.
    pub fn annotation(&self, field: &str) -> FlowResult<&str> {
        self.annotations
            .get(field)
            .map(|s| s.as_str())
            .ok_or_else(|| FlowError::MissingMetadata {
                field: field.to_string(),
                origin: self.source_display(),
            })
    }

    /// Look up an annotation that may be absent.
    pub fn annotation_opt(&self, field: &str) -> Option<&str> {
        self.annotations.get(field).map(|s| s.as_str())
    }

    /// Insert or replace an annotation.
    pub fn set_annotation(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(field.into(), value.into());
    }

    /// All annotations.
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }
}

#[cfg(test)]
mod tests {
    use super::{Metadata, DEFAULT_RANGE};

    #[test]
    fn uniform_range_covers_every_channel() {
        let meta = Metadata::with_uniform_range(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            1024.0,
        );
        for c in ["A", "B", "C"] {
            assert_eq!(meta.declared_range(c).unwrap(), 1024.0);
        }
    }

    #[test]
    fn declared_range_uses_one_based_entries() {
        let meta =
            Metadata::with_ranges(vec!["A".to_string(), "B".to_string()], &[1000.0, 2000.0])
                .unwrap();
        // Channel at table position 0 -> range entry 1, position 1 -> entry 2.
        assert_eq!(meta.declared_range("A").unwrap(), 1000.0);
        assert_eq!(meta.declared_range("B").unwrap(), 2000.0);
    }

    #[test]
    fn with_ranges_rejects_length_mismatch() {
        let err = Metadata::with_ranges(vec!["A".to_string()], &[1.0, 2.0]).unwrap_err();
        assert!(err.to_string().contains("2 range entries for 1 channels"));
    }

    #[test]
    fn missing_annotation_names_field_and_source() {
        let mut meta = Metadata::with_uniform_range(vec!["A".to_string()], DEFAULT_RANGE);
        meta.set_source("plate/A01.csv");
        let err = meta.annotation("$SRC").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'$SRC'"));
        assert!(msg.contains("A01.csv"));
    }

    #[test]
    fn annotations_round_trip() {
        let mut meta = Metadata::with_uniform_range(vec!["A".to_string()], DEFAULT_RANGE);
        meta.set_annotation("$SRC", "A2");
        assert_eq!(meta.annotation("$SRC").unwrap(), "A2");
        assert_eq!(meta.annotation_opt("$CYT"), None);
    }
}
