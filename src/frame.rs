//! In-memory event table.
//!
//! An [`EventFrame`] holds one sample's event data: one row per detected
//! particle, one named column per detector channel. Every reading is an `f64`.
//!
//! Frames carry stable per-event *labels* that survive gating and
//! subsampling, so a row selected out of a derived frame can always be traced
//! back to the event it came from in the originally loaded table.

use crate::error::{FlowError, FlowResult};

/// Row-major event table with named channels.
///
/// Rows are stored as `Vec<Vec<f64>>` in the same order as `channels`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    channels: Vec<String>,
    rows: Vec<Vec<f64>>,
    labels: Vec<u64>,
}

impl EventFrame {
    /// Create a frame from channel names and rows, assigning fresh labels
    /// `0..rows.len()`.
    ///
    /// Returns a validation error if any row length differs from the channel
    /// count.
    pub fn new(channels: Vec<String>, rows: Vec<Vec<f64>>) -> FlowResult<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != channels.len() {
                return Err(FlowError::validation(format!(
                    "row {i} has {} values but there are {} channels",
                    row.len(),
                    channels.len()
                )));
            }
        }
        let labels = (0..rows.len() as u64).collect();
        Ok(Self {
            channels,
            rows,
            labels,
        })
    }

    fn with_labels(channels: Vec<String>, rows: Vec<Vec<f64>>, labels: Vec<u64>) -> Self {
        debug_assert_eq!(rows.len(), labels.len());
        Self {
            channels,
            rows,
            labels,
        }
    }

    /// Channel names, in table order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Number of events (rows).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of channels (columns).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Event rows, row-major.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Stable per-event labels, parallel to [`EventFrame::rows`].
    pub fn labels(&self) -> &[u64] {
        &self.labels
    }

    /// Returns the column index of a channel by name, if present.
    pub fn index_of(&self, channel: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == channel)
    }

    /// Like [`EventFrame::index_of`] but failing with
    /// [`FlowError::UnknownChannel`].
    pub fn require_channel(&self, channel: &str) -> FlowResult<usize> {
        self.index_of(channel).ok_or_else(|| FlowError::UnknownChannel {
            channel: channel.to_string(),
        })
    }

    /// Iterate the values of one column.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[idx])
    }

    /// Minimum and maximum over the named channels, ignoring nothing
    /// (event tables have no nulls). Returns `None` for an empty frame or an
    /// empty channel list.
    pub fn extrema(&self, channels: &[String]) -> FlowResult<Option<(f64, f64)>> {
        let idxs: Vec<usize> = channels
            .iter()
            .map(|c| self.require_channel(c))
            .collect::<FlowResult<_>>()?;
        if self.rows.is_empty() || idxs.is_empty() {
            return Ok(None);
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for row in &self.rows {
            for &i in &idxs {
                let v = row[i];
                if v < min {
                    min = v;
                }
                if v > max {
                    max = v;
                }
            }
        }
        Ok(Some((min, max)))
    }

    /// Create a new frame containing only rows that match `predicate`.
    ///
    /// The returned frame preserves channel names and event labels.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[f64]) -> bool,
    {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (row, &label) in self.rows.iter().zip(&self.labels) {
            if predicate(row.as_slice()) {
                rows.push(row.clone());
                labels.push(label);
            }
        }
        Self::with_labels(self.channels.clone(), rows, labels)
    }

    /// Create a new frame from rows at the given positions, in the given
    /// order. Positions must already be bounds-checked by the caller.
    pub(crate) fn take_rows(&self, positions: &[usize]) -> Self {
        let rows = positions.iter().map(|&p| self.rows[p].clone()).collect();
        let labels = positions.iter().map(|&p| self.labels[p]).collect();
        Self::with_labels(self.channels.clone(), rows, labels)
    }

    /// Create a new frame from a contiguous (possibly strided) row range.
    /// `start..stop` must already be clamped to the row count.
    pub(crate) fn slice_rows(&self, start: usize, stop: usize, step: usize) -> Self {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        let mut i = start;
        while i < stop {
            rows.push(self.rows[i].clone());
            labels.push(self.labels[i]);
            i += step;
        }
        Self::with_labels(self.channels.clone(), rows, labels)
    }

    /// Create a new frame keeping only the named channels, in the order in
    /// which they appear in this frame.
    pub fn select_channels(&self, channels: &[String]) -> FlowResult<Self> {
        for c in channels {
            self.require_channel(c)?;
        }
        let keep: Vec<usize> = (0..self.channels.len())
            .filter(|&i| channels.iter().any(|c| *c == self.channels[i]))
            .collect();
        let channels = keep.iter().map(|&i| self.channels[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i]).collect())
            .collect();
        Ok(Self::with_labels(channels, rows, self.labels.clone()))
    }

    /// Replace the values of one column in place.
    ///
    /// Only used while assembling a derived frame; public operations never
    /// mutate a frame the caller can still see.
    pub(crate) fn set_column(&mut self, idx: usize, values: &[f64]) {
        debug_assert_eq!(values.len(), self.rows.len());
        for (row, &v) in self.rows.iter_mut().zip(values) {
            row[idx] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EventFrame;

    fn sample_frame() -> EventFrame {
        EventFrame::new(
            vec!["FSC-A".to_string(), "SSC-A".to_string()],
            vec![
                vec![100.0, 1.0],
                vec![200.0, 2.0],
                vec![300.0, 3.0],
                vec![400.0, 4.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_ragged_rows() {
        let err = EventFrame::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 2.0], vec![3.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn index_of_and_require_channel() {
        let f = sample_frame();
        assert_eq!(f.index_of("SSC-A"), Some(1));
        assert_eq!(f.index_of("missing"), None);
        let err = f.require_channel("missing").unwrap_err();
        assert!(err.to_string().contains("unknown channel 'missing'"));
    }

    #[test]
    fn filter_rows_keeps_labels() {
        let f = sample_frame();
        let out = f.filter_rows(|row| row[0] > 150.0);
        assert_eq!(out.row_count(), 3);
        assert_eq!(out.labels(), &[1, 2, 3]);
        // Original unchanged
        assert_eq!(f.row_count(), 4);
    }

    #[test]
    fn slice_rows_with_step() {
        let f = sample_frame();
        let out = f.slice_rows(0, 4, 2);
        assert_eq!(out.labels(), &[0, 2]);
        assert_eq!(out.rows()[1], vec![300.0, 3.0]);
    }

    #[test]
    fn select_channels_preserves_frame_order() {
        let f = sample_frame();
        // Request in reverse order; frame order wins.
        let out = f
            .select_channels(&["SSC-A".to_string(), "FSC-A".to_string()])
            .unwrap();
        assert_eq!(out.channels(), &["FSC-A".to_string(), "SSC-A".to_string()]);
        assert_eq!(out.row_count(), 4);
    }

    #[test]
    fn extrema_over_two_channels() {
        let f = sample_frame();
        let (min, max) = f
            .extrema(&["FSC-A".to_string(), "SSC-A".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(min, 1.0);
        assert_eq!(max, 400.0);
    }
}
