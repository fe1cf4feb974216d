//! A single sample: one event table plus its instrument metadata.
//!
//! Every operation on a [`Measurement`] returns a new value; the receiver is
//! never mutated. Metadata is shared between a measurement and its derived
//! copies via `Arc`, the event table is independently owned.

use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;

use crate::error::{FlowError, FlowResult};
use crate::frame::EventFrame;
use crate::gates::Gate;
use crate::meta::Metadata;
use crate::transform::{
    all_close, TransformKind, TransformOptions, TransformSpec, Transformation,
};

/// How many rows a subsample request selects, and from where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubsampleKey {
    /// Fraction of the total event count, in `[0.0, 1.0]` (floored).
    Fraction(f64),
    /// `(start, stop)` fractions of the total event count, each in
    /// `[0.0, 1.0]` with `start <= stop`; selects the positional window
    /// between them.
    Window(f64, f64),
    /// Positional row span, possibly strided.
    Span(Span),
    /// Absolute row count, resolved according to the [`SampleOrder`].
    Count(usize),
}

/// A positional row range with a stride.
///
/// `start > stop` selects nothing (slice semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl Span {
    /// Contiguous span `start..stop`.
    pub fn new(start: usize, stop: usize) -> Self {
        Self {
            start,
            stop,
            step: 1,
        }
    }

    /// Strided span.
    pub fn with_step(start: usize, stop: usize, step: usize) -> Self {
        Self { start, stop, step }
    }
}

/// Which rows a [`SubsampleKey::Count`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleOrder {
    /// Uniformly at random, without replacement; output order is whatever
    /// the draw produces.
    #[default]
    Random,
    /// The first N rows, in original order.
    Start,
    /// The last N rows, in original order.
    End,
}

impl FromStr for SampleOrder {
    type Err = FlowError;

    fn from_str(s: &str) -> FlowResult<Self> {
        match s {
            "random" => Ok(Self::Random),
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            other => Err(FlowError::invalid_argument(format!(
                "order must be one of 'random', 'start', 'end' (got '{other}')"
            ))),
        }
    }
}

/// One sample's event table and metadata.
#[derive(Debug, Clone)]
pub struct Measurement {
    id: String,
    frame: EventFrame,
    meta: Arc<Metadata>,
}

impl Measurement {
    /// Create a measurement, checking that every frame channel is known to
    /// the metadata.
    pub fn new(id: impl Into<String>, frame: EventFrame, meta: Arc<Metadata>) -> FlowResult<Self> {
        for c in frame.channels() {
            if !meta.channel_names().iter().any(|m| m == c) {
                return Err(FlowError::validation(format!(
                    "frame channel '{c}' is not declared in the metadata"
                )));
            }
        }
        Ok(Self {
            id: id.into(),
            frame,
            meta,
        })
    }

    fn derived(&self, frame: EventFrame) -> Self {
        Self {
            id: self.id.clone(),
            frame,
            meta: Arc::clone(&self.meta),
        }
    }

    /// Sample identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Same measurement under a new identity (metadata still shared).
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frame: self.frame.clone(),
            meta: Arc::clone(&self.meta),
        }
    }

    /// The event table.
    pub fn frame(&self) -> &EventFrame {
        &self.frame
    }

    /// The instrument metadata (shared with derived measurements).
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Channel names of the event table, in table order.
    pub fn channel_names(&self) -> &[String] {
        self.frame.channels()
    }

    /// Total number of events.
    pub fn counts(&self) -> usize {
        self.frame.row_count()
    }

    /// Look up a metadata annotation (e.g. an instrument-assigned well id),
    /// failing with a descriptive error naming the field and data source.
    pub fn annotation(&self, field: &str) -> FlowResult<&str> {
        self.meta.annotation(field)
    }

    /// Transform the selected channels, returning a new measurement.
    ///
    /// See [`Measurement::transform_with`] for the full contract; this
    /// variant discards the transformer.
    pub fn transform(
        &self,
        spec: impl Into<TransformSpec>,
        opts: &TransformOptions,
    ) -> FlowResult<Measurement> {
        self.transform_with(spec, opts).map(|(m, _)| m)
    }

    /// Transform the selected channels, also returning the
    /// [`Transformation`] used so it can be shared across further calls.
    ///
    /// - `opts.channels` defaults to every frame channel.
    /// - A [`TransformSpec::Prebuilt`] transformation is applied as-is,
    ///   without range validation.
    /// - A [`TransformSpec::Named`] kind is built here: with
    ///   `opts.auto_range` and no explicit `opts.d`, every selected channel
    ///   must declare an identical range, and for the log-like kinds the
    ///   range parameter becomes `log10(range)`. An explicit `opts.d` wins
    ///   over `auto_range` (with a warning).
    /// - `opts.return_all` keeps untransformed columns in place; otherwise
    ///   only the selected channels survive, in their original order.
    /// - The output id is `opts.id` or inherited.
    pub fn transform_with(
        &self,
        spec: impl Into<TransformSpec>,
        opts: &TransformOptions,
    ) -> FlowResult<(Measurement, Transformation)> {
        let channels = self.resolve_channels(opts)?;
        let transformer = match spec.into() {
            TransformSpec::Prebuilt(t) => t,
            TransformSpec::Named(kind) => build_transformer(&self.meta, &channels, kind, opts)?,
        };
        let out = self.apply_transformer(&transformer, &channels, opts)?;
        Ok((out, transformer))
    }

    fn resolve_channels(&self, opts: &TransformOptions) -> FlowResult<Vec<String>> {
        let channels = match &opts.channels {
            Some(list) => list.clone(),
            None => self.frame.channels().to_vec(),
        };
        for c in &channels {
            self.frame.require_channel(c)?;
        }
        Ok(channels)
    }

    fn apply_transformer(
        &self,
        transformer: &Transformation,
        channels: &[String],
        opts: &TransformOptions,
    ) -> FlowResult<Measurement> {
        let mut frame = if opts.return_all {
            self.frame.clone()
        } else {
            self.frame.select_channels(channels)?
        };

        // Prefer an already-attached table (the shared-transform path fits
        // one over the whole collection); otherwise fit to this sub-table.
        let table = if opts.use_spline {
            match transformer.spline() {
                Some(t) => Some(t.clone()),
                None => self
                    .frame
                    .extrema(channels)?
                    .map(|(lo, hi)| transformer.fit_table(lo, hi)),
            }
        } else {
            None
        };

        for c in channels {
            let dst = frame.require_channel(c)?;
            let src = self.frame.require_channel(c)?;
            let values: Vec<f64> = self
                .frame
                .column(src)
                .map(|x| match &table {
                    Some(t) => t.eval(x),
                    None => transformer.eval(x),
                })
                .collect();
            frame.set_column(dst, &values);
        }

        let id = opts.id.clone().unwrap_or_else(|| self.id.clone());
        Ok(Self {
            id,
            frame,
            meta: Arc::clone(&self.meta),
        })
    }

    /// Apply a gate, returning a new measurement holding exactly the gate's
    /// output; metadata is shared unchanged.
    pub fn gate<G: Gate + ?Sized>(&self, gate: &G) -> FlowResult<Measurement> {
        let frame = gate.apply(&self.frame)?;
        Ok(self.derived(frame))
    }

    /// Subsample the event table; randomness comes from the thread RNG.
    ///
    /// See [`Measurement::subsample_with_rng`].
    pub fn subsample(
        &self,
        key: SubsampleKey,
        order: SampleOrder,
        auto_resize: bool,
    ) -> FlowResult<Measurement> {
        self.subsample_with_rng(key, order, auto_resize, &mut rand::thread_rng())
    }

    /// Subsample the event table with an injected RNG.
    ///
    /// - `Fraction` and `Window` are converted to a count / span by flooring
    ///   against the total event count.
    /// - A count below 1 forces [`SampleOrder::Start`] (an empty result)
    ///   regardless of the requested order.
    /// - `auto_resize` clamps out-of-range spans and counts to the available
    ///   event count; without it an out-of-range request fails with
    ///   [`FlowError::OutOfBounds`] after a hint is logged.
    pub fn subsample_with_rng<R: Rng + ?Sized>(
        &self,
        key: SubsampleKey,
        order: SampleOrder,
        auto_resize: bool,
        rng: &mut R,
    ) -> FlowResult<Measurement> {
        enum Resolved {
            Span(Span),
            Count(usize),
        }

        let n = self.frame.row_count();
        let resolved = match key {
            SubsampleKey::Fraction(f) => {
                if !(0.0..=1.0).contains(&f) {
                    return Err(FlowError::invalid_argument(format!(
                        "fraction must be between 0.0 and 1.0 ({f} given)"
                    )));
                }
                Resolved::Count((n as f64 * f).floor() as usize)
            }
            SubsampleKey::Window(start, stop) => {
                if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&stop) || start > stop {
                    return Err(FlowError::invalid_argument(format!(
                        "window must be two ascending fractions between 0.0 and 1.0 \
                         (({start}, {stop}) given)"
                    )));
                }
                Resolved::Span(Span::new(
                    (n as f64 * start).floor() as usize,
                    (n as f64 * stop).floor() as usize,
                ))
            }
            SubsampleKey::Span(span) => {
                if span.step == 0 {
                    return Err(FlowError::invalid_argument("span step must be at least 1"));
                }
                Resolved::Span(span)
            }
            SubsampleKey::Count(k) => Resolved::Count(k),
        };

        let frame = match resolved {
            Resolved::Span(mut span) => {
                if auto_resize {
                    span.start = span.start.min(n);
                    span.stop = span.stop.min(n);
                } else if span.start > n || span.stop > n {
                    log::warn!(
                        "subsample span {}..{} exceeds the {n} available events; \
                         set auto_resize=true to clamp instead of failing",
                        span.start,
                        span.stop
                    );
                    return Err(FlowError::OutOfBounds {
                        requested: span.start.max(span.stop),
                        available: n,
                        context: "subsample span".to_string(),
                    });
                }
                self.frame.slice_rows(span.start, span.stop, span.step)
            }
            Resolved::Count(mut k) => {
                if auto_resize && k > n {
                    k = n;
                }
                // A request for fewer than one event always yields an empty
                // head slice, whatever order was asked for.
                let order = if k < 1 { SampleOrder::Start } else { order };
                if k > n {
                    log::warn!(
                        "subsample count {k} exceeds the {n} available events; \
                         set auto_resize=true to clamp instead of failing"
                    );
                    return Err(FlowError::OutOfBounds {
                        requested: k,
                        available: n,
                        context: "subsample count".to_string(),
                    });
                }
                match order {
                    SampleOrder::Random => {
                        let positions = rand::seq::index::sample(rng, n, k).into_vec();
                        self.frame.take_rows(&positions)
                    }
                    SampleOrder::Start => self.frame.slice_rows(0, k, 1),
                    SampleOrder::End => self.frame.slice_rows(n - k, n, 1),
                }
            }
        };

        Ok(self.derived(frame))
    }
}

/// Build a transformation for `kind` from metadata-declared channel ranges
/// and the call options.
///
/// This is the single construction-and-validation path used by both the
/// per-measurement and the shared collection-level transform.
pub(crate) fn build_transformer(
    meta: &Metadata,
    channels: &[String],
    kind: TransformKind,
    opts: &TransformOptions,
) -> FlowResult<Transformation> {
    let mut params = opts.params;
    if let Some(d) = opts.d {
        if opts.auto_range {
            log::warn!(
                "both auto_range and an explicit range parameter d were given; \
                 using the explicit value"
            );
        }
        params.d = d;
    } else if opts.auto_range {
        let ranges: Vec<f64> = channels
            .iter()
            .map(|c| meta.declared_range(c))
            .collect::<FlowResult<_>>()?;
        if !all_close(&ranges) {
            return Err(FlowError::validation(
                "not all specified channels share the same declared data range, so they \
                 cannot be transformed together; try transforming one channel at a time",
            ));
        }
        if kind.is_range_sensitive() {
            if let Some(&shared) = ranges.first() {
                params.d = shared.log10();
            }
        }
    }
    Transformation::new(kind, opts.direction, params)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{Measurement, SampleOrder, Span, SubsampleKey};
    use crate::error::FlowError;
    use crate::frame::EventFrame;
    use crate::gates::{ThresholdGate, ThresholdSide};
    use crate::meta::Metadata;
    use crate::transform::{Direction, TransformKind, TransformOptions};

    fn sample(rows: usize) -> Measurement {
        let channels = vec!["A".to_string(), "B".to_string()];
        let data = (0..rows)
            .map(|i| vec![i as f64, (rows - i) as f64])
            .collect();
        let frame = EventFrame::new(channels.clone(), data).unwrap();
        let meta = Arc::new(Metadata::with_uniform_range(channels, 1000.0));
        Measurement::new("s1", frame, meta).unwrap()
    }

    #[test]
    fn new_rejects_undeclared_channels() {
        let frame = EventFrame::new(vec!["X".to_string()], vec![vec![1.0]]).unwrap();
        let meta = Arc::new(Metadata::with_uniform_range(vec!["A".to_string()], 1000.0));
        let err = Measurement::new("s", frame, meta).unwrap_err();
        assert!(err.to_string().contains("'X'"));
    }

    #[test]
    fn transform_derives_d_from_shared_range() {
        let m = sample(50);
        let opts = TransformOptions {
            use_spline: false,
            ..TransformOptions::on_channels(["A", "B"])
        };
        let (_, transformer) = m.transform_with(TransformKind::Hlog, &opts).unwrap();
        assert!((transformer.params().d - 3.0).abs() < 1e-12); // log10(1000)
    }

    #[test]
    fn transform_rejects_mismatched_ranges() {
        let channels = vec!["A".to_string(), "B".to_string()];
        let frame = EventFrame::new(channels.clone(), vec![vec![1.0, 2.0]]).unwrap();
        let mut meta = Metadata::with_uniform_range(channels, 1000.0);
        meta.set_declared_range("B", 2000.0).unwrap();
        let m = Measurement::new("s1", frame, Arc::new(meta)).unwrap();

        let err = m
            .transform(
                TransformKind::Hlog,
                &TransformOptions::on_channels(["A", "B"]),
            )
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation { .. }));
        assert!(err.to_string().contains("one channel at a time"));
    }

    #[test]
    fn explicit_d_wins_over_auto_range() {
        let m = sample(10);
        let opts = TransformOptions {
            d: Some(4.5),
            use_spline: false,
            ..TransformOptions::on_channels(["A"])
        };
        let (_, transformer) = m.transform_with(TransformKind::Tlog, &opts).unwrap();
        assert_eq!(transformer.params().d, 4.5);
    }

    #[test]
    fn transform_round_trip_restores_values() {
        let m = sample(40);
        let fwd_opts = TransformOptions {
            use_spline: false,
            ..TransformOptions::on_channels(["A"])
        };
        let (transformed, transformer) = m.transform_with(TransformKind::Hlog, &fwd_opts).unwrap();

        let inv_opts = TransformOptions {
            use_spline: false,
            ..TransformOptions::on_channels(["A"])
        };
        let restored = transformed
            .transform(transformer.inverted(), &inv_opts)
            .unwrap();

        let idx = m.frame().index_of("A").unwrap();
        for (orig, back) in m.frame().column(idx).zip(restored.frame().column(idx)) {
            assert!(
                (orig - back).abs() <= 1e-6 * (1.0 + orig.abs()),
                "orig={orig} back={back}"
            );
        }
    }

    #[test]
    fn return_all_controls_surviving_columns() {
        let m = sample(5);
        let keep_all = m
            .transform(
                TransformKind::Tlog,
                &TransformOptions {
                    use_spline: false,
                    ..TransformOptions::on_channels(["A"])
                },
            )
            .unwrap();
        assert_eq!(keep_all.channel_names(), &["A".to_string(), "B".to_string()]);
        // Untransformed column preserved in value and position.
        let b = keep_all.frame().index_of("B").unwrap();
        assert_eq!(b, 1);
        let orig_b: Vec<f64> = m.frame().column(1).collect();
        let new_b: Vec<f64> = keep_all.frame().column(b).collect();
        assert_eq!(orig_b, new_b);

        let only_selected = m
            .transform(
                TransformKind::Tlog,
                &TransformOptions {
                    return_all: false,
                    use_spline: false,
                    ..TransformOptions::on_channels(["B"])
                },
            )
            .unwrap();
        assert_eq!(only_selected.channel_names(), &["B".to_string()]);
    }

    #[test]
    fn transform_replaces_id_when_asked() {
        let m = sample(5);
        let out = m
            .transform(
                TransformKind::Tlog,
                &TransformOptions {
                    id: Some("renamed".to_string()),
                    use_spline: false,
                    ..TransformOptions::default()
                },
            )
            .unwrap();
        assert_eq!(out.id(), "renamed");
        assert_eq!(m.id(), "s1");
    }

    #[test]
    fn prebuilt_transformer_skips_range_validation() {
        let channels = vec!["A".to_string(), "B".to_string()];
        let frame = EventFrame::new(channels.clone(), vec![vec![1.0, 2.0]]).unwrap();
        let mut meta = Metadata::with_uniform_range(channels, 1000.0);
        meta.set_declared_range("B", 2000.0).unwrap();
        let m = Measurement::new("s1", frame, Arc::new(meta)).unwrap();

        let t = crate::transform::Transformation::new(
            TransformKind::Tlog,
            Direction::Forward,
            Default::default(),
        )
        .unwrap();
        // Mismatched declared ranges, but the prebuilt path must not care.
        let out = m.transform(t, &TransformOptions::on_channels(["A", "B"]));
        assert!(out.is_ok());
    }

    #[test]
    fn subsample_full_and_empty_fractions() {
        let m = sample(20);
        let all = m
            .subsample(SubsampleKey::Fraction(1.0), SampleOrder::Random, false)
            .unwrap();
        assert_eq!(all.counts(), 20);
        let none = m
            .subsample(SubsampleKey::Fraction(0.0), SampleOrder::Random, false)
            .unwrap();
        assert_eq!(none.counts(), 0);
    }

    #[test]
    fn subsample_random_draws_distinct_original_rows() {
        let m = sample(30);
        let mut rng = StdRng::seed_from_u64(7);
        let out = m
            .subsample_with_rng(SubsampleKey::Count(12), SampleOrder::Random, false, &mut rng)
            .unwrap();
        assert_eq!(out.counts(), 12);
        let mut labels: Vec<u64> = out.frame().labels().to_vec();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 12, "labels must be distinct");
        assert!(labels.iter().all(|&l| l < 30));
    }

    #[test]
    fn subsample_start_and_end_are_deterministic() {
        let m = sample(10);
        let head = m
            .subsample(SubsampleKey::Count(3), SampleOrder::Start, false)
            .unwrap();
        assert_eq!(head.frame().labels(), &[0, 1, 2]);
        let tail = m
            .subsample(SubsampleKey::Count(3), SampleOrder::End, false)
            .unwrap();
        assert_eq!(tail.frame().labels(), &[7, 8, 9]);
    }

    #[test]
    fn subsample_window_and_span() {
        let m = sample(10);
        let mid = m
            .subsample(SubsampleKey::Window(0.2, 0.7), SampleOrder::Random, false)
            .unwrap();
        assert_eq!(mid.frame().labels(), &[2, 3, 4, 5, 6]);

        let strided = m
            .subsample(
                SubsampleKey::Span(Span::with_step(0, 10, 3)),
                SampleOrder::Random,
                false,
            )
            .unwrap();
        assert_eq!(strided.frame().labels(), &[0, 3, 6, 9]);
    }

    #[test]
    fn subsample_out_of_bounds_behaviour() {
        let m = sample(5);
        let err = m
            .subsample(SubsampleKey::Count(9), SampleOrder::Start, false)
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::OutOfBounds {
                requested: 9,
                available: 5,
                ..
            }
        ));

        let clamped = m
            .subsample(SubsampleKey::Count(9), SampleOrder::Start, true)
            .unwrap();
        assert_eq!(clamped.counts(), 5);

        let span_err = m
            .subsample(
                SubsampleKey::Span(Span::new(0, 8)),
                SampleOrder::Random,
                false,
            )
            .unwrap_err();
        assert!(matches!(span_err, FlowError::OutOfBounds { .. }));
    }

    #[test]
    fn subsample_invalid_arguments() {
        let m = sample(5);
        assert!(m
            .subsample(SubsampleKey::Fraction(1.5), SampleOrder::Random, false)
            .is_err());
        assert!(m
            .subsample(SubsampleKey::Window(0.8, 0.2), SampleOrder::Random, false)
            .is_err());
        assert!("sideways".parse::<SampleOrder>().is_err());
        assert_eq!("end".parse::<SampleOrder>().unwrap(), SampleOrder::End);
    }

    #[test]
    fn gate_never_mutates_the_input() {
        let m = sample(10);
        let before_rows = m.frame().rows().to_vec();
        let gated = m
            .gate(&ThresholdGate::new("A", 5.0, ThresholdSide::Above))
            .unwrap();
        assert_eq!(m.frame().rows(), before_rows.as_slice());
        assert_eq!(m.counts(), 10);
        assert_eq!(gated.counts(), 5);
    }

    #[test]
    fn annotation_lookup_surfaces_missing_fields() {
        let m = sample(3);
        let err = m.annotation("$SRC").unwrap_err();
        assert!(matches!(err, FlowError::MissingMetadata { .. }));
    }
}
