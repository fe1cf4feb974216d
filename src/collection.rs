//! Keyed groups of measurements.
//!
//! A [`Collection`] maps unique keys (e.g. well names) to [`Measurement`]s
//! and fans the per-measurement operations out across every member. The one
//! piece with real decision logic is the shared transform: building a single
//! [`Transformation`] from the first member's metadata and applying it, with
//! identical parameters, to the whole group.
//!
//! Fan-out is fail-fast: results are assembled into a new collection only
//! after every member succeeds, so a single member's failure aborts the
//! batch and leaves the input collection untouched.

use std::collections::BTreeMap;

use crate::error::{FlowError, FlowResult};
use crate::gates::Gate;
use crate::measurement::{build_transformer, Measurement, SampleOrder, SubsampleKey};
use crate::transform::{all_close, TransformOptions, TransformSpec, Transformation};

/// A keyed, ordered-by-key group of measurements.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    id: String,
    members: BTreeMap<String, Measurement>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: BTreeMap::new(),
        }
    }

    /// Create a collection from keyed measurements.
    pub fn from_members<I, K>(id: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = (K, Measurement)>,
        K: Into<String>,
    {
        Self {
            id: id.into(),
            members: members
                .into_iter()
                .map(|(k, m)| (k.into(), m))
                .collect(),
        }
    }

    /// Collection identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Insert or replace a member.
    pub fn insert(&mut self, key: impl Into<String>, measurement: Measurement) {
        self.members.insert(key.into(), measurement);
    }

    /// Member lookup by key.
    pub fn get(&self, key: &str) -> Option<&Measurement> {
        self.members.get(key)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(|k| k.as_str())
    }

    /// Iterate `(key, measurement)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Measurement)> {
        self.members.iter().map(|(k, m)| (k.as_str(), m))
    }

    fn first_member(&self) -> FlowResult<&Measurement> {
        self.members
            .values()
            .next()
            .ok_or_else(|| FlowError::validation("collection has no members"))
    }

    fn rebuilt(
        &self,
        id: Option<&str>,
        members: BTreeMap<String, Measurement>,
    ) -> Self {
        Self {
            id: id.unwrap_or(&self.id).to_string(),
            members,
        }
    }

    /// Event counts per member key.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.members
            .iter()
            .map(|(k, m)| (k.clone(), m.counts()))
            .collect()
    }

    /// Apply a fallible per-member operation, fail-fast.
    pub fn try_map<F>(&self, id: Option<&str>, mut op: F) -> FlowResult<Self>
    where
        F: FnMut(&str, &Measurement) -> FlowResult<Measurement>,
    {
        let mut members = BTreeMap::new();
        for (k, m) in &self.members {
            members.insert(k.clone(), op(k, m)?);
        }
        Ok(self.rebuilt(id, members))
    }

    /// Transform every member. See [`Collection::transform_with`].
    pub fn transform(
        &self,
        spec: impl Into<TransformSpec>,
        opts: &TransformOptions,
        share_transform: bool,
    ) -> FlowResult<Self> {
        self.transform_with(spec, opts, share_transform)
            .map(|(c, _)| c)
    }

    /// Transform every member, optionally sharing one transformation.
    ///
    /// - `share_transform == false`: the full per-measurement construction
    ///   logic runs independently for each member, so members may end up
    ///   with different effective parameters.
    /// - `share_transform == true`: exactly one [`Transformation`] is built,
    ///   using the first member's metadata as representative (same range
    ///   validation and derivation as the per-measurement path). When
    ///   `opts.use_spline` is set, the interpolation table is fitted to the
    ///   global extrema of the selected channels across ALL members, so the
    ///   approximation is consistent over the whole collection. The shared
    ///   transformation is also returned.
    ///
    /// `opts.id` renames the output collection; member ids are kept.
    pub fn transform_with(
        &self,
        spec: impl Into<TransformSpec>,
        opts: &TransformOptions,
        share_transform: bool,
    ) -> FlowResult<(Self, Option<Transformation>)> {
        let spec = spec.into();
        let member_opts = TransformOptions {
            id: None,
            ..opts.clone()
        };

        if !share_transform {
            let out = self.try_map(opts.id.as_deref(), |_, m| {
                m.transform(spec.clone(), &member_opts)
            })?;
            return Ok((out, None));
        }

        let representative = self.first_member()?;
        let channels = match &opts.channels {
            Some(list) => list.clone(),
            None => representative.channel_names().to_vec(),
        };

        let mut transformer = match spec {
            TransformSpec::Prebuilt(t) => t,
            TransformSpec::Named(kind) => {
                // Sharing is only sound when every member agrees on the
                // declared range of every selected channel; picking the
                // first member's value silently would be wrong.
                if opts.auto_range && opts.d.is_none() {
                    let mut ranges = Vec::new();
                    for m in self.members.values() {
                        for c in &channels {
                            ranges.push(m.meta().declared_range(c)?);
                        }
                    }
                    if !all_close(&ranges) {
                        return Err(FlowError::validation(
                            "members declare different data ranges for the selected \
                             channels, so one transformation cannot be shared across \
                             the collection",
                        ));
                    }
                }
                build_transformer(representative.meta(), &channels, kind, opts)?
            }
        };

        if opts.use_spline && transformer.spline().is_none() {
            if let Some((xmin, xmax)) = self.global_extrema(&channels)? {
                transformer.set_spline(xmin, xmax);
            }
        }

        let member_opts = TransformOptions {
            channels: Some(channels),
            ..member_opts
        };
        let out = self.try_map(opts.id.as_deref(), |_, m| {
            m.transform(transformer.clone(), &member_opts)
        })?;
        Ok((out, Some(transformer)))
    }

    /// Global (min, max) of the named channels across every member.
    ///
    /// `None` when no member has any events.
    pub fn global_extrema(&self, channels: &[String]) -> FlowResult<Option<(f64, f64)>> {
        let mut acc: Option<(f64, f64)> = None;
        for m in self.members.values() {
            if let Some((lo, hi)) = m.frame().extrema(channels)? {
                acc = Some(match acc {
                    Some((alo, ahi)) => (alo.min(lo), ahi.max(hi)),
                    None => (lo, hi),
                });
            }
        }
        Ok(acc)
    }

    /// Histogram bin edges shared by the whole collection: for each channel,
    /// `nbins` uniformly spaced points spanning the global extrema.
    ///
    /// This is what a grid plotter needs so every subplot bins identically.
    pub fn shared_bins(&self, channels: &[String], nbins: usize) -> FlowResult<Vec<Vec<f64>>> {
        if nbins < 2 {
            return Err(FlowError::invalid_argument(
                "at least two bin edges are required",
            ));
        }
        let mut out = Vec::with_capacity(channels.len());
        for channel in channels {
            let one = std::slice::from_ref(channel);
            let (lo, hi) = self
                .global_extrema(one)?
                .ok_or_else(|| FlowError::validation("no events to derive bins from"))?;
            let step = (hi - lo) / (nbins - 1) as f64;
            out.push((0..nbins).map(|i| lo + step * i as f64).collect());
        }
        Ok(out)
    }

    /// Subsample every member independently.
    ///
    /// With [`SampleOrder::Random`] the draw is independent per member, not
    /// shared across the collection.
    pub fn subsample(
        &self,
        key: SubsampleKey,
        order: SampleOrder,
        auto_resize: bool,
        id: Option<&str>,
    ) -> FlowResult<Self> {
        self.try_map(id, |_, m| m.subsample(key, order, auto_resize))
    }

    /// Gate every member.
    pub fn gate<G: Gate + ?Sized>(&self, gate: &G, id: Option<&str>) -> FlowResult<Self> {
        self.try_map(id, |_, m| m.gate(gate))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Collection;
    use crate::error::FlowError;
    use crate::frame::EventFrame;
    use crate::gates::{ThresholdGate, ThresholdSide};
    use crate::measurement::{Measurement, SampleOrder, SubsampleKey};
    use crate::meta::Metadata;
    use crate::transform::{TransformKind, TransformOptions};

    fn member(id: &str, values: &[f64], range: f64) -> Measurement {
        let channels = vec!["A".to_string(), "B".to_string()];
        let rows = values.iter().map(|&v| vec![v, -v]).collect();
        let frame = EventFrame::new(channels.clone(), rows).unwrap();
        let meta = Arc::new(Metadata::with_uniform_range(channels, range));
        Measurement::new(id, frame, meta).unwrap()
    }

    fn plate() -> Collection {
        Collection::from_members(
            "plate1",
            vec![
                ("A1", member("A1", &[10.0, 20.0, 30.0], 1000.0)),
                ("A2", member("A2", &[100.0, 200.0, 300.0], 1000.0)),
                ("A3", member("A3", &[1.0, 2.0, 3.0], 1000.0)),
            ],
        )
    }

    #[test]
    fn counts_per_member() {
        let c = plate();
        let counts = c.counts();
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 3));
    }

    #[test]
    fn shared_transform_uses_global_spline_bounds() {
        let c = plate();
        let opts = TransformOptions::on_channels(["A"]);
        let (out, transformer) = c
            .transform_with(TransformKind::Hlog, &opts, true)
            .unwrap();
        let transformer = transformer.expect("sharing returns the transformer");
        // Global extrema over channel A across all members, not any single
        // member's bounds.
        assert_eq!(transformer.spline_bounds(), Some((1.0, 300.0)));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn shared_transform_rejects_mismatched_member_ranges() {
        let mut c = plate();
        // One member declares a different range for channel A; sharing must
        // fail rather than silently pick the first member's value.
        c.insert("B1", member("B1", &[5.0], 4096.0));
        let err = c
            .transform(
                TransformKind::Hlog,
                &TransformOptions::on_channels(["A"]),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation { .. }));
        // Input untouched.
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn unshared_transform_derives_parameters_per_member() {
        let mut c = plate();
        c.insert("B1", member("B1", &[5.0, 6.0], 10_000.0));
        // Members declare different ranges; without sharing this is fine.
        let opts = TransformOptions {
            use_spline: false,
            ..TransformOptions::on_channels(["A"])
        };
        let (out, transformer) = c
            .transform_with(TransformKind::Hlog, &opts, false)
            .unwrap();
        assert!(transformer.is_none());
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn empty_collection_cannot_share_a_transform() {
        let c = Collection::new("empty");
        let err = c
            .transform(TransformKind::Hlog, &TransformOptions::default(), true)
            .unwrap_err();
        assert!(err.to_string().contains("no members"));
    }

    #[test]
    fn transform_renames_collection_not_members() {
        let c = plate();
        let opts = TransformOptions {
            id: Some("plate1.hlog".to_string()),
            use_spline: false,
            ..TransformOptions::on_channels(["A"])
        };
        let out = c.transform(TransformKind::Hlog, &opts, true).unwrap();
        assert_eq!(out.id(), "plate1.hlog");
        assert_eq!(out.get("A1").unwrap().id(), "A1");
    }

    #[test]
    fn gate_fan_out_and_fail_fast() {
        let c = plate();
        let gated = c
            .gate(&ThresholdGate::new("A", 15.0, ThresholdSide::Above), None)
            .unwrap();
        assert_eq!(gated.get("A1").unwrap().counts(), 2);
        assert_eq!(gated.get("A3").unwrap().counts(), 0);

        // A gate referencing a missing channel aborts the whole batch.
        let err = c
            .gate(&ThresholdGate::new("Z", 0.0, ThresholdSide::Above), None)
            .unwrap_err();
        assert!(matches!(err, FlowError::UnknownChannel { .. }));
        // Input untouched.
        assert_eq!(c.get("A1").unwrap().counts(), 3);
    }

    #[test]
    fn subsample_fan_out() {
        let c = plate();
        let out = c
            .subsample(
                SubsampleKey::Count(2),
                SampleOrder::Start,
                false,
                Some("sub"),
            )
            .unwrap();
        assert_eq!(out.id(), "sub");
        for (_, m) in out.iter() {
            assert_eq!(m.counts(), 2);
        }
    }

    #[test]
    fn shared_bins_span_global_extrema() {
        let c = plate();
        let bins = c.shared_bins(&["A".to_string()], 5).unwrap();
        assert_eq!(bins.len(), 1);
        let edges = &bins[0];
        assert_eq!(edges.len(), 5);
        assert_eq!(edges[0], 1.0);
        assert_eq!(*edges.last().unwrap(), 300.0);
    }
}
