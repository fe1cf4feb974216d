//! `flow-wrangler` is a small library for wrangling flow-cytometry
//! measurements: per-sample event tables (one row per detected particle, one
//! column per detector channel) plus the instrument metadata that came with
//! them.
//!
//! A sample lives in a [`measurement::Measurement`]; structured groups of
//! samples live in a [`collection::Collection`] or, arranged on a well grid,
//! a [`plate::Plate`]. Every operation returns a new value; nothing is ever
//! mutated in place.
//!
//! ## What you can do
//!
//! - **Transform** channel values with the hlog/tlog compressive families or
//!   a linear rescale, forward or inverse, with the range parameter derived
//!   automatically from each channel's declared metadata range, or shared
//!   with identical parameters across a whole collection.
//! - **Gate** (filter) events with threshold, interval, quadrant, polygon
//!   and composite gates, or anything else implementing [`gates::Gate`].
//! - **Subsample** events by fraction, window, positional span or absolute
//!   count, randomly or from either end.
//! - **Load** CSV event exports (with an optional JSON metadata sidecar)
//!   one file at a time or a directory glob at a time.
//!
//! ## Quick example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use flow_wrangler::frame::EventFrame;
//! use flow_wrangler::gates::{ThresholdGate, ThresholdSide};
//! use flow_wrangler::measurement::{Measurement, SampleOrder, SubsampleKey};
//! use flow_wrangler::meta::Metadata;
//! use flow_wrangler::transform::{TransformKind, TransformOptions};
//!
//! # fn main() -> Result<(), flow_wrangler::FlowError> {
//! let channels = vec!["FSC-A".to_string(), "SSC-A".to_string()];
//! let frame = EventFrame::new(
//!     channels.clone(),
//!     vec![vec![120.0, 30.0], vec![5000.0, 42.0], vec![99.0, 7.5]],
//! )?;
//! let meta = Arc::new(Metadata::with_uniform_range(channels, 262144.0));
//! let sample = Measurement::new("well-A1", frame, meta)?;
//!
//! // hlog both channels; the range parameter d comes from the metadata.
//! let compressed = sample.transform(
//!     TransformKind::Hlog,
//!     &TransformOptions::on_channels(["FSC-A", "SSC-A"]),
//! )?;
//!
//! // Keep large events, then thin to at most two of them.
//! let gated = compressed.gate(&ThresholdGate::new("FSC-A", 100.0, ThresholdSide::Above))?;
//! let thinned = gated.subsample(SubsampleKey::Count(2), SampleOrder::Start, true)?;
//! assert!(thinned.counts() <= 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sharing one transform across a collection
//!
//! ```rust
//! # use std::sync::Arc;
//! # use flow_wrangler::collection::Collection;
//! # use flow_wrangler::frame::EventFrame;
//! # use flow_wrangler::measurement::Measurement;
//! # use flow_wrangler::meta::Metadata;
//! # use flow_wrangler::transform::{TransformKind, TransformOptions};
//! # fn main() -> Result<(), flow_wrangler::FlowError> {
//! # let channels = vec!["FSC-A".to_string()];
//! # let meta = Arc::new(Metadata::with_uniform_range(channels.clone(), 262144.0));
//! # let mk = |id: &str, v: f64| {
//! #     let frame = EventFrame::new(channels.clone(), vec![vec![v]]).unwrap();
//! #     Measurement::new(id, frame, Arc::clone(&meta)).unwrap()
//! # };
//! let plate = Collection::from_members(
//!     "plate1",
//!     vec![("A1", mk("A1", 100.0)), ("A2", mk("A2", 9000.0))],
//! );
//!
//! // One transformer, built from the first member's metadata and fitted to
//! // the global extrema, applied identically to every member.
//! let opts = TransformOptions::on_channels(["FSC-A"]);
//! let (transformed, transformer) = plate.transform_with(TransformKind::Hlog, &opts, true)?;
//! assert_eq!(transformed.len(), 2);
//! assert!(transformer.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`loader`]: the loading seam plus the CSV/sidecar loader
//! - [`frame`]: the in-memory event table
//! - [`meta`]: instrument metadata (channel ranges, annotations)
//! - [`transform`]: transform kinds, parameters and fitted tables
//! - [`gates`]: gate trait and the concrete gate repertoire
//! - [`measurement`]: one sample and its operations
//! - [`collection`]: keyed fan-out and shared transforms
//! - [`plate`]: 2D grid overlay over a collection
//! - [`error`]: error types used across the crate

pub mod collection;
pub mod error;
pub mod frame;
pub mod gates;
pub mod loader;
pub mod measurement;
pub mod meta;
pub mod plate;
pub mod transform;

pub use error::{FlowError, FlowResult};
