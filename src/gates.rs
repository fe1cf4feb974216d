//! Event gates.
//!
//! A gate selects a subset of events based on channel criteria. Gates are
//! polymorphic over the [`Gate`] trait: anything that can filter an
//! [`EventFrame`] into a new one can be used with
//! [`crate::measurement::Measurement::gate`].
//!
//! The concrete gates here mirror the standard cytometry repertoire:
//! threshold and interval gates on one channel, quadrant and polygon gates on
//! a channel pair, and boolean combinations of any of them.

use crate::error::{FlowError, FlowResult};
use crate::frame::EventFrame;

/// Capability of filtering an event table.
pub trait Gate {
    /// Produce a new frame containing exactly the events that pass the gate.
    ///
    /// Fails if the gate references a channel absent from the frame. Must not
    /// mutate the input.
    fn apply(&self, frame: &EventFrame) -> FlowResult<EventFrame>;
}

/// Which side of a one-dimensional boundary passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSide {
    Above,
    Below,
}

/// Keeps events on one side of a value on a single channel.
#[derive(Debug, Clone)]
pub struct ThresholdGate {
    channel: String,
    value: f64,
    side: ThresholdSide,
}

impl ThresholdGate {
    pub fn new(channel: impl Into<String>, value: f64, side: ThresholdSide) -> Self {
        Self {
            channel: channel.into(),
            value,
            side,
        }
    }
}

impl Gate for ThresholdGate {
    fn apply(&self, frame: &EventFrame) -> FlowResult<EventFrame> {
        let idx = frame.require_channel(&self.channel)?;
        Ok(frame.filter_rows(|row| match self.side {
            ThresholdSide::Above => row[idx] >= self.value,
            ThresholdSide::Below => row[idx] <= self.value,
        }))
    }
}

/// Whether events inside or outside a region pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSide {
    In,
    Out,
}

/// Keeps events inside (or outside) a closed interval on a single channel.
#[derive(Debug, Clone)]
pub struct IntervalGate {
    channel: String,
    low: f64,
    high: f64,
    side: RegionSide,
}

impl IntervalGate {
    pub fn new(channel: impl Into<String>, low: f64, high: f64, side: RegionSide) -> Self {
        Self {
            channel: channel.into(),
            low,
            high,
            side,
        }
    }
}

impl Gate for IntervalGate {
    fn apply(&self, frame: &EventFrame) -> FlowResult<EventFrame> {
        let idx = frame.require_channel(&self.channel)?;
        Ok(frame.filter_rows(|row| {
            let inside = self.low <= row[idx] && row[idx] <= self.high;
            match self.side {
                RegionSide::In => inside,
                RegionSide::Out => !inside,
            }
        }))
    }
}

/// One quadrant around a vertex in a two-channel plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Keeps events in one quadrant around `(vx, vy)` on a channel pair.
#[derive(Debug, Clone)]
pub struct QuadGate {
    x_channel: String,
    y_channel: String,
    vertex: (f64, f64),
    quadrant: Quadrant,
}

impl QuadGate {
    pub fn new(
        x_channel: impl Into<String>,
        y_channel: impl Into<String>,
        vertex: (f64, f64),
        quadrant: Quadrant,
    ) -> Self {
        Self {
            x_channel: x_channel.into(),
            y_channel: y_channel.into(),
            vertex,
            quadrant,
        }
    }
}

impl Gate for QuadGate {
    fn apply(&self, frame: &EventFrame) -> FlowResult<EventFrame> {
        let xi = frame.require_channel(&self.x_channel)?;
        let yi = frame.require_channel(&self.y_channel)?;
        let (vx, vy) = self.vertex;
        Ok(frame.filter_rows(|row| {
            let (x, y) = (row[xi], row[yi]);
            match self.quadrant {
                Quadrant::TopLeft => x < vx && y > vy,
                Quadrant::TopRight => x > vx && y > vy,
                Quadrant::BottomLeft => x < vx && y < vy,
                Quadrant::BottomRight => x > vx && y < vy,
            }
        }))
    }
}

/// Keeps events inside (or outside) a polygon on a channel pair.
///
/// Containment is decided by ray casting; events exactly on an edge may fall
/// on either side. Applying a gate with fewer than three vertices is an
/// invalid-argument error.
#[derive(Debug, Clone)]
pub struct PolyGate {
    x_channel: String,
    y_channel: String,
    vertices: Vec<(f64, f64)>,
    side: RegionSide,
}

impl PolyGate {
    pub fn new(
        x_channel: impl Into<String>,
        y_channel: impl Into<String>,
        vertices: Vec<(f64, f64)>,
        side: RegionSide,
    ) -> Self {
        Self {
            x_channel: x_channel.into(),
            y_channel: y_channel.into(),
            vertices,
            side,
        }
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        let v = &self.vertices;
        let mut inside = false;
        let mut j = v.len() - 1;
        for i in 0..v.len() {
            let (xi, yi) = v[i];
            let (xj, yj) = v[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

impl Gate for PolyGate {
    fn apply(&self, frame: &EventFrame) -> FlowResult<EventFrame> {
        if self.vertices.len() < 3 {
            return Err(FlowError::invalid_argument(format!(
                "a polygon gate needs at least 3 vertices ({} given)",
                self.vertices.len()
            )));
        }
        let xi = frame.require_channel(&self.x_channel)?;
        let yi = frame.require_channel(&self.y_channel)?;
        Ok(frame.filter_rows(|row| {
            let inside = self.contains(row[xi], row[yi]);
            match self.side {
                RegionSide::In => inside,
                RegionSide::Out => !inside,
            }
        }))
    }
}

/// How a [`CompositeGate`] combines its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    And,
    Or,
}

/// Boolean combination of two gates.
///
/// Combination works on event labels: an event passes `And` if both gates
/// keep it, `Or` if either does. Output preserves the input's row order.
pub struct CompositeGate<A: Gate, B: Gate> {
    first: A,
    second: B,
    how: Combination,
}

impl<A: Gate, B: Gate> CompositeGate<A, B> {
    pub fn new(first: A, second: B, how: Combination) -> Self {
        Self { first, second, how }
    }
}

impl<A: Gate, B: Gate> Gate for CompositeGate<A, B> {
    fn apply(&self, frame: &EventFrame) -> FlowResult<EventFrame> {
        use std::collections::BTreeSet;

        let a: BTreeSet<u64> = self.first.apply(frame)?.labels().iter().copied().collect();
        let b: BTreeSet<u64> = self.second.apply(frame)?.labels().iter().copied().collect();

        let positions: Vec<usize> = frame
            .labels()
            .iter()
            .enumerate()
            .filter(|(_, label)| match self.how {
                Combination::And => a.contains(label) && b.contains(label),
                Combination::Or => a.contains(label) || b.contains(label),
            })
            .map(|(pos, _)| pos)
            .collect();
        Ok(frame.take_rows(&positions))
    }
}

/// Inverts another gate: keeps exactly the events the inner gate drops.
pub struct InvertedGate<G: Gate>(pub G);

impl<G: Gate> Gate for InvertedGate<G> {
    fn apply(&self, frame: &EventFrame) -> FlowResult<EventFrame> {
        use std::collections::BTreeSet;

        let kept: BTreeSet<u64> = self.0.apply(frame)?.labels().iter().copied().collect();
        let positions: Vec<usize> = frame
            .labels()
            .iter()
            .enumerate()
            .filter(|(_, label)| !kept.contains(label))
            .map(|(pos, _)| pos)
            .collect();
        Ok(frame.take_rows(&positions))
    }
}
