//! Channel-value transformations.
//!
//! Implements the compressive transforms commonly used to display cytometry
//! data: the hyperlog (`hlog`) and truncated-log (`tlog`) families plus a
//! plain linear rescale, each with a forward and an inverse direction.
//!
//! A [`Transformation`] is built once from a kind, a direction and a
//! [`TransformParams`] and is then reusable across many channels and
//! measurements. Because the forward hyperlog has no closed form (it is
//! defined as the inverse of [`hlog_inverse`]), repeated evaluation can go
//! through a fitted interpolation table (see [`Transformation::set_spline`])
//! instead of per-value root finding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

/// Full scale of an 18-bit acquisition, as a base-10 exponent.
fn default_decades() -> f64 {
    ((1u32 << 18) as f64).log10()
}

/// Named transform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Hyperlog: log-like away from zero, linear through it.
    Hlog,
    /// Inverse hyperlog.
    HlogInv,
    /// Truncated log10.
    Tlog,
    /// Inverse truncated log10.
    TlogInv,
    /// Linear rescale `a * x + c`.
    Linear,
}

impl TransformKind {
    /// Whether this kind consumes the range parameter `d` derived from a
    /// channel's declared range (the log-like families, both directions).
    pub fn is_range_sensitive(self) -> bool {
        matches!(
            self,
            Self::Hlog | Self::HlogInv | Self::Tlog | Self::TlogInv
        )
    }

    /// Canonical lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hlog => "hlog",
            Self::HlogInv => "hlog_inv",
            Self::Tlog => "tlog",
            Self::TlogInv => "tlog_inv",
            Self::Linear => "linear",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformKind {
    type Err = FlowError;

    fn from_str(s: &str) -> FlowResult<Self> {
        match s {
            "hlog" => Ok(Self::Hlog),
            "hlog_inv" => Ok(Self::HlogInv),
            "tlog" => Ok(Self::Tlog),
            "tlog_inv" => Ok(Self::TlogInv),
            "linear" => Ok(Self::Linear),
            other => Err(FlowError::invalid_argument(format!(
                "unknown transform kind '{other}' (expected hlog, hlog_inv, tlog, tlog_inv or linear)"
            ))),
        }
    }
}

/// Direction in which a [`TransformKind`] is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Apply the kind as named.
    #[default]
    Forward,
    /// Apply the kind's inverse.
    Inverse,
}

impl Direction {
    fn flip(self) -> Self {
        match self {
            Self::Forward => Self::Inverse,
            Self::Inverse => Self::Forward,
        }
    }
}

/// Shared numeric parameters for all transform kinds.
///
/// Field meanings follow the conventional hlog/tlog parameterization:
/// `b` is the hyperlog linear width, `th` the tlog truncation threshold,
/// `r` the display resolution the output is scaled to, `d` the number of
/// base-10 decades the input spans, and `a`/`c` the linear slope/intercept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    pub b: f64,
    pub th: f64,
    pub r: f64,
    pub d: f64,
    pub a: f64,
    pub c: f64,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            b: 500.0,
            th: 1.0,
            r: 1e4,
            d: default_decades(),
            a: 1.0,
            c: 0.0,
        }
    }
}

/// Inverse hyperlog: the closed-form side of the hyperlog pair.
///
/// Odd around zero, `hlog_inverse(0) == 0`, strictly increasing.
pub fn hlog_inverse(y: f64, p: &TransformParams) -> f64 {
    let aux = p.d / p.r * y;
    let s = if y == 0.0 { 1.0 } else { y.signum() };
    s * 10f64.powf(s * aux) + p.b * aux - s
}

/// Forward hyperlog, evaluated by inverting [`hlog_inverse`] with bisection.
pub fn hlog(x: f64, p: &TransformParams) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    let mut lo = -2.0 * p.r;
    let mut hi = 2.0 * p.r;
    let mut guard = 0;
    while hlog_inverse(lo, p) > x && guard < 64 {
        lo *= 2.0;
        guard += 1;
    }
    guard = 0;
    while hlog_inverse(hi, p) < x && guard < 64 {
        hi *= 2.0;
        guard += 1;
    }
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if hlog_inverse(mid, p) < x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Truncated log10: values at or below the threshold map to the threshold's
/// image.
pub fn tlog(x: f64, p: &TransformParams) -> f64 {
    let scale = p.r / p.d;
    if x <= p.th {
        p.th.log10() * scale
    } else {
        x.log10() * scale
    }
}

/// Inverse truncated log10, clamped below at the threshold.
pub fn tlog_inverse(y: f64, p: &TransformParams) -> f64 {
    let x = 10f64.powf(y * p.d / p.r);
    if x < p.th {
        p.th
    } else {
        x
    }
}

/// The concrete function a (kind, direction) pair resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effective {
    Hlog,
    HlogInverse,
    Tlog,
    TlogInverse,
    Linear,
    LinearInverse,
}

fn resolve(kind: TransformKind, direction: Direction) -> Effective {
    // An `_inv` kind in the inverse direction is the plain transform again.
    let (base, direction) = match kind {
        TransformKind::HlogInv => (TransformKind::Hlog, direction.flip()),
        TransformKind::TlogInv => (TransformKind::Tlog, direction.flip()),
        other => (other, direction),
    };
    match (base, direction) {
        (TransformKind::Hlog, Direction::Forward) => Effective::Hlog,
        (TransformKind::Hlog, Direction::Inverse) => Effective::HlogInverse,
        (TransformKind::Tlog, Direction::Forward) => Effective::Tlog,
        (TransformKind::Tlog, Direction::Inverse) => Effective::TlogInverse,
        (TransformKind::Linear, Direction::Forward) => Effective::Linear,
        (TransformKind::Linear, Direction::Inverse) => Effective::LinearInverse,
        _ => unreachable!("inverse kinds rewritten above"),
    }
}

/// A fitted piecewise-linear approximation of a transform over a value range.
///
/// Stands in for the spline fit used to avoid per-value root finding when a
/// transform is applied to large tables: `xs` is a uniform grid over the
/// fitted bounds and `ys` the exact transform evaluated on it.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineTable {
    xmin: f64,
    xmax: f64,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

const SPLINE_POINTS: usize = 1000;

impl SplineTable {
    fn fit(xmin: f64, xmax: f64, exact: impl Fn(f64) -> f64) -> Self {
        // Degenerate/collapsed bounds still need a usable grid.
        let hi = if xmax > xmin { xmax } else { xmin + 1.0 };
        let n = SPLINE_POINTS;
        let step = (hi - xmin) / (n - 1) as f64;
        let xs: Vec<f64> = (0..n).map(|i| xmin + step * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| exact(x)).collect();
        Self {
            xmin,
            xmax,
            xs,
            ys,
        }
    }

    /// The (xmin, xmax) bounds this table was fitted over.
    pub fn bounds(&self) -> (f64, f64) {
        (self.xmin, self.xmax)
    }

    /// Evaluate by linear interpolation, clamping outside the fitted grid.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        let hi = self.xs.partition_point(|&grid| grid <= x);
        let lo = hi - 1;
        let t = (x - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
        self.ys[lo] + t * (self.ys[hi] - self.ys[lo])
    }
}

/// A built, reusable channel transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    kind: TransformKind,
    direction: Direction,
    params: TransformParams,
    spline: Option<SplineTable>,
}

impl Transformation {
    /// Build a transformation, validating the parameters the kind consumes.
    pub fn new(
        kind: TransformKind,
        direction: Direction,
        params: TransformParams,
    ) -> FlowResult<Self> {
        match kind {
            TransformKind::Tlog | TransformKind::TlogInv => {
                if params.th <= 0.0 {
                    return Err(FlowError::invalid_argument(format!(
                        "tlog threshold must be positive ({} given)",
                        params.th
                    )));
                }
            }
            TransformKind::Linear => {
                if params.a == 0.0 {
                    return Err(FlowError::invalid_argument(
                        "linear slope must be non-zero",
                    ));
                }
            }
            TransformKind::Hlog | TransformKind::HlogInv => {}
        }
        if kind.is_range_sensitive() && (params.r <= 0.0 || params.d <= 0.0) {
            return Err(FlowError::invalid_argument(format!(
                "r and d must be positive (r={}, d={})",
                params.r, params.d
            )));
        }
        Ok(Self {
            kind,
            direction,
            params,
            spline: None,
        })
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn params(&self) -> &TransformParams {
        &self.params
    }

    /// Same transformation with the direction flipped (spline discarded,
    /// since it approximates the other direction).
    pub fn inverted(&self) -> Self {
        Self {
            kind: self.kind,
            direction: self.direction.flip(),
            params: self.params,
            spline: None,
        }
    }

    /// Exact evaluation of one value.
    pub fn eval(&self, x: f64) -> f64 {
        let p = &self.params;
        match resolve(self.kind, self.direction) {
            Effective::Hlog => hlog(x, p),
            Effective::HlogInverse => hlog_inverse(x, p),
            Effective::Tlog => tlog(x, p),
            Effective::TlogInverse => tlog_inverse(x, p),
            Effective::Linear => p.a * x + p.c,
            Effective::LinearInverse => (x - p.c) / p.a,
        }
    }

    /// Fit an interpolation table over `[xmin, xmax]` without attaching it.
    pub fn fit_table(&self, xmin: f64, xmax: f64) -> SplineTable {
        SplineTable::fit(xmin, xmax, |x| self.eval(x))
    }

    /// Fit and attach an interpolation table over `[xmin, xmax]`.
    ///
    /// Once attached, [`Transformation::eval_fast`] interpolates instead of
    /// evaluating exactly, and the bounds are observable via
    /// [`Transformation::spline_bounds`].
    pub fn set_spline(&mut self, xmin: f64, xmax: f64) {
        self.spline = Some(self.fit_table(xmin, xmax));
    }

    /// The attached table's fitted bounds, if any.
    pub fn spline_bounds(&self) -> Option<(f64, f64)> {
        self.spline.as_ref().map(|s| s.bounds())
    }

    /// The attached table, if any.
    pub fn spline(&self) -> Option<&SplineTable> {
        self.spline.as_ref()
    }

    /// Evaluate through the attached table when present, exactly otherwise.
    pub fn eval_fast(&self, x: f64) -> f64 {
        match &self.spline {
            Some(table) => table.eval(x),
            None => self.eval(x),
        }
    }
}

/// Either an already-built transformation or the name of one to build.
///
/// The prebuilt variant is the shared-parameter path: a caller (usually a
/// collection) constructs one [`Transformation`] and reuses it everywhere,
/// and no per-measurement range validation is performed.
#[derive(Debug, Clone)]
pub enum TransformSpec {
    /// Apply this transformation as-is.
    Prebuilt(Transformation),
    /// Build a transformation of this kind from the options and metadata.
    Named(TransformKind),
}

impl From<Transformation> for TransformSpec {
    fn from(t: Transformation) -> Self {
        Self::Prebuilt(t)
    }
}

impl From<TransformKind> for TransformSpec {
    fn from(k: TransformKind) -> Self {
        Self::Named(k)
    }
}

/// Options shared by the measurement- and collection-level transform
/// operations.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Direction to apply the kind in.
    pub direction: Direction,
    /// Channels to transform; `None` means every frame channel.
    pub channels: Option<Vec<String>>,
    /// Keep untransformed columns (`true`) or drop them (`false`).
    pub return_all: bool,
    /// Derive the range parameter `d` from the channels' declared ranges.
    pub auto_range: bool,
    /// Evaluate through a fitted interpolation table.
    pub use_spline: bool,
    /// Identity for the output; `None` inherits.
    pub id: Option<String>,
    /// Explicit range parameter. Wins over `auto_range` (with a warning).
    pub d: Option<f64>,
    /// Remaining transform parameters.
    pub params: TransformParams,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            channels: None,
            return_all: true,
            auto_range: true,
            use_spline: true,
            id: None,
            d: None,
            params: TransformParams::default(),
        }
    }
}

impl TransformOptions {
    /// Options restricted to the named channels.
    pub fn on_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: Some(channels.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// Numpy-style allclose over a slice: every value close to the first.
pub(crate) fn all_close(values: &[f64]) -> bool {
    const RTOL: f64 = 1e-5;
    const ATOL: f64 = 1e-8;
    match values.split_first() {
        None => true,
        Some((&first, rest)) => rest
            .iter()
            .all(|&v| (v - first).abs() <= ATOL + RTOL * first.abs()),
    }
}
