//! Plate layouts: a 2D grid overlay for a [`Collection`].
//!
//! A [`Plate`] composes a plain keyed collection with a [`PlateLayout`] that
//! maps `(row, col)` grid positions to well names ("A1", "C7", ...). The
//! collection stays the single source of truth for the measurements; the
//! layout only adds grid addressing, which is what grid-aware plotting
//! consumers need. Rendering itself is out of scope.

use crate::error::{FlowError, FlowResult};
use crate::gates::Gate;
use crate::measurement::{Measurement, SampleOrder, SubsampleKey};
use crate::collection::Collection;
use crate::transform::{TransformOptions, TransformSpec, Transformation};

const ROW_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Grid shape and well naming for a plate.
///
/// Rows are lettered `A..`, columns numbered `1..`, so position `(2, 6)` is
/// well `"C7"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlateLayout {
    n_rows: usize,
    n_cols: usize,
}

impl PlateLayout {
    /// Standard 96-well layout (8 rows x 12 columns).
    pub fn standard_96() -> Self {
        Self {
            n_rows: 8,
            n_cols: 12,
        }
    }

    /// Layout with the given shape. At most 26 rows (one letter each).
    pub fn new(n_rows: usize, n_cols: usize) -> FlowResult<Self> {
        if n_rows == 0 || n_cols == 0 {
            return Err(FlowError::invalid_argument(
                "plate must have at least one row and one column",
            ));
        }
        if n_rows > ROW_LETTERS.len() {
            return Err(FlowError::invalid_argument(format!(
                "at most {} rows supported ({n_rows} given)",
                ROW_LETTERS.len()
            )));
        }
        Ok(Self { n_rows, n_cols })
    }

    /// `(rows, cols)` shape.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Well name at a grid position.
    pub fn well_name(&self, row: usize, col: usize) -> FlowResult<String> {
        if row >= self.n_rows || col >= self.n_cols {
            return Err(FlowError::invalid_argument(format!(
                "position ({row}, {col}) outside a {}x{} plate",
                self.n_rows, self.n_cols
            )));
        }
        Ok(format!("{}{}", ROW_LETTERS[row] as char, col + 1))
    }

    /// Grid position of a well name like `"C7"`.
    pub fn parse_well(&self, name: &str) -> FlowResult<(usize, usize)> {
        let bad = || {
            FlowError::invalid_argument(format!(
                "'{name}' is not a well name for a {}x{} plate",
                self.n_rows, self.n_cols
            ))
        };
        let mut chars = name.chars();
        let letter = chars.next().ok_or_else(bad)?;
        let row = ROW_LETTERS
            .iter()
            .position(|&b| b as char == letter.to_ascii_uppercase())
            .ok_or_else(bad)?;
        let col: usize = chars.as_str().parse().map_err(|_| bad())?;
        if col == 0 || row >= self.n_rows || col > self.n_cols {
            return Err(bad());
        }
        Ok((row, col - 1))
    }

    /// Iterate all grid positions row-major.
    pub fn positions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n_rows).flat_map(move |r| (0..self.n_cols).map(move |c| (r, c)))
    }
}

/// A collection arranged on a plate grid.
#[derive(Debug, Clone)]
pub struct Plate {
    collection: Collection,
    layout: PlateLayout,
}

impl Plate {
    /// Attach a layout to a collection, checking that every member key is a
    /// valid well name on that layout.
    pub fn new(collection: Collection, layout: PlateLayout) -> FlowResult<Self> {
        for key in collection.keys() {
            layout.parse_well(key)?;
        }
        Ok(Self { collection, layout })
    }

    /// The underlying keyed collection.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The grid layout.
    pub fn layout(&self) -> &PlateLayout {
        &self.layout
    }

    /// Measurement at a grid position, if that well is present.
    pub fn measurement_at(&self, row: usize, col: usize) -> FlowResult<Option<&Measurement>> {
        let name = self.layout.well_name(row, col)?;
        Ok(self.collection.get(&name))
    }

    /// Per-position event counts, row-major; `None` for absent wells.
    pub fn counts_matrix(&self) -> Vec<Vec<Option<usize>>> {
        let (n_rows, n_cols) = self.layout.shape();
        (0..n_rows)
            .map(|r| {
                (0..n_cols)
                    .map(|c| {
                        let name = format!("{}{}", ROW_LETTERS[r] as char, c + 1);
                        self.collection.get(&name).map(Measurement::counts)
                    })
                    .collect()
            })
            .collect()
    }

    /// Transform every well; see [`Collection::transform`].
    pub fn transform(
        &self,
        spec: impl Into<TransformSpec>,
        opts: &TransformOptions,
        share_transform: bool,
    ) -> FlowResult<Self> {
        let collection = self.collection.transform(spec, opts, share_transform)?;
        Ok(Self {
            collection,
            layout: self.layout,
        })
    }

    /// Transform every well, also returning the shared transformation when
    /// sharing; see [`Collection::transform_with`].
    pub fn transform_with(
        &self,
        spec: impl Into<TransformSpec>,
        opts: &TransformOptions,
        share_transform: bool,
    ) -> FlowResult<(Self, Option<Transformation>)> {
        let (collection, transformer) =
            self.collection.transform_with(spec, opts, share_transform)?;
        Ok((
            Self {
                collection,
                layout: self.layout,
            },
            transformer,
        ))
    }

    /// Gate every well; see [`Collection::gate`].
    pub fn gate<G: Gate + ?Sized>(&self, gate: &G, id: Option<&str>) -> FlowResult<Self> {
        let collection = self.collection.gate(gate, id)?;
        Ok(Self {
            collection,
            layout: self.layout,
        })
    }

    /// Subsample every well; see [`Collection::subsample`].
    pub fn subsample(
        &self,
        key: SubsampleKey,
        order: SampleOrder,
        auto_resize: bool,
        id: Option<&str>,
    ) -> FlowResult<Self> {
        let collection = self.collection.subsample(key, order, auto_resize, id)?;
        Ok(Self {
            collection,
            layout: self.layout,
        })
    }
}
