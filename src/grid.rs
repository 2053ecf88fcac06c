//! World/raster coordinate mapping.
//!
//! A [`Grid`] is an immutable frame: the world position of the centre of cell
//! `[0, 0]`, independent row and column spacing, and a size in cells. Sample
//! `(col, row)` sits at `origin + (col · col_spacing, row · row_spacing)`;
//! rows run along world y and columns along world x.

use crate::config::constants::{GRID_SLACK_CELLS, TOLERANCE};
use crate::error::{GeometryError, Result};
use crate::math::{Bounds, Point2};
use crate::model::Structure;

/// Immutable raster frame shared by every slice of one operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    origin: Point2,
    row_spacing: f64,
    col_spacing: f64,
    width: usize,
    height: usize,
    z_spacing: Option<f64>,
}

impl Grid {
    /// Creates a grid.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::NonPositiveSpacing` unless both spacings are
    /// finite and strictly positive.
    pub fn new(
        origin: Point2,
        row_spacing: f64,
        col_spacing: f64,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        let valid = |s: f64| s.is_finite() && s > 0.0;
        if !valid(row_spacing) || !valid(col_spacing) {
            return Err(GeometryError::NonPositiveSpacing {
                row: row_spacing,
                col: col_spacing,
            }
            .into());
        }
        Ok(Self {
            origin,
            row_spacing,
            col_spacing,
            width,
            height,
            z_spacing: None,
        })
    }

    /// A zero-area grid. Operations treat it as a no-op.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            origin: Point2::origin(),
            row_spacing: 1.0,
            col_spacing: 1.0,
            width: 0,
            height: 0,
            z_spacing: None,
        }
    }

    #[must_use]
    pub fn with_z_spacing(mut self, z_spacing: f64) -> Self {
        self.z_spacing = (z_spacing > TOLERANCE).then_some(z_spacing);
        self
    }

    /// Smallest grid with the given spacing whose cells cover `bounds`
    /// expanded by `(pad_x, pad_y)` plus one cell of slack on every side.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::NonPositiveSpacing` for invalid spacing.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn covering(
        bounds: &Bounds,
        row_spacing: f64,
        col_spacing: f64,
        pad_x: f64,
        pad_y: f64,
    ) -> Result<Self> {
        // Validate spacing before deriving sizes from it.
        Self::new(Point2::origin(), row_spacing, col_spacing, 0, 0)?;
        #[allow(clippy::cast_precision_loss)]
        let slack = GRID_SLACK_CELLS as f64;
        let pad_x = pad_x.abs() + slack * col_spacing;
        let pad_y = pad_y.abs() + slack * row_spacing;
        let b = bounds.expand(pad_x, pad_y);
        let width = (b.width() / col_spacing).ceil() as usize + 1;
        let height = (b.height() / row_spacing).ceil() as usize + 1;
        Self::new(
            Point2::new(b.min_x, b.min_y),
            row_spacing,
            col_spacing,
            width,
            height,
        )
    }

    /// Grid for one DICOM image plane.
    ///
    /// # Errors
    ///
    /// Returns an error for non-positive spacing or an oblique orientation.
    pub fn from_image_plane(plane: &ImagePlane) -> Result<Self> {
        let [rx, ry, rz, cx, cy, cz] = plane.orientation;
        let axial = (rx - 1.0).abs() < 1e-6
            && ry.abs() < 1e-6
            && rz.abs() < 1e-6
            && cx.abs() < 1e-6
            && (cy - 1.0).abs() < 1e-6
            && cz.abs() < 1e-6;
        if !axial {
            return Err(GeometryError::InvalidInput(
                "only axial image orientation is supported".into(),
            )
            .into());
        }
        let [row_spacing, col_spacing] = plane.pixel_spacing;
        let grid = Self::new(
            Point2::new(plane.position[0], plane.position[1]),
            row_spacing,
            col_spacing,
            plane.columns,
            plane.rows,
        )?;
        Ok(match plane.slice_thickness {
            Some(t) => grid.with_z_spacing(t),
            None => grid,
        })
    }

    #[must_use]
    pub fn origin(&self) -> Point2 {
        self.origin
    }

    #[must_use]
    pub fn row_spacing(&self) -> f64 {
        self.row_spacing
    }

    #[must_use]
    pub fn col_spacing(&self) -> f64 {
        self.col_spacing
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn z_spacing(&self) -> Option<f64> {
        self.z_spacing
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn cell_area(&self) -> f64 {
        self.row_spacing * self.col_spacing
    }

    /// Fractional pixel coordinates `(col, row)` of a world point.
    #[must_use]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin.x) / self.col_spacing,
            (y - self.origin.y) / self.row_spacing,
        )
    }

    /// World coordinates of fractional pixel `(col, row)`.
    #[must_use]
    pub fn pixel_to_world(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.origin.x + px * self.col_spacing,
            self.origin.y + py * self.row_spacing,
        )
    }

    /// World extent covered by the cells (centre ± half a cell).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> Bounds {
        let (x0, y0) = self.pixel_to_world(-0.5, -0.5);
        let (x1, y1) = self.pixel_to_world(self.width as f64 - 0.5, self.height as f64 - 0.5);
        Bounds::new(x0, y0, x1, y1)
    }
}

/// Geometry of one image slice as reported by the DICOM layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlane {
    /// Image position (patient) of the first pixel centre.
    pub position: [f64; 3],
    /// Row cosines followed by column cosines.
    pub orientation: [f64; 6],
    /// `[row spacing, column spacing]` in millimetres.
    pub pixel_spacing: [f64; 2],
    pub rows: usize,
    pub columns: usize,
    pub slice_thickness: Option<f64>,
}

/// Derives a shared raster frame for a set of structures.
///
/// The bounding box of every contour is expanded by the absolute margin per
/// axis plus one cell of slack and rounded up to whole cells.
#[derive(Debug)]
pub struct BuildGrid<'a> {
    structures: Vec<&'a Structure>,
    margin_x: f64,
    margin_y: f64,
    row_spacing: f64,
    col_spacing: f64,
}

impl<'a> BuildGrid<'a> {
    /// Creates a grid builder with isotropic `cell_mm` spacing and no margin.
    #[must_use]
    pub fn new(structures: &[&'a Structure], cell_mm: f64) -> Self {
        Self {
            structures: structures.to_vec(),
            margin_x: 0.0,
            margin_y: 0.0,
            row_spacing: cell_mm,
            col_spacing: cell_mm,
        }
    }

    /// Sets `[row, col]` spacing.
    #[must_use]
    pub fn with_spacing(mut self, pixel_spacing: [f64; 2]) -> Self {
        self.row_spacing = pixel_spacing[0];
        self.col_spacing = pixel_spacing[1];
        self
    }

    /// Reserves headroom for a margin of the given per-axis magnitude.
    #[must_use]
    pub fn with_margin(mut self, margin_x: f64, margin_y: f64) -> Self {
        self.margin_x = margin_x;
        self.margin_y = margin_y;
        self
    }

    /// Executes the builder. Empty inputs produce [`Grid::empty`].
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::NonPositiveSpacing` for invalid spacing.
    pub fn execute(&self) -> Result<Grid> {
        let bounds = self
            .structures
            .iter()
            .filter_map(|s| s.bounds())
            .reduce(|a, b| a.union(&b));
        match bounds {
            Some(b) => Grid::covering(
                &b,
                self.row_spacing,
                self.col_spacing,
                self.margin_x,
                self.margin_y,
            ),
            None => {
                // Still reject bad spacing so callers see the real problem.
                Grid::new(Point2::origin(), self.row_spacing, self.col_spacing, 0, 0)?;
                Ok(Grid::empty())
            }
        }
    }
}
