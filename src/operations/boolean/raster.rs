//! Raster backend: per-cell boolean logic on a shared grid.

use crate::error::Result;
use crate::grid::Grid;
use crate::model::Ring;
use crate::raster::{extract_contours_with, rasterize, ExtractOptions, Mask};

use super::select::BooleanOp;

/// `OR` for union, `AND` for intersect, `AND-NOT` for subtract.
///
/// # Errors
///
/// Returns `GeometryError::InvalidInput` when the masks differ in shape.
pub fn combine_masks(a: &Mask, b: &Mask, op: BooleanOp) -> Result<Mask> {
    match op {
        BooleanOp::Union => a.or(b),
        BooleanOp::Intersect => a.and(b),
        BooleanOp::Subtract => a.and_not(b),
    }
}

/// Rasterizes both ring sets on `grid`, combines them, and extracts rings.
///
/// # Errors
///
/// Propagates mask shape errors; none occur for masks built on one grid.
pub fn raster_boolean(
    a: &[Ring],
    b: &[Ring],
    op: BooleanOp,
    grid: &Grid,
    options: &ExtractOptions,
) -> Result<Vec<Ring>> {
    let mask = combine_masks(&rasterize(a, grid), &rasterize(b, grid), op)?;
    Ok(extract_contours_with(&mask, grid, options))
}

/// Grid with `[row, col]` spacing covering both ring sets, or `None` when
/// both are empty.
///
/// # Errors
///
/// Returns `GeometryError::NonPositiveSpacing` for invalid spacing.
pub fn grid_for_rings(a: &[Ring], b: &[Ring], spacing: [f64; 2]) -> Result<Option<Grid>> {
    let Some(bounds) = a
        .iter()
        .chain(b)
        .map(Ring::bounds)
        .reduce(|x, y| x.union(&y))
    else {
        return Ok(None);
    };
    Grid::covering(&bounds, spacing[0], spacing[1], 0.0, 0.0).map(Some)
}
