//! Engine configuration.
//!
//! [`EngineConfig`] carries the safety limits and raster parameters that every
//! operation reads. It is a plain value: hosts build one (or deserialize it from
//! their settings store) and hand a copy to each job.

use serde::{Deserialize, Serialize};

pub mod constants {
    //! Fixed numeric constants shared across the engine.

    /// Global geometric tolerance for floating-point comparisons.
    pub const TOLERANCE: f64 = 1e-10;

    /// Scale applied to millimetre coordinates before integer clipping.
    ///
    /// `1e6` gives nanometre resolution while keeping patient-sized coordinates
    /// (well under a metre) comfortably inside `i64`.
    pub const FIXED_POINT_SCALE: f64 = 1e6;

    /// Extra cells added around a derived grid so dilation never touches the border.
    pub const GRID_SLACK_CELLS: usize = 1;

    /// Slice positions are keyed after rounding to this many steps per millimetre.
    pub const SLICE_KEY_SCALE: f64 = 1000.0;
}

/// Tunable limits and resolutions for the contour engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Contours longer than this are stride-downsampled before processing.
    pub max_points_per_contour: usize,
    /// Absolute margin magnitude ceiling in millimetres.
    pub max_margin_mm: f64,
    /// Number of slices processed between cooperative yield points.
    pub yield_every_slices: usize,
    /// Raster cell size used when the caller supplies no pixel spacing.
    pub default_cell_mm: f64,
    /// Float to integer scale for the vector boolean backend.
    pub fixed_point_scale: f64,
    /// Extracted rings smaller than this area (mm²) are dropped as noise.
    pub min_component_area_mm2: f64,
    /// Douglas-Peucker tolerance applied to extracted rings; `0` disables it.
    pub simplify_tolerance_mm: f64,
    /// Bounding slices further apart than this are not interpolated between.
    pub max_interpolation_gap_mm: f64,
    /// Cross-check vector boolean results against the raster backend.
    pub verify_backends: bool,
    /// Dice coefficient below which a backend mismatch is reported.
    pub mismatch_dice_threshold: f64,
    /// Lower bound on the number of resampled vertices used when morphing.
    pub interpolation_samples: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_points_per_contour: 5000,
            max_margin_mm: 50.0,
            yield_every_slices: 8,
            default_cell_mm: 0.25,
            fixed_point_scale: constants::FIXED_POINT_SCALE,
            min_component_area_mm2: 0.01,
            simplify_tolerance_mm: 0.0,
            max_interpolation_gap_mm: 20.0,
            verify_backends: false,
            mismatch_dice_threshold: 0.95,
            interpolation_samples: 128,
        }
    }
}

impl EngineConfig {
    /// Minimum ring area for a grid with the given cell area.
    ///
    /// Never smaller than half a cell, so single-sample speckle is always dropped.
    #[must_use]
    pub fn min_area_for_cell(&self, cell_area: f64) -> f64 {
        self.min_component_area_mm2.max(cell_area * 0.5)
    }
}
