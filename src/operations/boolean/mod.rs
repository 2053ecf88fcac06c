//! Boolean operations on contour structures.
//!
//! Two interchangeable backends:
//!
//! - **Vector**: exact fixed-point polygon clipping (split, classify,
//!   select, assemble). Inputs it cannot handle, such as self-intersecting
//!   rings, fall back to the raster backend slice by slice.
//! - **Raster**: rasterize both operands on one grid, apply the per-cell
//!   operator, and extract contours again.

mod assemble;
mod classify;
mod engine;
mod fixed;
mod raster;
mod select;
mod split;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{ContourError, OperationError, Result};
use crate::grid::{BuildGrid, Grid};
use crate::model::{Ring, Slice, SliceKey, Structure};
use crate::raster::{rasterize, ExtractOptions};
use crate::safety::{CancelToken, SafetyGovernor};

pub use engine::vector_boolean;
pub use raster::{combine_masks, grid_for_rings, raster_boolean};
pub use select::BooleanOp;

/// Which engine computes a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Vector,
    Raster,
}

/// Combines two structures slice by slice.
///
/// The result holds one slice per z position present in either operand,
/// including empty slices, so merging it into an existing structure clears
/// slices the operation emptied.
#[derive(Debug)]
pub struct Combine<'a> {
    a: &'a Structure,
    b: &'a Structure,
    op: BooleanOp,
    backend: Backend,
    config: EngineConfig,
    pixel_spacing: Option<[f64; 2]>,
    cancel: Option<CancelToken>,
}

impl<'a> Combine<'a> {
    /// Creates a new `Combine` operation with the default backend and config.
    #[must_use]
    pub fn new(a: &'a Structure, b: &'a Structure, op: BooleanOp) -> Self {
        Self {
            a,
            b,
            op,
            backend: Backend::default(),
            config: EngineConfig::default(),
            pixel_spacing: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Raster working resolution `[row, col]` in millimetres.
    #[must_use]
    pub fn with_pixel_spacing(mut self, pixel_spacing: [f64; 2]) -> Self {
        self.pixel_spacing = Some(pixel_spacing);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Executes the boolean.
    ///
    /// A slice whose computation fails keeps operand A's original rings.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::NonPositiveSpacing` for an invalid pixel
    /// spacing and `JobError::Canceled` if the job was canceled.
    pub fn execute(&self) -> Result<Vec<Slice>> {
        let governor = SafetyGovernor::new(self.config).with_cancel(self.cancel.clone());
        let cell = self.config.default_cell_mm;
        let grid = BuildGrid::new(&[self.a, self.b], cell)
            .with_spacing(self.pixel_spacing.unwrap_or([cell, cell]))
            .execute()?;

        let mut positions: BTreeMap<SliceKey, f64> = BTreeMap::new();
        for s in self.a.slices().chain(self.b.slices()) {
            positions.entry(s.key()).or_insert(s.z);
        }
        let inputs: Vec<Slice> = positions
            .values()
            .map(|&z| {
                self.a
                    .slice(z)
                    .cloned()
                    .unwrap_or_else(|| Slice::new(z, Vec::new()))
            })
            .collect();
        debug!(
            op = ?self.op,
            backend = ?self.backend,
            slices = inputs.len(),
            "combining structures"
        );

        governor.process_slices(&inputs, |slice| {
            let a = governor.cap_slice(slice);
            let b = self
                .b
                .slice(slice.z)
                .map_or_else(|| Slice::new(slice.z, Vec::new()), |s| governor.cap_slice(s));
            let rings = combine_on_grid(&a.rings, &b.rings, self.op, self.backend, &self.config, &grid)?;
            Ok(Slice::new(slice.z, rings))
        })
    }
}

/// Boolean of two ring sets on a single slice.
///
/// The raster grid (used by the raster backend, fallback, and verification)
/// covers both operands at the config's default cell size.
///
/// # Errors
///
/// Returns `GeometryError::NonPositiveSpacing` when `default_cell_mm` is not
/// a positive number.
pub fn combine_rings(
    a: &[Ring],
    b: &[Ring],
    op: BooleanOp,
    backend: Backend,
    config: &EngineConfig,
) -> Result<Vec<Ring>> {
    let cell = config.default_cell_mm;
    match grid_for_rings(a, b, [cell, cell])? {
        Some(grid) => combine_on_grid(a, b, op, backend, config, &grid),
        None => Ok(Vec::new()),
    }
}

fn combine_on_grid(
    a: &[Ring],
    b: &[Ring],
    op: BooleanOp,
    backend: Backend,
    config: &EngineConfig,
    grid: &Grid,
) -> Result<Vec<Ring>> {
    let options = ExtractOptions::from_config(config, grid);
    match backend {
        Backend::Raster => raster_boolean(a, b, op, grid, &options),
        Backend::Vector => match vector_boolean(a, b, op, config.fixed_point_scale) {
            Ok(rings) => {
                if config.verify_backends {
                    verify_against_raster(&rings, a, b, op, config, grid)?;
                }
                Ok(rings)
            }
            Err(ContourError::Geometry(err)) => {
                warn!(%err, ?op, "vector boolean failed, falling back to raster");
                raster_boolean(a, b, op, grid, &options)
            }
            Err(err) => Err(err),
        },
    }
}

/// Logs a `BackendMismatch` when the vector result and the raster result
/// disagree by more than the configured Dice threshold.
fn verify_against_raster(
    vector: &[Ring],
    a: &[Ring],
    b: &[Ring],
    op: BooleanOp,
    config: &EngineConfig,
    grid: &Grid,
) -> Result<()> {
    let expected = combine_masks(&rasterize(a, grid), &rasterize(b, grid), op)?;
    let dice = rasterize(vector, grid).dice(&expected)?;
    if dice < config.mismatch_dice_threshold {
        let err = OperationError::BackendMismatch { dice };
        warn!(%err, ?op, threshold = config.mismatch_dice_threshold, "backend cross-check");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point2;
    use crate::model::{Color, Contour};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        Ring::new(vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ])
        .unwrap()
    }

    #[allow(clippy::cast_precision_loss)]
    fn circle(cx: f64, cy: f64, r: f64, n: usize) -> Ring {
        Ring::new(
            (0..n)
                .map(|i| {
                    let t = i as f64 / n as f64 * std::f64::consts::TAU;
                    Point2::new(cx + r * t.cos(), cy + r * t.sin())
                })
                .collect(),
        )
        .unwrap()
    }

    fn structure(name: &str, rings: &[(Ring, f64)]) -> Structure {
        let mut s = Structure::new(name, Color::rgb(0, 255, 0));
        for (r, z) in rings {
            s.add_contour(Contour::from_ring(r.clone(), *z));
        }
        s
    }

    fn area(rings: &[Ring]) -> f64 {
        rings.iter().map(Ring::signed_area).sum()
    }

    #[test]
    fn overlapping_circles_union_to_one_boundary() {
        let a = [circle(0.0, 0.0, 10.0, 96)];
        let b = [circle(5.0, 0.0, 10.0, 96)];
        for backend in [Backend::Vector, Backend::Raster] {
            let out = combine_rings(&a, &b, BooleanOp::Union, backend, &EngineConfig::default())
                .unwrap();
            assert_eq!(out.len(), 1, "{backend:?}");
            let width = out[0].bounds().width();
            assert!((width - 25.0).abs() < 0.6, "{backend:?} width {width}");
        }
    }

    #[test]
    fn self_intersecting_input_falls_back_to_raster() {
        let bow = Ring::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 10.0),
            Point2::new(20.0, 0.0),
            Point2::new(0.0, 4.0),
        ])
        .unwrap();
        let b = [rect(30.0, 30.0, 31.0, 31.0)];
        let out = combine_rings(
            &[bow],
            &b,
            BooleanOp::Union,
            Backend::Vector,
            &EngineConfig::default(),
        )
        .unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn combine_keeps_every_slice_position() {
        let a = structure("A", &[(rect(0.0, 0.0, 10.0, 10.0), 0.0), (rect(0.0, 0.0, 10.0, 10.0), 3.0)]);
        let b = structure("B", &[(rect(5.0, 0.0, 15.0, 10.0), 0.0), (rect(0.0, 0.0, 2.0, 2.0), 6.0)]);

        let union = Combine::new(&a, &b, BooleanOp::Union).execute().unwrap();
        let zs: Vec<f64> = union.iter().map(|s| s.z).collect();
        assert_eq!(zs, vec![0.0, 3.0, 6.0]);
        assert!((union[0].area() - 150.0).abs() < 1e-6);
        assert!((union[2].area() - 4.0).abs() < 1e-6);

        let diff = Combine::new(&a, &b, BooleanOp::Subtract).execute().unwrap();
        assert!((diff[0].area() - 50.0).abs() < 1e-6);
        assert!((diff[1].area() - 100.0).abs() < 1e-6);
        assert!(diff[2].is_empty());
    }

    #[test]
    fn subtract_itself_empties_every_slice() {
        let a = structure("A", &[(rect(0.0, 0.0, 10.0, 10.0), 0.0), (circle(0.0, 0.0, 3.0, 32), 2.0)]);
        for backend in [Backend::Vector, Backend::Raster] {
            let out = Combine::new(&a, &a, BooleanOp::Subtract)
                .with_backend(backend)
                .with_pixel_spacing([0.5, 0.5])
                .execute()
                .unwrap();
            assert_eq!(out.len(), 2);
            assert!(out.iter().all(Slice::is_empty), "{backend:?}");
        }
    }

    #[test]
    fn canceled_combine_reports_canceled() {
        let a = structure("A", &[(rect(0.0, 0.0, 10.0, 10.0), 0.0)]);
        let token = CancelToken::new();
        token.cancel();
        let err = Combine::new(&a, &a, BooleanOp::Union)
            .with_cancel(Some(token))
            .execute()
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn verification_runs_without_changing_the_result() {
        let config = EngineConfig {
            verify_backends: true,
            ..EngineConfig::default()
        };
        let a = [rect(0.0, 0.0, 10.0, 10.0)];
        let b = [rect(5.0, 5.0, 15.0, 15.0)];
        let out = combine_rings(&a, &b, BooleanOp::Intersect, Backend::Vector, &config).unwrap();
        assert!((area(&out) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn backend_names_parse() {
        let b: Backend = serde_json::from_str("\"raster\"").unwrap();
        assert_eq!(b, Backend::Raster);
    }
}
