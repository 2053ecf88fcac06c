//! Morphological margins (grow / shrink) on contour structures.
//!
//! The committed result is always computed on the raster: every slice is
//! rasterized on a grid with headroom for the margin, dilated or eroded with an
//! elliptical structuring element, and traced back to rings. A non-zero
//! `marginZ` turns the element into an ellipsoid spanning neighbouring slices.
//! [`preview`] offers a cheap vector approximation for interactive dragging.

pub mod preview;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::constants::TOLERANCE;
use crate::config::EngineConfig;
use crate::error::{OperationError, Result};
use crate::grid::BuildGrid;
use crate::model::{Ring, Slice, SliceKey, Structure, VipStructure};
use crate::operations::interpolate::{InterpolateSlices, InterpolationOutcome};
use crate::raster::morphology::{dilate, erode};
use crate::raster::{try_extract_contours, ExtractOptions, Mask, MaskStructure, StructuringElement};
use crate::safety::{CancelToken, SafetyGovernor};

pub use preview::{MarginPreview, PreviewMode};

/// Margin request as sent by the editing layer.
///
/// Per-axis values default to `margin_value` in-plane and to zero along z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginParams {
    pub margin_value: f64,
    #[serde(default)]
    pub margin_x: Option<f64>,
    #[serde(default)]
    pub margin_y: Option<f64>,
    #[serde(default)]
    pub margin_z: Option<f64>,
    /// `[row, col]` raster resolution in millimetres.
    #[serde(default)]
    pub pixel_spacing: Option<[f64; 2]>,
    /// Keep at most this many outer rings (largest first) per slice.
    #[serde(default)]
    pub max_contours: Option<usize>,
    /// Fill gaps in the slice stack by interpolation before applying the margin.
    #[serde(default)]
    pub interpolate_slices: bool,
}

impl MarginParams {
    /// Isotropic in-plane margin.
    #[must_use]
    pub fn uniform(margin_mm: f64) -> Self {
        Self {
            margin_value: margin_mm,
            margin_x: None,
            margin_y: None,
            margin_z: None,
            pixel_spacing: None,
            max_contours: None,
            interpolate_slices: false,
        }
    }

    #[must_use]
    pub fn with_axes(mut self, x: f64, y: f64, z: f64) -> Self {
        self.margin_x = Some(x);
        self.margin_y = Some(y);
        self.margin_z = Some(z);
        self
    }

    /// Resolved `(x, y, z)` margins in millimetres.
    #[must_use]
    pub fn axes(&self) -> [f64; 3] {
        [
            self.margin_x.unwrap_or(self.margin_value),
            self.margin_y.unwrap_or(self.margin_value),
            self.margin_z.unwrap_or(0.0),
        ]
    }
}

/// Applies a margin to every slice of a structure.
///
/// Mixed-sign margins run as a dilation by the positive components followed
/// by an erosion by the negative ones. The result lists every input slice
/// position (empty when the margin erased it) plus any slices synthesized by
/// a z margin.
#[derive(Debug)]
pub struct Margin<'a> {
    structure: &'a Structure,
    params: MarginParams,
    config: EngineConfig,
    cancel: Option<CancelToken>,
}

impl<'a> Margin<'a> {
    /// Creates a new `Margin` operation with the default config.
    #[must_use]
    pub fn new(structure: &'a Structure, params: MarginParams) -> Self {
        Self {
            structure,
            params,
            config: EngineConfig::default(),
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Executes the margin.
    ///
    /// A slice whose morphology or tracing fails keeps its original rings
    /// while the rest of the batch completes.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::NonPositiveSpacing` for an invalid pixel
    /// spacing and `JobError::Canceled` if the job was canceled.
    pub fn execute(&self) -> Result<Vec<Slice>> {
        let governor = SafetyGovernor::new(self.config).with_cancel(self.cancel.clone());
        let [mx, my, mz] = self.params.axes().map(|m| governor.clamp_margin(m));

        if [mx, my, mz].iter().all(|m| m.abs() < TOLERANCE) {
            let mut unchanged = self.structure.clone();
            if self.params.interpolate_slices {
                self.fill_gaps(&mut unchanged)?;
            }
            return Ok(unchanged.slices().cloned().collect());
        }

        let mut source = self.capped_source(&governor);
        if self.params.interpolate_slices {
            self.fill_gaps(&mut source)?;
        }
        let positions = source.slice_positions();
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let grow = [mx.max(0.0), my.max(0.0), mz.max(0.0)];
        let shrink = [(-mx).max(0.0), (-my).max(0.0), (-mz).max(0.0)];
        let cell = self.config.default_cell_mm;
        let grid = BuildGrid::new(&[&source], cell)
            .with_spacing(self.params.pixel_spacing.unwrap_or([cell, cell]))
            .with_margin(grow[0], grow[1])
            .execute()?;
        debug!(
            margin = ?[mx, my, mz],
            slices = positions.len(),
            width = grid.width(),
            height = grid.height(),
            "applying margin"
        );

        let mut failed = BTreeSet::new();
        let mut masks = MaskStructure::from_structure(&source, &grid);
        let dz = source.slice_spacing().unwrap_or(mz.abs());
        if grow.iter().any(|&m| m > TOLERANCE) {
            masks = morph_phase(&masks, grow, dz, true, &governor, &mut failed)?;
        }
        if shrink.iter().any(|&m| m > TOLERANCE) {
            masks = morph_phase(&masks, shrink, dz, false, &governor, &mut failed)?;
        }
        governor.check()?;

        let originals: Vec<Slice> = masks
            .slices
            .values()
            .map(|s| {
                self.structure
                    .slice(s.z)
                    .or_else(|| source.slice(s.z))
                    .cloned()
                    .unwrap_or_else(|| Slice::new(s.z, Vec::new()))
            })
            .collect();
        let options = ExtractOptions::from_config(&self.config, &grid);
        let max_contours = self.params.max_contours;
        trace_slices(&governor, &originals, &failed, |z| {
            let mask = masks
                .get(z)
                .ok_or_else(|| OperationError::Failed(format!("no mask at z = {z}")))?;
            let rings = try_extract_contours(mask, &grid, &options)?;
            Ok(match max_contours {
                Some(n) => keep_largest(rings, n),
                None => rings,
            })
        })
    }

    fn capped_source(&self, governor: &SafetyGovernor) -> Structure {
        Structure::new(self.structure.name.clone(), self.structure.color)
            .with_slices(self.structure.slices().map(|s| governor.cap_slice(s)))
    }

    fn fill_gaps(&self, source: &mut Structure) -> Result<()> {
        let outcomes = InterpolateSlices::new(source)
            .with_config(self.config)
            .with_cancel(self.cancel.clone())
            .execute()?;
        for outcome in outcomes {
            if let InterpolationOutcome::Interpolated(slice) = outcome {
                source.set_slice(slice);
            }
        }
        Ok(())
    }
}

/// One dilation or erosion pass with radii `[x, y, z]` in millimetres.
///
/// Slices that fail are recorded in `failed` and carry their pre-phase mask.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn morph_phase(
    masks: &MaskStructure,
    radii: [f64; 3],
    dz: f64,
    grow: bool,
    governor: &SafetyGovernor,
    failed: &mut BTreeSet<SliceKey>,
) -> Result<MaskStructure> {
    let grid = masks.grid;
    let [rx, ry, rz] = radii;
    let steps = if rz > TOLERANCE && dz > TOLERANCE {
        ((rz + TOLERANCE) / dz).floor()
    } else {
        0.0
    };

    let sources: Vec<(f64, &Mask)> = masks.slices.values().map(|s| (s.z, &s.mask)).collect();
    if steps < 1.0 {
        let se = StructuringElement::from_margin(rx, ry, &grid);
        let results = governor.try_map_chunked(&sources, |&(_, mask)| {
            Ok(if grow { dilate(mask, &se) } else { erode(mask, &se) })
        })?;
        let zs = sources.iter().map(|&(z, _)| z);
        return Ok(collect_masks(masks, zs.zip(results), failed));
    }

    let n = steps as i64;
    // Element for each whole-slice offset k = 0..=n.
    let elements: Vec<StructuringElement> = (0..=n)
        .map(|k| {
            let d = (k as f64 * dz / rz).min(1.0);
            let f = (1.0 - d * d).max(0.0).sqrt();
            StructuringElement::from_margin(rx * f, ry * f, &grid)
        })
        .collect();

    let targets: Vec<f64> = if grow {
        let mut zs: BTreeMap<SliceKey, f64> = BTreeMap::new();
        for &(z, _) in &sources {
            for k in -n..=n {
                let t = z + k as f64 * dz;
                zs.entry(SliceKey::from_z(t)).or_insert(t);
            }
        }
        zs.into_values().collect()
    } else {
        sources.iter().map(|&(z, _)| z).collect()
    };

    let results = governor.try_map_chunked(&targets, |&z| {
        let mut acc: Option<Mask> = None;
        for k in -n..=n {
            let se = &elements[k.unsigned_abs() as usize];
            let neighbour = masks.get(z + k as f64 * dz);
            let m = match (neighbour, grow) {
                (Some(mask), true) => dilate(mask, se),
                (Some(mask), false) => erode(mask, se),
                (None, true) => continue,
                // Missing neighbours are background; erosion against them is empty.
                (None, false) => return Ok(Mask::for_grid(&grid)),
            };
            acc = Some(match acc {
                None => m,
                Some(prev) if grow => prev.or(&m)?,
                Some(prev) => prev.and(&m)?,
            });
        }
        Ok(acc.unwrap_or_else(|| Mask::for_grid(&grid)))
    })?;
    Ok(collect_masks(masks, targets.into_iter().zip(results), failed))
}

/// Gathers a phase's output masks. A failed slice keeps the mask it had
/// before the phase and is remembered in `failed`.
fn collect_masks(
    before: &MaskStructure,
    results: impl IntoIterator<Item = (f64, Result<Mask>)>,
    failed: &mut BTreeSet<SliceKey>,
) -> MaskStructure {
    let mut out = MaskStructure::new(before.grid);
    for (z, result) in results {
        match result {
            Ok(mask) => out.insert(z, mask),
            Err(err) => {
                warn!(z, %err, "margin failed on slice, keeping original");
                failed.insert(SliceKey::from_z(z));
                if let Some(mask) = before.get(z) {
                    out.insert(z, mask.clone());
                }
            }
        }
    }
    out
}

/// Traces the result rings of every slice in `originals`. Slices listed in
/// `failed`, and slices whose tracing fails or panics, keep their original
/// rings.
fn trace_slices<F>(
    governor: &SafetyGovernor,
    originals: &[Slice],
    failed: &BTreeSet<SliceKey>,
    trace: F,
) -> Result<Vec<Slice>>
where
    F: Fn(f64) -> Result<Vec<Ring>> + Sync,
{
    governor.process_slices(originals, |original| {
        if failed.contains(&original.key()) {
            return Ok(original.clone());
        }
        trace(original.z).map(|rings| Slice::new(original.z, rings))
    })
}

/// Keeps the `n` largest outer rings together with their holes.
fn keep_largest(rings: Vec<Ring>, n: usize) -> Vec<Ring> {
    let mut groups = VipStructure::group_nested(&VipStructure::tag_rings(&rings));
    if groups.len() <= n {
        return rings;
    }
    groups.sort_by(|(a, _), (b, _)| b.area().total_cmp(&a.area()));
    groups.truncate(n);
    groups
        .into_iter()
        .flat_map(|(solid, holes)| std::iter::once(solid).chain(holes))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::grid::Grid;
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

    fn stack(ring: &Ring, zs: &[f64]) -> Structure {
        let mut s = Structure::new("CTV", Color::rgb(255, 255, 0));
        for &z in zs {
            s.add_contour(Contour::from_ring(ring.clone(), z));
        }
        s
    }

    fn fine(params: MarginParams) -> MarginParams {
        MarginParams {
            pixel_spacing: Some([0.1, 0.1]),
            ..params
        }
    }

    #[test]
    fn params_parse_from_ui_payload() {
        let p: MarginParams = serde_json::from_str(
            r#"{ "marginValue": 5, "marginZ": 3, "pixelSpacing": [0.9, 0.9], "maxContours": 2 }"#,
        )
        .unwrap();
        assert_eq!(p.axes(), [5.0, 5.0, 3.0]);
        assert_eq!(p.max_contours, Some(2));
        assert!(!p.interpolate_slices);
    }

    #[test]
    fn dilated_square_gains_rounded_corners() {
        let s = stack(&rect(0.0, 0.0, 10.0, 10.0), &[0.0]);
        let out = Margin::new(&s, fine(MarginParams::uniform(1.0))).execute().unwrap();
        assert_eq!(out.len(), 1);
        let area = out[0].area();
        assert!(area > 144.0 - 3.0 && area < 148.0 * 1.05, "area {area}");
        let b = out[0].bounds().unwrap();
        assert!((b.width() - 12.0).abs() < 0.25, "width {}", b.width());
    }

    #[test]
    fn anisotropic_margin_grows_each_axis_separately() {
        let s = stack(&rect(0.0, 0.0, 10.0, 10.0), &[0.0]);
        let params = fine(MarginParams::uniform(0.0).with_axes(2.0, 0.5, 0.0));
        let out = Margin::new(&s, params).execute().unwrap();
        let b = out[0].bounds().unwrap();
        assert!((b.width() - 14.0).abs() < 0.25, "width {}", b.width());
        assert!((b.height() - 11.0).abs() < 0.25, "height {}", b.height());
    }

    #[test]
    fn erosion_past_the_shape_leaves_an_empty_slice() {
        let s = stack(&rect(0.0, 0.0, 4.0, 4.0), &[0.0, 2.0]);
        let out = Margin::new(&s, fine(MarginParams::uniform(-3.0))).execute().unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(Slice::is_empty));
    }

    #[test]
    fn zero_margin_is_identity() {
        let ring = rect(0.0, 0.0, 10.0, 10.0);
        let s = stack(&ring, &[0.0]);
        let out = Margin::new(&s, MarginParams::uniform(0.0)).execute().unwrap();
        assert_eq!(out[0].rings, vec![ring]);
    }

    #[test]
    fn zero_margin_returns_dense_rings_untouched() {
        let ring = Ring::new(
            (0..400)
                .map(|i| {
                    let a = f64::from(i) * std::f64::consts::TAU / 400.0;
                    Point2::new(5.0 * a.cos(), 5.0 * a.sin())
                })
                .collect(),
        )
        .unwrap();
        let s = stack(&ring, &[0.0, 2.0]);
        let config = EngineConfig {
            max_points_per_contour: 50,
            ..EngineConfig::default()
        };
        let out = Margin::new(&s, MarginParams::uniform(0.0))
            .with_config(config)
            .execute()
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|slice| slice.rings == vec![ring.clone()]));
    }

    #[test]
    fn failed_slice_keeps_its_original_rings() {
        let originals: Vec<Slice> = [0.0, 2.0, 4.0]
            .iter()
            .map(|&z| Slice::new(z, vec![rect(0.0, 0.0, 10.0, 10.0)]))
            .collect();
        let grown = rect(-1.0, -1.0, 11.0, 11.0);
        let failed = BTreeSet::from([SliceKey::from_z(4.0)]);
        let governor = SafetyGovernor::new(EngineConfig::default());
        let out = trace_slices(&governor, &originals, &failed, |z| {
            assert!(!(1.0..3.0).contains(&z), "tracing broke at z = {z}");
            Ok(vec![grown.clone()])
        })
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].rings, vec![grown.clone()]);
        assert_eq!(out[1], originals[1]);
        assert_eq!(out[2], originals[2]);
    }

    #[test]
    fn failed_phase_keeps_the_pre_phase_mask() {
        let grid = Grid::new(Point2::new(0.0, 0.0), 1.0, 1.0, 4, 4).unwrap();
        let mut before = MaskStructure::new(grid);
        let mut kept = Mask::for_grid(&grid);
        kept.set(1, 1, true);
        before.insert(2.0, kept.clone());
        let mut failed = BTreeSet::new();
        let results: Vec<(f64, Result<Mask>)> = vec![
            (0.0, Ok(Mask::for_grid(&grid))),
            (2.0, Err(OperationError::Failed("boom".into()).into())),
        ];
        let out = collect_masks(&before, results, &mut failed);
        assert_eq!(out.get(2.0), Some(&kept));
        assert!(out.get(0.0).is_some_and(Mask::is_empty));
        assert_eq!(failed, BTreeSet::from([SliceKey::from_z(2.0)]));
    }

    #[test]
    fn z_margin_synthesizes_slices_beyond_the_stack() {
        let s = stack(&rect(0.0, 0.0, 10.0, 10.0), &[0.0, 2.0, 4.0]);
        let params = MarginParams {
            pixel_spacing: Some([0.5, 0.5]),
            ..MarginParams::uniform(2.0).with_axes(2.0, 2.0, 4.0)
        };
        let out = Margin::new(&s, params).execute().unwrap();
        let zs: Vec<f64> = out.iter().map(|s| s.z).collect();
        assert_eq!(zs, vec![-4.0, -2.0, 0.0, 2.0, 4.0, 6.0, 8.0]);
        // The cap at the far end is only the original footprint.
        assert!((out[0].area() - 100.0).abs() < 10.0, "cap {}", out[0].area());
        assert!(out[3].area() > out[1].area());
    }

    #[test]
    fn z_erosion_removes_end_slices() {
        let s = stack(&rect(0.0, 0.0, 10.0, 10.0), &[0.0, 2.0, 4.0, 6.0]);
        let params = MarginParams {
            pixel_spacing: Some([0.5, 0.5]),
            ..MarginParams::uniform(0.0).with_axes(0.0, 0.0, -2.0)
        };
        let out = Margin::new(&s, params).execute().unwrap();
        assert_eq!(out.len(), 4);
        assert!(out[0].is_empty() && out[3].is_empty());
        assert!((out[1].area() - 100.0).abs() < 5.0, "area {}", out[1].area());
    }

    #[test]
    fn max_contours_keeps_the_largest() {
        let mut s = stack(&rect(0.0, 0.0, 10.0, 10.0), &[0.0]);
        s.add_contour(Contour::from_ring(rect(20.0, 0.0, 22.0, 2.0), 0.0));
        let params = MarginParams {
            max_contours: Some(1),
            ..fine(MarginParams::uniform(0.5))
        };
        let out = Margin::new(&s, params).execute().unwrap();
        assert_eq!(out[0].rings.len(), 1);
        assert!(out[0].area() > 100.0);
    }

    #[test]
    fn margin_is_clamped_to_the_configured_limit() {
        let s = stack(&rect(0.0, 0.0, 10.0, 10.0), &[0.0]);
        let config = EngineConfig {
            max_margin_mm: 1.0,
            ..EngineConfig::default()
        };
        let out = Margin::new(&s, MarginParams {
            pixel_spacing: Some([0.25, 0.25]),
            ..MarginParams::uniform(5.0)
        })
        .with_config(config)
        .execute()
        .unwrap();
        let b = out[0].bounds().unwrap();
        assert!((b.width() - 12.0).abs() < 0.5, "width {}", b.width());
    }
}
