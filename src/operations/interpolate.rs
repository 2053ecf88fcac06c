//! Slice interpolation.
//!
//! Fills an unpopulated z position from the nearest populated slice on each
//! side. Rings are paired by role and nearest centroid, brought into vertex
//! correspondence (common orientation, canonical start, equal counts by
//! arc-length resampling, best cyclic shift), and blended linearly. A blend
//! that crosses itself is repaired through the raster boolean backend.

use tracing::{debug, warn};

use crate::config::constants::TOLERANCE;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::math::intersect_2d::first_self_intersection;
use crate::math::polygon_2d::{resample, rotate_to_canonical_start, vertex_mean};
use crate::math::Point2;
use crate::model::{Ring, RingRole, Slice, Structure, TaggedRing, VipStructure};
use crate::operations::boolean::{combine_rings, Backend, BooleanOp};
use crate::safety::{CancelToken, SafetyGovernor};

/// Result for one requested z position.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationOutcome {
    Interpolated(Slice),
    /// The gap stays unfilled.
    NotApplicable { z: f64, reason: String },
}

/// Synthesizes slices between the populated slices of a structure.
#[derive(Debug)]
pub struct InterpolateSlices<'a> {
    structure: &'a Structure,
    targets: Option<Vec<f64>>,
    config: EngineConfig,
    cancel: Option<CancelToken>,
}

impl<'a> InterpolateSlices<'a> {
    /// Creates an interpolation over every gap wider than the structure's
    /// slice spacing.
    #[must_use]
    pub fn new(structure: &'a Structure) -> Self {
        Self {
            structure,
            targets: None,
            config: EngineConfig::default(),
            cancel: None,
        }
    }

    /// Interpolates exactly these z positions instead.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<f64>) -> Self {
        self.targets = Some(targets);
        self
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

    /// Default targets: positions at the slice spacing inside every gap.
    #[must_use]
    pub fn gap_positions(&self) -> Vec<f64> {
        let Some(spacing) = self.structure.slice_spacing() else {
            return Vec::new();
        };
        let zs = self.structure.slice_positions();
        let mut out = Vec::new();
        for w in zs.windows(2) {
            let mut z = w[0] + spacing;
            while z < w[1] - spacing * 0.5 {
                out.push(z);
                z += spacing;
            }
        }
        out
    }

    /// Executes the interpolation, one outcome per target in order.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Canceled` if the job was canceled.
    pub fn execute(&self) -> Result<Vec<InterpolationOutcome>> {
        let targets = self.targets.clone().unwrap_or_else(|| self.gap_positions());
        let governor = SafetyGovernor::new(self.config).with_cancel(self.cancel.clone());
        debug!(targets = targets.len(), "interpolating slices");
        governor.map_chunked(&targets, |&z| self.outcome_at(z, &governor))
    }

    /// Both bounding slices and the blended result are held to the point cap.
    fn outcome_at(&self, z: f64, governor: &SafetyGovernor) -> InterpolationOutcome {
        let not_applicable = |reason: String| InterpolationOutcome::NotApplicable { z, reason };
        if self.structure.slice(z).is_some() {
            return not_applicable("slice already populated".into());
        }
        let below = self.structure.slices().filter(|s| s.z < z).last();
        let above = self.structure.slices().find(|s| s.z > z);
        let (Some(lo), Some(hi)) = (below, above) else {
            return not_applicable("no populated slice on both sides".into());
        };
        let gap = hi.z - lo.z;
        if gap > self.config.max_interpolation_gap_mm {
            return not_applicable(format!(
                "bounding slices {gap:.2} mm apart exceed the {:.2} mm limit",
                self.config.max_interpolation_gap_mm
            ));
        }
        let t = (z - lo.z) / gap;
        let (lo, hi) = (governor.cap_slice(lo), governor.cap_slice(hi));
        let blended = interpolate_between(&lo, &hi, t, z, &self.config);
        InterpolationOutcome::Interpolated(governor.cap_slice(&blended))
    }
}

/// Blends two slices at parameter `t` in `[0, 1]` and places the result at `z`.
#[must_use]
pub fn interpolate_between(lo: &Slice, hi: &Slice, t: f64, z: f64, config: &EngineConfig) -> Slice {
    let lo_tagged = VipStructure::tag_rings(&lo.rings);
    let hi_tagged = VipStructure::tag_rings(&hi.rings);
    let mut rings = Vec::new();
    for role in [RingRole::Solid, RingRole::Hole] {
        let a: Vec<&TaggedRing> = lo_tagged.iter().filter(|r| r.role == role).collect();
        let b: Vec<&TaggedRing> = hi_tagged.iter().filter(|r| r.role == role).collect();
        let (pairs, lone_a, lone_b) = pair_by_centroid(&a, &b);
        for (i, j) in pairs {
            let blended = morph(&a[i].ring, &b[j].ring, t, config.interpolation_samples);
            rings.extend(finish(blended, role, z, config));
        }
        // Rings without a partner shrink towards their own centre.
        for i in lone_a {
            rings.extend(shrink_towards_centre(&a[i].ring, 1.0 - t));
        }
        for j in lone_b {
            rings.extend(shrink_towards_centre(&b[j].ring, t));
        }
    }
    Slice::new(z, rings)
}

type Pairing = (Vec<(usize, usize)>, Vec<usize>, Vec<usize>);

/// Greedy nearest-centroid matching.
fn pair_by_centroid(a: &[&TaggedRing], b: &[&TaggedRing]) -> Pairing {
    let centre = |r: &TaggedRing| vertex_mean(r.ring.points()).unwrap_or_else(Point2::origin);
    let ca: Vec<Point2> = a.iter().map(|&r| centre(r)).collect();
    let cb: Vec<Point2> = b.iter().map(|&r| centre(r)).collect();
    let mut candidates: Vec<(f64, usize, usize)> = ca
        .iter()
        .enumerate()
        .flat_map(|(i, p)| cb.iter().enumerate().map(move |(j, q)| ((p - q).norm(), i, j)))
        .collect();
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0));
    let mut used_a = vec![false; a.len()];
    let mut used_b = vec![false; b.len()];
    let mut pairs = Vec::new();
    for (_, i, j) in candidates {
        if !used_a[i] && !used_b[j] {
            used_a[i] = true;
            used_b[j] = true;
            pairs.push((i, j));
        }
    }
    let lone_a = (0..a.len()).filter(|&i| !used_a[i]).collect();
    let lone_b = (0..b.len()).filter(|&j| !used_b[j]).collect();
    (pairs, lone_a, lone_b)
}

/// Vertex-wise linear blend of two rings after establishing correspondence.
fn morph(a: &Ring, b: &Ring, t: f64, min_samples: usize) -> Vec<Point2> {
    let mut pa = rotate_to_canonical_start(&a.oriented(true).into_points());
    let mut pb = rotate_to_canonical_start(&b.oriented(true).into_points());
    if pa.len() != pb.len() {
        let count = pa.len().max(pb.len()).max(min_samples);
        pa = resample(&pa, count);
        pb = resample(&pb, count);
    }
    let shift = best_shift(&pa, &pb);
    let n = pa.len();
    (0..n)
        .map(|i| {
            let p = pa[i];
            let q = pb[(i + shift) % n];
            p + (q - p) * t
        })
        .collect()
}

/// Cyclic shift of `b` minimizing the summed squared distance to `a`, both
/// taken relative to their vertex means.
fn best_shift(a: &[Point2], b: &[Point2]) -> usize {
    let n = a.len();
    if n == 0 || b.len() != n {
        return 0;
    }
    let (Some(ca), Some(cb)) = (vertex_mean(a), vertex_mean(b)) else {
        return 0;
    };
    let ra: Vec<_> = a.iter().map(|p| p - ca).collect();
    let rb: Vec<_> = b.iter().map(|p| p - cb).collect();
    (0..n)
        .map(|s| {
            let cost: f64 = (0..n).map(|i| (ra[i] - rb[(i + s) % n]).norm_squared()).sum();
            (s, cost)
        })
        .min_by(|x, y| x.1.total_cmp(&y.1))
        .map_or(0, |(s, _)| s)
}

/// Builds the blended ring, repairing self-intersections on the raster.
fn finish(points: Vec<Point2>, role: RingRole, z: f64, config: &EngineConfig) -> Vec<Ring> {
    let solid = role == RingRole::Solid;
    if let Some(at) = first_self_intersection(&points) {
        warn!(z, x = at.x, y = at.y, "interpolated ring self-intersects, repairing");
        let Ok(ring) = Ring::new(points) else {
            return Vec::new();
        };
        return match combine_rings(&[ring], &[], BooleanOp::Union, Backend::Raster, config) {
            Ok(repaired) => repaired.into_iter().map(|r| r.oriented(solid)).collect(),
            Err(err) => {
                warn!(z, %err, "repair failed, dropping ring");
                Vec::new()
            }
        };
    }
    Ring::new(points)
        .map(|r| vec![r.oriented(solid)])
        .unwrap_or_default()
}

fn shrink_towards_centre(ring: &Ring, factor: f64) -> Option<Ring> {
    if factor < TOLERANCE {
        return None;
    }
    let c = vertex_mean(ring.points())?;
    Ring::new(ring.points().iter().map(|p| c + (p - c) * factor).collect()).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Color, Contour};
    use approx::assert_abs_diff_eq;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        Ring::new(vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ])
        .unwrap()
    }

    fn structure(slices: &[(f64, Vec<Ring>)]) -> Structure {
        let mut s = Structure::new("GTV", Color::rgb(255, 0, 255));
        for (z, rings) in slices {
            for r in rings {
                s.add_contour(Contour::from_ring(r.clone(), *z));
            }
        }
        s
    }

    #[test]
    fn translated_square_is_blended_halfway() {
        let s = structure(&[
            (0.0, vec![rect(0.0, 0.0, 10.0, 10.0)]),
            (6.0, vec![rect(10.0, 0.0, 20.0, 10.0)]),
        ]);
        let out = InterpolateSlices::new(&s).with_targets(vec![3.0]).execute().unwrap();
        let InterpolationOutcome::Interpolated(slice) = &out[0] else {
            panic!("expected a slice, got {out:?}");
        };
        assert_abs_diff_eq!(slice.z, 3.0);
        let b = slice.bounds().unwrap();
        assert_abs_diff_eq!(b.min_x, 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.max_x, 15.0, epsilon = 1e-9);
        assert_abs_diff_eq!(slice.area(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn different_vertex_counts_are_resampled() {
        let octagon = Ring::new(
            (0..8)
                .map(|i| {
                    let a = f64::from(i) * std::f64::consts::FRAC_PI_4;
                    Point2::new(5.0 * a.cos(), 5.0 * a.sin())
                })
                .collect(),
        )
        .unwrap();
        let s = structure(&[
            (0.0, vec![rect(-5.0, -5.0, 5.0, 5.0)]),
            (2.0, vec![octagon]),
        ]);
        let out = InterpolateSlices::new(&s).with_targets(vec![1.0]).execute().unwrap();
        let InterpolationOutcome::Interpolated(slice) = &out[0] else {
            panic!("expected a slice");
        };
        assert_eq!(slice.rings.len(), 1);
        let area = slice.area();
        assert!(area > 70.0 && area < 100.0, "area {area}");
    }

    #[test]
    fn dense_bounding_slices_respect_the_point_cap() {
        let circle = |n: u32| {
            Ring::new(
                (0..n)
                    .map(|i| {
                        let a = f64::from(i) * std::f64::consts::TAU / f64::from(n);
                        Point2::new(20.0 * a.cos(), 20.0 * a.sin())
                    })
                    .collect(),
            )
            .unwrap()
        };
        let s = structure(&[(0.0, vec![circle(2000)]), (10.0, vec![circle(1999)])]);
        let config = EngineConfig {
            max_points_per_contour: 100,
            ..EngineConfig::default()
        };
        let out = InterpolateSlices::new(&s)
            .with_config(config)
            .with_targets(vec![5.0])
            .execute()
            .unwrap();
        let InterpolationOutcome::Interpolated(slice) = &out[0] else {
            panic!("expected an interpolated slice, got {out:?}");
        };
        assert!(!slice.rings.is_empty());
        assert!(slice.rings.iter().all(|r| r.len() <= 100), "ring over the cap");
    }

    #[test]
    fn gaps_beyond_the_limit_are_not_applicable() {
        let s = structure(&[
            (0.0, vec![rect(0.0, 0.0, 1.0, 1.0)]),
            (30.0, vec![rect(0.0, 0.0, 1.0, 1.0)]),
        ]);
        let out = InterpolateSlices::new(&s)
            .with_targets(vec![15.0, 40.0, 0.0])
            .execute()
            .unwrap();
        assert!(out
            .iter()
            .all(|o| matches!(o, InterpolationOutcome::NotApplicable { .. })));
    }

    #[test]
    fn default_targets_fill_missing_positions() {
        let square = rect(0.0, 0.0, 4.0, 4.0);
        let s = structure(&[
            (0.0, vec![square.clone()]),
            (2.0, vec![square.clone()]),
            (8.0, vec![square]),
        ]);
        let interp = InterpolateSlices::new(&s);
        assert_eq!(interp.gap_positions(), vec![4.0, 6.0]);
        let out = interp.execute().unwrap();
        assert_eq!(out.len(), 2);
        assert!(out
            .iter()
            .all(|o| matches!(o, InterpolationOutcome::Interpolated(s) if (s.area() - 16.0).abs() < 1e-9)));
    }

    #[test]
    fn unmatched_ring_shrinks_towards_its_centre() {
        let s = structure(&[
            (0.0, vec![rect(0.0, 0.0, 4.0, 4.0), rect(20.0, 0.0, 24.0, 4.0)]),
            (2.0, vec![rect(0.0, 0.0, 4.0, 4.0)]),
        ]);
        let out = InterpolateSlices::new(&s).with_targets(vec![1.0]).execute().unwrap();
        let InterpolationOutcome::Interpolated(slice) = &out[0] else {
            panic!("expected a slice");
        };
        assert_eq!(slice.rings.len(), 2);
        assert_abs_diff_eq!(slice.area(), 16.0 + 4.0, epsilon = 1e-9);
    }

    #[test]
    fn holes_are_blended_with_holes() {
        let s = structure(&[
            (0.0, vec![rect(0.0, 0.0, 10.0, 10.0), rect(2.0, 2.0, 4.0, 4.0)]),
            (2.0, vec![rect(0.0, 0.0, 10.0, 10.0), rect(4.0, 2.0, 6.0, 4.0)]),
        ]);
        let out = InterpolateSlices::new(&s).with_targets(vec![1.0]).execute().unwrap();
        let InterpolationOutcome::Interpolated(slice) = &out[0] else {
            panic!("expected a slice");
        };
        assert_abs_diff_eq!(slice.area(), 96.0, epsilon = 1e-9);
        let hole = slice.rings.iter().find(|r| r.is_clockwise()).unwrap();
        assert_abs_diff_eq!(hole.bounds().min_x, 3.0, epsilon = 1e-9);
    }
}
