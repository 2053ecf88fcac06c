//! Vector margin preview.
//!
//! Moves vertices instead of rasterizing, so it is cheap enough to follow a
//! slider. Corners are not rounded and crossings are not repaired; commit
//! with [`Margin`](super::Margin).

use serde::{Deserialize, Serialize};

use crate::math::polygon_2d::{left_normal, segment_direction, vertex_mean};
use crate::math::{Point2, Vector2, TOLERANCE};
use crate::model::{Ring, RingRole, Slice, TaggedRing, VipStructure};

/// How preview vertices move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// Radially away from the ring's vertex mean.
    #[default]
    Centroid,
    /// Along the averaged outward normal of the two adjacent edges.
    Normal,
}

/// Approximate grow / shrink of one slice.
#[derive(Debug, Clone, Copy)]
pub struct MarginPreview {
    margin_x: f64,
    margin_y: f64,
    mode: PreviewMode,
}

impl MarginPreview {
    #[must_use]
    pub fn new(margin_x: f64, margin_y: f64) -> Self {
        Self {
            margin_x,
            margin_y,
            mode: PreviewMode::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PreviewMode) -> Self {
        self.mode = mode;
        self
    }

    /// Previews every ring of `slice`; holes move opposite to solids.
    /// Rings that collapse are dropped.
    #[must_use]
    pub fn execute(&self, slice: &Slice) -> Slice {
        let rings = VipStructure::tag_rings(&slice.rings)
            .iter()
            .filter_map(|t| self.offset(t))
            .collect();
        Slice::new(slice.z, rings)
    }

    fn offset(&self, tagged: &TaggedRing) -> Option<Ring> {
        let points = tagged.ring.points();
        let moved: Vec<Point2> = match self.mode {
            PreviewMode::Centroid => {
                // Radial growth of a hole widens it, so holes take the
                // opposite sign.
                let sign = match tagged.role {
                    RingRole::Solid => 1.0,
                    RingRole::Hole => -1.0,
                };
                let c = vertex_mean(points)?;
                points
                    .iter()
                    .map(|p| {
                        let d = p - c;
                        let len = d.norm();
                        if len < TOLERANCE {
                            *p
                        } else {
                            p + self.scaled(d / len * sign)
                        }
                    })
                    .collect()
            }
            // Tagged rings are oriented (solids CCW, holes CW), so the right
            // normal points away from the material for both roles.
            PreviewMode::Normal => {
                let n = points.len();
                (0..n)
                    .map(|i| {
                        let prev = points[(i + n - 1) % n];
                        let next = points[(i + 1) % n];
                        let p = points[i];
                        let sum = [(prev, p), (p, next)]
                            .iter()
                            .filter_map(|(a, b)| segment_direction(a, b).ok())
                            .map(|dir| -left_normal(dir))
                            .fold(Vector2::zeros(), |acc, v| acc + v);
                        let len = sum.norm();
                        if len < TOLERANCE {
                            p
                        } else {
                            p + self.scaled(sum / len)
                        }
                    })
                    .collect()
            }
        };
        // An edge that flipped direction means the shrink passed through the shape.
        let n = points.len();
        let flipped = (0..n).any(|i| {
            let j = (i + 1) % n;
            (moved[j] - moved[i]).dot(&(points[j] - points[i])) <= 0.0
        });
        if flipped {
            return None;
        }
        Ring::new(moved).ok()
    }

    fn scaled(&self, dir: Vector2) -> Vector2 {
        Vector2::new(dir.x * self.margin_x, dir.y * self.margin_y)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square(x0: f64, y0: f64, s: f64) -> Ring {
        Ring::new(vec![
            Point2::new(x0, y0),
            Point2::new(x0 + s, y0),
            Point2::new(x0 + s, y0 + s),
            Point2::new(x0, y0 + s),
        ])
        .unwrap()
    }

    #[test]
    fn normal_mode_offsets_edges_of_a_square() {
        let slice = Slice::new(0.0, vec![square(0.0, 0.0, 10.0)]);
        let out = MarginPreview::new(1.0, 1.0)
            .with_mode(PreviewMode::Normal)
            .execute(&slice);
        let b = out.rings[0].bounds();
        // Corner vertices move along the diagonal by one unit.
        let step = std::f64::consts::FRAC_1_SQRT_2;
        assert_abs_diff_eq!(b.min_x, -step, epsilon = 1e-9);
        assert_abs_diff_eq!(b.max_x, 10.0 + step, epsilon = 1e-9);
    }

    #[test]
    fn centroid_mode_is_anisotropic() {
        let slice = Slice::new(0.0, vec![square(-5.0, -5.0, 10.0)]);
        let out = MarginPreview::new(2.0, 0.0).execute(&slice);
        let b = out.rings[0].bounds();
        assert!(b.width() > 10.0);
        assert_abs_diff_eq!(b.height(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn holes_shrink_when_the_solid_grows() {
        let slice = Slice::new(0.0, vec![square(0.0, 0.0, 20.0), square(5.0, 5.0, 10.0)]);
        for mode in [PreviewMode::Centroid, PreviewMode::Normal] {
            let out = MarginPreview::new(1.0, 1.0).with_mode(mode).execute(&slice);
            assert_eq!(out.rings.len(), 2);
            let hole = out.rings.iter().find(|r| r.is_clockwise()).unwrap();
            assert!(hole.area() < 100.0, "{mode:?} hole area {}", hole.area());
        }
    }

    #[test]
    fn over_shrunk_rings_vanish() {
        let slice = Slice::new(0.0, vec![square(0.0, 0.0, 2.0)]);
        let out = MarginPreview::new(-3.0, -3.0)
            .with_mode(PreviewMode::Normal)
            .execute(&slice);
        assert!(out.is_empty());
    }
}
