use super::{Point2, Vector2, TOLERANCE};
use crate::error::{GeometryError, Result};

/// Computes the signed area of a closed ring (shoelace formula).
///
/// Positive for counter-clockwise, negative for clockwise.
#[must_use]
pub fn signed_area(points: &[Point2]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    sum * 0.5
}

/// Unsigned area of a closed ring. Degenerate rings (fewer than three points or
/// collinear) have zero area.
#[must_use]
pub fn area(points: &[Point2]) -> f64 {
    let a = signed_area(points).abs();
    if a < TOLERANCE {
        0.0
    } else {
        a
    }
}

/// Returns `true` when the shoelace sum of the ring is negative.
#[must_use]
pub fn is_clockwise(points: &[Point2]) -> bool {
    signed_area(points) < 0.0
}

/// Area-weighted centroid of a closed ring.
///
/// # Errors
///
/// Returns `GeometryError::ZeroArea` when the ring encloses no area; the
/// centroid is undefined there.
pub fn centroid(points: &[Point2]) -> Result<Point2> {
    let n = points.len();
    let a = signed_area(points);
    if n < 3 || a.abs() < TOLERANCE {
        return Err(GeometryError::ZeroArea.into());
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let p = &points[i];
        let q = &points[(i + 1) % n];
        let cross = p.x * q.y - q.x * p.y;
        cx += (p.x + q.x) * cross;
        cy += (p.y + q.y) * cross;
    }
    let k = 1.0 / (6.0 * a);
    Ok(Point2::new(cx * k, cy * k))
}

/// Arithmetic mean of the vertices, or `None` for an empty slice.
#[must_use]
pub fn vertex_mean(points: &[Point2]) -> Option<Point2> {
    if points.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let inv_n = 1.0 / points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point2::new(sx * inv_n, sy * inv_n))
}

/// Returns the ring oriented counter-clockwise (`ccw = true`) or clockwise.
#[must_use]
pub fn with_orientation(points: &[Point2], ccw: bool) -> Vec<Point2> {
    if is_clockwise(points) == ccw {
        points.iter().rev().copied().collect()
    } else {
        points.to_vec()
    }
}

/// Rotates a closed ring so it starts at the leftmost vertex (smallest x),
/// breaking ties by smallest y. Gives deterministic vertex correspondence.
#[must_use]
pub fn rotate_to_canonical_start(points: &[Point2]) -> Vec<Point2> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let mut best = 0;
    for (i, pt) in points.iter().enumerate().skip(1) {
        let b = &points[best];
        if pt.x < b.x - TOLERANCE || (pt.x - b.x).abs() < TOLERANCE && pt.y < b.y {
            best = i;
        }
    }
    let mut rotated = Vec::with_capacity(points.len());
    rotated.extend_from_slice(&points[best..]);
    rotated.extend_from_slice(&points[..best]);
    rotated
}

/// Closed-ring perimeter.
#[must_use]
pub fn perimeter(points: &[Point2]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| (points[(i + 1) % n] - points[i]).norm()).sum()
}

/// Even-odd point-in-ring test.
#[must_use]
pub fn point_in_ring(p: &Point2, ring: &[Point2]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (&ring[i], &ring[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Resamples a closed ring to `count` points evenly spaced along its perimeter,
/// starting at the first vertex.
#[must_use]
pub fn resample(points: &[Point2], count: usize) -> Vec<Point2> {
    let n = points.len();
    let total = perimeter(points);
    if n < 2 || count == 0 || total < TOLERANCE {
        return points.to_vec();
    }
    #[allow(clippy::cast_precision_loss)]
    let step = total / count as f64;

    let mut out = Vec::with_capacity(count);
    let mut seg = 0;
    let mut seg_start = 0.0;
    let mut seg_len = (points[1 % n] - points[0]).norm();
    for k in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let target = step * k as f64;
        while seg_start + seg_len < target && seg < n - 1 {
            seg_start += seg_len;
            seg += 1;
            seg_len = (points[(seg + 1) % n] - points[seg]).norm();
        }
        let a = points[seg];
        let b = points[(seg + 1) % n];
        let t = if seg_len < TOLERANCE {
            0.0
        } else {
            ((target - seg_start) / seg_len).clamp(0.0, 1.0)
        };
        out.push(a + (b - a) * t);
    }
    out
}

/// Computes the normalized direction from point `a` to point `b`.
///
/// # Errors
///
/// Returns `GeometryError::Degenerate` if the segment has zero length.
pub fn segment_direction(a: &Point2, b: &Point2) -> Result<Vector2> {
    let d = b - a;
    let len = d.norm();
    if len < TOLERANCE {
        return Err(GeometryError::Degenerate(format!(
            "zero-length segment at ({}, {})",
            a.x, a.y
        ))
        .into());
    }
    Ok(d / len)
}

/// Returns the left-pointing normal of a direction vector.
#[must_use]
pub fn left_normal(dir: Vector2) -> Vector2 {
    Vector2::new(-dir.y, dir.x)
}

/// Axis-aligned bounding box in world millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    #[must_use]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding box of a point set, or `None` when it is empty.
    #[must_use]
    pub fn from_points(points: &[Point2]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Self::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        Some(b)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grows the box by `dx` on both x sides and `dy` on both y sides.
    #[must_use]
    pub fn expand(&self, dx: f64, dy: f64) -> Self {
        Self::new(
            self.min_x - dx,
            self.min_y - dy,
            self.max_x + dx,
            self.max_y + dy,
        )
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Strict overlap test. Boxes that only share an edge or a corner do not
    /// overlap; broad-phase culling relies on this.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    #[must_use]
    pub fn contains(&self, p: &Point2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// Free-function form of [`Bounds::overlaps`].
#[must_use]
pub fn bounds_overlap(a: &Bounds, b: &Bounds) -> bool {
    a.overlaps(b)
}
