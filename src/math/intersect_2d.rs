use super::{Point2, TOLERANCE};

/// Parametric segment-segment intersection.
///
/// Returns `(point, t, u)` where the point equals `p1 + t·(p2 - p1)` and
/// `p3 + u·(p4 - p3)`, with both parameters in `[0, 1]`. Parallel (including
/// collinear) segments yield `None`.
#[must_use]
pub fn segment_intersection_params(
    p1: &Point2,
    p2: &Point2,
    p3: &Point2,
    p4: &Point2,
) -> Option<(Point2, f64, f64)> {
    let da = p2 - p1;
    let db = p4 - p3;

    let cross = da.x * db.y - da.y * db.x;
    if cross.abs() < TOLERANCE {
        return None;
    }

    let dx = p3.x - p1.x;
    let dy = p3.y - p1.y;
    let t = (dx * db.y - dy * db.x) / cross;
    let u = (dx * da.y - dy * da.x) / cross;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((p1 + da * t, t, u))
    } else {
        None
    }
}

/// Intersection point of segments `p1`-`p2` and `p3`-`p4`, if it lies within
/// both segments.
#[must_use]
pub fn segment_intersection(p1: &Point2, p2: &Point2, p3: &Point2, p4: &Point2) -> Option<Point2> {
    segment_intersection_params(p1, p2, p3, p4).map(|(pt, _, _)| pt)
}

/// Returns the first proper crossing between non-adjacent edges of a ring.
///
/// Adjacent edges share a vertex and are skipped; O(n²), intended for the
/// small blended rings produced by interpolation.
#[must_use]
pub fn first_self_intersection(ring: &[Point2]) -> Option<Point2> {
    let n = ring.len();
    if n < 4 {
        return None;
    }
    for i in 0..n {
        let (a0, a1) = (&ring[i], &ring[(i + 1) % n]);
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (b0, b1) = (&ring[j], &ring[(j + 1) % n]);
            if let Some((pt, t, u)) = segment_intersection_params(a0, a1, b0, b1) {
                // Touching at an exact endpoint is not a crossing.
                let interior = t > TOLERANCE && t < 1.0 - TOLERANCE && u > TOLERANCE && u < 1.0 - TOLERANCE;
                if interior {
                    return Some(pt);
                }
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(x: f64, y: f64) -> Point2 {
        Point2::new(x, y)
    }

    #[test]
    fn segment_segment_crossing() {
        let pt = segment_intersection(&p(0.0, 0.0), &p(2.0, 2.0), &p(0.0, 2.0), &p(2.0, 0.0)).unwrap();
        assert_abs_diff_eq!(pt.x, 1.0, epsilon = TOLERANCE);
        assert_abs_diff_eq!(pt.y, 1.0, epsilon = TOLERANCE);
    }

    #[test]
    fn segment_segment_no_crossing() {
        assert!(segment_intersection(&p(0.0, 0.0), &p(1.0, 0.0), &p(2.0, -1.0), &p(2.0, 1.0)).is_none());
    }

    #[test]
    fn parallel_segments_return_none() {
        assert!(segment_intersection(&p(0.0, 0.0), &p(1.0, 0.0), &p(0.0, 1.0), &p(1.0, 1.0)).is_none());
        assert!(segment_intersection(&p(0.0, 0.0), &p(2.0, 0.0), &p(1.0, 0.0), &p(3.0, 0.0)).is_none());
    }

    #[test]
    fn endpoint_touch_is_reported() {
        let (pt, t, u) =
            segment_intersection_params(&p(0.0, 0.0), &p(1.0, 0.0), &p(1.0, -1.0), &p(1.0, 1.0)).unwrap();
        assert_abs_diff_eq!(pt.x, 1.0, epsilon = TOLERANCE);
        assert_abs_diff_eq!(t, 1.0, epsilon = TOLERANCE);
        assert_abs_diff_eq!(u, 0.5, epsilon = TOLERANCE);
    }

    #[test]
    fn bowtie_self_intersects() {
        let bowtie = [p(0.0, 0.0), p(2.0, 2.0), p(2.0, 0.0), p(0.0, 2.0)];
        let x = first_self_intersection(&bowtie).unwrap();
        assert_abs_diff_eq!(x.x, 1.0, epsilon = 1e-9);
        let square = [p(0.0, 0.0), p(2.0, 0.0), p(2.0, 2.0), p(0.0, 2.0)];
        assert!(first_self_intersection(&square).is_none());
    }
}
