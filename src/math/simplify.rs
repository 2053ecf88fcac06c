//! Douglas-Peucker polyline simplification.
//!
//! Iterative: an explicit stack of index ranges replaces recursion, so very long
//! contours neither deepen the call stack nor allocate sub-slices.

use super::distance_2d::point_to_segment_dist;
use super::Point2;

/// Simplifies an open polyline. Both endpoints are always retained and a
/// tolerance of `0` returns the input unchanged.
#[must_use]
pub fn douglas_peucker(points: &[Point2], tolerance: f64) -> Vec<Point2> {
    let n = points.len();
    if n < 3 || tolerance <= 0.0 {
        return points.to_vec();
    }
    let keep = mark_kept(points, 0, n - 1, tolerance);
    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Simplifies a closed ring (stored open).
///
/// The ring is split at its first vertex and the vertex farthest from it, and
/// each half is simplified as an open chain, so both anchors survive.
#[must_use]
pub fn douglas_peucker_closed(points: &[Point2], tolerance: f64) -> Vec<Point2> {
    let n = points.len();
    if n < 4 || tolerance <= 0.0 {
        return points.to_vec();
    }

    let first = points[0];
    let far = (1..n)
        .max_by(|&a, &b| {
            let da = (points[a] - first).norm_squared();
            let db = (points[b] - first).norm_squared();
            da.total_cmp(&db)
        })
        .unwrap_or(n / 2);

    // Close the ring temporarily so the second half ends on the first vertex.
    let mut closed = Vec::with_capacity(n + 1);
    closed.extend_from_slice(points);
    closed.push(first);

    let mut keep = mark_kept(&closed, 0, far, tolerance);
    let tail = mark_kept(&closed, far, n, tolerance);
    for i in far..=n {
        keep[i] |= tail[i];
    }
    keep.truncate(n);

    let out: Vec<Point2> = points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect();
    if out.len() < 3 {
        return points.to_vec();
    }
    out
}

/// Flags which vertices in `points[start..=end]` survive simplification.
fn mark_kept(points: &[Point2], start: usize, end: usize, tolerance: f64) -> Vec<bool> {
    let mut keep = vec![false; points.len()];
    keep[start] = true;
    keep[end] = true;

    let mut stack = vec![(start, end)];
    while let Some((lo, hi)) = stack.pop() {
        if hi <= lo + 1 {
            continue;
        }
        let (a, b) = (&points[lo], &points[hi]);
        let mut max_dist = 0.0;
        let mut max_idx = lo;
        for (i, p) in points.iter().enumerate().take(hi).skip(lo + 1) {
            let d = point_to_segment_dist(p, a, b);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }
        if max_dist > tolerance {
            keep[max_idx] = true;
            stack.push((lo, max_idx));
            stack.push((max_idx, hi));
        }
    }
    keep
}
