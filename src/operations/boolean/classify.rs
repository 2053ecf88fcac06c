//! Exact point-in-operand classification.
//!
//! Queries are edge midpoints, so everything here works in doubled lattice
//! coordinates where those midpoints are integers.

use super::fixed::IntPoint;
use super::split::Edge;

/// Half-open even-odd crossing test of the ray from `p` towards `+x`
/// against segment `a`-`b`.
#[must_use]
pub fn ray_crosses(p: IntPoint, a: IntPoint, b: IntPoint) -> bool {
    if (a.y > p.y) == (b.y > p.y) {
        return false;
    }
    let dy = i128::from(b.y - a.y);
    let lhs = i128::from(p.x - a.x) * dy;
    let rhs = i128::from(p.y - a.y) * i128::from(b.x - a.x);
    if dy > 0 {
        lhs < rhs
    } else {
        lhs > rhs
    }
}

/// Edges of one operand bucketed by y so a containment query only visits
/// edges spanning the query row.
#[derive(Debug)]
pub struct EdgeIndex {
    edges: Vec<(IntPoint, IntPoint)>,
    buckets: Vec<Vec<usize>>,
    y_min: i64,
    y_max: i64,
    bucket_h: i64,
}

impl EdgeIndex {
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn new(edges: &[Edge]) -> Self {
        let doubled: Vec<(IntPoint, IntPoint)> = edges
            .iter()
            .map(|e| {
                (
                    IntPoint::new(2 * e.start.x, 2 * e.start.y),
                    IntPoint::new(2 * e.end.x, 2 * e.end.y),
                )
            })
            .collect();
        let y_min = doubled.iter().map(|(a, b)| a.y.min(b.y)).min().unwrap_or(0);
        let y_max = doubled.iter().map(|(a, b)| a.y.max(b.y)).max().unwrap_or(0);
        let count = ((doubled.len() as f64).sqrt().ceil() as usize).max(1);
        let span = y_max - y_min + 1;
        let bucket_h = ((span + count as i64 - 1) / count as i64).max(1);
        let mut index = Self {
            edges: Vec::new(),
            buckets: vec![Vec::new(); count],
            y_min,
            y_max,
            bucket_h,
        };
        for (i, &(a, b)) in doubled.iter().enumerate() {
            let lo = index.bucket_of(a.y.min(b.y));
            let hi = index.bucket_of(a.y.max(b.y));
            for bucket in &mut index.buckets[lo..=hi] {
                bucket.push(i);
            }
        }
        index.edges = doubled;
        index
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn bucket_of(&self, y: i64) -> usize {
        (((y - self.y_min) / self.bucket_h) as usize).min(self.buckets.len() - 1)
    }

    /// Even-odd containment of a point given in doubled coordinates.
    #[must_use]
    pub fn contains_doubled(&self, p: IntPoint) -> bool {
        if self.edges.is_empty() || p.y < self.y_min || p.y > self.y_max {
            return false;
        }
        self.buckets[self.bucket_of(p.y)]
            .iter()
            .filter(|&&i| {
                let (a, b) = self.edges[i];
                ray_crosses(p, a, b)
            })
            .count()
            % 2
            == 1
    }

    /// Classifies the midpoint of `edge`.
    #[must_use]
    pub fn contains_midpoint(&self, edge: &Edge) -> bool {
        self.contains_doubled(IntPoint::new(
            edge.start.x + edge.end.x,
            edge.start.y + edge.end.y,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(x: i64, y: i64) -> IntPoint {
        IntPoint::new(x, y)
    }

    fn square_edges(x0: i64, y0: i64, s: i64) -> Vec<Edge> {
        let pts = [ip(x0, y0), ip(x0 + s, y0), ip(x0 + s, y0 + s), ip(x0, y0 + s)];
        (0..4).map(|i| Edge::new(pts[i], pts[(i + 1) % 4])).collect()
    }

    #[test]
    fn midpoints_inside_and_outside() {
        let index = EdgeIndex::new(&square_edges(0, 0, 10));
        assert!(index.contains_midpoint(&Edge::new(ip(2, 2), ip(4, 4))));
        assert!(!index.contains_midpoint(&Edge::new(ip(12, 2), ip(14, 4))));
        assert!(!index.contains_midpoint(&Edge::new(ip(2, 12), ip(4, 14))));
    }

    #[test]
    fn even_odd_over_nested_rings() {
        let mut edges = square_edges(0, 0, 10);
        edges.extend(square_edges(3, 3, 4));
        let index = EdgeIndex::new(&edges);
        assert!(!index.contains_doubled(ip(10, 10)));
        assert!(index.contains_doubled(ip(2, 2)));
    }

    #[test]
    fn empty_index_contains_nothing() {
        assert!(!EdgeIndex::new(&[]).contains_doubled(ip(0, 0)));
    }

    #[test]
    fn ray_uses_half_open_rule() {
        // A vertex exactly on the ray counts for only one of its two edges.
        let (a, v, b) = (ip(4, -2), ip(4, 0), ip(4, 2));
        let p = ip(0, 0);
        assert_ne!(ray_crosses(p, a, v), ray_crosses(p, v, b));
    }
}
