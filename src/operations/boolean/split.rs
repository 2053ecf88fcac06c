//! Operand preparation and edge splitting for the vector backend.
//!
//! Every edge of one operand is cut wherever it meets an edge of the other,
//! including the end points of collinear overlaps, so that after splitting
//! two edges either coincide exactly or meet only at end points.

use crate::error::{GeometryError, Result};
use crate::model::Ring;

use super::classify::ray_crosses;
use super::fixed::{dot, orient, FixedFrame, IntPoint};
use super::select::EdgeSource;

/// A directed boundary edge with the operand's region on its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub start: IntPoint,
    pub end: IntPoint,
}

impl Edge {
    #[must_use]
    pub fn new(start: IntPoint, end: IntPoint) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn reversed(self) -> Self {
        Self::new(self.end, self.start)
    }

    fn bbox(&self) -> [i64; 4] {
        [
            self.start.x.min(self.end.x),
            self.start.y.min(self.end.y),
            self.start.x.max(self.end.x),
            self.start.y.max(self.end.y),
        ]
    }
}

/// A piece of an original edge after splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFragment {
    pub edge: Edge,
    pub source: EdgeSource,
}

fn twice_signed_area(ring: &[IntPoint]) -> i128 {
    let n = ring.len();
    (0..n).map(|i| orient(IntPoint::new(0, 0), ring[i], ring[(i + 1) % n])).sum()
}

/// Converts an operand to the lattice and orients each ring by nesting
/// depth so that the operand's region lies left of every edge.
///
/// # Errors
///
/// Returns `GeometryError::SelfIntersection` when rings cross or touch each
/// other or themselves, and `GeometryError::InvalidInput` for coordinates
/// outside the lattice.
pub fn prepare_operand(rings: &[Ring], frame: &FixedFrame) -> Result<Vec<Vec<IntPoint>>> {
    let mut fixed = Vec::with_capacity(rings.len());
    for ring in rings {
        let pts = frame.ring_to_fixed(ring)?;
        if pts.len() >= 3 && twice_signed_area(&pts) != 0 {
            fixed.push(pts);
        }
    }

    if let Some(p) = find_self_intersection(&fixed) {
        let at = frame.to_float(p);
        return Err(GeometryError::SelfIntersection { x: at.x, y: at.y }.into());
    }

    let doubled: Vec<Vec<IntPoint>> = fixed
        .iter()
        .map(|r| r.iter().map(|p| IntPoint::new(2 * p.x, 2 * p.y)).collect())
        .collect();
    let mut out = Vec::with_capacity(fixed.len());
    for (i, ring) in fixed.iter().enumerate() {
        let sample = doubled[i][0];
        let depth = doubled
            .iter()
            .enumerate()
            .filter(|&(j, other)| {
                j != i
                    && (0..other.len())
                        .filter(|&k| ray_crosses(sample, other[k], other[(k + 1) % other.len()]))
                        .count()
                        % 2
                        == 1
            })
            .count();
        let want_ccw = depth % 2 == 0;
        let is_ccw = twice_signed_area(ring) > 0;
        out.push(if want_ccw == is_ccw {
            ring.clone()
        } else {
            ring.iter().rev().copied().collect()
        });
    }
    Ok(out)
}

/// All directed edges of a prepared operand.
#[must_use]
pub fn ring_edges(rings: &[Vec<IntPoint>]) -> Vec<Edge> {
    rings
        .iter()
        .flat_map(|r| (0..r.len()).map(move |i| Edge::new(r[i], r[(i + 1) % r.len()])))
        .collect()
}

/// Sweep-and-prune broad phase over closed bounding boxes. Calls `visit` for
/// every pair whose boxes overlap or touch.
fn for_each_box_pair(boxes: &[[i64; 4]], mut visit: impl FnMut(usize, usize)) {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by_key(|&i| boxes[i][0]);
    for (k, &i) in order.iter().enumerate() {
        let bi = boxes[i];
        for &j in &order[k + 1..] {
            let bj = boxes[j];
            if bj[0] > bi[2] {
                break;
            }
            if bj[1] <= bi[3] && bi[1] <= bj[3] {
                visit(i, j);
            }
        }
    }
}

fn on_segment(p: IntPoint, a: IntPoint, b: IntPoint) -> bool {
    orient(a, b, p) == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Any common point of two closed segments, if they share one.
fn touch_point(a: Edge, b: Edge) -> Option<IntPoint> {
    let (p1, p2, p3, p4) = (a.start, a.end, b.start, b.end);
    let o1 = orient(p1, p2, p3).signum();
    let o2 = orient(p1, p2, p4).signum();
    let o3 = orient(p3, p4, p1).signum();
    let o4 = orient(p3, p4, p2).signum();
    if o1 * o2 < 0 && o3 * o4 < 0 {
        return intersection_point(a, b);
    }
    [(p3, a), (p4, a), (p1, b), (p2, b)]
        .into_iter()
        .find(|&(p, e)| on_segment(p, e.start, e.end))
        .map(|(p, _)| p)
}

/// First point where two rings (or one ring with itself, away from shared
/// vertices of consecutive edges) meet.
#[must_use]
pub fn find_self_intersection(rings: &[Vec<IntPoint>]) -> Option<IntPoint> {
    let mut edges = Vec::new();
    for (r, ring) in rings.iter().enumerate() {
        for i in 0..ring.len() {
            edges.push((r, i, ring.len(), Edge::new(ring[i], ring[(i + 1) % ring.len()])));
        }
    }
    let boxes: Vec<[i64; 4]> = edges.iter().map(|e| e.3.bbox()).collect();
    let mut found = None;
    for_each_box_pair(&boxes, |i, j| {
        if found.is_some() {
            return;
        }
        let (ri, ii, n, ei) = edges[i];
        let (rj, ij, _, ej) = edges[j];
        if ri == rj && (ij == (ii + 1) % n || ii == (ij + 1) % n) {
            // Consecutive edges share a vertex; only a fold back along
            // the same line is a defect.
            let shared = if ij == (ii + 1) % n { ei.end } else { ei.start };
            let (u, v) = if ij == (ii + 1) % n {
                (ei.start, ej.end)
            } else {
                (ej.start, ei.end)
            };
            if orient(u, shared, v) == 0 && dot(shared, u, v) > 0 {
                found = Some(shared);
            }
            return;
        }
        found = touch_point(ei, ej);
    });
    found
}

/// Rounded division for a strictly positive divisor.
fn round_div(n: i128, d: i128) -> i128 {
    (2 * n + d).div_euclid(2 * d)
}

/// Rounded crossing point of two non-parallel segments known to intersect.
#[allow(clippy::cast_possible_truncation)]
fn intersection_point(a: Edge, b: Edge) -> Option<IntPoint> {
    let (p1, p2, p3, p4) = (a.start, a.end, b.start, b.end);
    let (rx, ry) = (i128::from(p2.x - p1.x), i128::from(p2.y - p1.y));
    let (sx, sy) = (i128::from(p4.x - p3.x), i128::from(p4.y - p3.y));
    let (qx, qy) = (i128::from(p3.x - p1.x), i128::from(p3.y - p1.y));
    let mut d = rx * sy - ry * sx;
    if d == 0 {
        return None;
    }
    let mut t = qx * sy - qy * sx;
    let mut u = qx * ry - qy * rx;
    if d < 0 {
        d = -d;
        t = -t;
        u = -u;
    }
    if t < 0 || t > d || u < 0 || u > d {
        return None;
    }
    Some(IntPoint::new(
        p1.x + round_div(rx * t, d) as i64,
        p1.y + round_div(ry * t, d) as i64,
    ))
}

/// Records where `a` and `b` cut each other.
fn record_cuts(a: Edge, b: Edge, cuts_a: &mut Vec<IntPoint>, cuts_b: &mut Vec<IntPoint>) {
    let strictly_inside = |p: IntPoint, e: Edge| p != e.start && p != e.end;
    if orient(a.start, a.end, b.start) == 0 && orient(a.start, a.end, b.end) == 0 {
        // Collinear: each end point inside the other segment is a cut.
        let len_a = dot(a.start, a.end, a.end);
        let len_b = dot(b.start, b.end, b.end);
        for p in [b.start, b.end] {
            let t = dot(a.start, a.end, p);
            if t > 0 && t < len_a {
                cuts_a.push(p);
            }
        }
        for p in [a.start, a.end] {
            let t = dot(b.start, b.end, p);
            if t > 0 && t < len_b {
                cuts_b.push(p);
            }
        }
        return;
    }
    if let Some(p) = intersection_point(a, b) {
        if strictly_inside(p, a) {
            cuts_a.push(p);
        }
        if strictly_inside(p, b) {
            cuts_b.push(p);
        }
    }
}

fn split_at(edge: Edge, mut cuts: Vec<IntPoint>, source: EdgeSource, out: &mut Vec<EdgeFragment>) {
    cuts.sort_by_key(|&p| dot(edge.start, edge.end, p));
    cuts.dedup();
    let mut prev = edge.start;
    for p in cuts.into_iter().chain(std::iter::once(edge.end)) {
        if p != prev {
            out.push(EdgeFragment {
                edge: Edge::new(prev, p),
                source,
            });
            prev = p;
        }
    }
}

/// Splits both operands' edges at their mutual intersections.
#[must_use]
pub fn split_edges(edges_a: &[Edge], edges_b: &[Edge]) -> Vec<EdgeFragment> {
    let na = edges_a.len();
    let all: Vec<Edge> = edges_a.iter().chain(edges_b).copied().collect();
    let boxes: Vec<[i64; 4]> = all.iter().map(Edge::bbox).collect();
    let mut cuts: Vec<Vec<IntPoint>> = vec![Vec::new(); all.len()];

    for_each_box_pair(&boxes, |i, j| {
        let (ia, ib) = match (i < na, j < na) {
            (true, false) => (i, j),
            (false, true) => (j, i),
            _ => return,
        };
        let (mut ca, mut cb) = (Vec::new(), Vec::new());
        record_cuts(all[ia], all[ib], &mut ca, &mut cb);
        cuts[ia].extend(ca);
        cuts[ib].extend(cb);
    });

    let mut out = Vec::with_capacity(all.len());
    for (i, (edge, edge_cuts)) in all.into_iter().zip(cuts).enumerate() {
        let source = if i < na { EdgeSource::A } else { EdgeSource::B };
        split_at(edge, edge_cuts, source, &mut out);
    }
    out
}
