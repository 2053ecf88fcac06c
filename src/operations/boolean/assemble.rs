use std::collections::HashMap;

use crate::error::{GeometryError, Result};
use crate::model::Ring;

use super::fixed::{dot, orient, FixedFrame, IntPoint};
use super::split::Edge;

/// Smallest ring area (mm²) worth reporting; anything below is rounding debris.
const MIN_RING_AREA: f64 = 1e-9;

/// Links kept directed edges into closed rings.
///
/// Where several unused edges leave the same vertex (regions touching at a
/// point) the walk takes the sharpest left turn, so every ring stays simple.
///
/// # Errors
///
/// Returns `GeometryError::OpenBoundary` if a walk runs out of edges before
/// returning to its start.
pub fn link_edges(edges: &[Edge]) -> Result<Vec<Vec<IntPoint>>> {
    let mut outgoing: HashMap<IntPoint, Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.start).or_default().push(i);
    }
    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let origin = edges[first].start;
        let mut ring = vec![origin];
        let mut current = first;
        loop {
            used[current] = true;
            let Edge { start: from, end: at } = edges[current];
            if at == origin {
                break;
            }
            ring.push(at);
            let next = outgoing
                .get(&at)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&i| !used[i])
                .max_by(|&i, &j| {
                    turn_angle(from, at, edges[i].end).total_cmp(&turn_angle(from, at, edges[j].end))
                });
            match next {
                Some(i) => current = i,
                None => {
                    return Err(GeometryError::OpenBoundary(format!(
                        "no continuation at ({}, {}) after {} edges",
                        at.x,
                        at.y,
                        ring.len()
                    ))
                    .into())
                }
            }
        }
        rings.push(ring);
    }
    Ok(rings)
}

/// Signed turn from direction `from -> at` to `at -> to`, in `(-π, π]`.
/// A reversal back onto `from` ranks last.
#[allow(clippy::cast_precision_loss)]
fn turn_angle(from: IntPoint, at: IntPoint, to: IntPoint) -> f64 {
    if to == from {
        return f64::NEG_INFINITY;
    }
    let incoming = IntPoint::new(2 * at.x - from.x, 2 * at.y - from.y);
    let cross = orient(at, incoming, to) as f64;
    let dot = dot(at, incoming, to) as f64;
    cross.atan2(dot)
}

/// Drops vertices on straight runs, including across the wrap-around.
fn drop_collinear(ring: &[IntPoint]) -> Vec<IntPoint> {
    let mut out: Vec<IntPoint> = Vec::with_capacity(ring.len());
    for &p in ring {
        while out.len() >= 2 && orient(out[out.len() - 2], out[out.len() - 1], p) == 0 {
            out.pop();
        }
        out.push(p);
    }
    loop {
        let n = out.len();
        if n < 3 {
            return out;
        }
        if orient(out[n - 2], out[n - 1], out[0]) == 0 {
            out.pop();
        } else if orient(out[n - 1], out[0], out[1]) == 0 {
            out.remove(0);
        } else {
            return out;
        }
    }
}

/// Converts linked lattice rings back to millimetre rings, dropping debris.
#[must_use]
pub fn to_rings(linked: &[Vec<IntPoint>], frame: &FixedFrame) -> Vec<Ring> {
    linked
        .iter()
        .map(|r| drop_collinear(r))
        .filter(|r| r.len() >= 3)
        .filter_map(|r| Ring::new(r.into_iter().map(|p| frame.to_float(p)).collect()).ok())
        .filter(|r| r.area() > MIN_RING_AREA)
        .collect()
}
