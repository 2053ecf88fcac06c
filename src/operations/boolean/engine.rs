use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;
use crate::model::Ring;

use super::assemble::{link_edges, to_rings};
use super::classify::EdgeIndex;
use super::fixed::FixedFrame;
use super::select::{should_keep_edge, BooleanOp, EdgeClass, EdgeSource, KeepDecision};
use super::split::{prepare_operand, ring_edges, split_edges, Edge, EdgeFragment};

/// Exact polygon boolean of two ring sets on one slice.
///
/// Pipeline: snap both operands to the fixed-point lattice and orient them,
/// split edges at mutual intersections, classify each fragment against the
/// other operand, select fragments by operator, and link the survivors back
/// into rings. Outer rings come back counter-clockwise and holes clockwise.
///
/// # Errors
///
/// Returns `GeometryError::SelfIntersection` when either operand crosses
/// itself, `GeometryError::InvalidInput` for coordinates outside the lattice,
/// and `GeometryError::OpenBoundary` if the kept edges do not close.
pub fn vector_boolean(a: &[Ring], b: &[Ring], op: BooleanOp, scale: f64) -> Result<Vec<Ring>> {
    let frame = FixedFrame::new(scale)?;

    // Step 1: lattice operands with the region left of every edge
    let edges_a = ring_edges(&prepare_operand(a, &frame)?);
    let edges_b = ring_edges(&prepare_operand(b, &frame)?);

    // Step 2: split at intersections
    let fragments = split_edges(&edges_a, &edges_b);

    // Step 3: classify and select
    let index_a = EdgeIndex::new(&edges_a);
    let index_b = EdgeIndex::new(&edges_b);
    let frags_a: HashSet<Edge> = fragments
        .iter()
        .filter(|f| f.source == EdgeSource::A)
        .map(|f| f.edge)
        .collect();
    let frags_b: HashSet<Edge> = fragments
        .iter()
        .filter(|f| f.source == EdgeSource::B)
        .map(|f| f.edge)
        .collect();

    let kept: Vec<Edge> = fragments
        .iter()
        .filter_map(|frag| {
            let class = match frag.source {
                EdgeSource::A => classify(frag, &frags_b, &index_b),
                EdgeSource::B => classify(frag, &frags_a, &index_a),
            };
            match should_keep_edge(frag.source, class, op) {
                KeepDecision::Keep => Some(frag.edge),
                KeepDecision::KeepFlipped => Some(frag.edge.reversed()),
                KeepDecision::Discard => None,
            }
        })
        .collect();
    debug!(
        ?op,
        fragments = fragments.len(),
        kept = kept.len(),
        "vector boolean selection"
    );

    // Step 4: assemble
    let linked = link_edges(&kept)?;
    Ok(to_rings(&linked, &frame))
}

fn classify(frag: &EdgeFragment, other: &HashSet<Edge>, index: &EdgeIndex) -> EdgeClass {
    if other.contains(&frag.edge) {
        EdgeClass::SharedSame
    } else if other.contains(&frag.edge.reversed()) {
        EdgeClass::SharedOpposite
    } else if index.contains_midpoint(&frag.edge) {
        EdgeClass::Inside
    } else {
        EdgeClass::Outside
    }
}
