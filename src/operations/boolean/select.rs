use serde::{Deserialize, Serialize};

/// The type of boolean operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOp {
    Union,
    Subtract,
    Intersect,
}

/// Which operand a boundary edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSource {
    A,
    B,
}

/// Position of a split edge relative to the other operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClass {
    Inside,
    Outside,
    /// Coincides with an edge of the other operand running the same way
    /// (both regions on the same side).
    SharedSame,
    /// Coincides with an edge of the other operand running the opposite way
    /// (regions on opposite sides).
    SharedOpposite,
}

/// Decision about whether to keep an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepDecision {
    Keep,
    KeepFlipped,
    Discard,
}

/// Decides whether a split edge bounds the result.
///
/// | Edge   | vs other operand | Union   | Subtract(A-B) | Intersect |
/// |--------|------------------|---------|---------------|-----------|
/// | from A | outside B        | keep    | keep          | discard   |
/// | from A | inside B         | discard | discard       | keep      |
/// | from A | shared, same     | keep    | discard       | keep      |
/// | from A | shared, opposite | discard | keep          | discard   |
/// | from B | outside A        | keep    | discard       | discard   |
/// | from B | inside A         | discard | keep (flip)   | keep      |
/// | from B | shared, any      | discard | discard       | discard   |
///
/// Shared edges are represented once, by the copy from A.
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn should_keep_edge(source: EdgeSource, class: EdgeClass, op: BooleanOp) -> KeepDecision {
    match (source, class, op) {
        (EdgeSource::A, EdgeClass::Outside, BooleanOp::Union | BooleanOp::Subtract) => {
            KeepDecision::Keep
        }
        (EdgeSource::A, EdgeClass::Outside, BooleanOp::Intersect) => KeepDecision::Discard,

        (EdgeSource::A, EdgeClass::Inside, BooleanOp::Intersect) => KeepDecision::Keep,
        (EdgeSource::A, EdgeClass::Inside, _) => KeepDecision::Discard,

        (EdgeSource::A, EdgeClass::SharedSame, BooleanOp::Subtract) => KeepDecision::Discard,
        (EdgeSource::A, EdgeClass::SharedSame, _) => KeepDecision::Keep,

        (EdgeSource::A, EdgeClass::SharedOpposite, BooleanOp::Subtract) => KeepDecision::Keep,
        (EdgeSource::A, EdgeClass::SharedOpposite, _) => KeepDecision::Discard,

        (EdgeSource::B, EdgeClass::Outside, BooleanOp::Union) => KeepDecision::Keep,
        (EdgeSource::B, EdgeClass::Outside, _) => KeepDecision::Discard,

        (EdgeSource::B, EdgeClass::Inside, BooleanOp::Union) => KeepDecision::Discard,
        (EdgeSource::B, EdgeClass::Inside, BooleanOp::Subtract) => KeepDecision::KeepFlipped,
        (EdgeSource::B, EdgeClass::Inside, BooleanOp::Intersect) => KeepDecision::Keep,

        (EdgeSource::B, EdgeClass::SharedSame | EdgeClass::SharedOpposite, _) => {
            KeepDecision::Discard
        }
    }
}
