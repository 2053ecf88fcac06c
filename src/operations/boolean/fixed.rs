//! Fixed-point coordinates for the vector backend.
//!
//! Millimetre coordinates are scaled and rounded onto an `i64` lattice. All
//! predicates then run on exact integers, widened to `i128` for products, so
//! orientation and containment tests never suffer from rounding.

use crate::error::{GeometryError, Result};
use crate::math::Point2;
use crate::model::Ring;

/// Largest accepted scaled coordinate (100 m at the default scale). Keeps the
/// triple products of the intersection routine inside `i128`.
const MAX_COORD: f64 = 1e11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntPoint {
    pub x: i64,
    pub y: i64,
}

impl IntPoint {
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Cross product of `(b - a) × (c - a)`; positive for a left turn.
#[must_use]
pub fn orient(a: IntPoint, b: IntPoint, c: IntPoint) -> i128 {
    let (abx, aby) = (i128::from(b.x - a.x), i128::from(b.y - a.y));
    let (acx, acy) = (i128::from(c.x - a.x), i128::from(c.y - a.y));
    abx * acy - aby * acx
}

/// Dot product of `(b - a) · (c - a)`.
#[must_use]
pub fn dot(a: IntPoint, b: IntPoint, c: IntPoint) -> i128 {
    i128::from(b.x - a.x) * i128::from(c.x - a.x) + i128::from(b.y - a.y) * i128::from(c.y - a.y)
}

/// Scale between millimetres and lattice units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedFrame {
    scale: f64,
}

impl FixedFrame {
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` for a non-positive scale.
    pub fn new(scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(GeometryError::InvalidInput(format!("fixed-point scale {scale}")).into());
        }
        Ok(Self { scale })
    }

    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` when the scaled coordinate does
    /// not fit the lattice.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_fixed(&self, p: &Point2) -> Result<IntPoint> {
        let (x, y) = ((p.x * self.scale).round(), (p.y * self.scale).round());
        if x.abs() > MAX_COORD || y.abs() > MAX_COORD {
            return Err(GeometryError::InvalidInput(format!(
                "coordinate ({}, {}) out of fixed-point range",
                p.x, p.y
            ))
            .into());
        }
        Ok(IntPoint::new(x as i64, y as i64))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_float(&self, p: IntPoint) -> Point2 {
        Point2::new(p.x as f64 / self.scale, p.y as f64 / self.scale)
    }

    /// Converts a ring, dropping vertices that collapse onto their predecessor.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` for out-of-range coordinates.
    pub fn ring_to_fixed(&self, ring: &Ring) -> Result<Vec<IntPoint>> {
        let mut out: Vec<IntPoint> = Vec::with_capacity(ring.len());
        for p in ring.points() {
            let q = self.to_fixed(p)?;
            if out.last() != Some(&q) {
                out.push(q);
            }
        }
        while out.len() > 1 && out.first() == out.last() {
            out.pop();
        }
        Ok(out)
    }
}
