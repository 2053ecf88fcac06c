//! Contour data model: rings, per-slice contours, and named structures.

pub mod representation;
pub mod session;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::constants::SLICE_KEY_SCALE;
use crate::error::{GeometryError, Result};
use crate::math::polygon_2d::{self, Bounds};
use crate::math::{Point2, TOLERANCE};

pub use representation::{RingRole, StructureData, TaggedRing, VipStructure};
pub use session::{OutputTarget, Session, StructureId};

/// A closed polygon stored open (the closing edge is implicit).
///
/// Always holds at least three distinct vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    points: Vec<Point2>,
}

impl Ring {
    /// Builds a ring, rejecting inputs with fewer than three distinct vertices.
    ///
    /// A trailing vertex equal to the first is dropped.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` for under-sized or non-finite input.
    pub fn new(mut points: Vec<Point2>) -> Result<Self> {
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(GeometryError::InvalidInput("non-finite ring coordinate".into()).into());
        }
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        let mut distinct: Vec<&Point2> = Vec::with_capacity(3);
        for p in &points {
            if distinct.iter().all(|q| (*q - p).norm() > TOLERANCE) {
                distinct.push(p);
                if distinct.len() == 3 {
                    return Ok(Self { points });
                }
            }
        }
        Err(GeometryError::InvalidInput(format!(
            "ring needs at least 3 distinct vertices, got {}",
            distinct.len()
        ))
        .into())
    }

    #[must_use]
    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    #[must_use]
    pub fn into_points(self) -> Vec<Point2> {
        self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn signed_area(&self) -> f64 {
        polygon_2d::signed_area(&self.points)
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        polygon_2d::area(&self.points)
    }

    #[must_use]
    pub fn is_clockwise(&self) -> bool {
        polygon_2d::is_clockwise(&self.points)
    }

    /// # Errors
    ///
    /// Returns `GeometryError::ZeroArea` for rings that enclose no area.
    pub fn centroid(&self) -> Result<Point2> {
        polygon_2d::centroid(&self.points)
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        // Non-empty by construction.
        Bounds::from_points(&self.points).unwrap_or(Bounds::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Same ring with the opposite winding.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            points: self.points.iter().rev().copied().collect(),
        }
    }

    /// Same ring oriented counter-clockwise (`ccw = true`) or clockwise.
    #[must_use]
    pub fn oriented(&self, ccw: bool) -> Self {
        Self {
            points: polygon_2d::with_orientation(&self.points, ccw),
        }
    }

    #[must_use]
    pub fn contains(&self, p: &Point2) -> bool {
        polygon_2d::point_in_ring(p, &self.points)
    }
}

/// Slice identity derived from a z position rounded to micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SliceKey(i64);

impl SliceKey {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_z(z: f64) -> Self {
        Self((z * SLICE_KEY_SCALE).round() as i64)
    }
}

/// One closed boundary on one slice; the unit exchanged with the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub ring: Ring,
    pub z: f64,
}

impl Contour {
    /// Wraps a ring at slice position `z`. The z value is carried as given.
    #[must_use]
    pub fn from_ring(ring: Ring, z: f64) -> Self {
        Self { ring, z }
    }

    /// Returns the ring, discarding the slice position.
    #[must_use]
    pub fn to_ring(&self) -> Ring {
        self.ring.clone()
    }

    /// Parses a flat `[x, y, z, x, y, z, ...]` array.
    ///
    /// The slice position is taken from the first triple.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` when the array length is not a
    /// multiple of three or the ring is degenerate.
    pub fn from_flat(data: &[f64]) -> Result<Self> {
        if data.len() % 3 != 0 {
            return Err(GeometryError::InvalidInput(format!(
                "flat contour length {} is not a multiple of 3",
                data.len()
            ))
            .into());
        }
        let z = data.get(2).copied().unwrap_or(0.0);
        let points = data.chunks_exact(3).map(|c| Point2::new(c[0], c[1])).collect();
        Ok(Self::from_ring(Ring::new(points)?, z))
    }

    /// Flattens to `[x, y, z, ...]`.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.ring.len() * 3);
        for p in self.ring.points() {
            out.extend_from_slice(&[p.x, p.y, self.z]);
        }
        out
    }

    #[must_use]
    pub fn number_of_points(&self) -> usize {
        self.ring.len()
    }
}

/// All rings of one structure on one slice. Rings compose with even-odd
/// parity: a ring nested inside another is a hole.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub z: f64,
    pub rings: Vec<Ring>,
}

impl Slice {
    #[must_use]
    pub fn new(z: f64, rings: Vec<Ring>) -> Self {
        Self { z, rings }
    }

    #[must_use]
    pub fn key(&self) -> SliceKey {
        SliceKey::from_z(self.z)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Even-odd area: solids minus holes.
    #[must_use]
    pub fn area(&self) -> f64 {
        VipStructure::tag_rings(&self.rings)
            .iter()
            .map(|t| match t.role {
                RingRole::Solid => t.ring.area(),
                RingRole::Hole => -t.ring.area(),
            })
            .sum()
    }

    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        self.rings
            .iter()
            .map(Ring::bounds)
            .reduce(|a, b| a.union(&b))
    }

    #[must_use]
    pub fn contours(&self) -> Vec<Contour> {
        self.rings
            .iter()
            .map(|r| Contour::from_ring(r.clone(), self.z))
            .collect()
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.rings.iter().map(Ring::len).sum()
    }
}

/// Display colour of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A named, coloured set of contours across slices.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub name: String,
    pub color: Color,
    slices: BTreeMap<SliceKey, Slice>,
}

impl Structure {
    #[must_use]
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
            slices: BTreeMap::new(),
        }
    }

    /// Adds a contour to the slice at its z position.
    pub fn add_contour(&mut self, contour: Contour) {
        let key = SliceKey::from_z(contour.z);
        self.slices
            .entry(key)
            .or_insert_with(|| Slice::new(contour.z, Vec::new()))
            .rings
            .push(contour.ring);
    }

    /// Replaces (or removes, when empty) the slice at `slice.z`.
    pub fn set_slice(&mut self, slice: Slice) {
        let key = slice.key();
        if slice.is_empty() {
            self.slices.remove(&key);
        } else {
            self.slices.insert(key, slice);
        }
    }

    /// Builds a structure from slices, dropping empty ones.
    #[must_use]
    pub fn with_slices(mut self, slices: impl IntoIterator<Item = Slice>) -> Self {
        for s in slices {
            self.set_slice(s);
        }
        self
    }

    #[must_use]
    pub fn slice(&self, z: f64) -> Option<&Slice> {
        self.slices.get(&SliceKey::from_z(z))
    }

    /// Slices in ascending z.
    pub fn slices(&self) -> impl Iterator<Item = &Slice> {
        self.slices.values()
    }

    #[must_use]
    pub fn slice_positions(&self) -> Vec<f64> {
        self.slices.values().map(|s| s.z).collect()
    }

    pub fn contours(&self) -> impl Iterator<Item = Contour> + '_ {
        self.slices.values().flat_map(Slice::contours)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        self.slices
            .values()
            .filter_map(Slice::bounds)
            .reduce(|a, b| a.union(&b))
    }

    /// Smallest positive gap between populated slices, if there are at least two.
    #[must_use]
    pub fn slice_spacing(&self) -> Option<f64> {
        let zs = self.slice_positions();
        zs.windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > TOLERANCE)
            .reduce(f64::min)
    }
}
