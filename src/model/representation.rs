//! Interchangeable structure representations.
//!
//! A structure is handed to the engines either as tagged rings per slice
//! ([`VipStructure`]) or as masks per slice ([`MaskStructure`]). Both carry the
//! [`Grid`] they were built for; [`StructureData`] converts between them.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::grid::Grid;
use crate::raster::{rasterize, MaskStructure};

use super::{Color, Ring, Slice, SliceKey, Structure};

/// Whether a ring adds or removes area on its slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingRole {
    Solid,
    Hole,
}

/// A ring oriented by role: solids counter-clockwise, holes clockwise.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRing {
    pub ring: Ring,
    pub role: RingRole,
}

/// Tagged rings on one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct VipSlice {
    pub z: f64,
    pub rings: Vec<TaggedRing>,
}

/// Vector structure: a grid plus role-tagged rings per slice.
#[derive(Debug, Clone, PartialEq)]
pub struct VipStructure {
    pub grid: Grid,
    pub slices: BTreeMap<SliceKey, VipSlice>,
}

impl VipStructure {
    /// Tags each ring by how many other rings enclose it: even depth is
    /// solid, odd depth is a hole. Orientation is normalized to match.
    #[must_use]
    pub fn tag_rings(rings: &[Ring]) -> Vec<TaggedRing> {
        rings
            .iter()
            .enumerate()
            .map(|(i, ring)| {
                let sample = ring.points()[0];
                let depth = rings
                    .iter()
                    .enumerate()
                    .filter(|&(j, other)| j != i && other.contains(&sample))
                    .count();
                let role = if depth % 2 == 0 {
                    RingRole::Solid
                } else {
                    RingRole::Hole
                };
                TaggedRing {
                    ring: ring.oriented(role == RingRole::Solid),
                    role,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn from_structure(structure: &Structure, grid: &Grid) -> Self {
        let slices = structure
            .slices()
            .map(|s| {
                (
                    s.key(),
                    VipSlice {
                        z: s.z,
                        rings: Self::tag_rings(&s.rings),
                    },
                )
            })
            .collect();
        Self { grid: *grid, slices }
    }

    /// Plain slices, solids and holes in their normalized orientation.
    #[must_use]
    pub fn to_slices(&self) -> Vec<Slice> {
        self.slices
            .values()
            .map(|s| Slice::new(s.z, s.rings.iter().map(|t| t.ring.clone()).collect()))
            .collect()
    }

    /// Groups each slice's rings into (solid, holes directly inside it).
    #[must_use]
    pub fn group_nested(rings: &[TaggedRing]) -> Vec<(Ring, Vec<Ring>)> {
        let mut groups: Vec<(Ring, Vec<Ring>)> = rings
            .iter()
            .filter(|t| t.role == RingRole::Solid)
            .map(|t| (t.ring.clone(), Vec::new()))
            .collect();
        for hole in rings.iter().filter(|t| t.role == RingRole::Hole) {
            let sample = hole.ring.points()[0];
            let parent = groups
                .iter_mut()
                .filter(|(solid, _)| solid.contains(&sample))
                .min_by(|(a, _), (b, _)| a.area().total_cmp(&b.area()));
            if let Some((_, holes)) = parent {
                holes.push(hole.ring.clone());
            }
        }
        groups
    }
}

/// A structure in either representation.
#[derive(Debug, Clone, PartialEq)]
pub enum StructureData {
    Vector(VipStructure),
    Raster(MaskStructure),
}

impl StructureData {
    #[must_use]
    pub fn grid(&self) -> &Grid {
        match self {
            Self::Vector(v) => &v.grid,
            Self::Raster(m) => &m.grid,
        }
    }

    /// Raster form, rasterizing vector slices on their own grid.
    #[must_use]
    pub fn to_raster(&self) -> MaskStructure {
        match self {
            Self::Raster(m) => m.clone(),
            Self::Vector(v) => {
                let mut out = MaskStructure::new(v.grid);
                for s in v.slices.values() {
                    let rings: Vec<Ring> = s.rings.iter().map(|t| t.ring.clone()).collect();
                    out.insert(s.z, rasterize(&rings, &v.grid));
                }
                out
            }
        }
    }

    /// Vector form, extracting contours from raster slices.
    #[must_use]
    pub fn to_vector(&self, config: &EngineConfig) -> VipStructure {
        match self {
            Self::Vector(v) => v.clone(),
            Self::Raster(m) => {
                let slices = m
                    .to_slices(config)
                    .into_iter()
                    .map(|s| {
                        (
                            s.key(),
                            VipSlice {
                                z: s.z,
                                rings: VipStructure::tag_rings(&s.rings),
                            },
                        )
                    })
                    .collect();
                VipStructure {
                    grid: m.grid,
                    slices,
                }
            }
        }
    }

    /// Materializes a named structure, dropping empty slices.
    #[must_use]
    pub fn to_structure(&self, name: &str, color: Color, config: &EngineConfig) -> Structure {
        Structure::new(name, color).with_slices(self.to_vector(config).to_slices())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point2;
    use crate::model::Contour;

    fn square(x0: f64, y0: f64, s: f64) -> Ring {
        Ring::new(vec![
            Point2::new(x0, y0),
            Point2::new(x0 + s, y0),
            Point2::new(x0 + s, y0 + s),
            Point2::new(x0, y0 + s),
        ])
        .unwrap()
    }

    #[test]
    fn nesting_depth_sets_role_and_orientation() {
        let outer = square(0.0, 0.0, 10.0).reversed();
        let hole = square(2.0, 2.0, 6.0);
        let island = square(4.0, 4.0, 2.0);
        let tagged = VipStructure::tag_rings(&[hole, outer, island]);
        assert_eq!(tagged[0].role, RingRole::Hole);
        assert!(tagged[0].ring.is_clockwise());
        assert_eq!(tagged[1].role, RingRole::Solid);
        assert!(!tagged[1].ring.is_clockwise());
        assert_eq!(tagged[2].role, RingRole::Solid);
    }

    #[test]
    fn group_nested_attaches_holes_to_tightest_solid() {
        let tagged = VipStructure::tag_rings(&[
            square(0.0, 0.0, 10.0),
            square(2.0, 2.0, 6.0),
            square(4.0, 4.0, 2.0),
            square(20.0, 0.0, 3.0),
        ]);
        let groups = VipStructure::group_nested(&tagged);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].1.len(), 1);
        assert!(groups[1].1.is_empty());
    }

    #[test]
    fn vector_raster_vector_preserves_area() {
        let mut s = Structure::new("GTV", Color::rgb(255, 0, 0));
        s.add_contour(Contour::from_ring(square(0.0, 0.0, 10.0), 1.5));
        let grid = Grid::new(Point2::new(-1.05, -1.05), 0.1, 0.1, 125, 125).unwrap();
        let data = StructureData::Vector(VipStructure::from_structure(&s, &grid));
        let raster = StructureData::Raster(data.to_raster());
        let back = raster.to_structure("GTV", s.color, &EngineConfig::default());
        let area = back.slice(1.5).unwrap().area();
        assert!((area - 100.0).abs() / 100.0 < 0.02, "area {area}");
    }
}
