//! Raster representation of structures.
//!
//! - **Mask**: binary occupancy grid (`ndarray::Array2<u8>`, `[row, col]`)
//! - **Rasterize**: even-odd scanline fill of ring sets
//! - **Extract**: marching-squares boundary reconstruction back to rings
//! - **Morphology**: elliptical dilation / erosion / open / close

pub mod extract;
pub mod morphology;
pub mod rasterize;

use std::collections::{BTreeMap, VecDeque};

use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::{GeometryError, Result};
use crate::grid::Grid;
use crate::model::{Slice, SliceKey, Structure};

pub use extract::{extract_contours, extract_contours_with, try_extract_contours, ExtractOptions};
pub use morphology::StructuringElement;
pub use rasterize::rasterize;

/// Binary occupancy grid. Any non-zero cell is inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<u8>,
}

impl Mask {
    /// An all-outside mask of `width` columns by `height` rows.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: Array2::zeros((height, width)),
        }
    }

    #[must_use]
    pub fn for_grid(grid: &Grid) -> Self {
        Self::new(grid.width(), grid.height())
    }

    #[must_use]
    pub fn from_array(data: Array2<u8>) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn view(&self) -> ArrayView2<'_, u8> {
        self.data.view()
    }

    /// Cell value, treating out-of-bounds as outside.
    #[must_use]
    pub fn get(&self, col: isize, row: isize) -> bool {
        if col < 0 || row < 0 {
            return false;
        }
        #[allow(clippy::cast_sign_loss)]
        let index = (row as usize, col as usize);
        self.data.get(index).is_some_and(|&v| v != 0)
    }

    pub fn set(&mut self, col: usize, row: usize, inside: bool) {
        if let Some(v) = self.data.get_mut((row, col)) {
            *v = u8::from(inside);
        }
    }

    /// Number of inside cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    fn zip_with(&self, other: &Self, f: impl Fn(bool, bool) -> bool) -> Result<Self> {
        if self.data.dim() != other.data.dim() {
            return Err(GeometryError::InvalidInput(format!(
                "mask shapes differ: {:?} vs {:?}",
                self.data.dim(),
                other.data.dim()
            ))
            .into());
        }
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| u8::from(f(a != 0, b != 0)));
        Ok(Self { data })
    }

    /// Per-cell `AND`.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` when the shapes differ.
    pub fn and(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a && b)
    }

    /// Per-cell `OR`.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` when the shapes differ.
    pub fn or(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a || b)
    }

    /// Per-cell `AND NOT`.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` when the shapes differ.
    pub fn and_not(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a && !b)
    }

    /// `true` when every inside cell of `other` is inside `self`.
    #[must_use]
    pub fn contains_mask(&self, other: &Self) -> bool {
        self.data.dim() == other.data.dim()
            && Zip::from(&self.data)
                .and(&other.data)
                .all(|&a, &b| b == 0 || a != 0)
    }

    /// Dice coefficient `2|A∩B| / (|A|+|B|)`. Two empty masks score `1`.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::InvalidInput` when the shapes differ.
    pub fn dice(&self, other: &Self) -> Result<f64> {
        let both = self.and(other)?.count();
        let total = self.count() + other.count();
        if total == 0 {
            return Ok(1.0);
        }
        #[allow(clippy::cast_precision_loss)]
        let dice = 2.0 * both as f64 / total as f64;
        Ok(dice)
    }

    /// Labels 8-connected components, in row-major discovery order from `1`.
    #[must_use]
    pub fn label_components(&self) -> LabelMap {
        let (h, w) = self.data.dim();
        let mut labels = Array2::<u32>::zeros((h, w));
        let mut sizes = Vec::new();
        let mut queue = VecDeque::new();

        for r in 0..h {
            for c in 0..w {
                if self.data[[r, c]] == 0 || labels[[r, c]] != 0 {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                let label = sizes.len() as u32 + 1;
                let mut size = 0usize;
                labels[[r, c]] = label;
                queue.push_back((r, c));
                while let Some((y, x)) = queue.pop_front() {
                    size += 1;
                    for dy in -1isize..=1 {
                        for dx in -1isize..=1 {
                            let (Some(ny), Some(nx)) =
                                (y.checked_add_signed(dy), x.checked_add_signed(dx))
                            else {
                                continue;
                            };
                            if ny < h && nx < w && self.data[[ny, nx]] != 0 && labels[[ny, nx]] == 0 {
                                labels[[ny, nx]] = label;
                                queue.push_back((ny, nx));
                            }
                        }
                    }
                }
                sizes.push(size);
            }
        }
        LabelMap { labels, sizes }
    }

    /// Clears 8-connected components smaller than `min_cells`.
    #[must_use]
    pub fn remove_small_components(&self, min_cells: usize) -> Self {
        if min_cells <= 1 {
            return self.clone();
        }
        let map = self.label_components();
        let data = map.labels.mapv(|l| {
            u8::from(l != 0 && map.sizes.get(l as usize - 1).is_some_and(|&s| s >= min_cells))
        });
        Self { data }
    }
}

/// Multi-label mask produced by connected-component labelling.
#[derive(Debug, Clone)]
pub struct LabelMap {
    /// `0` is background; components are numbered from `1`.
    pub labels: Array2<u32>,
    /// Cell count per component, indexed by `label - 1`.
    pub sizes: Vec<usize>,
}

impl LabelMap {
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.sizes.len()
    }

    /// Binary mask of a single component.
    #[must_use]
    pub fn component(&self, label: u32) -> Mask {
        Mask::from_array(self.labels.mapv(|l| u8::from(l == label && label != 0)))
    }
}

/// One rasterized slice.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSlice {
    pub z: f64,
    pub mask: Mask,
}

/// Raster structure: a grid plus one mask per slice.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskStructure {
    pub grid: Grid,
    pub slices: BTreeMap<SliceKey, MaskSlice>,
}

impl MaskStructure {
    #[must_use]
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            slices: BTreeMap::new(),
        }
    }

    /// Rasterizes every slice of `structure` onto `grid`, slices in parallel.
    #[must_use]
    pub fn from_structure(structure: &Structure, grid: &Grid) -> Self {
        let slices: Vec<&Slice> = structure.slices().collect();
        let masks: Vec<(SliceKey, MaskSlice)> = slices
            .par_iter()
            .map(|s| {
                let mask = rasterize(&s.rings, grid);
                (s.key(), MaskSlice { z: s.z, mask })
            })
            .collect();
        Self {
            grid: *grid,
            slices: masks.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, z: f64, mask: Mask) {
        self.slices.insert(SliceKey::from_z(z), MaskSlice { z, mask });
    }

    #[must_use]
    pub fn get(&self, z: f64) -> Option<&Mask> {
        self.slices.get(&SliceKey::from_z(z)).map(|s| &s.mask)
    }

    /// Reconstructs world-space contours for every slice.
    #[must_use]
    pub fn to_slices(&self, config: &EngineConfig) -> Vec<Slice> {
        let options = ExtractOptions::from_config(config, &self.grid);
        let slices: Vec<&MaskSlice> = self.slices.values().collect();
        slices
            .par_iter()
            .map(|s| Slice::new(s.z, extract_contours_with(&s.mask, &self.grid, &options)))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn block(w: usize, h: usize, cells: &[(usize, usize)]) -> Mask {
        let mut m = Mask::new(w, h);
        for &(c, r) in cells {
            m.set(c, r, true);
        }
        m
    }

    #[test]
    fn boolean_cell_ops() {
        let a = block(3, 1, &[(0, 0), (1, 0)]);
        let b = block(3, 1, &[(1, 0), (2, 0)]);
        assert_eq!(a.and(&b).unwrap().count(), 1);
        assert_eq!(a.or(&b).unwrap().count(), 3);
        assert_eq!(a.and_not(&b).unwrap().count(), 1);
        assert!(a.and_not(&a).unwrap().is_empty());
        let union = a.or(&b).unwrap();
        assert!(union.contains_mask(&a) && union.contains_mask(&b));
        assert!(!a.contains_mask(&union));
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        assert!(Mask::new(2, 2).and(&Mask::new(3, 2)).is_err());
    }

    #[test]
    fn dice_scores() {
        let a = block(4, 1, &[(0, 0), (1, 0)]);
        let b = block(4, 1, &[(1, 0), (2, 0)]);
        assert!((a.dice(&a).unwrap() - 1.0).abs() < 1e-12);
        assert!((a.dice(&b).unwrap() - 0.5).abs() < 1e-12);
        assert!((Mask::new(2, 2).dice(&Mask::new(2, 2)).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn labels_diagonal_neighbours_together() {
        let m = block(5, 5, &[(0, 0), (1, 1), (4, 4), (4, 3)]);
        let map = m.label_components();
        assert_eq!(map.component_count(), 2);
        assert_eq!(map.sizes, vec![2, 2]);
        assert_eq!(map.component(1).count(), 2);
    }

    #[test]
    fn small_components_are_removed() {
        let m = block(6, 6, &[(0, 0), (3, 3), (3, 4), (4, 3), (4, 4)]);
        let cleaned = m.remove_small_components(2);
        assert_eq!(cleaned.count(), 4);
        assert!(!cleaned.get(0, 0));
    }

    #[test]
    fn out_of_bounds_reads_as_outside() {
        let m = block(2, 2, &[(0, 0)]);
        assert!(m.get(0, 0));
        assert!(!m.get(-1, 0));
        assert!(!m.get(5, 5));
    }
}
