//! Binary morphology with elliptical structuring elements.
//!
//! The element is stored as one half-width per row offset, which lets both
//! operations test each row span with a prefix-sum lookup instead of visiting
//! every element cell. Output rows are computed in parallel.

use ndarray::Array2;
use rayon::prelude::*;

use super::Mask;
use crate::grid::Grid;

/// Radius slack so that e.g. `1.0 / 0.1` still reaches ten whole cells.
const RADIUS_EPS: f64 = 1e-9;

/// A symmetric structuring element, described row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    /// `half_widths[k]` is the column half-width at row offset `k - ry`.
    half_widths: Vec<usize>,
}

impl StructuringElement {
    /// Ellipse with radii in (fractional) pixels along columns and rows.
    ///
    /// Negative radii are treated as their magnitude.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn ellipse(rx_px: f64, ry_px: f64) -> Self {
        let rx = rx_px.abs();
        let ry = ry_px.abs();
        let ry_cells = (ry + RADIUS_EPS).floor() as usize;
        let half_widths = (0..=2 * ry_cells)
            .map(|k| {
                let dy = k as f64 - ry_cells as f64;
                if ry < RADIUS_EPS {
                    return (rx + RADIUS_EPS).floor() as usize;
                }
                let t = 1.0 - (dy / ry).powi(2);
                if t <= 0.0 {
                    0
                } else {
                    (rx * t.sqrt() + RADIUS_EPS).floor() as usize
                }
            })
            .collect();
        Self { half_widths }
    }

    /// Element for a millimetre margin on `grid`, converting each axis by its
    /// own spacing.
    #[must_use]
    pub fn from_margin(margin_x_mm: f64, margin_y_mm: f64, grid: &Grid) -> Self {
        Self::ellipse(
            margin_x_mm / grid.col_spacing(),
            margin_y_mm / grid.row_spacing(),
        )
    }

    /// Row offset radius in cells.
    #[must_use]
    pub fn ry(&self) -> usize {
        self.half_widths.len() / 2
    }

    /// `true` when the element is the single centre cell.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.half_widths.len() == 1 && self.half_widths[0] == 0
    }

    /// Number of cells covered by the element.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.half_widths.iter().map(|w| 2 * w + 1).sum()
    }
}

/// Per-row inclusive prefix sums with a leading zero column.
fn row_prefix_sums(mask: &Mask) -> Array2<u32> {
    let (h, w) = (mask.height(), mask.width());
    let view = mask.view();
    let mut sums = Array2::<u32>::zeros((h, w + 1));
    for r in 0..h {
        for c in 0..w {
            sums[[r, c + 1]] = sums[[r, c]] + u32::from(view[[r, c]] != 0);
        }
    }
    sums
}

/// Shared dilation/erosion kernel; `dilate` selects the operation.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn apply(mask: &Mask, se: &StructuringElement, dilate: bool) -> Mask {
    if se.is_identity() || mask.width() == 0 || mask.height() == 0 {
        return mask.clone();
    }
    let (h, w) = (mask.height() as isize, mask.width() as isize);
    let sums = row_prefix_sums(mask);
    let ry = se.ry() as isize;

    let rows: Vec<Vec<u8>> = (0..h)
        .into_par_iter()
        .map(|r| {
            (0..w)
                .map(|c| {
                    let hit = se.half_widths.iter().enumerate().any(|(k, &hw)| {
                        let rr = r + k as isize - ry;
                        let hw = hw as isize;
                        let (lo, hi) = (c - hw, c + hw);
                        if dilate {
                            if rr < 0 || rr >= h {
                                return false;
                            }
                            let (lo, hi) = (lo.max(0), hi.min(w - 1));
                            let n = sums[[rr as usize, hi as usize + 1]] - sums[[rr as usize, lo as usize]];
                            n > 0
                        } else {
                            // Erosion: a miss is any outside cell under the element.
                            if rr < 0 || rr >= h || lo < 0 || hi >= w {
                                return true;
                            }
                            let n = sums[[rr as usize, hi as usize + 1]] - sums[[rr as usize, lo as usize]];
                            n as isize != hi - lo + 1
                        }
                    });
                    u8::from(hit == dilate)
                })
                .collect()
        })
        .collect();

    Mask::from_array(Array2::from_shape_fn(
        (mask.height(), mask.width()),
        |(r, c)| rows[r][c],
    ))
}

/// Binary dilation: a cell is set if the element centred on it touches any set cell.
#[must_use]
pub fn dilate(mask: &Mask, se: &StructuringElement) -> Mask {
    apply(mask, se, true)
}

/// Binary erosion: a cell stays set only if the element centred on it lies
/// entirely on set cells. Cells beyond the mask count as unset.
#[must_use]
pub fn erode(mask: &Mask, se: &StructuringElement) -> Mask {
    apply(mask, se, false)
}

/// Erosion followed by dilation; removes features narrower than the element.
#[must_use]
pub fn open(mask: &Mask, se: &StructuringElement) -> Mask {
    dilate(&erode(mask, se), se)
}

/// Dilation followed by erosion; fills gaps narrower than the element.
#[must_use]
pub fn close(mask: &Mask, se: &StructuringElement) -> Mask {
    erode(&dilate(mask, se), se)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn single(w: usize, h: usize, c: usize, r: usize) -> Mask {
        let mut m = Mask::new(w, h);
        m.set(c, r, true);
        m
    }

    fn block(w: usize, h: usize, c0: usize, r0: usize, c1: usize, r1: usize) -> Mask {
        let mut m = Mask::new(w, h);
        for r in r0..=r1 {
            for c in c0..=c1 {
                m.set(c, r, true);
            }
        }
        m
    }

    #[test]
    fn ellipse_shapes() {
        assert!(StructuringElement::ellipse(0.0, 0.0).is_identity());
        assert!(StructuringElement::ellipse(0.4, 0.9).is_identity());
        // Radius 1 disk is the plus sign.
        assert_eq!(StructuringElement::ellipse(1.0, 1.0).cell_count(), 5);
        // Horizontal line when the row radius is zero.
        let line = StructuringElement::ellipse(2.0, 0.0);
        assert_eq!(line.ry(), 0);
        assert_eq!(line.cell_count(), 5);
        // Vertical line when the column radius is zero.
        assert_eq!(StructuringElement::ellipse(0.0, 3.0).cell_count(), 7);
    }

    #[test]
    fn fractional_radius_reaches_whole_cells() {
        let se = StructuringElement::ellipse(1.0 / 0.1, 1.0 / 0.1);
        assert_eq!(se.ry(), 10);
    }

    #[test]
    fn zero_margin_is_identity() {
        let m = block(6, 6, 1, 2, 4, 3);
        let se = StructuringElement::ellipse(0.0, 0.0);
        assert_eq!(dilate(&m, &se), m);
        assert_eq!(erode(&m, &se), m);
    }

    #[test]
    fn dilate_point_yields_element() {
        let se = StructuringElement::ellipse(2.0, 1.0);
        let d = dilate(&single(9, 9, 4, 4), &se);
        assert_eq!(d.count(), se.cell_count());
        assert!(d.get(6, 4) && d.get(4, 5));
        assert!(!d.get(7, 4) && !d.get(4, 6));
    }

    #[test]
    fn erode_treats_border_as_background() {
        let full = block(5, 5, 0, 0, 4, 4);
        let e = erode(&full, &StructuringElement::ellipse(1.0, 1.0));
        assert_eq!(e.count(), 9);
        assert!(!e.get(0, 2));
    }

    #[test]
    fn erode_undoes_dilate_on_box() {
        let m = block(20, 20, 6, 6, 12, 12);
        let se = StructuringElement::ellipse(2.0, 2.0);
        assert_eq!(erode(&dilate(&m, &se), &se), m);
    }

    #[test]
    fn open_removes_speck_and_close_fills_gap() {
        let se = StructuringElement::ellipse(1.0, 1.0);
        let mut m = block(20, 20, 3, 3, 10, 10);
        m.set(16, 16, true);
        let opened = open(&m, &se);
        assert!(!opened.get(16, 16));
        assert!(opened.get(6, 6));

        let mut gap = block(20, 10, 2, 2, 15, 7);
        for r in 2..=7 {
            gap.set(8, r, false);
        }
        let closed = close(&gap, &se);
        assert!(closed.get(8, 4));
    }
}
