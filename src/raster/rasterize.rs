//! Scanline polygon fill.
//!
//! Every ring of a slice contributes its edge crossings to a shared per-row
//! list; filling between alternate crossings is the even-odd rule, which is
//! the XOR of each ring's own parity. Holes therefore subtract regardless of
//! ring order or winding.

use super::Mask;
use crate::grid::Grid;
use crate::model::Ring;

/// Rasterizes `rings` onto `grid`, sampling at cell centres.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn rasterize(rings: &[Ring], grid: &Grid) -> Mask {
    let mut mask = Mask::for_grid(grid);
    if grid.is_empty() || rings.is_empty() {
        return mask;
    }
    let (w, h) = (grid.width(), grid.height());

    // Work in pixel space: sample (c, r) sits at integer coordinates.
    let mut crossings: Vec<Vec<f64>> = vec![Vec::new(); h];
    for ring in rings {
        let pts: Vec<(f64, f64)> = ring
            .points()
            .iter()
            .map(|p| grid.world_to_pixel(p.x, p.y))
            .collect();
        let n = pts.len();
        for i in 0..n {
            let (ax, ay) = pts[i];
            let (bx, by) = pts[(i + 1) % n];
            if (ay - by).abs() < f64::EPSILON {
                continue;
            }
            let (lo, hi) = (ay.min(by), ay.max(by));
            let r0 = lo.ceil().max(0.0);
            let r1 = hi.ceil().min(h as f64);
            if r1 <= r0 {
                continue;
            }
            for r in (r0 as usize)..(r1 as usize) {
                let y = r as f64;
                // Half-open rule so shared vertices are counted once.
                if (ay > y) != (by > y) {
                    crossings[r].push(ax + (y - ay) * (bx - ax) / (by - ay));
                }
            }
        }
    }

    for (r, xs) in crossings.iter_mut().enumerate() {
        if xs.len() < 2 {
            continue;
        }
        xs.sort_by(f64::total_cmp);
        for pair in xs.chunks_exact(2) {
            // Fill sample columns c with pair[0] <= c < pair[1].
            let c0 = pair[0].ceil().max(0.0);
            let c1 = pair[1].ceil().min(w as f64);
            if c1 <= c0 {
                continue;
            }
            for c in (c0 as usize)..(c1 as usize) {
                mask.set(c, r, true);
            }
        }
    }
    mask
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point2;

    fn ring(pts: &[(f64, f64)]) -> Ring {
        Ring::new(pts.iter().map(|&(x, y)| Point2::new(x, y)).collect()).unwrap()
    }

    fn unit_grid(w: usize, h: usize) -> Grid {
        Grid::new(Point2::new(0.0, 0.0), 1.0, 1.0, w, h).unwrap()
    }

    #[test]
    fn fills_square_cells() {
        // Samples at integer coordinates 1..=4 fall inside [0.5, 4.5].
        let sq = ring(&[(0.5, 0.5), (4.5, 0.5), (4.5, 4.5), (0.5, 4.5)]);
        let m = rasterize(&[sq], &unit_grid(8, 8));
        assert_eq!(m.count(), 16);
        assert!(m.get(1, 1) && m.get(4, 4));
        assert!(!m.get(0, 0) && !m.get(5, 5));
    }

    #[test]
    fn nested_ring_is_a_hole_in_either_winding() {
        let outer = ring(&[(0.5, 0.5), (6.5, 0.5), (6.5, 6.5), (0.5, 6.5)]);
        let inner = ring(&[(2.5, 2.5), (4.5, 2.5), (4.5, 4.5), (2.5, 4.5)]);
        let g = unit_grid(8, 8);
        let a = rasterize(&[outer.clone(), inner.clone()], &g);
        let b = rasterize(&[inner.reversed(), outer], &g);
        assert_eq!(a.count(), 36 - 4);
        assert_eq!(a, b);
        assert!(!a.get(3, 3));
    }

    #[test]
    fn overlapping_rings_cancel_by_parity() {
        let a = ring(&[(0.5, 0.5), (4.5, 0.5), (4.5, 2.5), (0.5, 2.5)]);
        let b = ring(&[(2.5, 0.5), (6.5, 0.5), (6.5, 2.5), (2.5, 2.5)]);
        let m = rasterize(&[a, b], &unit_grid(8, 4));
        // Columns 3 and 4 are covered twice and cancel.
        assert!(m.get(1, 1) && m.get(5, 1));
        assert!(!m.get(3, 1) && !m.get(4, 1));
    }

    #[test]
    fn ring_outside_grid_leaves_mask_empty() {
        let far = ring(&[(100.0, 100.0), (101.0, 100.0), (101.0, 101.0)]);
        assert!(rasterize(&[far], &unit_grid(4, 4)).is_empty());
    }
}
