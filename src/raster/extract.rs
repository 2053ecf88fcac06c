//! Contour reconstruction from a mask (marching squares).
//!
//! The sample lattice is padded by one outside sample on every side, so every
//! boundary closes. Each lattice square is walked counter-clockwise; an edge
//! going from an inside to an outside corner is an *exit*, the reverse an
//! *entry*. Every exit is joined to the nearest entry before it, which keeps
//! diagonal (saddle) foreground cells apart and puts the inside of each
//! segment on its left. Outer boundaries therefore come out counter-clockwise
//! and holes clockwise.
//!
//! Edge midpoints are keyed in doubled pixel coordinates so that linking is
//! exact integer matching.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::warn;

use super::Mask;
use crate::config::EngineConfig;
use crate::error::{GeometryError, Result};
use crate::grid::Grid;
use crate::math::simplify::douglas_peucker_closed;
use crate::math::Point2;
use crate::model::Ring;

type Key = (i64, i64);

/// Post-processing applied to extracted rings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExtractOptions {
    /// Rings whose area is at or below this value (mm²) are dropped.
    pub min_area_mm2: f64,
    /// Douglas-Peucker tolerance in millimetres; `0` keeps every corner.
    pub simplify_tolerance_mm: f64,
}

impl ExtractOptions {
    #[must_use]
    pub fn from_config(config: &EngineConfig, grid: &Grid) -> Self {
        Self {
            min_area_mm2: config.min_area_for_cell(grid.cell_area()),
            simplify_tolerance_mm: config.simplify_tolerance_mm,
        }
    }

    /// Smallest 8-connected component, in cells of `grid`, whose area exceeds
    /// `min_area_mm2`. Smaller components are cleared before tracing, so a
    /// thin loop under the threshold vanishes whole instead of leaving its
    /// outer ring behind.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn min_component_cells(&self, grid: &Grid) -> usize {
        let cell = grid.cell_area();
        if cell <= 0.0 || !self.min_area_mm2.is_finite() || self.min_area_mm2 <= 0.0 {
            return 1;
        }
        (self.min_area_mm2 / cell).floor() as usize + 1
    }
}

/// Extracts boundary rings with the default noise threshold for `grid`.
#[must_use]
pub fn extract_contours(mask: &Mask, grid: &Grid) -> Vec<Ring> {
    extract_contours_with(mask, grid, &ExtractOptions::from_config(&EngineConfig::default(), grid))
}

/// Extracts boundary rings from `mask` in world coordinates.
///
/// Every outer ring is followed by the holes it directly contains.
#[must_use]
pub fn extract_contours_with(mask: &Mask, grid: &Grid, options: &ExtractOptions) -> Vec<Ring> {
    collect_rings(mask, grid, options, false).unwrap_or_default()
}

/// Like [`extract_contours_with`], but a boundary that does not close fails
/// the whole mask instead of being dropped.
///
/// # Errors
///
/// Returns `GeometryError::OpenBoundary` for an unclosed boundary walk.
pub fn try_extract_contours(mask: &Mask, grid: &Grid, options: &ExtractOptions) -> Result<Vec<Ring>> {
    collect_rings(mask, grid, options, true)
}

fn collect_rings(mask: &Mask, grid: &Grid, options: &ExtractOptions, strict: bool) -> Result<Vec<Ring>> {
    if mask.is_empty() || grid.is_empty() {
        return Ok(Vec::new());
    }
    let mask = match options.min_component_cells(grid) {
        n if n > 1 => Cow::Owned(mask.remove_small_components(n)),
        _ => Cow::Borrowed(mask),
    };

    let mut rings = Vec::new();
    for chain in trace_boundaries(&mask) {
        let chain = match chain {
            Ok(chain) => chain,
            Err(err) if strict => return Err(err),
            Err(err) => {
                warn!(%err, "dropping unclosed boundary");
                continue;
            }
        };
        let keys = drop_collinear(&chain);
        if keys.len() < 3 {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let points: Vec<Point2> = keys
            .iter()
            .map(|&(kx, ky)| {
                let (x, y) = grid.pixel_to_world(kx as f64 / 2.0, ky as f64 / 2.0);
                Point2::new(x, y)
            })
            .collect();
        let points = douglas_peucker_closed(&points, options.simplify_tolerance_mm);
        let Ok(ring) = Ring::new(points) else {
            continue;
        };
        if ring.area() <= options.min_area_mm2 {
            continue;
        }
        rings.push(ring);
    }
    Ok(nest_holes(rings))
}

/// Builds the start → end segment map and walks it into closed key chains.
#[allow(clippy::cast_possible_wrap)]
fn trace_boundaries(mask: &Mask) -> Vec<Result<Vec<Key>>> {
    let (w, h) = (mask.width() as isize, mask.height() as isize);
    let mut next: HashMap<Key, Key> = HashMap::new();
    let mut starts: Vec<Key> = Vec::new();

    for j in -1..h {
        for i in -1..w {
            let v = [
                mask.get(i, j),
                mask.get(i + 1, j),
                mask.get(i + 1, j + 1),
                mask.get(i, j + 1),
            ];
            if v.iter().all(|&b| b) || v.iter().all(|&b| !b) {
                continue;
            }
            let (i2, j2) = (2 * i as i64, 2 * j as i64);
            let mid = [
                (i2 + 1, j2),
                (i2 + 2, j2 + 1),
                (i2 + 1, j2 + 2),
                (i2, j2 + 1),
            ];
            let entry = |k: usize| !v[k] && v[(k + 1) % 4];
            for k in 0..4 {
                let exit = v[k] && !v[(k + 1) % 4];
                if !exit {
                    continue;
                }
                // Nearest entry walking backwards around the square.
                let Some(e) = (1..4).map(|d| (k + 4 - d) % 4).find(|&e| entry(e)) else {
                    continue;
                };
                next.insert(mid[k], mid[e]);
                starts.push(mid[k]);
            }
        }
    }

    let mut chains = Vec::new();
    for start in starts {
        if !next.contains_key(&start) {
            continue;
        }
        let mut chain = vec![start];
        let mut cur = start;
        let closed = loop {
            let Some(n) = next.remove(&cur) else {
                break false;
            };
            if n == start {
                break true;
            }
            chain.push(n);
            cur = n;
        };
        chains.push(if closed {
            Ok(chain)
        } else {
            Err(GeometryError::OpenBoundary(format!(
                "walk from ({}, {}) stopped after {} points",
                start.0,
                start.1,
                chain.len()
            ))
            .into())
        });
    }
    chains
}

fn cross(a: Key, b: Key, c: Key) -> i64 {
    (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0)
}

/// Removes vertices lying on a straight run of boundary, including across
/// the wrap-around.
fn drop_collinear(chain: &[Key]) -> Vec<Key> {
    let mut out: Vec<Key> = Vec::with_capacity(chain.len());
    for (i, &cur) in chain.iter().enumerate() {
        let prev = out.last().copied().unwrap_or(chain[chain.len() - 1]);
        let next = chain[(i + 1) % chain.len()];
        if cross(prev, cur, next) != 0 {
            out.push(cur);
        }
    }
    loop {
        let n = out.len();
        if n < 3 {
            return out;
        }
        if cross(out[n - 1], out[0], out[1]) == 0 {
            out.remove(0);
        } else if cross(out[n - 2], out[n - 1], out[0]) == 0 {
            out.pop();
        } else {
            return out;
        }
    }
}

/// Orders rings as outer, its holes, next outer, ...
fn nest_holes(rings: Vec<Ring>) -> Vec<Ring> {
    let (outers, holes): (Vec<Ring>, Vec<Ring>) =
        rings.into_iter().partition(|r| r.signed_area() > 0.0);
    let mut children: Vec<Vec<Ring>> = vec![Vec::new(); outers.len()];
    let mut orphans = Vec::new();
    for hole in holes {
        let sample = hole.points()[0];
        let parent = outers
            .iter()
            .enumerate()
            .filter(|(_, o)| o.contains(&sample))
            .min_by(|(_, a), (_, b)| a.area().total_cmp(&b.area()))
            .map(|(i, _)| i);
        match parent {
            Some(i) => children[i].push(hole),
            None => orphans.push(hole),
        }
    }
    let mut out = Vec::new();
    for (outer, kids) in outers.into_iter().zip(children) {
        out.push(outer);
        out.extend(kids);
    }
    out.extend(orphans);
    out
}
