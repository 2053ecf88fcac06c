#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Once;

use rtcontour::math::Point2;
use rtcontour::model::{Color, Contour, Ring, Structure};

static TRACING: Once = Once::new();

/// Installs a test subscriber once. Default: WARN for everything.
/// Override with `RUST_LOG` (e.g. `RUST_LOG=rtcontour=debug`).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
    Ring::new(vec![
        Point2::new(x0, y0),
        Point2::new(x1, y0),
        Point2::new(x1, y1),
        Point2::new(x0, y1),
    ])
    .unwrap()
}

#[allow(clippy::cast_precision_loss)]
pub fn circle(cx: f64, cy: f64, r: f64, n: usize) -> Ring {
    Ring::new(
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64 * std::f64::consts::TAU;
                Point2::new(cx + r * t.cos(), cy + r * t.sin())
            })
            .collect(),
    )
    .unwrap()
}

pub fn structure(name: &str, slices: &[(f64, Ring)]) -> Structure {
    let mut s = Structure::new(name, Color::rgb(200, 100, 0));
    for (z, ring) in slices {
        s.add_contour(Contour::from_ring(ring.clone(), *z));
    }
    s
}
