pub mod distance_2d;
pub mod intersect_2d;
pub mod polygon_2d;
pub mod simplify;

pub use polygon_2d::Bounds;

/// 2D point type (millimetres, patient space).
pub type Point2 = nalgebra::Point2<f64>;

/// 2D vector type.
pub type Vector2 = nalgebra::Vector2<f64>;

pub use crate::config::constants::TOLERANCE;
