pub mod config;
pub mod dispatch;
pub mod error;
pub mod grid;
pub mod math;
pub mod model;
pub mod operations;
pub mod raster;
pub mod safety;

pub use config::EngineConfig;
pub use error::{ContourError, Result};
