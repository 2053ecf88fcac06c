pub mod boolean;
pub mod interpolate;
pub mod margin;

pub use boolean::{combine_rings, Backend, BooleanOp, Combine};
pub use interpolate::{InterpolateSlices, InterpolationOutcome};
pub use margin::{Margin, MarginParams, MarginPreview, PreviewMode};
