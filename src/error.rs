use thiserror::Error;

/// Top-level error type for the contour engine.
#[derive(Debug, Error)]
pub enum ContourError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors related to geometric input and computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("ring has zero area")]
    ZeroArea,

    #[error("grid spacing must be strictly positive, got ({row}, {col})")]
    NonPositiveSpacing { row: f64, col: f64 },

    #[error("ring set self-intersects near ({x:.3}, {y:.3})")]
    SelfIntersection { x: f64, y: f64 },

    #[error("boundary walk did not close: {0}")]
    OpenBoundary(String),
}

/// Errors related to margin and boolean operations.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("margin {requested} mm exceeds the limit of {limit} mm")]
    MarginOutOfRange { requested: f64, limit: f64 },

    #[error("raster and vector backends disagree (dice = {dice:.4})")]
    BackendMismatch { dice: f64 },

    #[error("operation failed: {0}")]
    Failed(String),
}

/// Errors surfaced by the job dispatcher.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job canceled")]
    Canceled,

    #[error("job timed out")]
    Timeout,

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("result channel disconnected")]
    Disconnected,
}

/// Errors related to the structure store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("structure not found: {0}")]
    StructureNotFound(String),
}

impl ContourError {
    /// Returns `true` for errors that stem from cooperative cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Job(JobError::Canceled))
    }
}

/// Convenience type alias for results using [`ContourError`].
pub type Result<T> = std::result::Result<T, ContourError>;
