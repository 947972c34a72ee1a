use thiserror::Error;

/// Top-level error type for skelform.
#[derive(Debug, Error)]
pub enum SkelformError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Detail(#[from] DetailError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Triangulation(#[from] TriangulationError),
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("zero-length vector")]
    ZeroVector,
}

/// Errors raised by the geometry container.
#[derive(Debug, Error)]
pub enum DetailError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("invalid primitive: {0}")]
    InvalidPrimitive(String),
}

/// Errors related to skeleton and offset operations.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised while building a constrained triangulation.
#[derive(Debug, Error)]
pub enum TriangulationError {
    #[error("point insertion failed: {0}")]
    Insertion(String),
}

/// Convenience type alias for results using [`SkelformError`].
pub type Result<T> = std::result::Result<T, SkelformError>;
