use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid weight configuration: {0}")]
    InvalidWeightConfiguration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Embedding failed: {0}")]
    Embed(String),

    #[error("Vector store failed: {0}")]
    VectorStore(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Per-request failures that a stage absorbs as "zero candidates".
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Embed(_) | Error::VectorStore(_))
    }

    /// Failures that must surface to the caller instead of degrading.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
