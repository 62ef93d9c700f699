//! Error types for the comparison engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while caching, rendering, or comparing documents
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode or encode a page image
    #[error("Image error: {0}")]
    Image(String),

    /// Failed to serialize a sidecar or report record
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// No document capability is registered for the file's format
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The underlying document capability failed to open or render
    #[error("Document capability failed: {0}")]
    Capability(String),

    /// `commit` was called before any page count was known
    #[error("There is no data to commit")]
    NothingToCommit,

    /// A background write task failed or panicked
    #[error("Background write failed: {0}")]
    Task(String),

    /// Batch execution was started without any task
    #[error("Please add one task at least")]
    NoTasks,
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}
