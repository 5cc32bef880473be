//! Error type for VOL operations.

use std::io;

use crate::object::{ObjectId, ObjectType};

/// Errors reported by a VOL connector.
#[derive(Debug, thiserror::Error)]
pub enum VolError {
    /// I/O error from the underlying storage.
    #[error("VOL I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested operation is not supported by this VOL connector.
    #[error("VOL operation not supported: {0}")]
    Unsupported(String),

    /// Object (container, link, dataset, attribute) not found.
    #[error("VOL object not found: {0}")]
    NotFound(String),

    #[error("VOL object already exists: {0}")]
    AlreadyExists(String),

    /// The id was never issued, or has already been closed.
    #[error("invalid object handle {0}")]
    InvalidHandle(ObjectId),

    #[error("wrong object type: expected {expected}, got {actual}")]
    WrongType {
        expected: ObjectType,
        actual: ObjectType,
    },

    /// The container is open elsewhere and the operation needs it closed.
    #[error("container busy: {0}")]
    Busy(String),

    #[error("container opened read-only: {0}")]
    ReadOnly(String),

    /// Data format, size or layout error.
    #[error("VOL data error: {0}")]
    DataError(String),

    #[error("container image error: {0}")]
    Serde(#[from] serde_json::Error),

    /// An error raised by a stacked connector for a step it performs itself.
    #[error("{connector}: {source}")]
    Connector {
        connector: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, VolError>;
