//! Error taxonomy for engine operations.

use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised by graph, engine and import operations.
#[derive(Debug, Error)]
pub enum DiagramError {
    /// Malformed input: missing geometry, bad id, negative size.
    #[error("Validation error: {0}")]
    Validation(String),
    /// No constructor registered for an element or link type.
    #[error("Unknown type: {0}")]
    UnknownType(String),
    /// A link endpoint does not resolve to an element.
    #[error("Dangling reference: link {link} points at missing element {element}")]
    DanglingReference { link: String, element: String },
    /// Embedding would make an element its own ancestor.
    #[error("Cyclic embedding: {child} is an ancestor of {parent}")]
    CyclicEmbedding { parent: String, child: String },
    /// Operation on an id absent from the document.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Malformed persisted or imported payload.
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    /// The document could not be written out.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Persistence backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for DiagramError {
    fn from(err: serde_json::Error) -> Self {
        DiagramError::Deserialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type DiagramResult<T> = Result<T, DiagramError>;
