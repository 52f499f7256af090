//! Error types for document operations

/// Result type for document operations
pub type Result<T> = std::result::Result<T, XmlError>;

/// Unified error type for document and element operations
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// A required argument was empty or otherwise unusable. Raised before
    /// any lock is taken or any mutation happens.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Mutation was attempted on an element owned by a document whose
    /// access mode is immutable. Raised before any tree change.
    #[error("owning document has access mode set to immutable")]
    Immutable,

    /// An element offered for attachment already belongs to a tree. The
    /// whole batch is rejected before any of it is attached.
    #[error("element named '{0}' already has an attached parent")]
    AlreadyAttached(String),

    /// A bound query parameter was never referenced by the expression.
    /// Raised only after evaluation, never before.
    #[error("query expression did not use variable ${0} for which a value was bound")]
    UnusedBinding(String),

    /// Error surfaced by the underlying XML or query engine.
    #[error(transparent)]
    Engine(#[from] xml_engine::Error),

    /// IO error while writing serialized output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
