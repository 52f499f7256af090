//! Error types for engine operations

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the XML tree and query engine surface
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// XML parsing failed
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// XML serialization failed
    #[error("XML serialization error: {0}")]
    Serialize(String),

    /// Query expression compilation failed
    #[error("query compilation error: {0}")]
    QueryCompile(String),

    /// Query evaluation failed
    #[error("query evaluation error: {0}")]
    QueryEval(String),

    /// Tree node access or mutation failed
    #[error("node access error: {0}")]
    NodeAccess(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
