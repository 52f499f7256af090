//! Engine delegation layer: the external XML tree and query collaborators.
//!
//! This crate wraps the two engines the document layer delegates to: the
//! xot arena for parsing, serialization, and tree storage, and the xee
//! XPath engine for query compilation and evaluation. Nothing in here
//! knows about documents, access modes, or lock domains; it exposes one
//! tree ([`Tree`]) and query evaluation against it ([`query`]).

pub mod error;
pub mod query;
pub mod tree;

pub use error::{Error, Result};
pub use query::{NoVariables, VariableResolver};
pub use tree::Tree;
