//! Thread-safe typed wrapper over an XML document tree.
//!
//! A [`Document`] owns one tree, an [`AccessMode`] fixed at construction,
//! and a lock domain shared by every [`Node`] attached to it, so
//! concurrent readers and writers of the same document never race.
//! Detached nodes head private trees with independent lock domains.
//! Parsing, serialization, and query evaluation are delegated to external
//! engines through the `xml-engine` crate; queries take untrusted values
//! through a parameter binder instead of string concatenation, and a
//! bound value the expression never uses is reported as an error.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use xml_doc::{AccessMode, Document};
//!
//! let doc = Document::parse("<root><item id=\"1\"/></root>", AccessMode::Mutable)?;
//! let items = doc.evaluate_to_elements_with("//item[@id=$0]", &["1"])?;
//! items[0].set_attribute("seen", "true")?;
//! ```

mod binder;
pub mod document;
pub mod error;
mod lock;
pub mod mode;
pub mod node;

pub use document::{Document, Output};
pub use error::{Result, XmlError};
pub use mode::AccessMode;
pub use node::Node;
