//! Document: the top-level owner of one XML tree.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use tracing::debug;
use xml_engine::query;
use xml_engine::{NoVariables, Tree, VariableResolver};

use crate::binder::ParamBinder;
use crate::error::{Result, XmlError};
use crate::lock::LockDomain;
use crate::mode::AccessMode;
use crate::node::{check_name, Node};

/// Serialization style for document output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Indented, human-readable output.
    Pretty,
    /// No added line feeds or indentation.
    Compact,
}

struct DocumentShared {
    domain: LockDomain,
    mode: AccessMode,
}

/// The top-level owner of one XML tree, its access mode, and its lock
/// domain.
///
/// Cloning a `Document` clones the handle, not the tree: both handles
/// share one lock domain and observe the same mutations, which is what
/// makes handing a document to another thread cheap. Use
/// [`Document::copy`] for an independent deep clone.
#[derive(Clone)]
pub struct Document {
    shared: Arc<DocumentShared>,
}

impl Document {
    /// Parse an XML string into a document with the given access mode.
    pub fn parse(input: &str, mode: AccessMode) -> Result<Self> {
        Ok(Self::from_tree(Tree::parse(input)?, mode))
    }

    /// Parse raw UTF-8 bytes into a document with the given access mode.
    pub fn parse_bytes(input: &[u8], mode: AccessMode) -> Result<Self> {
        Ok(Self::from_tree(Tree::parse_bytes(input)?, mode))
    }

    /// Create a new document holding a single empty root element. New
    /// documents are always mutable.
    pub fn new(root_name: &str) -> Result<Self> {
        check_name("element", root_name)?;
        Ok(Self::from_tree(Tree::build(root_name)?, AccessMode::Mutable))
    }

    fn from_tree(tree: Tree, mode: AccessMode) -> Self {
        Self {
            shared: Arc::new(DocumentShared {
                domain: LockDomain::new(tree),
                mode,
            }),
        }
    }

    pub(crate) fn domain(&self) -> &LockDomain {
        &self.shared.domain
    }

    /// The access mode fixed at construction.
    pub fn access_mode(&self) -> AccessMode {
        self.shared.mode
    }

    /// The top-level root element, owned by this document.
    pub fn root_element(&self) -> Node {
        let root = {
            let tree = self.shared.domain.lock();
            tree.root()
        };
        Node::attached(self.clone(), root)
    }

    /// Deep-clone the whole tree into a new document with its own storage
    /// and a fresh lock domain. The copy is always mutable, regardless of
    /// this document's mode.
    pub fn copy(&self) -> Result<Self> {
        let cloned = {
            let tree = self.shared.domain.lock();
            tree.deep_clone()?
        };
        debug!("copied document");
        Ok(Self::from_tree(cloned, AccessMode::Mutable))
    }

    /// Serialize the document to a string.
    pub fn serialize(&self, output: Output) -> Result<String> {
        let mut tree = self.shared.domain.lock();
        Ok(tree.serialize(output == Output::Compact)?)
    }

    /// Serialize the document and write it, UTF-8 encoded, to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W, output: Output) -> Result<()> {
        let text = self.serialize(output)?;
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Evaluate the query and return the first matching element, if any.
    pub fn evaluate_to_element(&self, expr: &str) -> Result<Option<Node>> {
        let mut elements = self.evaluate_to_elements(expr)?;
        if elements.is_empty() {
            Ok(None)
        } else {
            Ok(Some(elements.remove(0)))
        }
    }

    /// Evaluate the query and return all matching elements, in engine
    /// order. Any `$variable` reference in the expression is undeclared
    /// and fails evaluation; use the parameterized variants to bind
    /// values.
    pub fn evaluate_to_elements(&self, expr: &str) -> Result<Vec<Node>> {
        self.run_query(expr, &NoVariables)
    }

    /// Evaluate a parameterized query. Values bind positionally to the
    /// variables `$0`, `$1`, … so untrusted values never need to be
    /// spliced into the expression text. Every supplied value must be
    /// referenced by the expression; a leftover binding fails with
    /// [`XmlError::UnusedBinding`] after evaluation.
    pub fn evaluate_to_elements_with<S: AsRef<str>>(
        &self,
        expr: &str,
        values: &[S],
    ) -> Result<Vec<Node>> {
        let binder = ParamBinder::positional(values);
        let nodes = self.run_query(expr, &binder)?;
        binder.ensure_all_used()?;
        Ok(nodes)
    }

    /// Evaluate a parameterized query with explicitly named variables.
    /// Like [`Document::evaluate_to_elements_with`], every supplied key
    /// must be referenced by the expression.
    pub fn evaluate_to_elements_named(
        &self,
        expr: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<Vec<Node>> {
        let binder = ParamBinder::named(values);
        let nodes = self.run_query(expr, &binder)?;
        binder.ensure_all_used()?;
        Ok(nodes)
    }

    fn run_query(&self, expr: &str, resolver: &dyn VariableResolver) -> Result<Vec<Node>> {
        if expr.is_empty() {
            return Err(XmlError::Argument("query expression is empty".to_string()));
        }
        let positions = {
            let tree = self.shared.domain.lock();
            let paths = query::evaluate_element_paths(&tree, expr, resolver)?;
            let mut positions = Vec::with_capacity(paths.len());
            for path in &paths {
                positions.push(query::resolve_path(&tree, path)?);
            }
            positions
        };
        Ok(positions
            .into_iter()
            .map(|node| Node::attached(self.clone(), node))
            .collect())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("mode", &self.shared.mode)
            .finish_non_exhaustive()
    }
}
