//! Element handles: navigation, text, attributes, and tree mutation.

use std::fmt;
use std::sync::{Arc, MutexGuard};

use tracing::debug;
use xml_engine::Tree;

use crate::document::Document;
use crate::error::{Result, XmlError};
use crate::lock::LockDomain;
use crate::mode::AccessMode;

/// Where an element's storage and lock live.
enum Home {
    /// Attached: storage and lock domain are the owning document's.
    Attached(Document),
    /// Detached: the element heads a private tree with a private domain.
    Detached(Arc<LockDomain>),
}

/// A handle to one element position within a tree.
///
/// Handles are deliberately not `Clone`: the operations that move an
/// element between trees ([`Node::detach`], [`Document`] attachment via
/// [`Node::attach_element`]) consume the handle, so a handle cannot
/// outlive the position it points at through its own doing. Handles
/// obtained independently (for example from two separate queries) can
/// still go stale if another handle removes the element; every operation
/// verifies liveness under the lock and a stale handle reports an error
/// instead of touching freed storage.
///
/// All operations serialize through the owning document's lock domain, or
/// through the element's private domain when detached, so concurrent use
/// from multiple threads is safe.
pub struct Node {
    home: Home,
    node: xot::Node,
}

impl Node {
    pub(crate) fn attached(document: Document, node: xot::Node) -> Self {
        Self {
            home: Home::Attached(document),
            node,
        }
    }

    pub(crate) fn detached(domain: Arc<LockDomain>, node: xot::Node) -> Self {
        Self {
            home: Home::Detached(domain),
            node,
        }
    }

    /// Create a new standalone element. It belongs to no document and is
    /// mutable until attached to one.
    pub fn new(name: &str) -> Result<Self> {
        check_name("element", name)?;
        let tree = Tree::build(name)?;
        let root = tree.root();
        Ok(Self::detached(Arc::new(LockDomain::new(tree)), root))
    }

    /// The owning document, if this element is attached to one.
    pub fn document(&self) -> Option<Document> {
        match &self.home {
            Home::Attached(document) => Some(document.clone()),
            Home::Detached(_) => None,
        }
    }

    fn domain(&self) -> &LockDomain {
        match &self.home {
            Home::Attached(document) => document.domain(),
            Home::Detached(domain) => domain,
        }
    }

    /// Lock the tree and verify this handle still points at a live
    /// element. Another handle may have removed it in the meantime;
    /// dereferencing the freed arena slot would panic, so staleness is
    /// reported as an error instead.
    fn live(&self) -> Result<MutexGuard<'_, Tree>> {
        let tree = self.domain().lock();
        if !tree.contains(self.node) {
            return Err(xml_engine::Error::NodeAccess(
                "element was removed from its tree; the handle is stale".to_string(),
            )
            .into());
        }
        Ok(tree)
    }

    /// New handle in the same home as this one.
    fn sibling_handle(&self, node: xot::Node) -> Node {
        match &self.home {
            Home::Attached(document) => Node::attached(document.clone(), node),
            Home::Detached(domain) => Node::detached(Arc::clone(domain), node),
        }
    }

    /// Re-checked on every mutating call rather than cached: a document's
    /// mode never changes, but the owner reference does (via detach and
    /// attach). Detached elements are always mutable.
    fn modification_check(&self) -> Result<()> {
        if let Home::Attached(document) = &self.home {
            if document.access_mode() == AccessMode::Immutable {
                return Err(XmlError::Immutable);
            }
        }
        Ok(())
    }

    /// The element's tag name.
    pub fn name(&self) -> Result<String> {
        let tree = self.live()?;
        Ok(element_name(&tree, self.node))
    }

    /// All attribute names present on this element, in storage order.
    pub fn attribute_names(&self) -> Result<Vec<String>> {
        let tree = self.live()?;
        let xot = tree.xot();
        let mut names = Vec::new();
        for (id, _) in xot.attributes(self.node).iter() {
            names.push(xot.local_name_str(id).to_string());
        }
        Ok(names)
    }

    /// The attribute value, if the attribute exists with a non-empty
    /// value. An empty value reads the same as a missing attribute; this
    /// matches the authoring convention the wrapper has always exposed.
    pub fn attribute(&self, name: &str) -> Result<Option<String>> {
        let tree = self.live()?;
        let xot = tree.xot();
        for (id, value) in xot.attributes(self.node).iter() {
            if xot.local_name_str(id) == name {
                if value.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(value.to_string()));
            }
        }
        Ok(None)
    }

    /// All direct child elements, in document order. Text, comment, and
    /// other non-element children are excluded.
    pub fn children(&self) -> Result<Vec<Node>> {
        self.collect_children(None)
    }

    /// Direct child elements with the given tag name, in document order.
    pub fn children_named(&self, name: &str) -> Result<Vec<Node>> {
        self.collect_children(Some(name))
    }

    /// The first direct child element with the given tag name, if any.
    pub fn child(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.collect_children(Some(name))?.into_iter().next())
    }

    fn collect_children(&self, name: Option<&str>) -> Result<Vec<Node>> {
        let matches = {
            let tree = self.live()?;
            let xot = tree.xot();
            let mut matches = Vec::new();
            for child in xot.children(self.node) {
                if let xot::Value::Element(element) = xot.value(child) {
                    if name.is_none_or(|n| xot.local_name_str(element.name()) == n) {
                        matches.push(child);
                    }
                }
            }
            matches
        };
        Ok(matches
            .into_iter()
            .map(|child| self.sibling_handle(child))
            .collect())
    }

    /// The concatenated content of all direct text children, in document
    /// order. Plain text children are whitespace-trimmed; text that
    /// arrived as a CDATA section keeps its whitespace exactly. `None` if
    /// the result is empty.
    pub fn text(&self) -> Result<Option<String>> {
        let tree = self.live()?;
        let xot = tree.xot();
        let mut out = String::new();
        for child in xot.children(self.node) {
            if let xot::Value::Text(text) = xot.value(child) {
                if tree.is_cdata_text(child) {
                    out.push_str(text.get());
                } else {
                    out.push_str(text.get().trim());
                }
            }
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    /// The structural parent element, or `None` if this element is a root
    /// or detached.
    pub fn parent(&self) -> Result<Option<Node>> {
        let parent = {
            let tree = self.live()?;
            let xot = tree.xot();
            match xot.parent(self.node) {
                Some(parent) if xot.value_type(parent) == xot::ValueType::Element => Some(parent),
                _ => None,
            }
        };
        Ok(parent.map(|parent| self.sibling_handle(parent)))
    }

    /// Exact serialization of this element and its subtree. Text that
    /// arrived as CDATA is emitted as ordinary escaped text.
    pub fn to_xml(&self) -> Result<String> {
        let tree = self.live()?;
        Ok(tree.subtree_xml(self.node)?)
    }

    /// Set an attribute value, replacing any existing value.
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        check_name("attribute", name)?;
        self.modification_check()?;
        let mut tree = self.live()?;
        let xot = tree.xot_mut();
        let id = xot.add_name(name);
        xot.attributes_mut(self.node).insert(id, value.to_string());
        Ok(())
    }

    /// Remove one attribute, if present.
    pub fn remove_attribute(&self, name: &str) -> Result<()> {
        check_name("attribute", name)?;
        self.modification_check()?;
        let mut tree = self.live()?;
        let xot = tree.xot_mut();
        let mut found = None;
        for (id, _) in xot.attributes(self.node).iter() {
            if xot.local_name_str(id) == name {
                found = Some(id);
                break;
            }
        }
        if let Some(id) = found {
            xot.attributes_mut(self.node).remove(id);
        }
        Ok(())
    }

    /// Remove every attribute on this element.
    pub fn remove_attributes(&self) -> Result<()> {
        self.modification_check()?;
        let mut tree = self.live()?;
        let xot = tree.xot_mut();
        let ids: Vec<_> = xot.attributes(self.node).iter().map(|(id, _)| id).collect();
        for id in ids {
            xot.attributes_mut(self.node).remove(id);
        }
        Ok(())
    }

    /// Create a new empty element in this element's tree and append it as
    /// the last child. Returns a handle to the new child.
    pub fn new_child_element(&self, name: &str) -> Result<Node> {
        check_name("element", name)?;
        self.modification_check()?;
        let child = {
            let mut tree = self.live()?;
            tree.graft_under(self.node, &format!("<{name}/>"))?
        };
        Ok(self.sibling_handle(child))
    }

    /// Attach one standalone element as the last child of this element.
    /// See [`Node::attach_elements`].
    pub fn attach_element(&self, node: Node) -> Result<()> {
        self.attach_elements(vec![node])
    }

    /// Adopt each element, with its whole subtree, into this element's
    /// tree, appended as the last children in the order given. The
    /// handles are consumed; fetch the adopted children again through
    /// [`Node::children`] if needed.
    ///
    /// Every offered element must be standalone: not owned by a document
    /// and without a parent. The check is all-or-nothing; if any element
    /// fails it, nothing is attached.
    pub fn attach_elements(&self, nodes: Vec<Node>) -> Result<()> {
        self.modification_check()?;
        for node in &nodes {
            let owned = matches!(node.home, Home::Attached(_));
            if owned || node.parent()?.is_some() {
                return Err(XmlError::AlreadyAttached(node.name()?));
            }
        }

        // Clone each subtree out under its own private domain first. The
        // sources are standalone, so those domains cannot contend with
        // anything; the target's domain is the only one held while the
        // tree changes.
        let mut snapshots = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let tree = node.live()?;
            snapshots.push(tree.extract_subtree(node.node)?);
        }

        let mut tree = self.live()?;
        for snapshot in &snapshots {
            tree.graft_tree(self.node, snapshot)?;
        }
        debug!(count = snapshots.len(), "attached elements");
        Ok(())
    }

    /// Detach and discard every direct child element.
    pub fn remove_children(&self) -> Result<()> {
        self.remove_children_impl(None)
    }

    /// Detach and discard every direct child element with the given name.
    pub fn remove_children_named(&self, name: &str) -> Result<()> {
        self.remove_children_impl(Some(name))
    }

    fn remove_children_impl(&self, name: Option<&str>) -> Result<()> {
        self.modification_check()?;
        let mut tree = self.live()?;
        let doomed: Vec<xot::Node> = {
            let xot = tree.xot();
            xot.children(self.node)
                .filter(|child| match xot.value(*child) {
                    xot::Value::Element(element) => {
                        name.is_none_or(|n| xot.local_name_str(element.name()) == n)
                    }
                    _ => false,
                })
                .collect()
        };
        for child in doomed {
            tree.remove_subtree(child)?;
        }
        Ok(())
    }

    /// Remove every direct text child. Element and comment children are
    /// left in place.
    pub fn remove_text(&self) -> Result<()> {
        self.modification_check()?;
        let mut tree = self.live()?;
        remove_text_children(&mut tree, self.node)?;
        Ok(())
    }

    /// Replace all direct text children with a single text node holding
    /// `text`. The empty string is a valid, explicit value.
    pub fn set_text(&self, text: &str) -> Result<()> {
        self.modification_check()?;
        let mut tree = self.live()?;
        remove_text_children(&mut tree, self.node)?;
        let xot = tree.xot_mut();
        let text_node = xot.new_text(text);
        xot.append(self.node, text_node)
            .map_err(|e| xml_engine::Error::NodeAccess(e.to_string()))?;
        Ok(())
    }

    /// Replace all direct comment children with one comment per line. The
    /// new comments are placed before any existing content, in the order
    /// given.
    pub fn set_comment<S: AsRef<str>>(&self, lines: &[S]) -> Result<()> {
        self.modification_check()?;
        let mut tree = self.live()?;
        let doomed: Vec<xot::Node> = tree
            .xot()
            .children(self.node)
            .filter(|child| tree.xot().value_type(*child) == xot::ValueType::Comment)
            .collect();
        for child in doomed {
            tree.remove_subtree(child)?;
        }
        let anchor = tree.xot().first_child(self.node);
        let xot = tree.xot_mut();
        for line in lines {
            let comment = xot.new_comment(line.as_ref());
            match anchor {
                Some(anchor) => xot
                    .insert_before(anchor, comment)
                    .map_err(|e| xml_engine::Error::NodeAccess(e.to_string()))?,
                None => xot
                    .append(self.node, comment)
                    .map_err(|e| xml_engine::Error::NodeAccess(e.to_string()))?,
            }
        }
        Ok(())
    }

    /// Remove this element from its parent and move it, with its subtree,
    /// into a private tree with a private lock domain. The returned
    /// handle belongs to no document and is always mutable.
    ///
    /// An element without a parent edge (a root element, or one already
    /// detached) is returned unchanged.
    pub fn detach(self) -> Result<Node> {
        self.modification_check()?;
        let extracted = {
            let mut tree = self.live()?;
            let has_parent = matches!(
                tree.xot().parent(self.node),
                Some(parent) if tree.xot().value_type(parent) == xot::ValueType::Element
            );
            if has_parent {
                let subtree = tree.extract_subtree(self.node)?;
                tree.remove_subtree(self.node)?;
                Some(subtree)
            } else {
                None
            }
        };
        match extracted {
            None => Ok(self),
            Some(tree) => {
                let root = tree.root();
                debug!("detached element");
                Ok(Node::detached(Arc::new(LockDomain::new(tree)), root))
            }
        }
    }

    /// Deep-clone this element and its entire subtree into a new
    /// standalone element, independent of the source from then on.
    pub fn copy(&self) -> Result<Node> {
        let tree = {
            let guard = self.live()?;
            guard.extract_subtree(self.node)?
        };
        let root = tree.root();
        Ok(Node::detached(Arc::new(LockDomain::new(tree)), root))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let home = match &self.home {
            Home::Attached(_) => "attached",
            Home::Detached(_) => "detached",
        };
        f.debug_struct("Node")
            .field("home", &home)
            .field("node", &self.node)
            .finish()
    }
}

fn element_name(tree: &Tree, node: xot::Node) -> String {
    match tree.xot().value(node) {
        xot::Value::Element(element) => tree.xot().local_name_str(element.name()).to_string(),
        _ => String::new(),
    }
}

fn remove_text_children(tree: &mut Tree, node: xot::Node) -> Result<()> {
    let doomed: Vec<xot::Node> = tree
        .xot()
        .children(node)
        .filter(|child| tree.xot().value_type(*child) == xot::ValueType::Text)
        .collect();
    for child in doomed {
        tree.remove_subtree(child)?;
    }
    Ok(())
}

/// Names end up spliced into markup handed to the engine, so they are
/// validated up front instead of surfacing later as parse errors.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = name
        .chars()
        .skip(1)
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(XmlError::Argument(format!(
            "{kind} name '{name}' is not a valid XML name"
        )))
    }
}
