//! One XML tree held in a xot arena.
//!
//! All parsing and serialization is delegated to xot. Node handles
//! (`xot::Node`) are stable `Copy` indices into the arena; the arena is
//! exclusively owned by its `Tree`, so two trees never share storage.
//!
//! xot folds CDATA sections into plain text at parse, but callers need to
//! know which text arrived as CDATA. Before parsing, each section is
//! lifted into a placeholder element with its content escaped; afterwards
//! the placeholders are collapsed back into text nodes and recorded in a
//! side table ([`Tree::is_cdata_text`]). Text consolidation is disabled so
//! those nodes stay distinct from adjacent plain text.

use std::collections::HashSet;

use tracing::debug;
use xot::Xot;

use crate::error::{Error, Result};

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";
const CDATA_MARKER: &str = "_cdata_section_";

/// A xot arena plus the document node parsed or built into it.
pub struct Tree {
    xot: Xot,
    document: xot::Node,
    root: xot::Node,
    cdata: HashSet<xot::Node>,
}

impl Tree {
    /// Parse an XML string into a fresh tree.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut tree = match lift_cdata_sections(xml) {
            None => Self::parse_plain(xml)?,
            Some(lifted) => {
                let mut tree = Self::parse_plain(&lifted)?;
                tree.hydrate_cdata()?;
                tree
            }
        };
        debug!(len = xml.len(), "parsed xml tree");
        tree.cdata.shrink_to_fit();
        Ok(tree)
    }

    fn parse_plain(xml: &str) -> Result<Self> {
        let mut xot = Xot::new();
        xot.set_text_consolidation(false);
        let document = xot.parse(xml).map_err(|e| Error::Parse(e.to_string()))?;
        let root = xot
            .document_element(document)
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(Self {
            xot,
            document,
            root,
            cdata: HashSet::new(),
        })
    }

    /// Parse raw bytes, which must be UTF-8 encoded XML.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Parse(format!("input is not valid UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// Build a tree holding a single empty root element. The caller is
    /// responsible for `root_name` being a well-formed element name.
    pub fn build(root_name: &str) -> Result<Self> {
        Self::parse(&format!("<{root_name}/>"))
    }

    /// Collapse the placeholder elements produced by
    /// [`lift_cdata_sections`] back into text nodes and record them.
    fn hydrate_cdata(&mut self) -> Result<()> {
        let mut markers = Vec::new();
        let mut stack = vec![self.document];
        while let Some(node) = stack.pop() {
            if let xot::Value::Element(element) = self.xot.value(node) {
                if self.xot.local_name_str(element.name()) == CDATA_MARKER {
                    markers.push(node);
                    continue;
                }
            }
            stack.extend(self.xot.children(node));
        }
        for marker in markers {
            let content = self.xot.string_value(marker);
            if !content.is_empty() {
                let text = self.xot.new_text(&content);
                self.xot
                    .insert_before(marker, text)
                    .map_err(|e| Error::NodeAccess(e.to_string()))?;
                self.cdata.insert(text);
            }
            self.xot
                .remove(marker)
                .map_err(|e| Error::NodeAccess(e.to_string()))?;
        }
        Ok(())
    }

    pub fn xot(&self) -> &Xot {
        &self.xot
    }

    pub fn xot_mut(&mut self) -> &mut Xot {
        &mut self.xot
    }

    /// The document node at the top of this tree.
    pub fn document(&self) -> xot::Node {
        self.document
    }

    /// The document element (root element) of this tree.
    pub fn root(&self) -> xot::Node {
        self.root
    }

    /// Whether `node` is a text node that arrived as a CDATA section.
    pub fn is_cdata_text(&self, node: xot::Node) -> bool {
        self.cdata.contains(&node)
    }

    /// Whether `node` is still reachable from this tree's document node.
    /// Handles into removed subtrees go stale; dereferencing one would
    /// panic inside the arena, so callers check liveness first.
    pub fn contains(&self, node: xot::Node) -> bool {
        let mut stack = vec![self.document];
        while let Some(current) = stack.pop() {
            if current == node {
                return true;
            }
            stack.extend(self.xot.children(current));
        }
        false
    }

    /// Exact serialization of one subtree, with no added indentation or
    /// declaration. Used for query snapshots, where the output only has to
    /// carry identical content, not identical markup: CDATA-born text is
    /// emitted as ordinary escaped text.
    pub fn subtree_xml(&self, node: xot::Node) -> Result<String> {
        self.xot
            .to_string(node)
            .map_err(|e| Error::Serialize(e.to_string()))
    }

    /// Serialize the whole tree. Pretty-printed by default; `compact`
    /// suppresses indentation and emits the tree exactly as stored.
    pub fn serialize(&mut self, compact: bool) -> Result<String> {
        if compact {
            return self.subtree_xml(self.document);
        }
        let document = self.document;
        self.xot
            .serialize_xml_string(
                xot::output::xml::Parameters {
                    indentation: Some(Default::default()),
                    ..Default::default()
                },
                document,
            )
            .map_err(|e| Error::Serialize(e.to_string()))
    }

    /// Full deep copy of this tree into fresh storage, built node by node
    /// so CDATA marking carries over. Document-level comments around the
    /// root are copied too.
    pub fn deep_clone(&self) -> Result<Self> {
        let mut clone = Self::build(&self.element_local_name(self.root)?)?;
        let clone_root = clone.root;
        self.copy_element_attributes(self.root, &mut clone, clone_root)?;
        self.copy_children_into(self.root, &mut clone, clone_root)?;
        let siblings: Vec<xot::Node> = self.xot.children(self.document).collect();
        let mut before_root = true;
        for node in siblings {
            if node == self.root {
                before_root = false;
                continue;
            }
            if let xot::Value::Comment(comment) = self.xot.value(node) {
                let copied = clone.xot.new_comment(comment.get());
                if before_root {
                    clone
                        .xot
                        .insert_before(clone.root, copied)
                        .map_err(|e| Error::NodeAccess(e.to_string()))?;
                } else {
                    clone
                        .xot
                        .append(clone.document, copied)
                        .map_err(|e| Error::NodeAccess(e.to_string()))?;
                }
            }
        }
        Ok(clone)
    }

    /// Deep-clone the subtree rooted at `node` into a tree of its own.
    pub fn extract_subtree(&self, node: xot::Node) -> Result<Self> {
        let mut subtree = Self::build(&self.element_local_name(node)?)?;
        let subtree_root = subtree.root;
        self.copy_element_attributes(node, &mut subtree, subtree_root)?;
        self.copy_children_into(node, &mut subtree, subtree_root)?;
        Ok(subtree)
    }

    /// Copy another tree's root element, with its whole subtree, into this
    /// arena as the last child of `parent`. Returns the new element.
    pub fn graft_tree(&mut self, parent: xot::Node, src: &Tree) -> Result<xot::Node> {
        let name = src.element_local_name(src.root)?;
        let id = self.xot.add_name(&name);
        let element = self.xot.new_element(id);
        self.xot
            .append(parent, element)
            .map_err(|e| Error::NodeAccess(e.to_string()))?;
        src.copy_element_attributes(src.root, self, element)?;
        src.copy_children_into(src.root, self, element)?;
        Ok(element)
    }

    /// Parse `xml` into this tree's arena and move its document element
    /// under `parent` as the last child. Returns the grafted element.
    pub fn graft_under(&mut self, parent: xot::Node, xml: &str) -> Result<xot::Node> {
        let fragment = self
            .xot
            .parse(xml)
            .map_err(|e| Error::Parse(e.to_string()))?;
        let element = self
            .xot
            .document_element(fragment)
            .map_err(|e| Error::NodeAccess(e.to_string()))?;
        self.xot
            .append(parent, element)
            .map_err(|e| Error::NodeAccess(e.to_string()))?;
        // The fragment's document node is empty now that its element moved.
        self.xot
            .remove(fragment)
            .map_err(|e| Error::NodeAccess(e.to_string()))?;
        Ok(element)
    }

    /// Remove `node` and its whole subtree, dropping any CDATA marks the
    /// subtree carried so a later arena slot reuse cannot resurrect them.
    pub fn remove_subtree(&mut self, node: xot::Node) -> Result<()> {
        if !self.cdata.is_empty() {
            let mut stack = vec![node];
            while let Some(current) = stack.pop() {
                self.cdata.remove(&current);
                stack.extend(self.xot.children(current));
            }
        }
        self.xot
            .remove(node)
            .map_err(|e| Error::NodeAccess(e.to_string()))
    }

    fn element_local_name(&self, node: xot::Node) -> Result<String> {
        match self.xot.value(node) {
            xot::Value::Element(element) => {
                Ok(self.xot.local_name_str(element.name()).to_string())
            }
            _ => Err(Error::NodeAccess("node is not an element".to_string())),
        }
    }

    fn copy_element_attributes(
        &self,
        src_el: xot::Node,
        dst: &mut Tree,
        dst_el: xot::Node,
    ) -> Result<()> {
        for (id, value) in self.xot.attributes(src_el).iter() {
            let name = self.xot.local_name_str(id);
            let dst_id = dst.xot.add_name(name);
            dst.xot.attributes_mut(dst_el).insert(dst_id, value.clone());
        }
        Ok(())
    }

    fn copy_children_into(
        &self,
        src_parent: xot::Node,
        dst: &mut Tree,
        dst_parent: xot::Node,
    ) -> Result<()> {
        let children: Vec<xot::Node> = self.xot.children(src_parent).collect();
        for child in children {
            match self.xot.value(child) {
                xot::Value::Element(element) => {
                    let name = self.xot.local_name_str(element.name()).to_string();
                    let id = dst.xot.add_name(&name);
                    let copied = dst.xot.new_element(id);
                    dst.xot
                        .append(dst_parent, copied)
                        .map_err(|e| Error::NodeAccess(e.to_string()))?;
                    self.copy_element_attributes(child, dst, copied)?;
                    self.copy_children_into(child, dst, copied)?;
                }
                xot::Value::Text(text) => {
                    let copied = dst.xot.new_text(text.get());
                    dst.xot
                        .append(dst_parent, copied)
                        .map_err(|e| Error::NodeAccess(e.to_string()))?;
                    if self.cdata.contains(&child) {
                        dst.cdata.insert(copied);
                    }
                }
                xot::Value::Comment(comment) => {
                    let copied = dst.xot.new_comment(comment.get());
                    dst.xot
                        .append(dst_parent, copied)
                        .map_err(|e| Error::NodeAccess(e.to_string()))?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Rewrite every CDATA section into a placeholder element holding the
/// escaped content, so the distinction survives the parse. Returns `None`
/// when the input has no sections. Comments and processing instructions
/// are skipped; a literal `<![CDATA[` inside them is not a section.
fn lift_cdata_sections(xml: &str) -> Option<String> {
    if !xml.contains(CDATA_OPEN) {
        return None;
    }
    let mut out = String::with_capacity(xml.len());
    let mut found = false;
    let mut i = 0;
    while i < xml.len() {
        let rest = &xml[i..];
        let Some(lt) = rest.find('<') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..lt]);
        i += lt;
        let tag = &xml[i..];
        if let Some(after_open) = tag.strip_prefix(CDATA_OPEN) {
            let Some(close) = after_open.find(CDATA_CLOSE) else {
                // Unterminated section; hand it to the parser verbatim so
                // the error comes from there.
                out.push_str(tag);
                break;
            };
            found = true;
            out.push('<');
            out.push_str(CDATA_MARKER);
            out.push('>');
            for c in after_open[..close].chars() {
                match c {
                    '&' => out.push_str("&amp;"),
                    '<' => out.push_str("&lt;"),
                    '>' => out.push_str("&gt;"),
                    _ => out.push(c),
                }
            }
            out.push_str("</");
            out.push_str(CDATA_MARKER);
            out.push('>');
            i += CDATA_OPEN.len() + close + CDATA_CLOSE.len();
        } else if tag.starts_with("<!--") {
            let end = tag.find("-->").map(|p| p + 3).unwrap_or(tag.len());
            out.push_str(&tag[..end]);
            i += end;
        } else if tag.starts_with("<?") {
            let end = tag.find("?>").map(|p| p + 2).unwrap_or(tag.len());
            out.push_str(&tag[..end]);
            i += end;
        } else {
            out.push('<');
            i += 1;
        }
    }
    found.then_some(out)
}
