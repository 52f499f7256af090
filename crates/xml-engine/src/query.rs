//! Query evaluation against a [`Tree`], delegated to the xee XPath engine.
//!
//! xee keeps documents inside its own arena, so evaluation runs against an
//! exact snapshot of the tree re-parsed by the engine, and matching
//! elements are mapped back into the caller's arena as element-position
//! paths. Paths count element children only: both arenas hold the same
//! elements, while text nodes may differ in how adjacent runs are split
//! (the caller's tree keeps CDATA-born text distinct).

use tracing::debug;
use xee_xpath::context::{StaticContextBuilder, Variables};
use xee_xpath::{Atomic, Documents, Item, Queries, Query};
use xot::xmlname::OwnedName;

use crate::error::{Error, Result};
use crate::tree::Tree;

/// Supplies values for `$variable` references found in a query expression.
///
/// The resolver is invoked once per distinct variable the expression
/// references. Returning `None` leaves the variable undeclared and the
/// engine fails the query with its own undeclared-variable error.
pub trait VariableResolver {
    fn resolve(&self, local_name: &str) -> Option<String>;
}

/// Resolver for expressions that carry no bound parameters.
pub struct NoVariables;

impl VariableResolver for NoVariables {
    fn resolve(&self, _local_name: &str) -> Option<String> {
        None
    }
}

/// Evaluate `expr` against `tree` and return the element-position path,
/// relative to the document element, of every element in the result, in
/// engine-reported order. Non-element results are dropped.
pub fn evaluate_element_paths(
    tree: &Tree,
    expr: &str,
    resolver: &dyn VariableResolver,
) -> Result<Vec<Vec<usize>>> {
    let referenced = referenced_variables(expr);
    let (expr, aliases) = alias_positional_variables(expr, &referenced);

    // Ask the resolver for every referenced variable; the ones it knows
    // get declared and bound under their (possibly aliased) name.
    let mut bound: Vec<(String, String)> = Vec::new();
    for name in &referenced {
        if let Some(value) = resolver.resolve(name) {
            let engine_name = aliases
                .iter()
                .find(|(original, _)| original == name)
                .map(|(_, alias)| alias.clone())
                .unwrap_or_else(|| name.clone());
            bound.push((engine_name, value));
        }
    }

    let snapshot = tree.subtree_xml(tree.document())?;
    let mut documents = Documents::new();
    let handle = documents
        .add_string_without_uri(&snapshot)
        .map_err(|e| Error::QueryEval(format!("{:?}", e)))?;

    let queries = if bound.is_empty() {
        Queries::default()
    } else {
        let mut static_context_builder = StaticContextBuilder::default();
        static_context_builder
            .variable_names(bound.iter().map(|(name, _)| OwnedName::name(name)));
        Queries::new(static_context_builder)
    };
    let query = queries
        .sequence(&expr)
        .map_err(|e| Error::QueryCompile(format!("{:?}", e)))?;

    let sequence = if bound.is_empty() {
        query
            .execute(&mut documents, handle)
            .map_err(|e| Error::QueryEval(format!("{:?}", e)))?
    } else {
        let context_node = documents
            .document_node(handle)
            .ok_or_else(|| Error::QueryEval("snapshot document is missing".to_string()))?;
        let mut variables = Variables::default();
        for (name, value) in &bound {
            let item: Item = Atomic::from(value.clone()).into();
            variables.insert(OwnedName::name(name), item.into());
        }
        query
            .execute_build_context(&mut documents, |builder| {
                builder.context_item(Item::Node(context_node));
                builder.variables(variables);
            })
            .map_err(|e| Error::QueryEval(format!("{:?}", e)))?
    };

    let xot = documents.xot();
    let mut paths = Vec::new();
    for item in sequence.iter() {
        if let Item::Node(node) = item {
            if xot.value_type(node) == xot::ValueType::Element {
                paths.push(path_from_document_element(xot, node)?);
            }
        }
    }
    debug!(expr = expr.as_str(), results = paths.len(), "evaluated query");
    Ok(paths)
}

/// Replay an element-position path produced by [`evaluate_element_paths`]
/// in the caller's arena, starting at the document element.
pub fn resolve_path(tree: &Tree, path: &[usize]) -> Result<xot::Node> {
    let mut current = tree.root();
    for &index in path {
        current = tree
            .xot()
            .children(current)
            .filter(|child| tree.xot().value_type(*child) == xot::ValueType::Element)
            .nth(index)
            .ok_or_else(|| Error::NodeAccess(format!("stale query path at child index {index}")))?;
    }
    Ok(current)
}

fn path_from_document_element(xot: &xot::Xot, node: xot::Node) -> Result<Vec<usize>> {
    let mut path = Vec::new();
    let mut current = node;
    loop {
        let Some(parent) = xot.parent(current) else {
            break;
        };
        if xot.value_type(parent) == xot::ValueType::Document {
            break;
        }
        let index = xot
            .children(parent)
            .filter(|child| xot.value_type(*child) == xot::ValueType::Element)
            .position(|child| child == current)
            .ok_or_else(|| Error::NodeAccess("result node missing from its parent".to_string()))?;
        path.push(index);
        current = parent;
    }
    path.reverse();
    Ok(path)
}

/// Collect the `$name` variable references in an expression, in first-seen
/// order without duplicates. String literals are skipped; XPath literals
/// have no escape sequences, so a literal ends at the next matching quote.
pub fn referenced_variables(expr: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                for d in chars.by_ref() {
                    if d == c {
                        break;
                    }
                }
            }
            '$' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '-' || d == '.' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}

/// Positional parameter names like `$0` are not legal XPath variable
/// names. Rewrite each digit-leading reference to a generated alias the
/// engine will accept, and report the (original, alias) pairs. Only
/// variable tokens found by the lexer are touched, so values can never be
/// spliced into the expression.
fn alias_positional_variables(expr: &str, referenced: &[String]) -> (String, Vec<(String, String)>) {
    let mut aliases: Vec<(String, String)> = Vec::new();
    for name in referenced {
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            let mut alias = format!("v{name}");
            while referenced.contains(&alias) || aliases.iter().any(|(_, a)| *a == alias) {
                alias.insert(0, '_');
            }
            aliases.push((name.clone(), alias));
        }
    }
    if aliases.is_empty() {
        return (expr.to_string(), aliases);
    }

    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push(c);
                for d in chars.by_ref() {
                    out.push(d);
                    if d == c {
                        break;
                    }
                }
            }
            '$' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '-' || d == '.' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push('$');
                match aliases.iter().find(|(original, _)| *original == name) {
                    Some((_, alias)) => out.push_str(alias),
                    None => out.push_str(&name),
                }
            }
            _ => out.push(c),
        }
    }
    (out, aliases)
}
