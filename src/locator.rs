use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::model::SelectorConfig;
use crate::tree::{NodeId, NodeInfo, UiTree};

/// Upper bound on nodes visited by one breadth-first scan.
pub const MAX_SCAN_NODES: usize = 10_000;

/// How far the send cascade walks up looking for a clickable container.
pub const MAX_ANCESTOR_HOPS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingText {
    pub latest: String,
    /// Number of non-blank text nodes matched in this scan.
    pub count: usize,
}

/// Find the field to type into: configured selectors first, in order, then the
/// first node of `fallback_field_type` in breadth-first order.
pub fn locate_input<T: UiTree + ?Sized>(
    tree: &T,
    root: NodeId,
    config: &SelectorConfig,
) -> Option<NodeId> {
    if let Some(node) = first_selector_match(tree, root, &config.input_selectors) {
        return Some(node);
    }
    if config.fallback_field_type.is_empty() {
        return None;
    }
    find_first(tree, root, |_, info| {
        info.node_type == config.fallback_field_type
    })
}

/// First match of the first selector that matches anything.
pub fn first_selector_match<T: UiTree + ?Sized>(
    tree: &T,
    root: NodeId,
    selectors: &[String],
) -> Option<NodeId> {
    for selector in selectors {
        match tree.find_by_selector(root, selector) {
            Ok(nodes) => {
                if let Some(first) = nodes.first() {
                    return Some(*first);
                }
            }
            Err(err) => debug!(selector = %selector, error = %err, "selector lookup failed"),
        }
    }
    None
}

/// Texts of all incoming-message nodes; the last one is the latest.
pub fn latest_incoming_text<T: UiTree + ?Sized>(
    tree: &T,
    root: NodeId,
    config: &SelectorConfig,
) -> Option<IncomingText> {
    let mut texts = Vec::new();

    for selector in &config.incoming_text_selectors {
        match tree.find_by_selector(root, selector) {
            Ok(nodes) => texts.extend(nodes.into_iter().filter_map(|n| non_blank_text(tree, n))),
            Err(err) => debug!(selector = %selector, error = %err, "selector lookup failed"),
        }
    }

    if texts.is_empty() {
        if let Some(node_type) = &config.incoming_text_type {
            texts = collect_matching(tree, root, |_, info| &info.node_type == node_type)
                .into_iter()
                .filter_map(|n| non_blank_text(tree, n))
                .collect();
        }
    }

    let count = texts.len();
    let latest = texts.pop()?;
    Some(IncomingText {
        latest: latest.trim().to_string(),
        count,
    })
}

fn non_blank_text<T: UiTree + ?Sized>(tree: &T, node: NodeId) -> Option<String> {
    let info = tree.info(node).ok()?;
    info.text.filter(|t| !t.trim().is_empty())
}

/// Breadth-first search for the first node satisfying `predicate`.
///
/// Nodes that cannot be read are treated as non-matching; their children are
/// still visited when the tree can enumerate them.
pub fn find_first<T, F>(tree: &T, root: NodeId, mut predicate: F) -> Option<NodeId>
where
    T: UiTree + ?Sized,
    F: FnMut(NodeId, &NodeInfo) -> bool,
{
    let mut found = None;
    walk_breadth_first(tree, root, |node, info| {
        if predicate(node, info) {
            found = Some(node);
            false
        } else {
            true
        }
    });
    found
}

pub fn collect_matching<T, F>(tree: &T, root: NodeId, mut predicate: F) -> Vec<NodeId>
where
    T: UiTree + ?Sized,
    F: FnMut(NodeId, &NodeInfo) -> bool,
{
    let mut out = Vec::new();
    walk_breadth_first(tree, root, |node, info| {
        if predicate(node, info) {
            out.push(node);
        }
        true
    });
    out
}

// `visit` returns false to stop the walk.
fn walk_breadth_first<T, F>(tree: &T, root: NodeId, mut visit: F)
where
    T: UiTree + ?Sized,
    F: FnMut(NodeId, &NodeInfo) -> bool,
{
    let mut queue = VecDeque::from([root]);
    let mut seen = HashSet::new();

    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        if seen.len() > MAX_SCAN_NODES {
            debug!(limit = MAX_SCAN_NODES, "tree scan truncated");
            return;
        }

        match tree.info(node) {
            Ok(info) => {
                if !visit(node, &info) {
                    return;
                }
            }
            Err(err) => debug!(error = %err, "skipping unreadable node"),
        }

        if let Ok(children) = tree.children(node) {
            queue.extend(children);
        }
    }
}

/// Nearest clickable ancestor within `max_hops` parents.
pub fn first_clickable_ancestor<T: UiTree + ?Sized>(
    tree: &T,
    node: NodeId,
    max_hops: usize,
) -> Option<NodeId> {
    let mut current = tree.parent(node).ok().flatten();
    let mut hops = 0;
    while let Some(candidate) = current {
        if hops >= max_hops {
            break;
        }
        if tree.info(candidate).map(|i| i.clickable).unwrap_or(false) {
            return Some(candidate);
        }
        current = tree.parent(candidate).ok().flatten();
        hops += 1;
    }
    None
}
