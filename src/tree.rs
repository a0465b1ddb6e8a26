use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Handle into the foreign UI tree. Only meaningful while the tree that issued
/// it is alive; any access may fail with [`TreeError::Stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// Read-only attributes of one node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeInfo {
    /// Stable element id (the thing selectors match).
    pub selector: Option<String>,
    pub node_type: String,
    pub text: Option<String>,
    pub description: Option<String>,
    pub visible: bool,
    pub clickable: bool,
    pub bounds: Rect,
}

impl NodeInfo {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Capabilities the engine needs from a live UI tree.
///
/// Mutating calls report whether the foreign UI accepted the action; `Err`
/// means the node could not be reached at all.
pub trait UiTree {
    fn root(&self) -> Option<NodeId>;

    /// Nodes under `root` whose selector equals `selector`, in tree order.
    fn find_by_selector(&self, root: NodeId, selector: &str) -> Result<Vec<NodeId>, TreeError>;

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, TreeError>;

    fn parent(&self, node: NodeId) -> Result<Option<NodeId>, TreeError>;

    fn info(&self, node: NodeId) -> Result<NodeInfo, TreeError>;

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<bool, TreeError>;

    fn click(&mut self, node: NodeId) -> Result<bool, TreeError>;

    fn focus(&mut self, node: NodeId) -> Result<bool, TreeError>;

    /// Generic "paste clipboard into this node" action.
    fn paste(&mut self, node: NodeId) -> Result<bool, TreeError>;

    fn set_clipboard(&mut self, text: &str) -> bool;

    fn tap(&mut self, x: f32, y: f32) -> bool;

    fn long_press(&mut self, x: f32, y: f32) -> bool;
}
