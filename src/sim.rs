use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::model::{Edit, TypingPlan};
use crate::tree::{NodeId, NodeInfo, Rect, UiTree};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanStats {
    pub steps: usize,
    pub inserts: usize,
    pub deletes: usize,
    pub clears: usize,
    pub total_ms: u64,
}

pub fn stats(plan: &TypingPlan) -> PlanStats {
    let mut out = PlanStats {
        steps: plan.steps.len(),
        total_ms: plan.send_delay_ms,
        ..Default::default()
    };

    for step in &plan.steps {
        match step.edit {
            Edit::Clear => out.clears += 1,
            Edit::Insert { .. } => out.inserts += 1,
            Edit::DeleteLast { .. } => out.deletes += 1,
        }
    }

    out
}

/// Apply a plan's edits, in delay order, to a field holding `plan.base_text`.
///
/// Uses the edit operations rather than the recorded `text` snapshots so the
/// two can be checked against each other.
pub fn replay_plan(plan: &TypingPlan) -> Result<String> {
    let mut ordered: Vec<_> = plan.steps.iter().enumerate().collect();
    ordered.sort_by_key(|(idx, step)| (step.delay_ms, *idx));

    let mut buf: Vec<char> = plan.base_text.chars().collect();
    for (idx, step) in ordered {
        match step.edit {
            Edit::Clear => buf.clear(),
            Edit::Insert { ch } => buf.push(ch),
            Edit::DeleteLast { deleted } => match buf.pop() {
                Some(c) if c == deleted => {}
                other => {
                    return Err(anyhow!(
                        "step {idx} deletes {deleted:?} but the field ends with {other:?}"
                    ))
                }
            },
        }
        let current: String = buf.iter().collect();
        if current != step.text {
            return Err(anyhow!(
                "step {idx} records {:?} but replay produced {current:?}",
                step.text
            ));
        }
    }

    Ok(buf.into_iter().collect())
}

/// Declarative description of one synthetic node and its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimNodeSpec {
    pub selector: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    pub text: Option<String>,
    pub description: Option<String>,
    pub visible: bool,
    pub clickable: bool,
    pub bounds: Rect,
    pub rejects_text: bool,
    pub rejects_click: bool,
    pub rejects_paste: bool,
    pub stale: bool,
    /// Clicking or tapping this node sends the focused field's text.
    pub commits: bool,
    /// Setting text ending in a newline sends it.
    pub commits_on_newline: bool,
    pub children: Vec<SimNodeSpec>,
}

impl Default for SimNodeSpec {
    fn default() -> Self {
        Self {
            selector: None,
            node_type: "android.view.View".to_string(),
            text: None,
            description: None,
            visible: true,
            clickable: false,
            bounds: Rect::default(),
            rejects_text: false,
            rejects_click: false,
            rejects_paste: false,
            stale: false,
            commits: false,
            commits_on_newline: false,
            children: Vec::new(),
        }
    }
}

impl SimNodeSpec {
    pub fn new(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            ..Default::default()
        }
    }

    pub fn selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn rejects_text(mut self) -> Self {
        self.rejects_text = true;
        self
    }

    pub fn rejects_click(mut self) -> Self {
        self.rejects_click = true;
        self
    }

    pub fn rejects_paste(mut self) -> Self {
        self.rejects_paste = true;
        self
    }

    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn commits(mut self) -> Self {
        self.commits = true;
        self
    }

    pub fn commits_on_newline(mut self) -> Self {
        self.commits_on_newline = true;
        self
    }

    pub fn child(mut self, child: SimNodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimAction {
    SetText { node: NodeId, text: String, accepted: bool },
    Click { node: NodeId, accepted: bool },
    Focus { node: NodeId },
    Paste { node: NodeId, accepted: bool },
    Clipboard { text: String },
    Tap { x: f32, y: f32, accepted: bool },
    LongPress { x: f32, y: f32, accepted: bool },
}

#[derive(Debug, Clone)]
struct SimNode {
    spec: SimNodeSpec,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Set on the menu entry revealed by a long-press; clicking it pastes here.
    pastes_into: Option<NodeId>,
}

/// In-memory UI tree with scriptable failures and an action log.
#[derive(Debug, Clone)]
pub struct SimTree {
    nodes: Vec<SimNode>,
    detached: bool,
    gestures_enabled: bool,
    paste_menu: bool,
    clipboard: Option<String>,
    focused: Option<NodeId>,
    log: Vec<SimAction>,
    committed: Vec<String>,
}

impl SimTree {
    pub fn new(root: SimNodeSpec) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            detached: false,
            gestures_enabled: true,
            paste_menu: false,
            clipboard: None,
            focused: None,
            log: Vec::new(),
            committed: Vec::new(),
        };
        tree.insert(root, None);
        tree
    }

    fn insert(&mut self, mut spec: SimNodeSpec, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let children = std::mem::take(&mut spec.children);
        self.nodes.push(SimNode {
            spec,
            parent,
            children: Vec::new(),
            pastes_into: None,
        });
        for child in children {
            let child_id = self.insert(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    /// Simulate the window going away: `root()` returns nothing.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    pub fn set_gestures_enabled(&mut self, enabled: bool) {
        self.gestures_enabled = enabled;
    }

    /// Long-pressing an editable node reveals a "Paste" menu entry.
    pub fn set_paste_menu(&mut self, enabled: bool) {
        self.paste_menu = enabled;
    }

    pub fn set_stale(&mut self, node: NodeId, stale: bool) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.spec.stale = stale;
        }
    }

    pub fn log(&self) -> &[SimAction] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Messages the foreign app "sent".
    pub fn committed(&self) -> &[String] {
        &self.committed
    }

    pub fn node_text(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).and_then(|n| n.spec.text.as_deref())
    }

    pub fn by_selector(&self, selector: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.spec.selector.as_deref() == Some(selector))
            .map(NodeId)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Result<&SimNode, TreeError> {
        let node = self.nodes.get(id.0).ok_or(TreeError::Unknown(id))?;
        if node.spec.stale {
            return Err(TreeError::Stale(id));
        }
        Ok(node)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SimNode, TreeError> {
        let node = self.nodes.get_mut(id.0).ok_or(TreeError::Unknown(id))?;
        if node.spec.stale {
            return Err(TreeError::Stale(id));
        }
        Ok(node)
    }

    fn commit_focused(&mut self) {
        let Some(focused) = self.focused else {
            return;
        };
        let Some(node) = self.nodes.get_mut(focused.0) else {
            return;
        };
        let text = node.spec.text.take().unwrap_or_default();
        if !text.trim().is_empty() {
            self.committed.push(text);
        }
    }

    fn paste_into(&mut self, id: NodeId) -> bool {
        let Some(clip) = self.clipboard.clone() else {
            return false;
        };
        match self.nodes.get_mut(id.0) {
            Some(node) => {
                node.spec.text.get_or_insert_with(String::new).push_str(&clip);
                true
            }
            None => false,
        }
    }

    // Deepest visible node whose bounds contain the point.
    fn hit_test(&self, x: f32, y: f32) -> Option<NodeId> {
        let mut hit = None;
        let mut stack = vec![NodeId(0)];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id.0) else {
                continue;
            };
            if !node.spec.visible || !node.spec.bounds.contains(x, y) {
                continue;
            }
            hit = Some(id);
            stack.extend(node.children.iter().rev().copied());
        }
        hit
    }
}

impl UiTree for SimTree {
    fn root(&self) -> Option<NodeId> {
        if self.detached || self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    fn find_by_selector(&self, root: NodeId, selector: &str) -> Result<Vec<NodeId>, TreeError> {
        self.node(root)?;
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Ok(node) = self.node(id) else {
                continue;
            };
            if node.spec.selector.as_deref() == Some(selector) {
                out.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(out)
    }

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(self.node(node)?.children.clone())
    }

    fn parent(&self, node: NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.node(node)?.parent)
    }

    fn info(&self, node: NodeId) -> Result<NodeInfo, TreeError> {
        let spec = &self.node(node)?.spec;
        Ok(NodeInfo {
            selector: spec.selector.clone(),
            node_type: spec.node_type.clone(),
            text: spec.text.clone(),
            description: spec.description.clone(),
            visible: spec.visible,
            clickable: spec.clickable,
            bounds: spec.bounds,
        })
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<bool, TreeError> {
        let target = self.node_mut(node)?;
        let accepted = !target.spec.rejects_text;
        let mut commit = false;
        if accepted {
            if target.spec.commits_on_newline && text.ends_with('\n') {
                target.spec.text = None;
                commit = true;
            } else {
                target.spec.text = Some(text.to_string());
            }
        }
        self.log.push(SimAction::SetText {
            node,
            text: text.to_string(),
            accepted,
        });
        if commit {
            self.committed.push(text.trim_end_matches('\n').to_string());
        }
        Ok(accepted)
    }

    fn click(&mut self, node: NodeId) -> Result<bool, TreeError> {
        let target = self.node(node)?;
        let accepted = target.spec.clickable && !target.spec.rejects_click;
        let commits = target.spec.commits;
        let pastes_into = target.pastes_into;
        self.log.push(SimAction::Click { node, accepted });
        if accepted {
            if commits {
                self.commit_focused();
            }
            if let Some(field) = pastes_into {
                self.paste_into(field);
            }
        }
        Ok(accepted)
    }

    fn focus(&mut self, node: NodeId) -> Result<bool, TreeError> {
        self.node(node)?;
        self.focused = Some(node);
        self.log.push(SimAction::Focus { node });
        Ok(true)
    }

    fn paste(&mut self, node: NodeId) -> Result<bool, TreeError> {
        let accepted = !self.node(node)?.spec.rejects_paste && self.paste_into(node);
        self.log.push(SimAction::Paste { node, accepted });
        Ok(accepted)
    }

    fn set_clipboard(&mut self, text: &str) -> bool {
        self.clipboard = Some(text.to_string());
        self.log.push(SimAction::Clipboard {
            text: text.to_string(),
        });
        true
    }

    fn tap(&mut self, x: f32, y: f32) -> bool {
        let accepted = self.gestures_enabled;
        self.log.push(SimAction::Tap { x, y, accepted });
        if accepted {
            let commits = self
                .hit_test(x, y)
                .and_then(|id| self.nodes.get(id.0))
                .map(|n| n.spec.commits)
                .unwrap_or(false);
            if commits {
                self.commit_focused();
            }
        }
        accepted
    }

    fn long_press(&mut self, x: f32, y: f32) -> bool {
        let accepted = self.gestures_enabled;
        self.log.push(SimAction::LongPress { x, y, accepted });
        if accepted && self.paste_menu {
            if let Some(field) = self.hit_test(x, y) {
                let menu = self.insert(
                    SimNodeSpec::new("android.widget.TextView")
                        .text("Paste")
                        .clickable(),
                    Some(NodeId(0)),
                );
                self.nodes[0].children.push(menu);
                self.nodes[menu.0].pastes_into = Some(field);
            }
        }
        accepted
    }
}
