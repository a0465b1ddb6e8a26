use tracing::{debug, info, warn};

use crate::error::Failure;
use crate::locator::{find_first, first_clickable_ancestor, MAX_ANCESTOR_HOPS};
use crate::model::{SelectorConfig, SendOutcome};
use crate::tree::{NodeId, NodeInfo, UiTree};

pub const DEFAULT_SEND_KEYWORDS: &[&str] = &["send"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Press {
    Clicked,
    AncestorClicked,
    Tapped,
}

/// Commit the typed message. Strategies run in a fixed order and the first one
/// that works wins:
///
/// 1. configured send selectors (click, then clickable ancestor, then a tap at
///    the node center),
/// 2. any visible node whose text or description contains a send keyword
///    (same three presses),
/// 3. re-set the input's text with a trailing newline, which many inputs treat
///    as "send".
///
/// Never errors; `SendOutcome::Failed` is the terminal result.
pub fn try_send<T: UiTree + ?Sized>(
    tree: &mut T,
    root: Option<NodeId>,
    input: NodeId,
    config: &SelectorConfig,
    keywords: &[String],
) -> SendOutcome {
    let Some(root) = root else {
        warn!("send: no active window");
        return SendOutcome::Failed;
    };

    let mut saw_control = false;

    for selector in &config.send_selectors {
        let node = match tree.find_by_selector(root, selector) {
            Ok(nodes) => match nodes.first() {
                Some(node) => *node,
                None => continue,
            },
            Err(err) => {
                debug!(selector = %selector, error = %err, "send selector lookup failed");
                continue;
            }
        };
        saw_control = true;

        match press(tree, node) {
            Some(Press::Clicked) => return SendOutcome::CommittedById,
            Some(Press::AncestorClicked) => return SendOutcome::CommittedByAncestorClick,
            Some(Press::Tapped) => return SendOutcome::CommittedByGesture,
            None => debug!(selector = %selector, "send control did not respond"),
        }
    }

    let candidate = find_first(&*tree, root, |node, info| {
        node != input && matches_send_keyword(info, keywords)
    });
    if let Some(node) = candidate {
        saw_control = true;
        match press(tree, node) {
            Some(Press::Clicked | Press::AncestorClicked) => return SendOutcome::CommittedByTextMatch,
            Some(Press::Tapped) => return SendOutcome::CommittedByGesture,
            None => debug!(node = %node, "keyword-matched control did not respond"),
        }
    }

    if !saw_control {
        info!(error = %Failure::NoSendControlFound, "send: falling back to newline");
    }

    if commit_with_newline(tree, input) {
        return SendOutcome::CommittedByImeFallback;
    }

    warn!(error = %Failure::AllSendStrategiesFailed, "send failed");
    SendOutcome::Failed
}

fn press<T: UiTree + ?Sized>(tree: &mut T, node: NodeId) -> Option<Press> {
    match tree.click(node) {
        Ok(true) => return Some(Press::Clicked),
        Ok(false) => {}
        Err(err) => debug!(error = %err, "click failed"),
    }

    if let Some(ancestor) = first_clickable_ancestor(&*tree, node, MAX_ANCESTOR_HOPS) {
        if matches!(tree.click(ancestor), Ok(true)) {
            return Some(Press::AncestorClicked);
        }
    }

    match tap_center(tree, node) {
        Ok(()) => Some(Press::Tapped),
        Err(failure) => {
            debug!(node = %node, error = %failure, "tap fallback failed");
            None
        }
    }
}

/// Dispatch a tap gesture at the center of `node`'s bounds.
pub fn tap_center<T: UiTree + ?Sized>(tree: &mut T, node: NodeId) -> Result<(), Failure> {
    let bounds = tree
        .info(node)
        .map_err(|_| Failure::GestureDispatchFailed)?
        .bounds;
    if bounds.is_empty() {
        return Err(Failure::GestureDispatchFailed);
    }
    let (x, y) = bounds.center();
    if tree.tap(x, y) {
        Ok(())
    } else {
        Err(Failure::GestureDispatchFailed)
    }
}

pub fn matches_send_keyword(info: &NodeInfo, keywords: &[String]) -> bool {
    if !info.visible {
        return false;
    }
    let text = info.text_or_empty().to_lowercase();
    let description = info.description.as_deref().unwrap_or("").to_lowercase();
    keywords.iter().any(|k| {
        let k = k.trim().to_lowercase();
        !k.is_empty() && (text.contains(&k) || description.contains(&k))
    })
}

fn commit_with_newline<T: UiTree + ?Sized>(tree: &mut T, input: NodeId) -> bool {
    let current = tree
        .info(input)
        .ok()
        .and_then(|info| info.text)
        .unwrap_or_default();
    match tree.set_text(input, &format!("{current}\n")) {
        Ok(accepted) => accepted,
        Err(err) => {
            debug!(error = %err, "newline commit could not reach input");
            false
        }
    }
}
