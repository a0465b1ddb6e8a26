use tracing::debug;

use crate::error::Failure;
use crate::locator::find_first;
use crate::tree::{NodeId, UiTree};

const PASTE_LABEL: &str = "paste";

/// Put `text` into `input` through the clipboard: a direct paste action first,
/// then a long-press on the field followed by a click on the "Paste" menu entry.
pub fn paste_text<T: UiTree + ?Sized>(
    tree: &mut T,
    input: NodeId,
    text: &str,
) -> Result<(), Failure> {
    if !tree.set_clipboard(text) {
        return Err(Failure::PasteRejected);
    }

    match tree.paste(input) {
        Ok(true) => return Ok(()),
        Ok(false) => debug!("direct paste rejected; trying long-press menu"),
        Err(err) => debug!(error = %err, "direct paste could not reach input"),
    }

    let bounds = tree
        .info(input)
        .map_err(|_| Failure::PasteRejected)?
        .bounds;
    if bounds.is_empty() {
        return Err(Failure::PasteRejected);
    }
    let (x, y) = bounds.center();
    if !tree.long_press(x, y) {
        debug!(error = %Failure::GestureDispatchFailed, "long-press failed");
        return Err(Failure::PasteRejected);
    }

    let root = tree.root().ok_or(Failure::PasteRejected)?;
    let item = find_first(&*tree, root, |node, info| {
        node != input
            && info.visible
            && (info.text_or_empty().to_lowercase().contains(PASTE_LABEL)
                || info
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(PASTE_LABEL)))
    })
    .ok_or(Failure::PasteRejected)?;

    match tree.click(item) {
        Ok(true) => Ok(()),
        _ => Err(Failure::PasteRejected),
    }
}
