use crate::locator::MAX_SCAN_NODES;
use crate::model::{Edit, TypingPlan};
use crate::tree::{NodeId, UiTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub step_index: usize,
    pub line: String,
}

fn escape_for_log(s: &str) -> String {
    s.escape_debug().to_string()
}

fn flush(events: &mut Vec<TraceEvent>, run_start: &mut Option<usize>, run: &mut String) {
    if let Some(step_index) = run_start.take() {
        events.push(TraceEvent {
            step_index,
            line: format!("Typing \"{}\"...", escape_for_log(run)),
        });
        run.clear();
    }
}

/// Precompute console trace lines so each can be printed right before the
/// step that starts it.
pub fn plan_console_trace(plan: &TypingPlan) -> Vec<TraceEvent> {
    let mut events = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run = String::new();

    let mut steps = plan.steps.iter().enumerate().peekable();
    while let Some((idx, step)) = steps.next() {
        match step.edit {
            Edit::Clear => {
                flush(&mut events, &mut run_start, &mut run);
                events.push(TraceEvent {
                    step_index: idx,
                    line: "Clear field...".to_string(),
                });
            }
            Edit::Insert { ch } => {
                run_start.get_or_insert(idx);
                run.push(ch);
            }
            Edit::DeleteLast { deleted } => {
                flush(&mut events, &mut run_start, &mut run);
                events.push(TraceEvent {
                    step_index: idx,
                    line: format!(
                        "Correct \"{}\"...",
                        escape_for_log(&deleted.to_string())
                    ),
                });
                // The retype belongs to the correction, not to the next typing run.
                if let Some((_, next)) = steps.peek() {
                    if matches!(next.edit, Edit::Insert { ch } if ch == deleted) {
                        steps.next();
                    }
                }
            }
        }
    }
    flush(&mut events, &mut run_start, &mut run);

    events
}

pub fn print_trace_line(line: &str) {
    const RESET: &str = "\x1b[0m";
    const TYPING: &str = "\x1b[34m";
    const CORRECT: &str = "\x1b[33m";
    const SEND: &str = "\x1b[32m";

    if let Some(rest) = line.strip_prefix("Typing") {
        eprintln!("{TYPING}Typing{RESET}{rest}");
    } else if let Some(rest) = line.strip_prefix("Correct") {
        eprintln!("{CORRECT}Correct{RESET}{rest}");
    } else if let Some(rest) = line.strip_prefix("Send") {
        eprintln!("{SEND}Send{RESET}{rest}");
    } else {
        eprintln!("{line}");
    }
}

/// One indented `selector [type] text='...'` line per node, depth first.
pub fn hierarchy_lines<T: UiTree + ?Sized>(tree: &T, root: NodeId) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stack = vec![(root, 0usize)];

    while let Some((node, depth)) = stack.pop() {
        if lines.len() >= MAX_SCAN_NODES {
            lines.push("...".to_string());
            break;
        }
        let indent = "  ".repeat(depth);
        match tree.info(node) {
            Ok(info) => lines.push(format!(
                "{indent}{} [{}] text='{}'",
                info.selector.as_deref().unwrap_or("<no-id>"),
                if info.node_type.is_empty() {
                    "<no-type>"
                } else {
                    info.node_type.as_str()
                },
                escape_for_log(info.text_or_empty())
            )),
            Err(err) => lines.push(format!("{indent}<{err}>")),
        }
        if let Ok(children) = tree.children(node) {
            stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
        }
    }

    lines
}
