use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FIELD_TYPE: &str = "android.widget.EditText";

/// Selectors for one foreign application, as handed out by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub input_selectors: Vec<String>,
    pub send_selectors: Vec<String>,
    pub incoming_text_selectors: Vec<String>,
    pub fallback_field_type: String,
    /// Node type scanned breadth-first for incoming text when no selector matches.
    pub incoming_text_type: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            input_selectors: Vec::new(),
            send_selectors: Vec::new(),
            incoming_text_selectors: Vec::new(),
            fallback_field_type: DEFAULT_FIELD_TYPE.to_string(),
            incoming_text_type: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Leave a field that already holds text alone.
    Skip,
    #[default]
    Clear,
    Append,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::Skip => "skip",
            InputMode::Clear => "clear",
            InputMode::Append => "append",
        }
    }
}

impl FromStr for InputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(InputMode::Skip),
            "clear" => Ok(InputMode::Clear),
            "append" => Ok(InputMode::Append),
            other => Err(anyhow!(
                "unknown input handling mode {other:?} (expected skip, clear or append)"
            )),
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPlan {
    pub target: String,
    pub mode: InputMode,
    /// Field content before the first typed character lands.
    pub base_text: String,
    /// Part of `base_text` already present in the field when the plan was built.
    pub existing_text: String,
    pub steps: Vec<PlanStep>,
    pub correction: Option<Correction>,
    pub send_delay_ms: u64,
}

impl TypingPlan {
    pub fn final_text(&self) -> String {
        format!("{}{}", self.base_text, self.target)
    }

    /// Text to paste when the field refuses direct mutation.
    pub fn paste_text(&self) -> String {
        let prefix = self
            .base_text
            .strip_prefix(self.existing_text.as_str())
            .unwrap_or(self.base_text.as_str());
        format!("{prefix}{}", self.target)
    }

    /// Index of the first insert, which tells whether the field accepts direct mutation.
    pub fn first_insert_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| matches!(s.edit, Edit::Insert { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub delay_ms: u64,
    pub edit: Edit,
    /// Field content after this step is applied.
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Edit {
    Clear,
    Insert { ch: char },
    DeleteLast { deleted: char },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// Position in `target` of the character that gets deleted and retyped.
    pub index: usize,
    pub deleted: char,
    pub delete_delay_ms: u64,
    pub retype_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    CommittedById,
    CommittedByAncestorClick,
    CommittedByGesture,
    CommittedByTextMatch,
    CommittedByImeFallback,
    Failed,
}

impl SendOutcome {
    pub fn is_committed(self) -> bool {
        self != SendOutcome::Failed
    }

    pub fn describe(self) -> &'static str {
        match self {
            SendOutcome::CommittedById => "clicked configured send control",
            SendOutcome::CommittedByAncestorClick => "clicked clickable ancestor",
            SendOutcome::CommittedByGesture => "tapped control center",
            SendOutcome::CommittedByTextMatch => "clicked control matched by label",
            SendOutcome::CommittedByImeFallback => "appended newline to input",
            SendOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}
