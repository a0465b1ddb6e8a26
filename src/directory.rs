use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::SelectorConfig;

/// Read-only lookup of selectors per application id.
pub trait SelectorDirectory {
    fn lookup(&self, app_id: &str) -> Option<SelectorConfig>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppRegistry {
    apps: BTreeMap<String, SelectorConfig>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app_id: &str, config: SelectorConfig) -> Self {
        self.apps.insert(app_id.to_string(), config);
        self
    }

    /// Messaging apps known to work out of the box.
    pub fn builtin() -> Self {
        fn ids(app: &str, input: &str, send: &str) -> SelectorConfig {
            SelectorConfig {
                input_selectors: vec![format!("{app}:id/{input}")],
                send_selectors: vec![format!("{app}:id/{send}")],
                ..Default::default()
            }
        }

        Self::new()
            .with_app("com.whatsapp", ids("com.whatsapp", "entry", "send"))
            .with_app(
                "org.telegram.messenger",
                ids("org.telegram.messenger", "edit_text", "button_send"),
            )
            .with_app(
                "com.google.android.apps.messaging",
                ids(
                    "com.google.android.apps.messaging",
                    "compose_message_text",
                    "send_message_button_icon",
                ),
            )
            .with_app("com.tinder", SelectorConfig::default())
            .with_app("com.bumble.app", SelectorConfig::default())
            .with_app("co.hinge.app", SelectorConfig::default())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse app registry JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn app_ids(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }
}

impl SelectorDirectory for AppRegistry {
    fn lookup(&self, app_id: &str) -> Option<SelectorConfig> {
        self.apps.get(app_id).cloned()
    }
}

/// Supplies the text for each run.
pub trait SentenceSource {
    fn next_sentence(&mut self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceEntry {
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub scenario_tag: Option<String>,
}

/// Cycles through its entries in order, skipping blank ones.
#[derive(Debug, Clone, Default)]
pub struct SentenceDeck {
    entries: Vec<SentenceEntry>,
    cursor: usize,
}

impl SentenceDeck {
    pub fn new(entries: Vec<SentenceEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| !e.text.trim().is_empty())
            .collect();
        Self { entries, cursor: 0 }
    }

    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| SentenceEntry {
                    id: i as u64 + 1,
                    text: text.into(),
                    scenario_tag: None,
                })
                .collect(),
        )
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<SentenceEntry> =
            serde_json::from_str(json).context("failed to parse sentences JSON")?;
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SentenceSource for SentenceDeck {
    fn next_sentence(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = &self.entries[self.cursor % self.entries.len()];
        self.cursor = (self.cursor + 1) % self.entries.len();
        Some(entry.text.clone())
    }
}
