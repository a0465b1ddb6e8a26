use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::dispatcher::DEFAULT_SEND_KEYWORDS;
use crate::model::InputMode;
use crate::planner::{validate_config, PlannerConfig};

/// Keyboard apps whose windows flood the event stream.
pub const DEFAULT_IGNORED_APPS: &[&str] = &[
    "com.google.android.inputmethod.latin",
    "com.microsoft.inputmethod.latin",
    "com.touchtype.swiftkey",
    "com.samsung.android.honeyboard",
    "com.baidu.input",
    "jp.co.omronsoft.openwnn",
];

/// Runtime toggles and tuning. Read at the start of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service_active: bool,
    #[serde(deserialize_with = "lenient_mode")]
    pub input_mode: InputMode,
    /// Minimum time between successful sends to the same app; 0 disables.
    pub cooldown_ms: u64,
    /// Debounce between a notification and the scan it triggers.
    pub scan_delay_ms: u64,
    /// Apps without an entry are enabled.
    pub app_enabled: HashMap<String, bool>,
    pub ignored_apps: Vec<String>,
    pub send_keywords: Vec<String>,
    pub typing: PlannerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_active: false,
            input_mode: InputMode::Clear,
            cooldown_ms: 0,
            scan_delay_ms: 120,
            app_enabled: HashMap::new(),
            ignored_apps: DEFAULT_IGNORED_APPS.iter().map(|s| s.to_string()).collect(),
            send_keywords: DEFAULT_SEND_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            typing: PlannerConfig::default(),
        }
    }
}

fn lenient_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<InputMode, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(parse_mode_or_default(&raw))
}

/// Unknown modes fall back to `clear`.
pub fn parse_mode_or_default(raw: &str) -> InputMode {
    raw.parse().unwrap_or_else(|err| {
        warn!(mode = raw, error = %err, "using default input mode");
        InputMode::default()
    })
}

impl Settings {
    pub fn is_app_enabled(&self, app_id: &str) -> bool {
        self.app_enabled.get(app_id).copied().unwrap_or(true)
    }

    pub fn set_app_enabled(&mut self, app_id: &str, enabled: bool) {
        self.app_enabled.insert(app_id.to_string(), enabled);
    }

    pub fn is_ignored(&self, app_id: &str) -> bool {
        self.ignored_apps.iter().any(|a| a == app_id)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(json).context("failed to parse settings JSON")?;
        validate_config(&settings.typing).context("invalid typing settings")?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let s = Settings::from_json("{}").expect("defaults parse");
        assert_eq!(s, Settings::default());
        assert!(s.is_ignored("com.touchtype.swiftkey"));
        assert!(s.is_app_enabled("com.whatsapp"));
    }

    #[test]
    fn unknown_mode_falls_back_to_clear() {
        let s = Settings::from_json(r#"{"input_mode": "shout", "cooldown_ms": 5000}"#)
            .expect("lenient mode");
        assert_eq!(s.input_mode, InputMode::Clear);
        assert_eq!(s.cooldown_ms, 5000);

        let s = Settings::from_json(r#"{"input_mode": "Append"}"#).expect("case-insensitive");
        assert_eq!(s.input_mode, InputMode::Append);
    }

    #[test]
    fn invalid_typing_ranges_are_rejected() {
        let err = Settings::from_json(
            r#"{"typing": {"char_delay_ms_min": 300, "char_delay_ms_max": 100}}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("char_delay_ms_min"));

        let err = Settings::from_json(r#"{"typing": {"send_pause_ms_max": 18446744073709551615}}"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("send_pause_ms_max"));
    }

    #[test]
    fn per_app_toggle() {
        let mut s = Settings::default();
        s.set_app_enabled("com.tinder", false);
        assert!(!s.is_app_enabled("com.tinder"));
        assert!(s.is_app_enabled("com.bumble.app"));
    }
}
