use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::model::SelectorConfig;

/// Application plus per-window token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowIdentity {
    pub app_id: Option<String>,
    pub window_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
        })
    }
}

/// Guard state for the focused window. Replaced wholesale on every window
/// identity change; never carried across windows.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub identity: WindowIdentity,
    pub config: Option<SelectorConfig>,
    pub typed_once: bool,
    pub in_progress: bool,
    pub last_incoming_signature: Option<String>,
}

impl SessionState {
    pub fn new(identity: WindowIdentity, config: Option<SelectorConfig>) -> Self {
        Self {
            identity,
            config,
            typed_once: false,
            in_progress: false,
            last_incoming_signature: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.in_progress {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    /// Whether a scan may start a run on this window.
    pub fn can_start(&self) -> bool {
        self.config.is_some() && !self.typed_once && !self.in_progress
    }

    /// Latch the one-shot and enter `Running`.
    pub fn begin_run(&mut self) {
        self.typed_once = true;
        self.in_progress = true;
    }

    pub fn finish_run(&mut self) {
        self.in_progress = false;
    }

    /// Record an observed incoming-text signature; false if it repeats the last one.
    pub fn accept_incoming(&mut self, signature: String) -> bool {
        if self.last_incoming_signature.as_deref() == Some(signature.as_str()) {
            return false;
        }
        self.last_incoming_signature = Some(signature);
        true
    }
}

pub fn incoming_signature(app_id: &str, latest: &str, count: usize) -> String {
    let mut hasher = DefaultHasher::new();
    latest.hash(&mut hasher);
    format!("{app_id}|{:016x}|{count}", hasher.finish())
}

/// Last successful send per application. Outlives sessions.
pub trait CooldownStore {
    fn last_send_ms(&self, app_id: &str) -> Option<u64>;
    fn record_send(&mut self, app_id: &str, at_ms: u64);
}

#[derive(Debug, Clone, Default)]
pub struct CooldownTable {
    last_send: HashMap<String, u64>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CooldownStore for CooldownTable {
    fn last_send_ms(&self, app_id: &str) -> Option<u64> {
        self.last_send.get(app_id).copied()
    }

    fn record_send(&mut self, app_id: &str, at_ms: u64) {
        self.last_send.insert(app_id.to_string(), at_ms);
    }
}

/// A zero cooldown always passes.
pub fn cooldown_satisfied(
    store: &dyn CooldownStore,
    app_id: &str,
    now_ms: u64,
    cooldown_ms: u64,
) -> bool {
    if cooldown_ms == 0 {
        return true;
    }
    match store.last_send_ms(app_id) {
        Some(last) => now_ms.saturating_sub(last) >= cooldown_ms,
        None => true,
    }
}
