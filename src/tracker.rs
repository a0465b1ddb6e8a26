use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::directory::{SelectorDirectory, SentenceSource};
use crate::dispatcher::try_send;
use crate::error::Failure;
use crate::guard::{
    cooldown_satisfied, incoming_signature, CooldownStore, CooldownTable, Phase, SessionState,
    WindowIdentity,
};
use crate::locator::{latest_incoming_text, locate_input};
use crate::model::{SelectorConfig, SendOutcome, TypingPlan};
use crate::paste::paste_text;
use crate::planner::build_plan;
use crate::settings::Settings;
use crate::status::{LogStatus, StatusSink};
use crate::timer::TimerQueue;
use crate::trace::hierarchy_lines;
use crate::tree::{NodeId, UiTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WindowChanged,
    ContentChanged,
    FocusChanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiEvent {
    pub kind: EventKind,
    pub app_id: Option<String>,
    pub window_id: i64,
}

impl UiEvent {
    pub fn new(kind: EventKind, app_id: &str, window_id: i64) -> Self {
        Self {
            kind,
            app_id: Some(app_id.to_string()),
            window_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Scan,
    Run(u64),
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Scan,
    Step { index: usize },
    Send,
}

#[derive(Debug)]
struct ActiveRun {
    id: u64,
    app_id: String,
    input: NodeId,
    config: SelectorConfig,
    plan: TypingPlan,
}

/// External collaborators the tracker reads from and reports to.
pub struct Collaborators {
    pub directory: Box<dyn SelectorDirectory>,
    pub sentences: Box<dyn SentenceSource>,
    pub cooldowns: Box<dyn CooldownStore>,
    pub status: Box<dyn StatusSink>,
}

impl Collaborators {
    pub fn new(
        directory: impl SelectorDirectory + 'static,
        sentences: impl SentenceSource + 'static,
    ) -> Self {
        Self {
            directory: Box::new(directory),
            sentences: Box::new(sentences),
            cooldowns: Box::new(CooldownTable::new()),
            status: Box::new(LogStatus),
        }
    }

    pub fn with_cooldowns(mut self, cooldowns: impl CooldownStore + 'static) -> Self {
        self.cooldowns = Box::new(cooldowns);
        self
    }

    pub fn with_status(mut self, status: impl StatusSink + 'static) -> Self {
        self.status = Box::new(status);
        self
    }
}

/// Debug view of the guard, as shown by an overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub app_id: Option<String>,
    pub window_id: i64,
    pub active: bool,
    pub typed_once: bool,
    pub phase: Phase,
    pub pending_callbacks: usize,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "app={}", self.app_id.as_deref().unwrap_or("none"))?;
        writeln!(f, "win={}", self.window_id)?;
        writeln!(f, "active={}", self.active)?;
        writeln!(f, "typed_once={}", self.typed_once)?;
        writeln!(f, "phase={}", self.phase)?;
        write!(f, "pending={}", self.pending_callbacks)
    }
}

/// Receives UI notifications and drives locate → type → send for the focused
/// window, one run at most per window identity.
///
/// Single-threaded: every notification, timer tick and command must come from
/// the same caller. Time is a caller-supplied monotonic millisecond clock.
pub struct Tracker<R: Rng> {
    settings: Settings,
    session: SessionState,
    run: Option<ActiveRun>,
    next_run_id: u64,
    timers: TimerQueue<Tag, Task>,
    rng: R,
    directory: Box<dyn SelectorDirectory>,
    sentences: Box<dyn SentenceSource>,
    cooldowns: Box<dyn CooldownStore>,
    status: Box<dyn StatusSink>,
}

impl<R: Rng> Tracker<R> {
    pub fn new(settings: Settings, collaborators: Collaborators, rng: R) -> Self {
        let Collaborators {
            directory,
            sentences,
            cooldowns,
            status,
        } = collaborators;
        Self {
            settings,
            session: SessionState::new(
                WindowIdentity {
                    app_id: None,
                    window_id: i64::MIN,
                },
                None,
            ),
            run: None,
            next_run_id: 1,
            timers: TimerQueue::new(),
            rng,
            directory,
            sentences,
            cooldowns,
            status,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn cooldowns(&self) -> &dyn CooldownStore {
        self.cooldowns.as_ref()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.timers.next_due()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            app_id: self.session.identity.app_id.clone(),
            window_id: self.session.identity.window_id,
            active: self.settings.service_active,
            typed_once: self.session.typed_once,
            phase: self.session.phase(),
            pending_callbacks: self.timers.len(),
        }
    }

    /// Arm the service and scan the current window.
    pub fn start(&mut self, now_ms: u64) {
        self.settings.service_active = true;
        info!("service started");
        self.schedule_scan(now_ms);
    }

    /// Cancel everything outstanding and disarm.
    pub fn stop(&mut self) {
        self.cancel_outstanding();
        self.settings.service_active = false;
        info!("service stopped");
    }

    /// Cancel everything outstanding; stays armed and keeps the one-shot latch.
    pub fn interrupt(&mut self) {
        self.cancel_outstanding();
        debug!("interrupted");
    }

    fn cancel_outstanding(&mut self) {
        let cancelled = self.timers.cancel_all();
        if let Some(run) = self.run.take() {
            debug!(run = run.id, cancelled, "run cancelled");
        }
        self.session.finish_run();
    }

    pub fn dump_hierarchy<T: UiTree + ?Sized>(&self, tree: &T) -> Vec<String> {
        let Some(root) = tree.root() else {
            return Vec::new();
        };
        let lines = hierarchy_lines(tree, root);
        debug!(
            app = self.session.identity.app_id.as_deref().unwrap_or("none"),
            "---- window hierarchy ----"
        );
        for line in &lines {
            debug!("{line}");
        }
        lines
    }

    pub fn on_event(&mut self, event: &UiEvent, now_ms: u64) {
        if let Some(app) = &event.app_id {
            if self.settings.is_ignored(app) {
                return;
            }
        }

        let identity = WindowIdentity {
            app_id: event.app_id.clone(),
            window_id: event.window_id,
        };
        if identity != self.session.identity {
            self.switch_window(identity);
            self.schedule_scan(now_ms);
            return;
        }

        match event.kind {
            EventKind::WindowChanged => self.schedule_scan(now_ms),
            EventKind::ContentChanged | EventKind::FocusChanged => {
                if self.settings.service_active && self.session.can_start() {
                    self.schedule_scan(now_ms);
                }
            }
        }
    }

    fn switch_window(&mut self, identity: WindowIdentity) {
        self.cancel_outstanding();

        let (config, status) = match identity.app_id.as_deref() {
            None => (None, "unknown"),
            Some(app) => match self.directory.lookup(app) {
                None => (None, "ignored"),
                Some(_) if !self.settings.is_app_enabled(app) => (None, "disabled"),
                Some(cfg) => (Some(cfg), "supported"),
            },
        };
        info!(
            app = identity.app_id.as_deref().unwrap_or("none"),
            window = identity.window_id,
            status,
            "window changed"
        );

        self.session = SessionState::new(identity, config);
    }

    fn schedule_scan(&mut self, now_ms: u64) {
        self.timers.cancel(&Tag::Scan);
        self.timers.schedule(
            Tag::Scan,
            now_ms.saturating_add(self.settings.scan_delay_ms),
            Task::Scan,
        );
    }

    /// Fire every callback due at or before `now_ms`, in order. Each callback
    /// sees the time it was due as its "now".
    pub fn tick<T: UiTree + ?Sized>(&mut self, tree: &mut T, now_ms: u64) {
        while let Some((due, tag, task)) = self.timers.pop_due(now_ms) {
            match (tag, task) {
                (_, Task::Scan) => self.scan(tree, due),
                (Tag::Run(id), Task::Step { index }) => self.run_step(tree, id, index, due),
                (Tag::Run(id), Task::Send) => self.send(tree, id, due),
                (Tag::Scan, _) => {}
            }
        }
    }

    fn scan<T: UiTree + ?Sized>(&mut self, tree: &mut T, now_ms: u64) {
        if !self.settings.service_active || !self.session.can_start() {
            return;
        }
        let Some(app_id) = self.session.identity.app_id.clone() else {
            return;
        };
        if !self.settings.is_app_enabled(&app_id) {
            debug!(app = %app_id, "app disabled");
            return;
        }
        let Some(config) = self.session.config.clone() else {
            return;
        };
        let Some(root) = tree.root() else {
            debug!(app = %app_id, "no active window root");
            return;
        };

        if let Some(incoming) = latest_incoming_text(&*tree, root, &config) {
            let signature = incoming_signature(&app_id, &incoming.latest, incoming.count);
            if self.session.accept_incoming(signature) {
                debug!(app = %app_id, latest = %incoming.latest, "latest incoming");
                self.status.incoming_text(&app_id, &incoming.latest);
            }
        }

        let input = locate_input(&*tree, root, &config);
        self.status.scan_completed(&app_id, input.is_some());
        match input {
            Some(input) => self.start_run(tree, app_id, input, config, now_ms),
            None => debug!(app = %app_id, error = %Failure::NoFieldFound, "scan"),
        }
    }

    fn start_run<T: UiTree + ?Sized>(
        &mut self,
        tree: &mut T,
        app_id: String,
        input: NodeId,
        config: SelectorConfig,
        now_ms: u64,
    ) {
        if !cooldown_satisfied(
            self.cooldowns.as_ref(),
            &app_id,
            now_ms,
            self.settings.cooldown_ms,
        ) {
            info!(app = %app_id, cooldown_ms = self.settings.cooldown_ms, "cooldown active; not typing");
            return;
        }

        self.session.begin_run();

        let Some(sentence) = self.sentences.next_sentence() else {
            info!(app = %app_id, "no sentence to type");
            self.session.finish_run();
            return;
        };

        let mode = self.settings.input_mode;
        let existing = tree
            .info(input)
            .ok()
            .and_then(|info| info.text)
            .unwrap_or_default();

        let plan = match build_plan(&sentence, mode, &existing, &self.settings.typing, &mut self.rng)
        {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                info!(app = %app_id, mode = %mode, "field already has text; leaving this window alone");
                self.session.finish_run();
                return;
            }
            Err(err) => {
                warn!(app = %app_id, error = %format!("{err:#}"), "could not plan typing");
                self.session.finish_run();
                return;
            }
        };

        if let Err(err) = tree.focus(input) {
            debug!(error = %err, "focus failed");
        }
        if let Err(err) = tree.click(input) {
            debug!(error = %err, "click on input failed");
        }

        let id = self.next_run_id;
        self.next_run_id += 1;
        for (index, step) in plan.steps.iter().enumerate() {
            self.timers.schedule(
                Tag::Run(id),
                now_ms.saturating_add(step.delay_ms),
                Task::Step { index },
            );
        }
        self.timers.schedule(
            Tag::Run(id),
            now_ms.saturating_add(plan.send_delay_ms),
            Task::Send,
        );

        info!(
            app = %app_id,
            run = id,
            mode = %mode,
            chars = plan.target.chars().count(),
            send_in_ms = plan.send_delay_ms,
            "typing"
        );

        self.run = Some(ActiveRun {
            id,
            app_id,
            input,
            config,
            plan,
        });
    }

    fn run_step<T: UiTree + ?Sized>(&mut self, tree: &mut T, id: u64, index: usize, now_ms: u64) {
        let Some(run) = self.run.as_ref().filter(|r| r.id == id) else {
            return;
        };
        let Some(step) = run.plan.steps.get(index) else {
            return;
        };
        let input = run.input;
        let is_first_insert = run.plan.first_insert_step() == Some(index);

        let accepted = match tree.set_text(input, &step.text) {
            Ok(accepted) => accepted,
            Err(err) => {
                debug!(error = %err, "input unreachable");
                false
            }
        };

        if accepted {
            return;
        }
        if is_first_insert {
            warn!(error = %Failure::MutationRejected, "switching to clipboard paste");
            self.timers.cancel(&Tag::Run(id));
            self.paste_and_commit(tree, id, now_ms);
        } else {
            debug!(step = index, "set_text rejected (may succeed later)");
        }
    }

    fn paste_and_commit<T: UiTree + ?Sized>(&mut self, tree: &mut T, id: u64, now_ms: u64) {
        let Some(run) = self.run.as_ref().filter(|r| r.id == id) else {
            return;
        };
        let input = run.input;
        let text = run.plan.paste_text();
        let app_id = run.app_id.clone();

        let expected = run.plan.final_text();

        if let Err(failure) = paste_text(tree, input, &text) {
            warn!(app = %app_id, error = %failure, "paste fallback failed");
            self.abandon_run(&app_id, failure);
            return;
        }

        // A field that refused the clear step still holds its old draft.
        let pasted = tree.info(input).ok().and_then(|info| info.text);
        if pasted.as_deref() != Some(expected.as_str()) {
            warn!(
                app = %app_id,
                error = %Failure::MutationRejected,
                field = pasted.as_deref().unwrap_or("<unreadable>"),
                "pasted field does not hold the planned text; not sending"
            );
            self.abandon_run(&app_id, Failure::MutationRejected);
            return;
        }

        self.send(tree, id, now_ms);
    }

    fn abandon_run(&mut self, app_id: &str, failure: Failure) {
        self.run = None;
        self.status.run_failed(app_id, failure);
        self.status.send_attempted(app_id, SendOutcome::Failed);
        self.session.finish_run();
    }

    fn send<T: UiTree + ?Sized>(&mut self, tree: &mut T, id: u64, now_ms: u64) {
        if !self.run.as_ref().is_some_and(|r| r.id == id) {
            return;
        }
        let Some(run) = self.run.take() else {
            return;
        };
        self.timers.cancel(&Tag::Run(id));

        let root = tree.root();
        let outcome = try_send(
            tree,
            root,
            run.input,
            &run.config,
            &self.settings.send_keywords,
        );
        info!(app = %run.app_id, run = id, outcome = ?outcome, "Send: {outcome}");

        self.status.send_attempted(&run.app_id, outcome);
        if outcome.is_committed() {
            self.cooldowns.record_send(&run.app_id, now_ms);
        }
        self.session.finish_run();
    }
}
