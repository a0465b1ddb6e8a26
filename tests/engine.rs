use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use typist::directory::{AppRegistry, SentenceDeck};
use typist::error::Failure;
use typist::guard::{CooldownStore, CooldownTable, Phase};
use typist::model::{InputMode, SelectorConfig, SendOutcome};
use typist::settings::Settings;
use typist::sim::{SimAction, SimNodeSpec, SimTree};
use typist::status::{RecordingStatus, StatusEvent};
use typist::tracker::{Collaborators, EventKind, Tracker, UiEvent};
use typist::tree::Rect;

const APP: &str = "com.chat";
const ENTRY: &str = "com.chat:id/entry";
const SEND: &str = "com.chat:id/send";
const MSG: &str = "com.chat:id/msg";

fn registry() -> AppRegistry {
    AppRegistry::new()
        .with_app(
            APP,
            SelectorConfig {
                input_selectors: vec![ENTRY.to_string()],
                send_selectors: vec![SEND.to_string()],
                incoming_text_selectors: vec![MSG.to_string()],
                ..Default::default()
            },
        )
        .with_app(
            "com.plain",
            SelectorConfig {
                input_selectors: vec!["com.plain:id/box".to_string()],
                ..Default::default()
            },
        )
}

fn entry() -> SimNodeSpec {
    SimNodeSpec::new("android.widget.EditText")
        .selector(ENTRY)
        .clickable()
        .bounds(Rect::new(0.0, 1800.0, 900.0, 1900.0))
}

fn send_button() -> SimNodeSpec {
    SimNodeSpec::new("android.widget.ImageButton")
        .selector(SEND)
        .description("Send")
        .clickable()
        .commits()
        .bounds(Rect::new(900.0, 1800.0, 1080.0, 1900.0))
}

fn screen(input: SimNodeSpec) -> SimTree {
    SimTree::new(
        SimNodeSpec::new("android.widget.FrameLayout")
            .bounds(Rect::new(0.0, 0.0, 1080.0, 2000.0))
            .child(
                SimNodeSpec::new("android.widget.TextView")
                    .selector(MSG)
                    .text("hey, how are you?"),
            )
            .child(input)
            .child(send_button()),
    )
}

struct Harness {
    tracker: Tracker<StdRng>,
    tree: SimTree,
    status: RecordingStatus,
    now: u64,
}

impl Harness {
    fn new(tree: SimTree, settings: Settings) -> Self {
        Self::with_cooldowns(tree, settings, CooldownTable::new())
    }

    fn with_cooldowns(tree: SimTree, settings: Settings, cooldowns: CooldownTable) -> Self {
        let status = RecordingStatus::new();
        let collaborators = Collaborators::new(
            registry(),
            SentenceDeck::from_texts(["hi there", "see you soon"]),
        )
        .with_cooldowns(cooldowns)
        .with_status(status.clone());
        let mut tracker = Tracker::new(settings, collaborators, StdRng::seed_from_u64(17));
        tracker.start(0);
        Self {
            tracker,
            tree,
            status,
            now: 0,
        }
    }

    fn with_defaults(tree: SimTree) -> Self {
        Self::new(tree, Settings::default())
    }

    fn event(&mut self, kind: EventKind, app: &str, window: i64) {
        self.tracker
            .on_event(&UiEvent::new(kind, app, window), self.now);
    }

    fn open(&mut self, app: &str, window: i64) {
        self.event(EventKind::WindowChanged, app, window);
    }

    /// Fire callbacks due up to `until`, then move the clock there.
    fn advance_to(&mut self, until: u64) {
        while let Some(due) = self.tracker.next_due().filter(|d| *d <= until) {
            self.tracker.tick(&mut self.tree, due);
        }
        self.now = until.max(self.now);
    }

    fn advance(&mut self, ms: u64) {
        self.advance_to(self.now + ms);
    }

    /// Fire every outstanding callback.
    fn settle(&mut self) {
        while let Some(due) = self.tracker.next_due() {
            self.tracker.tick(&mut self.tree, due);
            self.now = self.now.max(due);
        }
    }

    fn input_text(&self) -> Option<String> {
        let input = self.tree.by_selector(ENTRY)?;
        self.tree.node_text(input).map(str::to_string)
    }

    fn scans(&self) -> usize {
        self.status
            .events()
            .iter()
            .filter(|e| matches!(e, StatusEvent::Scan { .. }))
            .count()
    }
}

#[test]
fn types_and_sends_once_per_window() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open(APP, 1);
    h.settle();

    assert_eq!(h.tree.committed(), ["hi there".to_string()]);
    assert_eq!(h.status.sends(), vec![SendOutcome::CommittedById]);
    let snapshot = h.tracker.snapshot();
    assert!(snapshot.typed_once);
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.pending_callbacks, 0);

    for _ in 0..3 {
        h.event(EventKind::ContentChanged, APP, 1);
        h.event(EventKind::FocusChanged, APP, 1);
        h.settle();
    }
    h.open(APP, 1);
    h.settle();

    assert_eq!(h.tree.committed(), ["hi there".to_string()]);
    assert_eq!(h.status.sends().len(), 1);
}

#[test]
fn field_shows_each_plan_step() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open(APP, 1);
    h.settle();

    let texts: Vec<String> = h
        .tree
        .log()
        .iter()
        .filter_map(|a| match a {
            SimAction::SetText { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(texts.first().map(String::as_str), Some(""));
    assert_eq!(texts.last().map(String::as_str), Some("hi there"));
    assert!(
        texts.windows(2).any(|w| w[1].len() < w[0].len() && !w[1].is_empty()),
        "a delete/retype correction should be visible: {texts:?}"
    );
}

#[test]
fn new_window_gets_a_new_run() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open(APP, 1);
    h.settle();
    h.open(APP, 2);
    h.settle();

    assert_eq!(
        h.tree.committed(),
        ["hi there".to_string(), "see you soon".to_string()]
    );
    assert_eq!(h.tracker.snapshot().window_id, 2);
}

#[test]
fn window_change_mid_run_cancels_typing() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open(APP, 1);
    h.advance(400);
    assert_eq!(h.tracker.snapshot().phase, Phase::Running);
    let partial = h.input_text();

    h.open("com.other.app", 9);
    h.settle();

    assert!(h.tree.committed().is_empty());
    assert!(h.status.sends().is_empty());
    assert_eq!(h.input_text(), partial);
    assert_eq!(h.tracker.snapshot().phase, Phase::Idle);
}

#[test]
fn cooldown_blocks_runs_until_it_expires() {
    let settings = Settings {
        cooldown_ms: 60_000,
        ..Default::default()
    };
    let mut h = Harness::new(screen(entry()), settings);
    h.open(APP, 1);
    h.settle();
    assert_eq!(h.status.sends().len(), 1);

    h.advance(1_000);
    h.open(APP, 2);
    h.settle();
    assert_eq!(h.status.sends().len(), 1);
    assert!(
        !h.tracker.session().typed_once,
        "a cooldown rejection must not latch the window"
    );

    h.advance_to(70_000);
    h.event(EventKind::ContentChanged, APP, 2);
    h.settle();
    assert_eq!(h.status.sends().len(), 2);
    assert_eq!(h.tree.committed().len(), 2);
}

/// Input that refuses direct text and a send control that refuses clicks.
/// With gestures off every send strategy fails.
fn unsendable_screen() -> SimTree {
    let mut tree = SimTree::new(
        SimNodeSpec::new("android.widget.FrameLayout")
            .bounds(Rect::new(0.0, 0.0, 1080.0, 2000.0))
            .child(entry().rejects_text())
            .child(
                SimNodeSpec::new("android.widget.ImageButton")
                    .selector(SEND)
                    .rejects_click()
                    .bounds(Rect::new(900.0, 1800.0, 1080.0, 1900.0)),
            ),
    );
    tree.set_gestures_enabled(false);
    tree
}

#[test]
fn failed_send_does_not_start_cooldown() {
    let settings = Settings {
        cooldown_ms: 60_000,
        ..Default::default()
    };
    let mut h = Harness::new(unsendable_screen(), settings);
    h.open(APP, 1);
    h.settle();

    assert_eq!(h.status.sends(), vec![SendOutcome::Failed]);
    assert_eq!(h.tracker.cooldowns().last_send_ms(APP), None);

    h.advance(1_000);
    h.open(APP, 2);
    h.settle();
    assert_eq!(
        h.status.sends(),
        vec![SendOutcome::Failed, SendOutcome::Failed],
        "the second window runs right away"
    );
    assert!(h.tracker.session().typed_once);
}

#[test]
fn committed_send_records_its_time() {
    let settings = Settings {
        cooldown_ms: 60_000,
        ..Default::default()
    };
    let mut h = Harness::new(screen(entry()), settings);
    h.open(APP, 1);
    h.settle();

    assert_eq!(h.tracker.cooldowns().last_send_ms(APP), Some(h.now));
}

#[test]
fn injected_cooldown_store_blocks_run() {
    let mut cooldowns = CooldownTable::new();
    cooldowns.record_send(APP, 0);
    let settings = Settings {
        cooldown_ms: 60_000,
        ..Default::default()
    };
    let mut h = Harness::with_cooldowns(screen(entry()), settings, cooldowns);
    h.open(APP, 1);
    h.settle();

    assert!(h.status.sends().is_empty());
    assert_eq!(h.scans(), 1);
    assert!(!h.tracker.session().typed_once);
    assert_eq!(h.tracker.cooldowns().last_send_ms(APP), Some(0));

    h.advance_to(60_000);
    h.event(EventKind::ContentChanged, APP, 1);
    h.settle();
    assert_eq!(h.status.sends(), vec![SendOutcome::CommittedById]);
    assert!(h
        .tracker
        .cooldowns()
        .last_send_ms(APP)
        .is_some_and(|at| at > 60_000));
}

#[test]
fn settings_changes_apply_to_the_next_run() {
    let mut h = Harness::with_defaults(screen(entry().text("my draft")));
    h.open(APP, 1);
    h.settle();
    assert_eq!(h.tree.committed(), ["hi there".to_string()]);

    h.tracker.settings_mut().input_mode = InputMode::Skip;
    h.tree = screen(entry().text("my draft"));
    h.open(APP, 2);
    h.settle();

    assert_eq!(h.tree.committed().len(), 0);
    assert_eq!(h.input_text().as_deref(), Some("my draft"));
    assert_eq!(h.status.sends().len(), 1);
}

#[test]
fn stop_cancels_and_disarms() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open(APP, 1);
    h.advance(400);

    h.tracker.stop();
    assert_eq!(h.tracker.next_due(), None);
    assert!(!h.tracker.settings().service_active);
    assert!(!h.tracker.session().in_progress);

    h.event(EventKind::ContentChanged, APP, 1);
    h.open(APP, 3);
    h.settle();
    assert!(h.tree.committed().is_empty());
    assert!(h.status.sends().is_empty());
}

#[test]
fn interrupt_cancels_but_keeps_the_latch() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open(APP, 1);
    h.advance(400);

    h.tracker.interrupt();
    assert_eq!(h.tracker.next_due(), None);
    assert!(h.tracker.settings().service_active);
    assert!(h.tracker.session().typed_once);

    h.event(EventKind::ContentChanged, APP, 1);
    assert_eq!(h.tracker.next_due(), None);
    h.settle();
    assert!(h.tree.committed().is_empty());

    h.open(APP, 2);
    h.settle();
    assert_eq!(h.tree.committed().len(), 1);
}

#[test]
fn rejected_mutation_switches_to_paste() {
    let mut h = Harness::with_defaults(screen(entry().rejects_text()));
    h.open(APP, 1);
    h.settle();

    assert!(h.tree.log().contains(&SimAction::Clipboard {
        text: "hi there".to_string()
    }));
    assert_eq!(h.tree.committed(), ["hi there".to_string()]);
    assert_eq!(h.status.sends(), vec![SendOutcome::CommittedById]);

    let rejected_sets = h
        .tree
        .log()
        .iter()
        .filter(|a| matches!(a, SimAction::SetText { accepted: false, .. }))
        .count();
    assert_eq!(rejected_sets, 2, "clear step plus the first insert, nothing after");
}

#[test]
fn paste_goes_through_long_press_menu() {
    let mut tree = screen(entry().rejects_text().rejects_paste());
    tree.set_paste_menu(true);
    let mut h = Harness::with_defaults(tree);
    h.open(APP, 1);
    h.settle();

    assert!(h
        .tree
        .log()
        .iter()
        .any(|a| matches!(a, SimAction::LongPress { accepted: true, .. })));
    assert_eq!(h.tree.committed(), ["hi there".to_string()]);
    assert_eq!(h.status.sends(), vec![SendOutcome::CommittedById]);
}

#[test]
fn failed_paste_ends_run_as_failed() {
    let mut h = Harness::with_defaults(screen(entry().rejects_text().rejects_paste()));
    h.open(APP, 1);
    h.settle();

    assert!(h.tree.committed().is_empty());
    assert_eq!(h.status.sends(), vec![SendOutcome::Failed]);
    assert!(h.status.events().contains(&StatusEvent::RunFailed {
        app_id: APP.to_string(),
        failure: Failure::PasteRejected,
    }));
    let session = h.tracker.session();
    assert!(session.typed_once);
    assert!(!session.in_progress);
    assert_eq!(h.tracker.next_due(), None);
}

#[test]
fn paste_over_uncleared_draft_is_not_sent() {
    let mut h = Harness::with_defaults(screen(entry().text("draft").rejects_text()));
    h.open(APP, 1);
    h.settle();

    assert!(h.tree.committed().is_empty());
    assert_eq!(h.status.sends(), vec![SendOutcome::Failed]);
    assert!(h.status.events().contains(&StatusEvent::RunFailed {
        app_id: APP.to_string(),
        failure: Failure::MutationRejected,
    }));
    assert_eq!(h.input_text().as_deref(), Some("drafthi there"));
    let send = h.tree.by_selector(SEND);
    assert!(!h
        .tree
        .log()
        .iter()
        .any(|a| matches!(a, SimAction::Click { node, .. } if Some(*node) == send)));
    assert_eq!(h.tracker.snapshot().phase, Phase::Idle);
}

#[test]
fn newline_commits_when_no_send_control_exists() {
    let tree = SimTree::new(
        SimNodeSpec::new("android.widget.FrameLayout").child(
            SimNodeSpec::new("android.widget.EditText")
                .selector("com.plain:id/box")
                .commits_on_newline(),
        ),
    );
    let mut h = Harness::with_defaults(tree);
    h.open("com.plain", 1);
    h.settle();

    assert_eq!(h.status.sends(), vec![SendOutcome::CommittedByImeFallback]);
    assert_eq!(h.tree.committed(), ["hi there".to_string()]);
}

#[test]
fn skip_mode_leaves_draft_alone() {
    let settings = Settings {
        input_mode: InputMode::Skip,
        ..Default::default()
    };
    let mut h = Harness::new(screen(entry().text("my draft")), settings);
    h.open(APP, 1);
    h.settle();

    assert_eq!(h.input_text().as_deref(), Some("my draft"));
    assert!(h.status.sends().is_empty());
    assert!(h.tracker.session().typed_once);
}

#[test]
fn append_mode_types_after_draft() {
    let settings = Settings {
        input_mode: InputMode::Append,
        ..Default::default()
    };
    let mut h = Harness::new(screen(entry().text("my draft")), settings);
    h.open(APP, 1);
    h.settle();

    assert_eq!(h.tree.committed(), ["my draft\nhi there".to_string()]);
}

#[test]
fn incoming_text_is_reported_once_per_change() {
    let tree = SimTree::new(
        SimNodeSpec::new("android.widget.FrameLayout").child(
            SimNodeSpec::new("android.widget.TextView")
                .selector(MSG)
                .text("hey, what's up?"),
        ),
    );
    let mut h = Harness::with_defaults(tree);
    h.open(APP, 1);
    h.settle();
    h.event(EventKind::ContentChanged, APP, 1);
    h.settle();
    h.event(EventKind::ContentChanged, APP, 1);
    h.settle();

    assert_eq!(h.status.incoming(), vec!["hey, what's up?".to_string()]);
    assert_eq!(h.scans(), 3);
    assert!(!h.tracker.session().typed_once);
}

#[test]
fn bursts_of_events_collapse_into_one_scan() {
    let tree = SimTree::new(SimNodeSpec::new("android.widget.FrameLayout"));
    let mut h = Harness::with_defaults(tree);
    h.open(APP, 1);
    for _ in 0..5 {
        h.advance(50);
        h.event(EventKind::ContentChanged, APP, 1);
    }
    h.settle();

    assert_eq!(h.scans(), 1);
}

#[test]
fn disabled_app_is_never_typed_into() {
    let mut settings = Settings::default();
    settings.set_app_enabled(APP, false);
    let mut h = Harness::new(screen(entry()), settings);
    h.open(APP, 1);
    h.settle();

    assert!(h.status.events().is_empty());
    assert!(h.tree.committed().is_empty());
}

#[test]
fn unknown_app_is_ignored() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open("com.example.notes", 1);
    h.settle();

    assert!(h.status.events().is_empty());
    assert!(h.tree.committed().is_empty());
}

#[test]
fn keyboard_events_do_not_interrupt_a_run() {
    let mut h = Harness::with_defaults(screen(entry()));
    h.open(APP, 1);
    h.advance(400);
    h.open("com.google.android.inputmethod.latin", 77);
    h.event(EventKind::ContentChanged, "com.touchtype.swiftkey", 78);
    h.settle();

    assert_eq!(h.tracker.snapshot().app_id.as_deref(), Some(APP));
    assert_eq!(h.tree.committed(), ["hi there".to_string()]);
}

#[test]
fn missing_window_root_does_nothing() {
    let mut tree = screen(entry());
    tree.detach();
    let mut h = Harness::with_defaults(tree);
    h.open(APP, 1);
    h.settle();

    assert!(h.status.events().is_empty());
    assert!(!h.tracker.session().typed_once);
}

#[test]
fn dump_lists_every_node() {
    let h = Harness::with_defaults(screen(entry().text("draft")));
    let lines = h.tracker.dump_hierarchy(&h.tree);

    assert_eq!(
        lines,
        vec![
            "<no-id> [android.widget.FrameLayout] text=''".to_string(),
            "  com.chat:id/msg [android.widget.TextView] text='hey, how are you?'".to_string(),
            "  com.chat:id/entry [android.widget.EditText] text='draft'".to_string(),
            "  com.chat:id/send [android.widget.ImageButton] text=''".to_string(),
        ]
    );
}
