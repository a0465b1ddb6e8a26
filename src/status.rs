use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::error::Failure;
use crate::model::SendOutcome;

/// Where the engine reports what happened.
pub trait StatusSink {
    fn scan_completed(&mut self, app_id: &str, field_found: bool);

    fn send_attempted(&mut self, app_id: &str, outcome: SendOutcome);

    /// New (non-duplicate) incoming text seen on screen.
    fn incoming_text(&mut self, _app_id: &str, _text: &str) {}

    /// A run ended without reaching the send step.
    fn run_failed(&mut self, _app_id: &str, _failure: Failure) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn scan_completed(&mut self, app_id: &str, field_found: bool) {
        info!(app = app_id, field_found, "scan");
    }

    fn send_attempted(&mut self, app_id: &str, outcome: SendOutcome) {
        info!(app = app_id, outcome = %outcome, "send");
    }

    fn incoming_text(&mut self, app_id: &str, text: &str) {
        info!(app = app_id, text, "incoming");
    }

    fn run_failed(&mut self, app_id: &str, failure: Failure) {
        info!(app = app_id, error = %failure, "run failed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Scan { app_id: String, field_found: bool },
    Send { app_id: String, outcome: SendOutcome },
    Incoming { app_id: String, text: String },
    RunFailed { app_id: String, failure: Failure },
}

/// Keeps every report; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatus {
    events: Rc<RefCell<Vec<StatusEvent>>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.borrow().clone()
    }

    pub fn sends(&self) -> Vec<SendOutcome> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Send { outcome, .. } => Some(*outcome),
                _ => None,
            })
            .collect()
    }

    pub fn incoming(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Incoming { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: StatusEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl StatusSink for RecordingStatus {
    fn scan_completed(&mut self, app_id: &str, field_found: bool) {
        self.push(StatusEvent::Scan {
            app_id: app_id.to_string(),
            field_found,
        });
    }

    fn send_attempted(&mut self, app_id: &str, outcome: SendOutcome) {
        self.push(StatusEvent::Send {
            app_id: app_id.to_string(),
            outcome,
        });
    }

    fn incoming_text(&mut self, app_id: &str, text: &str) {
        self.push(StatusEvent::Incoming {
            app_id: app_id.to_string(),
            text: text.to_string(),
        });
    }

    fn run_failed(&mut self, app_id: &str, failure: Failure) {
        self.push(StatusEvent::RunFailed {
            app_id: app_id.to_string(),
            failure,
        });
    }
}

/// Fan reports out to two sinks.
pub struct Tee<A, B>(pub A, pub B);

impl<A: StatusSink, B: StatusSink> StatusSink for Tee<A, B> {
    fn scan_completed(&mut self, app_id: &str, field_found: bool) {
        self.0.scan_completed(app_id, field_found);
        self.1.scan_completed(app_id, field_found);
    }

    fn send_attempted(&mut self, app_id: &str, outcome: SendOutcome) {
        self.0.send_attempted(app_id, outcome);
        self.1.send_attempted(app_id, outcome);
    }

    fn incoming_text(&mut self, app_id: &str, text: &str) {
        self.0.incoming_text(app_id, text);
        self.1.incoming_text(app_id, text);
    }

    fn run_failed(&mut self, app_id: &str, failure: Failure) {
        self.0.run_failed(app_id, failure);
        self.1.run_failed(app_id, failure);
    }
}
