use thiserror::Error;

use crate::tree::NodeId;

/// Failures the engine recovers from locally. None of them abort the process;
/// each either selects a fallback or ends the run as a logged outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("no input field found")]
    NoFieldFound,
    #[error("field rejected direct text mutation")]
    MutationRejected,
    #[error("clipboard paste rejected")]
    PasteRejected,
    #[error("gesture dispatch failed")]
    GestureDispatchFailed,
    #[error("no send control found")]
    NoSendControlFound,
    #[error("all send strategies failed")]
    AllSendStrategiesFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {0} went stale")]
    Stale(NodeId),
    #[error("node {0} does not exist")]
    Unknown(NodeId),
}
