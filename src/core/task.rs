//! Per-file upload state machine.
//!
//! The transition table is a pure function over [`UploadStatus`]; [`TaskControl`] carries the
//! signals a running transport observes (pause via a `watch` channel, abort via a
//! [`CancellationToken`]).

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use super::errors::{Result, UploadError};
use super::types::UploadStatus;

/// Events that drive a task between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEvent {
    Start,
    Progress,
    Succeed,
    Fail,
    Pause,
    Resume,
    Retry,
    Cancel,
}

impl std::fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskEvent::Start => "start",
            TaskEvent::Progress => "report progress for",
            TaskEvent::Succeed => "complete",
            TaskEvent::Fail => "fail",
            TaskEvent::Pause => "pause",
            TaskEvent::Resume => "resume",
            TaskEvent::Retry => "retry",
            TaskEvent::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Task state, the record status plus the terminal `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Live(UploadStatus),
    Removed,
}

impl TaskState {
    /// Apply `event`, returning the next state or `InvalidTransition`.
    ///
    /// A removed task is never reported as such here: by then the record is gone and callers get
    /// `NotFound` from the registry instead.
    pub fn next(self, event: TaskEvent) -> Result<TaskState> {
        let from = match self {
            TaskState::Live(status) => status,
            TaskState::Removed => return Ok(TaskState::Removed),
        };

        next_status(from, event)
            .map(TaskState::Live)
            .or_else(|err| match event {
                TaskEvent::Cancel => Ok(TaskState::Removed),
                _ => Err(err),
            })
    }
}

/// Transition table for live records. `Cancel` is handled by the registry removing the record.
pub fn next_status(from: UploadStatus, event: TaskEvent) -> Result<UploadStatus> {
    use UploadStatus::*;

    let to = match (from, event) {
        (Pending, TaskEvent::Start) => Uploading,
        (Uploading, TaskEvent::Progress) => Uploading,
        // a transport may finish while its task sits paused
        (Uploading | Paused, TaskEvent::Succeed) => Completed,
        (Uploading | Paused, TaskEvent::Fail) => Failed,
        (Uploading, TaskEvent::Pause) => Paused,
        (Paused, TaskEvent::Resume) => Uploading,
        (Failed | Pending, TaskEvent::Retry) => Pending,
        _ => return Err(UploadError::invalid_transition(from, event)),
    };

    Ok(to)
}

/// Run signal observed by a transport between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Running,
    Paused,
}

/// Control half held by the manager for one in-flight task.
#[derive(Debug, Clone)]
pub(crate) struct TaskControl {
    signal_tx: watch::Sender<RunSignal>,
    cancellation_token: CancellationToken,
}

impl TaskControl {
    pub(crate) fn new() -> (Self, TaskSignals) {
        let (signal_tx, signal_rx) = watch::channel(RunSignal::Running);
        let cancellation_token = CancellationToken::new();
        let signals = TaskSignals {
            signal_rx,
            cancellation_token: cancellation_token.clone(),
        };

        (Self { signal_tx, cancellation_token }, signals)
    }

    pub(crate) fn pause(&self) {
        self.signal_tx.send_replace(RunSignal::Paused);
    }

    pub(crate) fn resume(&self) {
        self.signal_tx.send_replace(RunSignal::Running);
    }

    pub(crate) fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// Observer half handed to the transport.
#[derive(Debug, Clone)]
pub struct TaskSignals {
    signal_rx: watch::Receiver<RunSignal>,
    cancellation_token: CancellationToken,
}

impl TaskSignals {
    pub fn is_paused(&self) -> bool {
        *self.signal_rx.borrow() == RunSignal::Paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Resolves once the task is aborted.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }

    /// Suspend while paused. Returns `false` if the task was aborted meanwhile.
    pub async fn wait_until_running(&mut self) -> bool {
        loop {
            if self.cancellation_token.is_cancelled() {
                return false;
            }
            if *self.signal_rx.borrow_and_update() == RunSignal::Running {
                return true;
            }

            tokio::select! {
                changed = self.signal_rx.changed() => {
                    // sender dropped: the manager let go of the task
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = self.cancellation_token.cancelled() => return false,
            }
        }
    }
}
