use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;
use super::errors::UploadError;
use super::registry::FileRegistry;
use super::task::{TaskEvent, TaskSignals};
use super::types::{FileId, UploadFile, UploadStatus};

/// Final result of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success {
        remote_url: String,
    },
    Failure {
        reason: String,
    },
}

impl TransferOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure { reason: reason.into() }
    }
}

/// 传输 trait - 所有传输实现都必须实现此接口
///
/// A transport moves one file and reports non-decreasing percentages through
/// [`TransferContext::report`]. It must honour pause and cancellation within one tick: call
/// [`TransferContext::wait_until_running`] between units of work and race long waits against
/// [`TransferContext::cancelled`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run(&self, file: &UploadFile, ctx: TransferContext) -> TransferOutcome;

    fn name(&self) -> &str;
}

/// What happened to a reported progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Recorded; carries the value now held by the registry
    Applied(u8),
    /// The task is paused, the value was not recorded
    Suspended,
    /// The task no longer accepts progress (removed or finished)
    Discarded,
}

/// Writes progress into the registry and forwards accepted values on the task's channel.
pub struct ProgressSink {
    file_id: FileId,
    registry: Arc<FileRegistry>,
    progress_tx: mpsc::UnboundedSender<u8>,
}

impl ProgressSink {
    pub(crate) fn new(file_id: FileId, registry: Arc<FileRegistry>, progress_tx: mpsc::UnboundedSender<u8>) -> Self {
        Self { file_id, registry, progress_tx }
    }

    pub fn report(&self, percent: u8) -> Delivery {
        let percent = percent.min(100);

        let result = self.registry.update(self.file_id, |file| match file.status {
            UploadStatus::Uploading => {
                file.progress = file.progress.max(percent);
                Ok(Some(file.progress))
            }
            UploadStatus::Paused => Ok(None),
            status => Err(UploadError::invalid_transition(status, TaskEvent::Progress)),
        });

        match result {
            Ok(Some(progress)) => {
                // receiver gone means the driver stopped listening, the record is still updated
                let _ = self.progress_tx.send(progress);
                Delivery::Applied(progress)
            }
            Ok(None) => Delivery::Suspended,
            Err(_) => Delivery::Discarded,
        }
    }
}

/// Everything a transport gets to observe and report on its task.
pub struct TransferContext {
    sink: ProgressSink,
    signals: TaskSignals,
}

impl TransferContext {
    pub(crate) fn new(sink: ProgressSink, signals: TaskSignals) -> Self {
        Self { sink, signals }
    }

    pub fn file_id(&self) -> FileId {
        self.sink.file_id
    }

    pub fn report(&self, percent: u8) -> Delivery {
        self.sink.report(percent)
    }

    pub async fn wait_until_running(&mut self) -> bool {
        self.signals.wait_until_running().await
    }

    pub fn is_paused(&self) -> bool {
        self.signals.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.signals.cancelled().await
    }
}
