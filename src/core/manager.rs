use std::collections::HashMap;
use std::sync::Arc;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use crate::config::Config;
use crate::transports::MockTransport;
use crate::utils::ThumbnailGenerator;
use super::aggregator::{SessionAggregator, SessionSummary};
use super::errors::{Result, UploadError};
use super::registry::FileRegistry;
use super::task::{next_status, TaskControl, TaskEvent, TaskState};
use super::traits::{ProgressSink, TransferContext, TransferOutcome, Transport};
use super::types::{FileId, FileMeta, UploadEvent, UploadFile, UploadSession, UploadStatus};

const EVENT_CAPACITY: usize = 256;

/// Upload task manager, the API the presentation layer talks to.
///
/// Each `start_upload` call drives its own transfer; any number of them can run concurrently.
pub struct UploadManager {
    registry: Arc<FileRegistry>,
    transport: Arc<dyn Transport>,
    controls: RwLock<HashMap<FileId, TaskControl>>,
    event_tx: broadcast::Sender<UploadEvent>,
}

impl UploadManager {
    pub fn new(registry: FileRegistry, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            registry: Arc::new(registry),
            transport,
            controls: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Manager backed by the mock transport.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = MockTransport::new(&config.transport)?;
        let registry = FileRegistry::new(ThumbnailGenerator::new(&config.thumbnail));
        Ok(Self::new(registry, Arc::new(transport)))
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Subscribe to state and progress events of every file.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub fn create_session(&self) -> UploadSession {
        let session = UploadSession::new();
        debug!(session_id = %session.id, "Session created");
        session
    }

    pub async fn create_file(&self, meta: FileMeta, content: impl Into<Bytes>) -> Result<UploadFile> {
        let file = self.registry.create(meta, content.into()).await?;
        self.emit(UploadEvent::Created { file_id: file.id });
        Ok(file)
    }

    pub fn get_by_id(&self, id: FileId) -> Result<UploadFile> {
        self.registry.get_by_id(id)
    }

    pub fn get_all(&self) -> Vec<UploadFile> {
        self.registry.get_all()
    }

    /// Task state of `id`, `Removed` once the record is gone.
    pub fn state(&self, id: FileId) -> TaskState {
        match self.registry.get_by_id(id) {
            Ok(file) => TaskState::Live(file.status),
            Err(_) => TaskState::Removed,
        }
    }

    /// Run the transfer of a pending file to its end.
    ///
    /// `on_progress` sees strictly ordered, non-decreasing percentages and, on success, 100 as
    /// its last value. Resolves with the completed record, `TransportFailure` when the transfer
    /// failed (the record is then `failed`), or `NotFound` if the file is unknown or was cancelled
    /// meanwhile.
    pub async fn start_upload<F>(&self, id: FileId, on_progress: F) -> Result<UploadFile>
    where
        F: FnMut(u8) + Send,
    {
        self.drive(id, on_progress)
            .instrument(info_span!("upload", file_id = %id))
            .await
    }

    /// Spawn `start_upload` on the runtime.
    pub fn spawn_upload<F>(self: &Arc<Self>, id: FileId, on_progress: F) -> JoinHandle<Result<UploadFile>>
    where
        F: FnMut(u8) + Send + 'static,
    {
        let manager = self.clone();
        tokio::spawn(async move { manager.start_upload(id, on_progress).await })
    }

    async fn drive<F>(&self, id: FileId, mut on_progress: F) -> Result<UploadFile>
    where
        F: FnMut(u8) + Send,
    {
        let (old_state, file) = self.registry.update(id, |file| {
            let old_state = file.status;
            file.status = next_status(old_state, TaskEvent::Start)?;
            file.started_at = Some(Utc::now());
            file.error = None;
            Ok((old_state, file.clone()))
        })?;

        let (control, signals) = TaskControl::new();
        let mut run = ActiveRun::register(id, control.clone(), &self.registry, &self.controls);
        // a pause may have landed before the control was registered
        if matches!(self.registry.get_by_id(id), Ok(f) if f.status == UploadStatus::Paused) {
            control.pause();
        }

        info!(name = %file.name, size = file.size, transport = self.transport.name(), "Upload started");
        self.emit_state_change(id, old_state, file.status);

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let ctx = TransferContext::new(
            ProgressSink::new(id, self.registry.clone(), progress_tx),
            signals,
        );

        let mut last_reported = file.progress;
        let transfer = self.transport.run(&file, ctx);
        tokio::pin!(transfer);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(progress) = progress_rx.recv() => {
                    self.deliver(id, &control, progress, &mut last_reported, &mut on_progress);
                }
                outcome = &mut transfer => break outcome,
            }
        };

        // ticks recorded right before the transport returned
        while let Ok(progress) = progress_rx.try_recv() {
            self.deliver(id, &control, progress, &mut last_reported, &mut on_progress);
        }

        run.finish();
        if control.is_cancelled() {
            debug!("Upload cancelled");
            return Err(UploadError::NotFound(id));
        }

        match outcome {
            TransferOutcome::Success { remote_url } => {
                let (old_state, file) = self.registry.update(id, |file| {
                    let old_state = file.status;
                    file.status = next_status(old_state, TaskEvent::Succeed)?;
                    file.progress = 100;
                    file.uploaded_at = Some(Utc::now());
                    file.remote_url = Some(remote_url.clone());
                    Ok((old_state, file.clone()))
                })?;

                if last_reported < 100 {
                    self.deliver(id, &control, 100, &mut last_reported, &mut on_progress);
                }

                info!(remote_url = %remote_url, "Upload completed");
                self.emit_state_change(id, old_state, file.status);
                self.emit(UploadEvent::Completed { file_id: id, remote_url });
                Ok(file)
            }
            TransferOutcome::Failure { reason } => {
                let (old_state, file) = self.registry.update(id, |file| {
                    let old_state = file.status;
                    file.status = next_status(old_state, TaskEvent::Fail)?;
                    file.error = Some(reason.clone());
                    Ok((old_state, file.clone()))
                })?;

                warn!(progress = file.progress, error = %reason, "Upload failed");
                self.emit_state_change(id, old_state, file.status);
                self.emit(UploadEvent::Failed { file_id: id, error: reason.clone() });
                Err(UploadError::transport(reason))
            }
        }
    }

    fn deliver<F>(&self, id: FileId, control: &TaskControl, progress: u8, last_reported: &mut u8, on_progress: &mut F)
    where
        F: FnMut(u8),
    {
        // cancel wins over ticks still in flight
        if control.is_cancelled() || progress < *last_reported {
            return;
        }

        *last_reported = progress;
        on_progress(progress);
        self.emit(UploadEvent::Progress { file_id: id, progress });
    }

    pub fn pause(&self, id: FileId) -> Result<UploadFile> {
        let file = self.transition(id, TaskEvent::Pause, |_| {})?;
        if let Some(control) = self.controls.read().get(&id) {
            control.pause();
        }

        debug!(file_id = %id, progress = file.progress, "Upload paused");
        Ok(file)
    }

    pub fn resume(&self, id: FileId) -> Result<UploadFile> {
        let file = self.transition(id, TaskEvent::Resume, |_| {})?;
        if let Some(control) = self.controls.read().get(&id) {
            control.resume();
        }

        debug!(file_id = %id, progress = file.progress, "Upload resumed");
        Ok(file)
    }

    /// Reset a failed (or never started) file to `pending`. The caller starts it again.
    pub fn retry(&self, id: FileId) -> Result<UploadFile> {
        let file = self.transition(id, TaskEvent::Retry, |file| {
            file.progress = 0;
            file.error = None;
            file.started_at = None;
        })?;

        info!(file_id = %id, "Upload reset for retry");
        Ok(file)
    }

    /// Remove the file whatever its state, aborting an active transfer.
    pub fn cancel(&self, id: FileId) -> Result<bool> {
        let file = self.remove(id)?;
        info!(file_id = %id, last_state = %file.status, "Upload cancelled");
        Ok(true)
    }

    pub fn delete(&self, id: FileId) -> Result<bool> {
        let file = self.remove(id)?;
        debug!(file_id = %id, last_state = %file.status, "File deleted");
        Ok(true)
    }

    /// Pause every uploading file, returning the ids that were paused.
    pub fn pause_all(&self) -> Vec<FileId> {
        self.apply_to(UploadStatus::Uploading, |id| self.pause(id).map(|_| ()))
    }

    /// Resume every paused file, returning the ids that were resumed.
    pub fn resume_all(&self) -> Vec<FileId> {
        self.apply_to(UploadStatus::Paused, |id| self.resume(id).map(|_| ()))
    }

    /// 清除所有 <Failed/Completed> 状态的文件
    pub fn clear_finished(&self) -> usize {
        let mut cleared = self.apply_to(UploadStatus::Completed, |id| self.delete(id).map(|_| ()));
        cleared.extend(self.apply_to(UploadStatus::Failed, |id| self.delete(id).map(|_| ())));
        cleared.len()
    }

    pub fn summarize(&self) -> SessionSummary {
        SessionAggregator::summarize(&self.registry.get_all())
    }

    pub fn summarize_session(&self, session: &UploadSession) -> SessionSummary {
        SessionAggregator::summarize_session(session, &self.registry.get_all())
    }

    fn apply_to<F>(&self, status: UploadStatus, mut action: F) -> Vec<FileId>
    where
        F: FnMut(FileId) -> Result<()>,
    {
        self.registry
            .get_all()
            .into_iter()
            .filter(|file| file.status == status)
            // the state may have moved on since the snapshot
            .filter(|file| action(file.id).is_ok())
            .map(|file| file.id)
            .collect()
    }

    fn transition<M>(&self, id: FileId, event: TaskEvent, effect: M) -> Result<UploadFile>
    where
        M: FnOnce(&mut UploadFile),
    {
        let (old_state, file) = self.registry.update(id, |file| {
            let old_state = file.status;
            file.status = next_status(old_state, event)?;
            effect(file);
            Ok((old_state, file.clone()))
        })?;

        self.emit_state_change(id, old_state, file.status);
        Ok(file)
    }

    fn remove(&self, id: FileId) -> Result<UploadFile> {
        let file = self.registry.remove(id)?;
        if let Some(control) = self.controls.read().get(&id) {
            control.cancel();
        }

        let state = TaskState::Live(file.status).next(TaskEvent::Cancel)?;
        debug_assert_eq!(state, TaskState::Removed);

        self.emit(UploadEvent::Removed { file_id: id, last_state: file.status });
        Ok(file)
    }

    fn emit_state_change(&self, file_id: FileId, old_state: UploadStatus, new_state: UploadStatus) {
        if old_state != new_state {
            self.emit(UploadEvent::StateChanged { file_id, old_state, new_state });
        }
    }

    fn emit(&self, event: UploadEvent) {
        // no subscriber is fine
        let _ = self.event_tx.send(event);
    }
}

/// Registration of a running transfer in the control table.
///
/// Dropping it without `finish` (the `start_upload` future was dropped mid-transfer) aborts the
/// transport and marks the record failed so it can be retried.
struct ActiveRun<'a> {
    id: FileId,
    control: TaskControl,
    registry: &'a FileRegistry,
    controls: &'a RwLock<HashMap<FileId, TaskControl>>,
    finished: bool,
}

impl<'a> ActiveRun<'a> {
    fn register(
        id: FileId,
        control: TaskControl,
        registry: &'a FileRegistry,
        controls: &'a RwLock<HashMap<FileId, TaskControl>>,
    ) -> Self {
        controls.write().insert(id, control.clone());
        Self { id, control, registry, controls, finished: false }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.controls.write().remove(&self.id);
        }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        self.control.cancel();
        self.controls.write().remove(&self.id);
        let abandoned = self.registry.update(self.id, |file| {
            file.status = next_status(file.status, TaskEvent::Fail)?;
            file.error = Some("upload abandoned by caller".to_string());
            Ok(())
        });
        if abandoned.is_ok() {
            warn!(file_id = %self.id, "Upload abandoned before completion");
        }
    }
}
