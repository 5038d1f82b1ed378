use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use crate::utils::ThumbnailGenerator;
use super::errors::{Result, UploadError};
use super::types::{FileId, FileMeta, UploadFile, UploadStatus};

struct Entry {
    /// Insertion order, used to keep snapshots stable
    seq: u64,
    file: UploadFile,
    removed: bool,
}

type Slot = Arc<Mutex<Entry>>;

/// Authoritative in-memory store of file records.
///
/// The id index and each record have their own lock. The index lock is only held to look up or
/// insert/remove a slot, never while a record is locked, so work on one file does not wait on
/// another file's record.
pub struct FileRegistry {
    slots: RwLock<HashMap<FileId, Slot>>,
    next_seq: AtomicU64,
    thumbnails: ThumbnailGenerator,
}

impl FileRegistry {
    pub fn new(thumbnails: ThumbnailGenerator) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            thumbnails,
        }
    }

    /// Insert a new pending record. The thumbnail is resolved before the record becomes visible.
    pub async fn create(&self, meta: FileMeta, content: Bytes) -> Result<UploadFile> {
        let name = meta.name.trim();
        if name.is_empty() {
            return Err(UploadError::malformed("file name is required"));
        }
        let size = meta
            .size
            .ok_or_else(|| UploadError::malformed(format!("size of '{}' is required", name)))?;

        let mime_type = match meta.mime_type.trim() {
            "" => "application/octet-stream".to_string(),
            mime => mime.to_ascii_lowercase(),
        };

        let thumbnail = self.thumbnails.generate(content, &mime_type).await;

        let file = UploadFile {
            id: FileId::new(),
            name: name.to_string(),
            size,
            mime_type,
            status: UploadStatus::Pending,
            progress: 0,
            uploaded_at: None,
            remote_url: None,
            thumbnail,
            created_at: Utc::now(),
            started_at: None,
            error: None,
        };

        let entry = Entry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            file: file.clone(),
            removed: false,
        };
        self.slots.write().insert(file.id, Arc::new(Mutex::new(entry)));

        debug!(file_id = %file.id, name = %file.name, size = file.size, "File registered");
        Ok(file)
    }

    fn slot(&self, id: FileId) -> Result<Slot> {
        self.slots
            .read()
            .get(&id)
            .cloned()
            .ok_or(UploadError::NotFound(id))
    }

    pub fn get_by_id(&self, id: FileId) -> Result<UploadFile> {
        let slot = self.slot(id)?;
        let entry = slot.lock();
        if entry.removed {
            return Err(UploadError::NotFound(id));
        }
        Ok(entry.file.clone())
    }

    /// Snapshot of every record in creation order.
    pub fn get_all(&self) -> Vec<UploadFile> {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();

        let mut files: Vec<(u64, UploadFile)> = slots
            .iter()
            .filter_map(|slot| {
                let entry = slot.lock();
                (!entry.removed).then(|| (entry.seq, entry.file.clone()))
            })
            .collect();

        files.sort_by_key(|(seq, _)| *seq);
        files.into_iter().map(|(_, file)| file).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete a record. Any later operation on the id fails with `NotFound`.
    pub fn remove(&self, id: FileId) -> Result<UploadFile> {
        let slot = self
            .slots
            .write()
            .remove(&id)
            .ok_or(UploadError::NotFound(id))?;

        let mut entry = slot.lock();
        entry.removed = true;
        Ok(entry.file.clone())
    }

    /// Apply `mutation` to one record atomically.
    ///
    /// The mutation works on a copy which is committed only if it returns `Ok`, so a rejected
    /// change leaves the record untouched.
    pub fn update<F, R>(&self, id: FileId, mutation: F) -> Result<R>
    where
        F: FnOnce(&mut UploadFile) -> Result<R>,
    {
        let slot = self.slot(id)?;
        let mut entry = slot.lock();
        if entry.removed {
            return Err(UploadError::NotFound(id));
        }

        let mut draft = entry.file.clone();
        let result = mutation(&mut draft)?;
        entry.file = draft;
        Ok(result)
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new(ThumbnailGenerator::default())
    }
}
