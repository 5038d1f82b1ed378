use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 上传文件唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 会话唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Paused => "paused",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preview payload rendered by the presentation layer, a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Thumbnail(pub String);

impl Thumbnail {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metadata supplied by the caller when submitting a file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileMeta {
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: String,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
            mime_type: mime_type.into(),
        }
    }
}

/// A file record as held by the registry. Callers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadFile {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    /// 0..=100
    pub progress: u8,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub remote_url: Option<String>,
    pub thumbnail: Option<Thumbnail>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Reason of the last transport failure
    pub error: Option<String>,
}

/// Caller-owned grouping of files used for aggregate reporting.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadSession {
    pub id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub file_ids: Vec<FileId>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            start_time: Utc::now(),
            end_time: None,
            file_ids: Vec::new(),
        }
    }

    pub fn attach(&mut self, file_id: FileId) {
        if !self.file_ids.contains(&file_id) {
            self.file_ids.push(file_id);
        }
    }

    /// Close the session. Only the first call records the end time.
    pub fn close(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

/// 上传事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 文件已创建
    Created {
        file_id: FileId,
    },
    /// 状态变更
    StateChanged {
        file_id: FileId,
        old_state: UploadStatus,
        new_state: UploadStatus,
    },
    /// 进度更新
    Progress {
        file_id: FileId,
        progress: u8,
    },
    /// 任务完成
    Completed {
        file_id: FileId,
        remote_url: String,
    },
    /// 任务失败
    Failed {
        file_id: FileId,
        error: String,
    },
    /// 已移除
    Removed {
        file_id: FileId,
        last_state: UploadStatus,
    },
}

// 静态断言确保类型是 Send的
const _: () = {
    fn assert_send<T: Send + Sync>() {}
    fn assert_types() {
        assert_send::<UploadFile>();
        assert_send::<UploadEvent>();
        assert_send::<UploadSession>();
    }
};
