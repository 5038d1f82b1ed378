use std::collections::HashSet;
use serde::Serialize;
use crate::utils::format_bytes;
use super::types::{UploadFile, UploadSession, UploadStatus};

/// 按状态统计的文件数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub uploading: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    fn record(&mut self, status: UploadStatus) {
        match status {
            UploadStatus::Pending => self.pending += 1,
            UploadStatus::Uploading => self.uploading += 1,
            UploadStatus::Paused => self.paused += 1,
            UploadStatus::Completed => self.completed += 1,
            UploadStatus::Failed => self.failed += 1,
        }
    }
}

/// 聚合统计信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// 总文件数
    pub count: usize,
    /// 所有文件的总字节数
    pub total_bytes: u64,
    /// completed / count, 0 when empty
    pub completion_ratio: f64,
    pub by_status: StatusCounts,
}

impl SessionSummary {
    pub fn total_size(&self) -> String {
        format_bytes(self.total_bytes)
    }

    pub fn percent_complete(&self) -> u8 {
        (self.completion_ratio * 100.0).round() as u8
    }

    /// No file is waiting or in flight.
    pub fn is_settled(&self) -> bool {
        self.by_status.pending + self.by_status.uploading + self.by_status.paused == 0
    }
}

/// Derives session metrics from a registry snapshot. Holds no state of its own.
pub struct SessionAggregator;

impl SessionAggregator {
    pub fn summarize<'a>(files: impl IntoIterator<Item = &'a UploadFile>) -> SessionSummary {
        let mut count = 0;
        let mut total_bytes = 0u64;
        let mut by_status = StatusCounts::default();

        for file in files {
            count += 1;
            total_bytes = total_bytes.saturating_add(file.size);
            by_status.record(file.status);
        }

        let completion_ratio = if count > 0 {
            by_status.completed as f64 / count as f64
        } else {
            0.0
        };

        SessionSummary {
            count,
            total_bytes,
            completion_ratio,
            by_status,
        }
    }

    /// Summary restricted to the files attached to `session`.
    pub fn summarize_session(session: &UploadSession, files: &[UploadFile]) -> SessionSummary {
        let ids: HashSet<_> = session.file_ids.iter().collect();
        Self::summarize(files.iter().filter(|file| ids.contains(&file.id)))
    }
}
