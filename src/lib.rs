pub mod config;
pub mod core;
pub mod transports;
pub mod utils;

// 重新导出核心类型
pub use crate::core::{
    FileId,
    FileMeta,
    FileRegistry,
    Result,
    SessionAggregator,
    SessionSummary,
    TransferContext,
    TransferOutcome,
    Transport,
    UploadError,
    UploadEvent,
    UploadFile,
    UploadManager,
    UploadSession,
    UploadStatus,
};

pub use config::Config;
pub use transports::MockTransport;
pub use utils::ThumbnailGenerator;

#[cfg(test)]
mod tests;
