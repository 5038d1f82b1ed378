mod aggregator;
mod errors;
mod manager;
mod registry;
mod task;
mod traits;
mod types;

pub use aggregator::{SessionAggregator, SessionSummary, StatusCounts};
pub use errors::{Result, UploadError};
pub use manager::UploadManager;
pub use registry::FileRegistry;
pub use task::{next_status, RunSignal, TaskEvent, TaskSignals, TaskState};
pub use traits::{Delivery, ProgressSink, TransferContext, TransferOutcome, Transport};
pub use types::{
    FileId,
    FileMeta,
    SessionId,
    Thumbnail,
    UploadEvent,
    UploadFile,
    UploadSession,
    UploadStatus,
};
