pub mod format;
pub mod thumbnail;

pub use format::{format_bytes, format_duration};
pub use thumbnail::ThumbnailGenerator;
