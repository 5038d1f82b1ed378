use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tracing::{debug, warn};
use crate::config::ThumbnailConfig;
use crate::core::Thumbnail;

/// 缩略图生成器
///
/// Best-effort: every failure path yields `None`, an upload never waits on or fails because of
/// its preview.
#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    max_source_bytes: usize,
}

impl ThumbnailGenerator {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            max_source_bytes: config.max_source_bytes,
        }
    }

    pub async fn generate(&self, content: Bytes, mime_type: &str) -> Option<Thumbnail> {
        if !mime_type.starts_with("image/") {
            return None;
        }

        if content.is_empty() || content.len() > self.max_source_bytes {
            debug!(len = content.len(), limit = self.max_source_bytes, "Skipping thumbnail");
            return None;
        }

        let declared = mime_type.to_string();
        match tokio::task::spawn_blocking(move || encode_preview(&content, &declared)).await {
            Ok(thumbnail) => thumbnail,
            Err(err) => {
                warn!(error = %err, "Thumbnail encoder panicked");
                None
            }
        }
    }
}

impl Default for ThumbnailGenerator {
    fn default() -> Self {
        Self::new(&ThumbnailConfig::default())
    }
}

fn encode_preview(content: &[u8], declared: &str) -> Option<Thumbnail> {
    let mime = match infer::get(content) {
        Some(kind) if matches!(kind.matcher_type(), infer::MatcherType::Image) => kind.mime_type(),
        // svg is text and has no magic bytes
        _ if declared == "image/svg+xml" && looks_like_svg(content) => "image/svg+xml",
        _ => {
            debug!(declared, "Content is not a decodable image");
            return None;
        }
    };

    Some(Thumbnail(format!("data:{};base64,{}", mime, STANDARD.encode(content))))
}

fn looks_like_svg(content: &[u8]) -> bool {
    std::str::from_utf8(content)
        .map(|text| text.contains("<svg"))
        .unwrap_or(false)
}
