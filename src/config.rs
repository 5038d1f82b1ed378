//! Runtime configuration, loaded from an optional TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a working setup.

use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use url::Url;
use crate::core::{Result, UploadError};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub thumbnail: ThumbnailConfig,
    pub log: LogConfig,
}

/// Mock transport settings
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TransportConfig {
    /// 进度更新间隔（毫秒）
    pub tick_interval_ms: u64,
    pub min_increment: u8,
    pub max_increment: u8,
    /// Completed files are published under `<remote_base_url>/<id>`
    pub remote_base_url: String,
    /// Inject a failure once progress reaches this percentage
    pub fail_at: Option<u8>,
}

impl TransportConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(UploadError::Config("transport.tick_interval_ms must be positive".to_string()));
        }
        if self.min_increment == 0 || self.min_increment > self.max_increment || self.max_increment > 100 {
            return Err(UploadError::Config(format!(
                "transport increment range [{}, {}] must satisfy 1 <= min <= max <= 100",
                self.min_increment, self.max_increment
            )));
        }
        if let Some(fail_at) = self.fail_at {
            if fail_at > 100 {
                return Err(UploadError::Config("transport.fail_at must be within 0..=100".to_string()));
            }
        }

        Url::parse(&self.remote_base_url)?;
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            min_increment: 5,
            max_increment: 20,
            remote_base_url: "https://example.com/files/".to_string(),
            fail_at: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Larger images are not previewed
    pub max_source_bytes: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "upflow=info".to_string(),
        }
    }
}

impl Config {
    pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
        let config_str = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(config_str)?;
        config.transport.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.transport.tick_interval(), Duration::from_millis(200));
        assert_eq!(config.transport.min_increment, 5);
        assert_eq!(config.transport.max_increment, 20);
        assert!(config.transport.fail_at.is_none());
        assert_eq!(config.log.filter, "upflow=info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[transport]\ntick_interval_ms = 10\nremote_base_url = \"https://cdn.test/u/\"\n\n[thumbnail]\nmax_source_bytes = 1024"
        )
        .unwrap();

        let config = Config::load_config(file.path()).unwrap();
        assert_eq!(config.transport.tick_interval_ms, 10);
        assert_eq!(config.transport.remote_base_url, "https://cdn.test/u/");
        assert_eq!(config.thumbnail.max_source_bytes, 1024);
        // untouched sections keep defaults
        assert_eq!(config.transport.max_increment, 20);
    }

    #[test]
    fn test_rejects_bad_increment_range() {
        let err = Config::parse("[transport]\nmin_increment = 30\nmax_increment = 10").unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_url() {
        let err = Config::parse("[transport]\nremote_base_url = \"not a url\"").unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load_config("/nonexistent/upflow.toml").unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));
    }
}
