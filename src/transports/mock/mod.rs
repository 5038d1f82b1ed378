use std::ops::RangeInclusive;
use std::time::Duration;
use async_trait::async_trait;
use rand::Rng;
use tracing::trace;
use url::Url;
use crate::config::TransportConfig;
use crate::core::{Delivery, FileId, Result, TransferContext, TransferOutcome, Transport, UploadFile};

/// 模拟传输
///
/// Advances a percentage counter by a random step on every tick and succeeds once it reaches
/// 100. It only fails when cancelled or when a fault threshold is configured.
#[derive(Debug, Clone)]
pub struct MockTransport {
    tick_interval: Duration,
    increment: RangeInclusive<u8>,
    remote_base: Url,
    fail_at: Option<u8>,
}

impl MockTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        config.validate()?;
        let mut remote_base = Url::parse(&config.remote_base_url)?;
        // keep the last path segment when joining ids
        if !remote_base.path().ends_with('/') {
            let path = format!("{}/", remote_base.path());
            remote_base.set_path(&path);
        }

        Ok(Self {
            tick_interval: config.tick_interval(),
            increment: config.min_increment..=config.max_increment,
            remote_base,
            fail_at: config.fail_at,
        })
    }

    /// Fail the transfer as soon as progress would reach `percent`.
    pub fn with_fault(mut self, percent: u8) -> Self {
        self.fail_at = Some(percent.min(100));
        self
    }

    pub fn remote_url(&self, file_id: FileId) -> String {
        match self.remote_base.join(&file_id.to_string()) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.remote_base, file_id),
        }
    }

    fn next_step(&self) -> u8 {
        rand::thread_rng().gen_range(self.increment.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn run(&self, file: &UploadFile, mut ctx: TransferContext) -> TransferOutcome {
        let mut progress = file.progress;

        loop {
            if !ctx.wait_until_running().await {
                return TransferOutcome::failure("transfer aborted");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {}
                _ = ctx.cancelled() => return TransferOutcome::failure("transfer aborted"),
            }

            let next = progress.saturating_add(self.next_step()).min(100);
            if let Some(fail_at) = self.fail_at {
                if next >= fail_at {
                    return TransferOutcome::failure(format!("injected fault at {}%", next));
                }
            }

            match ctx.report(next) {
                Delivery::Applied(applied) => progress = applied,
                // paused mid-tick, the counter stays where the registry froze it
                Delivery::Suspended => continue,
                Delivery::Discarded => return TransferOutcome::failure("transfer aborted"),
            }
            trace!(file_id = %file.id, progress, "tick");

            if progress >= 100 {
                return TransferOutcome::Success {
                    remote_url: self.remote_url(file.id),
                };
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UploadError;

    #[test]
    fn test_remote_url_joins_id() {
        let transport = MockTransport::new(&TransportConfig::default()).unwrap();
        let id = FileId::new();
        assert_eq!(transport.remote_url(id), format!("https://example.com/files/{}", id));
    }

    #[test]
    fn test_remote_url_without_trailing_slash() {
        let config = TransportConfig {
            remote_base_url: "https://cdn.test/uploads".to_string(),
            ..Default::default()
        };
        let transport = MockTransport::new(&config).unwrap();
        let id = FileId::new();
        assert_eq!(transport.remote_url(id), format!("https://cdn.test/uploads/{}", id));
    }

    #[test]
    fn test_steps_stay_in_range() {
        let transport = MockTransport::new(&TransportConfig::default()).unwrap();
        for _ in 0..500 {
            let step = transport.next_step();
            assert!((5..=20).contains(&step));
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let inverted = TransportConfig {
            min_increment: 30,
            max_increment: 10,
            tick_interval_ms: 1,
            ..Default::default()
        };
        assert!(matches!(MockTransport::new(&inverted), Err(UploadError::Config(_))));

        let zero_tick = TransportConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(MockTransport::new(&zero_tick), Err(UploadError::Config(_))));
    }

    #[test]
    fn test_fault_is_clamped() {
        let transport = MockTransport::new(&TransportConfig::default()).unwrap().with_fault(250);
        assert_eq!(transport.fail_at, Some(100));
    }
}
