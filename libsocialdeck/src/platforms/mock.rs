//! Mock platform
//!
//! Used in mock mode (no vendor calls, fabricated ids) and by tests that
//! need to script successes, failures and latency. Clones share their call
//! counters, so a test can hand a clone to the scheduler and inspect the
//! original afterwards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::{validate_length, ClientFactory, PlatformClient};
use crate::error::{PlatformError, Result};
use crate::types::{Platform, Post};

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Error returned by every publish call, when set
    pub publish_error: Option<PlatformError>,

    /// Fail this many calls with `publish_error` before succeeding
    pub failures_before_success: Option<usize>,

    /// Simulated network latency
    pub delay: Duration,

    /// Overrides the platform's real limit
    pub character_limit: Option<usize>,

    pub is_configured: bool,

    pub publish_call_count: Arc<Mutex<usize>>,

    /// Content of every successful publish
    pub published_content: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            publish_error: None,
            failures_before_success: None,
            delay: Duration::ZERO,
            character_limit: platform.character_limit(),
            is_configured: true,
            publish_call_count: Arc::new(Mutex::new(0)),
            published_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// Every publish fails with `error`
    pub fn failing(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            publish_error: Some(error),
            ..MockConfig::new(platform)
        })
    }

    /// The first `failures` publishes fail with `error`, later ones succeed
    pub fn flaky(platform: Platform, error: PlatformError, failures: usize) -> Self {
        Self::new(MockConfig {
            publish_error: Some(error),
            failures_before_success: Some(failures),
            ..MockConfig::new(platform)
        })
    }

    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    pub fn not_configured(platform: Platform) -> Self {
        Self::new(MockConfig {
            is_configured: false,
            ..MockConfig::new(platform)
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *self
            .config
            .publish_call_count
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn published_content(&self) -> Vec<String> {
        self.config
            .published_content
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    fn validate(&self, post: &Post) -> Result<()> {
        validate_length(&post.content, self.config.character_limit)?;
        if self.config.platform.requires_image() && post.image_url.is_none() {
            return Err(PlatformError::Validation(format!(
                "{} posts require an image URL",
                self.config.platform
            ))
            .into());
        }
        Ok(())
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let call = {
            let mut count = self
                .config
                .publish_call_count
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *count += 1;
            *count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.publish_error {
            let still_failing = self
                .config
                .failures_before_success
                .map_or(true, |failures| call <= failures);
            if still_failing {
                return Err(error.clone().into());
            }
        }

        self.config
            .published_content
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(post.content.clone());

        Ok(format!("{}:mock-{}", self.config.platform, uuid::Uuid::new_v4()))
    }
}

/// Hands out clones of preregistered mocks; unknown platforms succeed
#[derive(Default)]
pub struct MockClients {
    mocks: Mutex<Vec<MockPlatform>>,
}

impl MockClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, mock: MockPlatform) -> Self {
        self.mocks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(mock);
        self
    }
}

impl ClientFactory for MockClients {
    fn client_for(&self, platform: Platform) -> Result<Box<dyn PlatformClient>> {
        let mocks = self.mocks.lock().unwrap_or_else(|e| e.into_inner());
        let mock = mocks
            .iter()
            .find(|m| m.platform() == platform)
            .cloned()
            .unwrap_or_else(|| MockPlatform::success(platform));
        Ok(Box::new(mock))
    }
}
