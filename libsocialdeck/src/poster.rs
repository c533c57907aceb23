//! Publishing with retry
//!
//! A publish is validated once, then attempted up to three times. Only
//! transient failures (network errors and rate limits) are retried, with
//! exponential backoff; anything else fails immediately.

use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::Result;
use crate::platforms::PlatformClient;
use crate::types::{Platform, Post};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.pow(attempt.saturating_sub(1))
    }
}

/// Result of publishing one post
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub post_id: String,
    pub platform: Platform,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
}

/// Validate and publish `post`, retrying transient failures
pub async fn publish_post(
    client: &dyn PlatformClient,
    post: &Post,
    policy: RetryPolicy,
) -> PublishOutcome {
    let mut outcome = PublishOutcome {
        post_id: post.id.clone(),
        platform: client.platform(),
        success: false,
        platform_post_id: None,
        error: None,
        attempts: 0,
    };

    if let Err(e) = client.validate(post) {
        outcome.error = Some(e.to_string());
        return outcome;
    }

    match publish_with_retry(client, post, policy, &mut outcome.attempts).await {
        Ok(id) => {
            outcome.success = true;
            outcome.platform_post_id = Some(id);
        }
        Err(e) => outcome.error = Some(e.to_string()),
    }
    outcome
}

async fn publish_with_retry(
    client: &dyn PlatformClient,
    post: &Post,
    policy: RetryPolicy,
    attempts: &mut u32,
) -> Result<String> {
    let max_attempts = policy.max_attempts.max(1);
    let name = client.name().to_string();

    let mut attempt = 1;
    loop {
        *attempts = attempt;
        match client.publish(post).await {
            Ok(id) => {
                if attempt > 1 {
                    info!("Published to {} on attempt {}", name, attempt);
                }
                return Ok(id);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Transient error publishing to {} (attempt {}/{}): {}. Retrying in {:?}",
                    name, attempt, max_attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt == max_attempts && e.is_transient() {
                    warn!(
                        "Giving up on {} after {} attempts: {}",
                        name, max_attempts, e
                    );
                }
                return Err(e);
            }
        }
    }
}
