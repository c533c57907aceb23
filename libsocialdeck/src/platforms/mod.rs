//! Platform clients
//!
//! Every supported network is reached through a `PlatformClient`. Clients
//! are thin: a token, an overridable base URL, and the one or two REST calls
//! the vendor needs to publish a post. Status codes are mapped onto
//! `PlatformError` the same way for every vendor (see [`http`]).
//!
//! ```no_run
//! use libsocialdeck::platforms::create_client;
//! use libsocialdeck::{Config, CredentialManager, Platform, Post};
//!
//! # async fn example() -> libsocialdeck::Result<()> {
//! let config = Config::load()?;
//! let credentials = CredentialManager::new(config.credentials.clone())?;
//! let client = create_client(Platform::Telegram, &config, &credentials)?;
//!
//! let post = Post::new("Hello!".into(), Platform::Telegram, chrono::Utc::now());
//! client.validate(&post)?;
//! let message_id = client.publish(&post).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::credentials::CredentialManager;
use crate::error::{PlatformError, Result};
use crate::types::{Platform, Post};

pub mod facebook;
pub mod github;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod mock;
pub mod telegram;
pub mod twitter;
pub mod whatsapp;
pub mod youtube;

pub use mock::{MockClients, MockConfig, MockPlatform};

#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Lowercase identifier, e.g. "telegram"
    fn name(&self) -> &str {
        self.platform().as_str()
    }

    /// Whether every credential and identifier the client needs is present
    fn is_configured(&self) -> bool;

    fn character_limit(&self) -> Option<usize> {
        self.platform().character_limit()
    }

    /// Check content against platform rules before any network call
    fn validate(&self, post: &Post) -> Result<()> {
        validate_length(&post.content, self.character_limit())
    }

    /// Publish and return the platform's id for the new post
    async fn publish(&self, post: &Post) -> Result<String>;
}

/// Reject empty content and content over `limit` characters
pub fn validate_length(content: &str, limit: Option<usize>) -> Result<()> {
    if content.trim().is_empty() {
        return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
    }

    if let Some(limit) = limit {
        let length = content.chars().count();
        if length > limit {
            return Err(PlatformError::Validation(format!(
                "Content exceeds {} character limit (got {} characters)",
                limit, length
            ))
            .into());
        }
    }

    Ok(())
}

/// Build the client for `platform`
///
/// In mock mode a `MockPlatform` that always succeeds is returned and no
/// credentials are read.
pub fn create_client(
    platform: Platform,
    config: &Config,
    credentials: &CredentialManager,
) -> Result<Box<dyn PlatformClient>> {
    if config.mock_mode {
        tracing::debug!("Mock mode: using mock client for {}", platform);
        return Ok(Box::new(MockPlatform::success(platform)));
    }

    let settings = config.platform(platform);
    let client: Box<dyn PlatformClient> = match platform {
        Platform::Twitter => Box::new(twitter::TwitterClient::from_config(&settings, credentials)?),
        Platform::LinkedIn => {
            Box::new(linkedin::LinkedInClient::from_config(&settings, credentials)?)
        }
        Platform::Facebook => {
            Box::new(facebook::FacebookClient::from_config(&settings, credentials)?)
        }
        Platform::Instagram => {
            Box::new(instagram::InstagramClient::from_config(&settings, credentials)?)
        }
        Platform::YouTube => Box::new(youtube::YouTubeClient::from_config(&settings, credentials)?),
        Platform::Telegram => {
            Box::new(telegram::TelegramClient::from_config(&settings, credentials)?)
        }
        Platform::WhatsApp => {
            Box::new(whatsapp::WhatsAppClient::from_config(&settings, credentials)?)
        }
        Platform::GitHub => Box::new(github::GitHubClient::from_config(&settings, credentials)?),
    };
    Ok(client)
}

/// Source of platform clients for the scheduler
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, platform: Platform) -> Result<Box<dyn PlatformClient>>;
}

/// Builds clients from configuration and stored credentials
pub struct ConfiguredClients {
    config: Config,
    credentials: Arc<CredentialManager>,
}

impl ConfiguredClients {
    pub fn new(config: Config, credentials: Arc<CredentialManager>) -> Self {
        Self {
            config,
            credentials,
        }
    }
}

impl ClientFactory for ConfiguredClients {
    fn client_for(&self, platform: Platform) -> Result<Box<dyn PlatformClient>> {
        create_client(platform, &self.config, &self.credentials)
    }
}
