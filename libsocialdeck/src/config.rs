//! Configuration management for SocialDeck

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::credentials::CredentialConfig;
use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Skip vendor APIs and fabricate successful responses
    #[serde(default)]
    pub mock_mode: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub platforms: BTreeMap<Platform, PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/socialdeck/state.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Seconds between due-post checks
    pub poll_interval: u64,
    /// Upper bound on AI posts created per platform per day
    pub max_posts_per_platform: usize,
    /// Offset used for best times and the daily guard, e.g. "+02:00"
    pub utc_offset: String,
    /// Topics the daily AI posts rotate through
    pub topics: Vec<String>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            max_posts_per_platform: 3,
            utc_offset: "+00:00".to_string(),
            topics: vec![
                "industry news".to_string(),
                "productivity tips".to_string(),
                "behind the scenes".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Base URL of an OpenAI-compatible API (without /chat/completions)
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 400,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RssConfig {
    /// Prefix prepended to feed URLs, for feeds only reachable through a proxy
    pub proxy: Option<String>,
    pub timeout_secs: u64,
    /// Maximum number of items turned into posts per fetch
    pub max_items: usize,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_secs: 30,
            max_items: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub linkedin: Option<OAuthClientConfig>,
    pub twitter: Option<OAuthClientConfig>,
}

impl OAuthConfig {
    pub fn client(&self, platform: Platform) -> Option<&OAuthClientConfig> {
        match platform {
            Platform::LinkedIn => self.linkedin.as_ref(),
            Platform::Twitter => self.twitter.as_ref(),
            _ => None,
        }
    }
}

/// OAuth application registration; the client secret lives in the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Override for the authorize endpoint (tests, proxies)
    #[serde(default)]
    pub authorize_url: Option<String>,
    /// Override for the token endpoint (tests, proxies)
    #[serde(default)]
    pub token_url: Option<String>,
}

/// Per-platform identifiers that are not secrets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Override for the platform API base URL
    pub api_base: Option<String>,
    /// LinkedIn author URN, e.g. "urn:li:person:abc123"
    pub author_urn: Option<String>,
    /// Facebook page id
    pub page_id: Option<String>,
    /// Instagram business user id
    pub ig_user_id: Option<String>,
    /// YouTube video that carries channel announcements
    pub video_id: Option<String>,
    /// Telegram chat or channel id
    pub chat_id: Option<String>,
    /// WhatsApp Business phone number id
    pub phone_number_id: Option<String>,
    /// WhatsApp recipient in E.164 format
    pub recipient: Option<String>,
    /// Publish GitHub gists publicly
    pub public: bool,
    /// Image attached to generated posts that carry none
    pub default_image_url: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration, falling back to defaults when no file exists
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Ok(Self::default_config())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        // Reject an unparseable offset at load time rather than at midnight
        config.utc_offset()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            mock_mode: false,
            database: DatabaseConfig::default(),
            scheduling: SchedulingConfig::default(),
            ai: AiConfig::default(),
            credentials: CredentialConfig::default(),
            rss: RssConfig::default(),
            oauth: OAuthConfig::default(),
            platforms: BTreeMap::new(),
        }
    }

    /// The configured offset for local clock times
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        crate::scheduling::parse_utc_offset(&self.scheduling.utc_offset)
    }

    /// Platform identifiers, or an empty section when none are configured
    pub fn platform(&self, platform: Platform) -> PlatformConfig {
        self.platforms.get(&platform).cloned().unwrap_or_default()
    }

    /// Configured default images, keyed by platform
    pub fn default_images(&self) -> BTreeMap<Platform, String> {
        self.platforms
            .iter()
            .filter_map(|(platform, section)| {
                section
                    .default_image_url
                    .clone()
                    .map(|url| (*platform, url))
            })
            .collect()
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALDECK_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialdeck").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("socialdeck"))
}

/// Resolve the state database path
///
/// `SOCIALDECK_DB_PATH` wins over the configured path.
pub fn resolve_db_path(configured: &str) -> PathBuf {
    let raw = std::env::var("SOCIALDECK_DB_PATH").unwrap_or_else(|_| configured.to_string());
    PathBuf::from(shellexpand::tilde(&raw).to_string())
}
