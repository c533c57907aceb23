//! Core types for SocialDeck

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DeckError;

/// One of the supported social networks/services
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    LinkedIn,
    Facebook,
    Instagram,
    YouTube,
    Telegram,
    WhatsApp,
    GitHub,
}

impl Platform {
    pub const ALL: [Platform; 8] = [
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Facebook,
        Platform::Instagram,
        Platform::YouTube,
        Platform::Telegram,
        Platform::WhatsApp,
        Platform::GitHub,
    ];

    /// Lowercase identifier used on the wire, in config, and in credential names
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::YouTube => "youtube",
            Platform::Telegram => "telegram",
            Platform::WhatsApp => "whatsapp",
            Platform::GitHub => "github",
        }
    }

    /// Maximum post length, or `None` when the platform has no practical limit
    pub fn character_limit(&self) -> Option<usize> {
        match self {
            Platform::Twitter => Some(280),
            Platform::LinkedIn => Some(3000),
            Platform::Facebook => Some(63206),
            Platform::Instagram => Some(2200),
            Platform::YouTube => Some(10000),
            Platform::Telegram => Some(4096),
            Platform::WhatsApp => Some(4096),
            Platform::GitHub => None,
        }
    }

    /// Whether a post is rejected without an image
    pub fn requires_image(&self) -> bool {
        matches!(self, Platform::Instagram)
    }

    /// Out-of-the-box posting times for a fresh state
    pub fn default_best_times(&self) -> Vec<NaiveTime> {
        let times: &[(u32, u32)] = match self {
            Platform::Twitter => &[(9, 0), (12, 0), (17, 0)],
            Platform::LinkedIn => &[(8, 0), (12, 0), (17, 30)],
            Platform::Facebook => &[(9, 0), (13, 0), (15, 0)],
            Platform::Instagram => &[(11, 0), (14, 0), (19, 0)],
            Platform::YouTube => &[(14, 0), (16, 0), (20, 0)],
            Platform::Telegram => &[(10, 0), (15, 0), (20, 0)],
            Platform::WhatsApp => &[(10, 0), (14, 0), (19, 0)],
            Platform::GitHub => &[(10, 0), (14, 0), (16, 0)],
        };
        times
            .iter()
            .filter_map(|(h, m)| NaiveTime::from_hms_opt(*h, *m, 0))
            .collect()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::LinkedIn),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "youtube" => Ok(Platform::YouTube),
            "telegram" => Ok(Platform::Telegram),
            "whatsapp" => Ok(Platform::WhatsApp),
            "github" => Ok(Platform::GitHub),
            other => Err(DeckError::InvalidInput(format!(
                "Unknown platform '{}'. Valid platforms: twitter, linkedin, facebook, instagram, youtube, telegram, whatsapp, github",
                other
            ))),
        }
    }
}

/// Parse a comma-separated platform list such as "twitter,linkedin"
pub fn parse_platform_list(input: &str) -> Result<Vec<Platform>, DeckError> {
    let mut platforms = Vec::new();
    for part in input.split(',').filter(|p| !p.trim().is_empty()) {
        let platform: Platform = part.parse()?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    if platforms.is_empty() {
        return Err(DeckError::InvalidInput(
            "At least one platform is required".to_string(),
        ));
    }
    Ok(platforms)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(DeckError::InvalidInput(format!(
                "Unknown status '{}'. Valid statuses: draft, scheduled, published, failed",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub content: String,
    pub platform: Platform,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub ai_generated: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

impl Post {
    /// Create a draft post for `platform`, scheduled for `scheduled_time`
    pub fn new(content: String, platform: Platform, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            platform,
            scheduled_time,
            status: PostStatus::Draft,
            media_urls: Vec::new(),
            source_url: None,
            image_url: None,
            ai_generated: false,
            created_at: Utc::now(),
            published_at: None,
            platform_post_id: None,
            error: None,
            campaign_id: None,
        }
    }

    /// Create a post that the scheduler will pick up
    pub fn scheduled(content: String, platform: Platform, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            status: PostStatus::Scheduled,
            ..Self::new(content, platform, scheduled_time)
        }
    }

    /// A post is due once its time has passed and it is still waiting
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Scheduled && self.scheduled_time <= now
    }

    pub fn mark_published(&mut self, platform_post_id: String, at: DateTime<Utc>) {
        self.status = PostStatus::Published;
        self.platform_post_id = Some(platform_post_id);
        self.published_at = Some(at);
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = PostStatus::Failed;
        self.error = Some(error);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    pub platform: Platform,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(with = "clock_times")]
    pub best_times: Vec<NaiveTime>,
}

impl PlatformSettings {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            enabled: false,
            connected: false,
            username: None,
            best_times: platform.default_best_times(),
        }
    }
}

/// Serialize clock times as "HH:MM"
mod clock_times {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(times: &[NaiveTime], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(times.iter().map(|t| t.format("%H:%M").to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<NaiveTime>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| crate::scheduling::parse_best_time(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CampaignType {
    ProductLaunch,
    BrandAwareness,
    EventPromotion,
    Seasonal,
    ContentSeries,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::ProductLaunch => "product-launch",
            CampaignType::BrandAwareness => "brand-awareness",
            CampaignType::EventPromotion => "event-promotion",
            CampaignType::Seasonal => "seasonal",
            CampaignType::ContentSeries => "content-series",
        }
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignType {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "product-launch" => Ok(CampaignType::ProductLaunch),
            "brand-awareness" => Ok(CampaignType::BrandAwareness),
            "event-promotion" => Ok(CampaignType::EventPromotion),
            "seasonal" => Ok(CampaignType::Seasonal),
            "content-series" => Ok(CampaignType::ContentSeries),
            other => Err(DeckError::InvalidInput(format!(
                "Unknown campaign type '{}'. Valid types: product-launch, brand-awareness, event-promotion, seasonal, content-series",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub campaign_type: CampaignType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub post_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HashtagGroup {
    pub id: String,
    pub name: String,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RssFeed {
    pub id: String,
    pub name: String,
    pub url: String,
    pub platforms: Vec<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_post: bool,
}

impl RssFeed {
    pub fn new(name: String, url: String, platforms: Vec<Platform>, auto_post: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            url,
            platforms,
            last_fetched: None,
            auto_post,
        }
    }
}

fn default_state_version() -> u32 {
    1
}

/// Everything the tools persist, stored as one JSON document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default = "default_state_version")]
    pub version: u32,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub platforms: Vec<PlatformSettings>,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub hashtag_groups: Vec<HashtagGroup>,
    #[serde(default)]
    pub rss_feeds: Vec<RssFeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scheduled_date: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: default_state_version(),
            posts: Vec::new(),
            platforms: Platform::ALL.iter().map(|p| PlatformSettings::new(*p)).collect(),
            campaigns: Vec::new(),
            hashtag_groups: Vec::new(),
            rss_feeds: Vec::new(),
            last_scheduled_date: None,
        }
    }
}

impl AppState {
    /// Settings for a platform, if present in the state
    pub fn platform_settings(&self, platform: Platform) -> Option<&PlatformSettings> {
        self.platforms.iter().find(|s| s.platform == platform)
    }

    /// Settings for a platform, inserting defaults when missing
    pub fn platform_settings_mut(&mut self, platform: Platform) -> &mut PlatformSettings {
        let index = match self.platforms.iter().position(|s| s.platform == platform) {
            Some(index) => index,
            None => {
                self.platforms.push(PlatformSettings::new(platform));
                self.platforms.len() - 1
            }
        };
        &mut self.platforms[index]
    }

    pub fn is_enabled(&self, platform: Platform) -> bool {
        self.platform_settings(platform).is_some_and(|s| s.enabled)
    }

    pub fn enabled_platforms(&self) -> Vec<Platform> {
        self.platforms
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.platform)
            .collect()
    }

    pub fn find_post(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == post_id)
    }

    pub fn find_post_mut(&mut self, post_id: &str) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| p.id == post_id)
    }

    /// Remove a post, returning it if it existed
    pub fn remove_post(&mut self, post_id: &str) -> Option<Post> {
        let index = self.posts.iter().position(|p| p.id == post_id)?;
        Some(self.posts.remove(index))
    }

    /// Scheduled posts ordered by publish time
    pub fn scheduled_posts(&self) -> Vec<&Post> {
        let mut posts: Vec<&Post> = self
            .posts
            .iter()
            .filter(|p| p.status == PostStatus::Scheduled)
            .collect();
        posts.sort_by_key(|p| p.scheduled_time);
        posts
    }
}
