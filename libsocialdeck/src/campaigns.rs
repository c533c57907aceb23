//! Campaign planning
//!
//! A campaign spreads a number of posts over a date range. The range is cut
//! into phases whose lengths and post counts follow a fixed percentage table
//! for the campaign type; posts inside a phase are spread evenly over its
//! days, rotate through the target platforms, and land on each platform's
//! first best time.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ai::{ContentGenerator, GenerationRequest};
use crate::error::{DeckError, Result};
use crate::scheduling::at_local_time;
use crate::store::Store;
use crate::types::{AppState, Campaign, CampaignType, Platform, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTemplate {
    pub name: &'static str,
    pub percentage: u32,
}

const fn phase(name: &'static str, percentage: u32) -> PhaseTemplate {
    PhaseTemplate { name, percentage }
}

const PRODUCT_LAUNCH: &[PhaseTemplate] =
    &[phase("teaser", 20), phase("launch", 50), phase("follow-up", 30)];
const BRAND_AWARENESS: &[PhaseTemplate] = &[
    phase("introduction", 30),
    phase("engagement", 40),
    phase("reinforcement", 30),
];
const EVENT_PROMOTION: &[PhaseTemplate] =
    &[phase("announcement", 25), phase("countdown", 50), phase("recap", 25)];
const SEASONAL: &[PhaseTemplate] = &[phase("build-up", 40), phase("peak", 40), phase("wrap-up", 20)];
const CONTENT_SERIES: &[PhaseTemplate] = &[phase("series", 100)];

/// Phase table for a campaign type; percentages sum to 100
pub fn phase_templates(campaign_type: CampaignType) -> &'static [PhaseTemplate] {
    match campaign_type {
        CampaignType::ProductLaunch => PRODUCT_LAUNCH,
        CampaignType::BrandAwareness => BRAND_AWARENESS,
        CampaignType::EventPromotion => EVENT_PROMOTION,
        CampaignType::Seasonal => SEASONAL,
        CampaignType::ContentSeries => CONTENT_SERIES,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignPhase {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub post_count: usize,
}

/// Whole days covered by a range, at least one
fn span_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    ((seconds + 86_399) / 86_400).max(1)
}

/// Cut `start..end` into the phases of `campaign_type`
///
/// Boundaries fall on whole days from `start`; the last phase always ends at
/// `end`. Each phase gets `floor(total * pct / 100)` posts and whatever is
/// left over goes to the last phase.
pub fn plan_phases(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    total_posts: usize,
    campaign_type: CampaignType,
) -> Result<Vec<CampaignPhase>> {
    if end <= start {
        return Err(DeckError::InvalidInput(
            "Campaign end date must be after its start date".to_string(),
        ));
    }

    let templates = phase_templates(campaign_type);
    let days = span_days(start, end);

    let mut phases = Vec::with_capacity(templates.len());
    let mut cumulative = 0u32;
    let mut assigned = 0usize;

    for (index, template) in templates.iter().enumerate() {
        let is_last = index + 1 == templates.len();
        let phase_start = boundary(start, end, days, cumulative);
        cumulative += template.percentage;
        let phase_end = if is_last {
            end
        } else {
            boundary(start, end, days, cumulative)
        };

        let mut post_count = total_posts * template.percentage as usize / 100;
        assigned += post_count;
        if is_last {
            post_count += total_posts - assigned;
        }

        phases.push(CampaignPhase {
            name: template.name.to_string(),
            start: phase_start,
            end: phase_end,
            post_count,
        });
    }

    Ok(phases)
}

fn boundary(start: DateTime<Utc>, end: DateTime<Utc>, days: i64, percentage: u32) -> DateTime<Utc> {
    let offset_days = (days as f64 * f64::from(percentage) / 100.0).round() as i64;
    (start + Duration::days(offset_days)).min(end)
}

/// One post slot of a campaign, before content exists
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedPost {
    pub phase: String,
    pub platform: Platform,
    pub scheduled_time: DateTime<Utc>,
}

fn first_best_time(state: &AppState, platform: Platform) -> NaiveTime {
    state
        .platform_settings(platform)
        .and_then(|s| s.best_times.iter().min().copied())
        .or_else(|| NaiveTime::from_hms_opt(9, 0, 0))
        .unwrap_or_default()
}

/// Place every phase's posts on concrete times
pub fn schedule_campaign_posts(
    phases: &[CampaignPhase],
    platforms: &[Platform],
    state: &AppState,
    offset: FixedOffset,
) -> Vec<PlannedPost> {
    let mut planned = Vec::new();
    if platforms.is_empty() {
        return planned;
    }

    let mut rotation = 0usize;
    for phase in phases {
        if phase.post_count == 0 {
            continue;
        }
        let first_day = phase.start.with_timezone(&offset).date_naive();
        let days = span_days(phase.start, phase.end);

        for slot in 0..phase.post_count {
            let platform = platforms[rotation % platforms.len()];
            rotation += 1;

            let day_offset = slot as i64 * days / phase.post_count as i64;
            let day = first_day + Duration::days(day_offset);
            let scheduled_time = at_local_time(day, first_best_time(state, platform), offset)
                .unwrap_or(phase.start);

            planned.push(PlannedPost {
                phase: phase.name.clone(),
                platform,
                scheduled_time,
            });
        }
    }
    planned
}

#[derive(Debug, Clone)]
pub struct CampaignInput {
    pub name: String,
    pub campaign_type: CampaignType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub platforms: Vec<Platform>,
    pub total_posts: usize,
    pub description: String,
}

impl CampaignInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DeckError::InvalidInput("Campaign name cannot be empty".to_string()));
        }
        if self.end <= self.start {
            return Err(DeckError::InvalidInput(
                "Campaign end date must be after its start date".to_string(),
            ));
        }
        if self.total_posts == 0 {
            return Err(DeckError::InvalidInput(
                "A campaign needs at least one post".to_string(),
            ));
        }
        if self.platforms.is_empty() {
            return Err(DeckError::InvalidInput(
                "A campaign needs at least one platform".to_string(),
            ));
        }
        Ok(())
    }
}

/// Creates campaigns and their scheduled posts
pub struct CampaignPlanner {
    generator: Arc<dyn ContentGenerator>,
    offset: FixedOffset,
    default_images: BTreeMap<Platform, String>,
}

impl CampaignPlanner {
    pub fn new(generator: Arc<dyn ContentGenerator>, offset: FixedOffset) -> Self {
        Self {
            generator,
            offset,
            default_images: BTreeMap::new(),
        }
    }

    /// Images attached to the posts of each platform
    pub fn with_default_images(mut self, images: BTreeMap<Platform, String>) -> Self {
        self.default_images = images;
        self
    }

    /// Phases and slots for `input` without generating anything
    pub fn plan(&self, input: &CampaignInput, state: &AppState) -> Result<Vec<PlannedPost>> {
        input.validate()?;
        if let Some(platform) = input
            .platforms
            .iter()
            .find(|p| p.requires_image() && !self.default_images.contains_key(p))
        {
            return Err(DeckError::InvalidInput(format!(
                "{} posts need an image; set platforms.{}.default_image_url",
                platform,
                platform.as_str()
            )));
        }
        let phases = plan_phases(input.start, input.end, input.total_posts, input.campaign_type)?;
        Ok(schedule_campaign_posts(
            &phases,
            &input.platforms,
            state,
            self.offset,
        ))
    }

    /// Generate content for every slot and store the campaign with its posts
    ///
    /// Slots whose generation fails are logged and left out.
    pub async fn create(&self, store: &Store, input: CampaignInput) -> Result<Campaign> {
        let state = store.load().await?;
        let planned = self.plan(&input, &state)?;

        let campaign_id = Uuid::new_v4().to_string();
        let topic = if input.description.trim().is_empty() {
            input.name.clone()
        } else {
            format!("{}: {}", input.name, input.description)
        };

        let mut posts = Vec::with_capacity(planned.len());
        for slot in &planned {
            let request = GenerationRequest::new(slot.platform, topic.clone()).with_context(
                format!("{} campaign, {} phase", input.campaign_type, slot.phase),
            );
            match self.generator.generate(&request).await {
                Ok(content) => {
                    let mut post = Post::scheduled(content, slot.platform, slot.scheduled_time);
                    post.ai_generated = true;
                    post.campaign_id = Some(campaign_id.clone());
                    post.image_url = self.default_images.get(&slot.platform).cloned();
                    posts.push(post);
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping {} post in {} phase of campaign '{}': {}",
                        slot.platform,
                        slot.phase,
                        input.name,
                        e
                    );
                }
            }
        }

        let campaign = Campaign {
            id: campaign_id,
            name: input.name,
            campaign_type: input.campaign_type,
            start_date: input.start,
            end_date: input.end,
            platforms: input.platforms,
            description: input.description,
            post_ids: posts.iter().map(|p| p.id.clone()).collect(),
            created_at: Utc::now(),
        };

        let stored = campaign.clone();
        store
            .update(move |state| {
                state.posts.extend(posts);
                state.campaigns.push(stored);
                Ok(())
            })
            .await?;

        tracing::info!(
            "Created campaign '{}' with {} posts",
            campaign.name,
            campaign.post_ids.len()
        );
        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::StaticGenerator;
    use crate::platforms::PlatformClient;
    use crate::types::PostStatus;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn utc_offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_phase_tables_sum_to_100() {
        for campaign_type in [
            CampaignType::ProductLaunch,
            CampaignType::BrandAwareness,
            CampaignType::EventPromotion,
            CampaignType::Seasonal,
            CampaignType::ContentSeries,
        ] {
            let total: u32 = phase_templates(campaign_type)
                .iter()
                .map(|p| p.percentage)
                .sum();
            assert_eq!(total, 100, "{}", campaign_type);
        }
    }

    #[test]
    fn test_product_launch_phases() {
        let phases = plan_phases(utc(2026, 3, 1), utc(2026, 3, 11), 10, CampaignType::ProductLaunch)
            .unwrap();

        let names: Vec<&str> = phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["teaser", "launch", "follow-up"]);

        assert_eq!(phases[0].start, utc(2026, 3, 1));
        assert_eq!(phases[0].end, utc(2026, 3, 3));
        assert_eq!(phases[1].start, utc(2026, 3, 3));
        assert_eq!(phases[1].end, utc(2026, 3, 8));
        assert_eq!(phases[2].end, utc(2026, 3, 11));

        let counts: Vec<usize> = phases.iter().map(|p| p.post_count).collect();
        assert_eq!(counts, vec![2, 5, 3]);
    }

    #[test]
    fn test_leftover_posts_go_to_last_phase() {
        // 7 posts: floor(7*0.25)=1, floor(7*0.5)=3, floor(7*0.25)=1, leftover 2
        let phases =
            plan_phases(utc(2026, 5, 1), utc(2026, 5, 21), 7, CampaignType::EventPromotion).unwrap();
        let counts: Vec<usize> = phases.iter().map(|p| p.post_count).collect();
        assert_eq!(counts, vec![1, 3, 3]);
        assert_eq!(counts.iter().sum::<usize>(), 7);
    }

    #[test]
    fn test_plan_rejects_inverted_range() {
        assert!(plan_phases(utc(2026, 5, 2), utc(2026, 5, 1), 3, CampaignType::Seasonal).is_err());
    }

    #[test]
    fn test_schedule_rotates_platforms_and_uses_best_time() {
        let phases = plan_phases(utc(2026, 3, 1), utc(2026, 3, 5), 4, CampaignType::ContentSeries)
            .unwrap();
        let state = AppState::default();
        let planned = schedule_campaign_posts(
            &phases,
            &[Platform::LinkedIn, Platform::Twitter],
            &state,
            utc_offset(),
        );

        assert_eq!(planned.len(), 4);
        let platforms: Vec<Platform> = planned.iter().map(|p| p.platform).collect();
        assert_eq!(
            platforms,
            vec![Platform::LinkedIn, Platform::Twitter, Platform::LinkedIn, Platform::Twitter]
        );
        // LinkedIn's first default best time is 08:00, Twitter's 09:00
        assert_eq!(planned[0].scheduled_time, Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
        assert_eq!(planned[1].scheduled_time, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        assert_eq!(planned[3].scheduled_time, Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_schedule_falls_back_to_nine() {
        let phases =
            plan_phases(utc(2026, 3, 1), utc(2026, 3, 2), 1, CampaignType::ContentSeries).unwrap();
        let mut state = AppState::default();
        state.platform_settings_mut(Platform::GitHub).best_times.clear();

        let planned = schedule_campaign_posts(&phases, &[Platform::GitHub], &state, utc_offset());
        assert_eq!(planned[0].scheduled_time, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_input_validation() {
        let input = CampaignInput {
            name: "Spring".to_string(),
            campaign_type: CampaignType::Seasonal,
            start: utc(2026, 3, 1),
            end: utc(2026, 3, 20),
            platforms: vec![Platform::Facebook],
            total_posts: 6,
            description: String::new(),
        };
        assert!(input.validate().is_ok());

        let no_platforms = CampaignInput {
            platforms: Vec::new(),
            ..input.clone()
        };
        assert!(matches!(no_platforms.validate(), Err(DeckError::InvalidInput(_))));

        let no_posts = CampaignInput {
            total_posts: 0,
            ..input
        };
        assert!(no_posts.validate().is_err());
    }

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::new(dir.path().join("state.db").to_str().unwrap())
            .await
            .unwrap();
        (dir, store)
    }

    fn launch(platforms: Vec<Platform>) -> CampaignInput {
        CampaignInput {
            name: "Widget 2.0".to_string(),
            campaign_type: CampaignType::ProductLaunch,
            start: utc(2026, 3, 1),
            end: utc(2026, 3, 11),
            platforms,
            total_posts: 10,
            description: "the faster widget".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_stores_campaign_and_posts() {
        let (_dir, store) = temp_store().await;

        let generator = StaticGenerator::new().failing_for(Platform::Facebook);
        let planner = CampaignPlanner::new(Arc::new(generator.clone()), utc_offset());

        let campaign = planner
            .create(&store, launch(vec![Platform::Twitter, Platform::Facebook]))
            .await
            .unwrap();

        // Every other slot is Facebook, whose generation fails
        assert_eq!(campaign.post_ids.len(), 5);
        assert_eq!(generator.requests().len(), 10);

        let state = store.load().await.unwrap();
        assert_eq!(state.campaigns.len(), 1);
        assert_eq!(state.posts.len(), 5);
        for post in &state.posts {
            assert_eq!(post.status, PostStatus::Scheduled);
            assert!(post.ai_generated);
            assert_eq!(post.platform, Platform::Twitter);
            assert_eq!(post.campaign_id.as_deref(), Some(campaign.id.as_str()));
            assert!(post.image_url.is_none());
        }
    }

    #[tokio::test]
    async fn test_instagram_needs_a_default_image() {
        let (_dir, store) = temp_store().await;
        let generator = StaticGenerator::new();
        let planner = CampaignPlanner::new(Arc::new(generator.clone()), utc_offset());

        let err = planner
            .create(&store, launch(vec![Platform::Twitter, Platform::Instagram]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::InvalidInput(_)));
        assert!(err.to_string().contains("platforms.instagram.default_image_url"));
        assert!(generator.requests().is_empty());
        assert!(store.load().await.unwrap().campaigns.is_empty());
    }

    #[tokio::test]
    async fn test_default_image_is_attached_to_instagram_posts() {
        let (_dir, store) = temp_store().await;
        let images = BTreeMap::from([(
            Platform::Instagram,
            "https://cdn.example.org/widget.png".to_string(),
        )]);
        let planner = CampaignPlanner::new(Arc::new(StaticGenerator::new()), utc_offset())
            .with_default_images(images);

        planner
            .create(&store, launch(vec![Platform::Twitter, Platform::Instagram]))
            .await
            .unwrap();

        let state = store.load().await.unwrap();
        let instagram = crate::platforms::instagram::InstagramClient::new(None, None, None).unwrap();
        let mut checked = 0;
        for post in state.posts.iter().filter(|p| p.platform == Platform::Instagram) {
            assert_eq!(post.image_url.as_deref(), Some("https://cdn.example.org/widget.png"));
            instagram.validate(post).unwrap();
            checked += 1;
        }
        assert_eq!(checked, 5);
        assert!(state
            .posts
            .iter()
            .filter(|p| p.platform == Platform::Twitter)
            .all(|p| p.image_url.is_none()));
    }
}
