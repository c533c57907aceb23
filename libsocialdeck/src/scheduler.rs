//! The posting scheduler
//!
//! Once per local day the scheduler asks the content generator for posts at
//! each enabled platform's remaining best times; every poll interval it
//! publishes whatever is due. `run` drives both until the shutdown channel
//! fires, and the `deck-send` daemon is a thin wrapper around it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::ai::{ContentGenerator, GenerationRequest};
use crate::config::Config;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::platforms::ClientFactory;
use crate::poster::{publish_post, PublishOutcome, RetryPolicy};
use crate::scheduling::{local_date_string, next_local_midnight, parse_utc_offset, upcoming_slots_today};
use crate::store::Store;
use crate::types::{Platform, Post, PostStatus};

const FALLBACK_TOPIC: &str = "our latest updates";

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    pub max_posts_per_platform: usize,
    pub topics: Vec<String>,
    pub offset: FixedOffset,
    pub retry: RetryPolicy,
    /// Image attached to generated posts, per platform
    pub default_images: BTreeMap<Platform, String>,
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let scheduling = &config.scheduling;
        Ok(Self {
            poll_interval: Duration::from_secs(scheduling.poll_interval.max(1)),
            max_posts_per_platform: scheduling.max_posts_per_platform,
            topics: scheduling.topics.clone(),
            offset: parse_utc_offset(&scheduling.utc_offset)?,
            retry: RetryPolicy::default(),
            default_images: config.default_images(),
        })
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_posts_per_platform: 3,
            topics: Vec::new(),
            offset: Utc.fix(),
            retry: RetryPolicy::default(),
            default_images: BTreeMap::new(),
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<Store>,
    clients: Arc<dyn ClientFactory>,
    generator: Arc<dyn ContentGenerator>,
    events: EventBus,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        clients: Arc<dyn ClientFactory>,
        generator: Arc<dyn ContentGenerator>,
        events: EventBus,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            store,
            clients,
            generator,
            events,
            options,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn topic(&self, index: usize) -> String {
        if self.options.topics.is_empty() {
            FALLBACK_TOPIC.to_string()
        } else {
            self.options.topics[index % self.options.topics.len()].clone()
        }
    }

    /// Create today's AI posts, at most once per local calendar day
    ///
    /// Returns the posts added; empty when today was already handled.
    pub async fn schedule_posts_for_today(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let today = local_date_string(now, self.options.offset);
        let state = self.store.load().await?;
        if state.last_scheduled_date.as_deref() == Some(today.as_str()) {
            debug!("Posts for {} already scheduled", today);
            return Ok(Vec::new());
        }

        let mut posts = Vec::new();
        let mut topic_index = 0;
        for platform in state.enabled_platforms() {
            let best_times = state
                .platform_settings(platform)
                .map(|s| s.best_times.clone())
                .unwrap_or_default();
            let slots = upcoming_slots_today(&best_times, now, self.options.offset);
            if slots.is_empty() {
                continue;
            }

            let image_url = self.options.default_images.get(&platform).cloned();
            if platform.requires_image() && image_url.is_none() {
                let error = format!(
                    "{} posts need an image; set platforms.{}.default_image_url",
                    platform,
                    platform.as_str()
                );
                warn!("Skipping {}: {}", platform, error);
                self.events.emit(Event::GenerationFailed { platform, error });
                continue;
            }

            for slot in slots.into_iter().take(self.options.max_posts_per_platform) {
                let request = GenerationRequest::new(platform, self.topic(topic_index));
                topic_index += 1;

                match self.generator.generate(&request).await {
                    Ok(content) => {
                        let mut post = Post::scheduled(content, platform, slot);
                        post.ai_generated = true;
                        post.image_url = image_url.clone();
                        posts.push(post);
                    }
                    Err(e) => {
                        warn!("Skipping {} slot at {}: {}", platform, slot, e);
                        self.events.emit(Event::GenerationFailed {
                            platform,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let added = posts.clone();
        let date = today.clone();
        let stored = self
            .store
            .update(move |state| {
                // Another process may have won the race while we generated
                if state.last_scheduled_date.as_deref() == Some(date.as_str()) {
                    return Ok(false);
                }
                state.posts.extend(added);
                state.last_scheduled_date = Some(date);
                Ok(true)
            })
            .await?;

        if !stored {
            debug!("Posts for {} were scheduled concurrently, discarding", today);
            return Ok(Vec::new());
        }

        for post in &posts {
            self.events.emit(Event::PostScheduled {
                post_id: post.id.clone(),
                platform: post.platform,
                scheduled_time: post.scheduled_time,
            });
        }
        self.events.emit(Event::DailyScheduleCompleted {
            date: today.clone(),
            scheduled: posts.len(),
        });
        info!("Scheduled {} posts for {}", posts.len(), today);
        Ok(posts)
    }

    /// Publish every scheduled post that is due on an enabled platform
    pub async fn publish_due_posts(&self, now: DateTime<Utc>) -> Result<Vec<PublishOutcome>> {
        let state = self.store.load().await?;
        let due: Vec<Post> = state
            .scheduled_posts()
            .into_iter()
            .filter(|p| p.is_due(now) && state.is_enabled(p.platform))
            .cloned()
            .collect();

        if due.is_empty() {
            return Ok(Vec::new());
        }
        info!("Found {} post(s) due for publishing", due.len());

        let mut outcomes = Vec::with_capacity(due.len());
        for post in due {
            let outcome = match self.clients.client_for(post.platform) {
                Ok(client) => publish_post(client.as_ref(), &post, self.options.retry).await,
                Err(e) => PublishOutcome {
                    post_id: post.id.clone(),
                    platform: post.platform,
                    success: false,
                    platform_post_id: None,
                    error: Some(e.to_string()),
                    attempts: 0,
                },
            };
            self.record(&outcome).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn record(&self, outcome: &PublishOutcome) -> Result<()> {
        let recorded = outcome.clone();
        let published_at = Utc::now();
        let updated = self
            .store
            .update(move |state| {
                let Some(post) = state.find_post_mut(&recorded.post_id) else {
                    return Ok(false);
                };
                // Cancelled or rescheduled while we were publishing
                if post.status != PostStatus::Scheduled {
                    return Ok(false);
                }
                match (recorded.success, recorded.platform_post_id) {
                    (true, Some(id)) => post.mark_published(id, published_at),
                    _ => post.mark_failed(recorded.error.unwrap_or_else(|| "unknown error".to_string())),
                }
                Ok(true)
            })
            .await?;

        if !updated {
            warn!("Post {} changed while publishing; result not recorded", outcome.post_id);
        }

        match (&outcome.platform_post_id, &outcome.error) {
            (Some(id), _) if outcome.success => {
                info!("Published {} to {} ({})", outcome.post_id, outcome.platform, id);
                self.events.emit(Event::PostPublished {
                    post_id: outcome.post_id.clone(),
                    platform: outcome.platform,
                    platform_post_id: id.clone(),
                });
            }
            (_, error) => {
                let error = error.clone().unwrap_or_default();
                error!("Failed to publish {} to {}: {}", outcome.post_id, outcome.platform, error);
                self.events.emit(Event::PostFailed {
                    post_id: outcome.post_id.clone(),
                    platform: outcome.platform,
                    error,
                });
            }
        }
        Ok(())
    }

    /// Schedule today, then publish every poll interval and reschedule at
    /// each local midnight until `shutdown` turns true or its sender drops
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if *shutdown.borrow() {
            return Ok(());
        }
        if let Err(e) = self.schedule_posts_for_today(Utc::now()).await {
            error!("Daily scheduling failed: {}", e);
        }

        let mut ticker = interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let now = Utc::now();
            let until_midnight = (next_local_midnight(now, self.options.offset) - now)
                .to_std()
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_due_posts(Utc::now()).await {
                        error!("Error publishing due posts: {}", e);
                    }
                }
                _ = sleep(until_midnight) => {
                    if let Err(e) = self.schedule_posts_for_today(Utc::now()).await {
                        error!("Daily scheduling failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Run on a background task
    pub fn spawn(self) -> SchedulerHandle {
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(shutdown).await });
        SchedulerHandle { stop, task }
    }
}

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl SchedulerHandle {
    /// Cancel both timers and wait for the loop to finish its current pass
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Scheduler task ended abnormally: {}", e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::StaticGenerator;
    use crate::error::PlatformError;
    use crate::platforms::{MockClients, MockPlatform, PlatformClient};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<Store>,
    }

    async fn fixture(enabled: &[Platform]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("state.db").to_str().unwrap())
            .await
            .unwrap();
        let enabled = enabled.to_vec();
        store
            .update(move |state| {
                for platform in enabled {
                    state.platform_settings_mut(platform).enabled = true;
                }
                Ok(())
            })
            .await
            .unwrap();
        Fixture {
            _dir: dir,
            store: Arc::new(store),
        }
    }

    fn options() -> SchedulerOptions {
        SchedulerOptions {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            topics: vec!["rust".to_string()],
            ..SchedulerOptions::default()
        }
    }

    fn scheduler(fx: &Fixture, clients: MockClients, generator: StaticGenerator) -> Scheduler {
        Scheduler::new(
            fx.store.clone(),
            Arc::new(clients),
            Arc::new(generator),
            EventBus::default(),
            options(),
        )
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_generates_only_for_enabled_platforms_at_future_slots() {
        let fx = fixture(&[Platform::Twitter, Platform::LinkedIn]).await;
        let generator = StaticGenerator::new();
        let scheduler = scheduler(&fx, MockClients::new(), generator.clone());

        let now = at(1, 10, 30);
        let posts = scheduler.schedule_posts_for_today(now).await.unwrap();

        // Twitter 12:00 and 17:00, LinkedIn 12:00 and 17:30
        assert_eq!(posts.len(), 4);
        for post in &posts {
            assert!(matches!(post.platform, Platform::Twitter | Platform::LinkedIn));
            assert!(post.scheduled_time > now);
            assert_eq!(post.status, PostStatus::Scheduled);
            assert!(post.ai_generated);
        }
        assert!(posts
            .iter()
            .any(|p| p.platform == Platform::LinkedIn && p.scheduled_time == at(1, 17, 30)));

        let state = fx.store.load().await.unwrap();
        assert_eq!(state.posts.len(), 4);
        assert_eq!(state.last_scheduled_date.as_deref(), Some("2026-03-01"));
        assert_eq!(generator.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_caps_posts_per_platform() {
        let fx = fixture(&[Platform::Twitter]).await;
        let mut scheduler = scheduler(&fx, MockClients::new(), StaticGenerator::new());
        scheduler.options.max_posts_per_platform = 1;

        let posts = scheduler.schedule_posts_for_today(at(1, 6, 0)).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].scheduled_time, at(1, 9, 0));
    }

    #[tokio::test]
    async fn test_scheduling_is_idempotent_per_day() {
        let fx = fixture(&[Platform::Twitter]).await;
        let scheduler = scheduler(&fx, MockClients::new(), StaticGenerator::new());

        assert_eq!(scheduler.schedule_posts_for_today(at(1, 8, 0)).await.unwrap().len(), 3);
        assert!(scheduler
            .schedule_posts_for_today(at(1, 8, 5))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(fx.store.load().await.unwrap().posts.len(), 3);

        // A new day schedules again
        assert_eq!(scheduler.schedule_posts_for_today(at(2, 8, 0)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_generation_failure_skips_only_that_platform() {
        let fx = fixture(&[Platform::Twitter, Platform::Telegram]).await;
        let scheduler = scheduler(
            &fx,
            MockClients::new(),
            StaticGenerator::new().failing_for(Platform::Telegram),
        );
        let mut events = scheduler.events().subscribe();

        let posts = scheduler.schedule_posts_for_today(at(1, 8, 0)).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert!(posts.iter().all(|p| p.platform == Platform::Twitter));

        let first = events.recv().await.unwrap();
        assert!(matches!(first, Event::GenerationFailed { platform: Platform::Telegram, .. }));
    }

    #[tokio::test]
    async fn test_instagram_without_image_is_skipped() {
        let fx = fixture(&[Platform::Twitter, Platform::Instagram]).await;
        let generator = StaticGenerator::new();
        let scheduler = scheduler(&fx, MockClients::new(), generator.clone());
        let mut events = scheduler.events().subscribe();

        let posts = scheduler.schedule_posts_for_today(at(1, 8, 0)).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert!(posts.iter().all(|p| p.platform == Platform::Twitter));
        assert!(generator
            .requests()
            .iter()
            .all(|r| r.platform == Platform::Twitter));

        match events.recv().await.unwrap() {
            Event::GenerationFailed { platform, error } => {
                assert_eq!(platform, Platform::Instagram);
                assert!(error.contains("platforms.instagram.default_image_url"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_instagram_posts_carry_default_image_and_publish() {
        let fx = fixture(&[Platform::Instagram]).await;
        let instagram = MockPlatform::success(Platform::Instagram);
        let mut scheduler = scheduler(
            &fx,
            MockClients::new().with(instagram.clone()),
            StaticGenerator::new(),
        );
        scheduler
            .options
            .default_images
            .insert(Platform::Instagram, "https://cdn.example.org/daily.png".to_string());

        // Instagram defaults to 11:00, 14:00 and 19:00
        let posts = scheduler.schedule_posts_for_today(at(1, 8, 0)).await.unwrap();
        assert_eq!(posts.len(), 3);
        let real_client = crate::platforms::instagram::InstagramClient::new(None, None, None).unwrap();
        for post in &posts {
            assert_eq!(post.image_url.as_deref(), Some("https://cdn.example.org/daily.png"));
            real_client.validate(post).unwrap();
        }

        let outcomes = scheduler.publish_due_posts(at(1, 11, 0)).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert_eq!(instagram.publish_call_count(), 1);
    }

    #[tokio::test]
    async fn test_publishes_only_due_scheduled_posts_on_enabled_platforms() {
        let fx = fixture(&[Platform::Twitter]).await;
        let now = at(1, 12, 0);

        let due = Post::scheduled("due".to_string(), Platform::Twitter, at(1, 11, 0));
        let future = Post::scheduled("later".to_string(), Platform::Twitter, at(1, 13, 0));
        let draft = Post::new("draft".to_string(), Platform::Twitter, at(1, 11, 0));
        let disabled = Post::scheduled("off".to_string(), Platform::Facebook, at(1, 11, 0));
        let ids: Vec<String> = [&due, &future, &draft, &disabled]
            .iter()
            .map(|p| p.id.clone())
            .collect();
        fx.store
            .update(move |state| {
                state.posts.extend([due, future, draft, disabled]);
                Ok(())
            })
            .await
            .unwrap();

        let twitter = MockPlatform::success(Platform::Twitter);
        let facebook = MockPlatform::success(Platform::Facebook);
        let clients = MockClients::new().with(twitter.clone()).with(facebook.clone());
        let scheduler = scheduler(&fx, clients, StaticGenerator::new());

        let outcomes = scheduler.publish_due_posts(now).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(twitter.published_content(), vec!["due".to_string()]);
        assert_eq!(facebook.publish_call_count(), 0);

        let state = fx.store.load().await.unwrap();
        let status = |id: &str| state.find_post(id).unwrap().status;
        assert_eq!(status(&ids[0]), PostStatus::Published);
        assert_eq!(status(&ids[1]), PostStatus::Scheduled);
        assert_eq!(status(&ids[2]), PostStatus::Draft);
        assert_eq!(status(&ids[3]), PostStatus::Scheduled);

        let published = state.find_post(&ids[0]).unwrap();
        assert!(published.platform_post_id.as_deref().unwrap().starts_with("twitter:mock-"));
        assert!(published.published_at.is_some());
    }

    #[tokio::test]
    async fn test_posting_failure_marks_failed() {
        let fx = fixture(&[Platform::LinkedIn]).await;
        let post = Post::scheduled("hello".to_string(), Platform::LinkedIn, at(1, 9, 0));
        let id = post.id.clone();
        fx.store
            .update(move |state| {
                state.posts.push(post);
                Ok(())
            })
            .await
            .unwrap();

        let clients = MockClients::new().with(MockPlatform::failing(
            Platform::LinkedIn,
            PlatformError::Authentication("token revoked".to_string()),
        ));
        let scheduler = scheduler(&fx, clients, StaticGenerator::new());
        let mut events = scheduler.events().subscribe();

        let outcomes = scheduler.publish_due_posts(at(1, 10, 0)).await.unwrap();
        assert!(!outcomes[0].success);

        let state = fx.store.load().await.unwrap();
        let stored = state.find_post(&id).unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored.error.as_deref().unwrap().contains("token revoked"));
        assert!(stored.platform_post_id.is_none());

        assert!(matches!(events.recv().await.unwrap(), Event::PostFailed { .. }));
    }

    #[tokio::test]
    async fn test_run_publishes_and_stops() {
        let fx = fixture(&[Platform::GitHub]).await;
        let post = Post::scheduled("gist".to_string(), Platform::GitHub, Utc::now());
        let id = post.id.clone();
        fx.store
            .update(move |state| {
                state.posts.push(post);
                Ok(())
            })
            .await
            .unwrap();

        let github = MockPlatform::success(Platform::GitHub);
        let mut scheduler = scheduler(&fx, MockClients::new().with(github.clone()), StaticGenerator::new());
        scheduler.options.poll_interval = Duration::from_millis(20);
        let handle = scheduler.spawn();

        for _ in 0..100 {
            if github.publish_call_count() > 0 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        handle.stop().await.unwrap();

        let state = fx.store.load().await.unwrap();
        assert_eq!(state.find_post(&id).unwrap().status, PostStatus::Published);
        assert!(state.last_scheduled_date.is_some());
    }

    #[tokio::test]
    async fn test_run_returns_when_sender_dropped() {
        let fx = fixture(&[]).await;
        let scheduler = scheduler(&fx, MockClients::new(), StaticGenerator::new());
        let (stop, shutdown) = watch::channel(false);
        drop(stop);
        tokio::time::timeout(Duration::from_secs(5), scheduler.run(shutdown))
            .await
            .unwrap()
            .unwrap();
    }
}
