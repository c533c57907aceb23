//! Queue statistics

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{AppState, Platform, PostStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub draft: usize,
    pub scheduled: usize,
    pub published: usize,
    pub failed: usize,
}

impl StatusCounts {
    fn add(&mut self, status: PostStatus) {
        match status {
            PostStatus::Draft => self.draft += 1,
            PostStatus::Scheduled => self.scheduled += 1,
            PostStatus::Published => self.published += 1,
            PostStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.draft + self.scheduled + self.published + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextPost {
    pub post_id: String,
    pub platform: Platform,
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub total: StatusCounts,
    pub by_platform: BTreeMap<Platform, StatusCounts>,
    pub ai_generated: usize,
    pub next_scheduled: Option<NextPost>,
}

impl QueueStats {
    pub fn from_state(state: &AppState) -> Self {
        let mut stats = QueueStats::default();
        for post in &state.posts {
            stats.total.add(post.status);
            stats.by_platform.entry(post.platform).or_default().add(post.status);
            if post.ai_generated {
                stats.ai_generated += 1;
            }
        }

        stats.next_scheduled = state.scheduled_posts().first().map(|post| NextPost {
            post_id: post.id.clone(),
            platform: post.platform,
            scheduled_time: post.scheduled_time,
        });
        stats
    }

    /// Share of finished posts that were published, in percent
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.total.published + self.total.failed;
        (finished > 0).then(|| self.total.published as f64 * 100.0 / finished as f64)
    }
}
