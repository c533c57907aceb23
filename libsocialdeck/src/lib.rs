//! SocialDeck - schedule and publish posts across social platforms
//!
//! This library provides the core of the SocialDeck tools: the post data
//! model, the persisted application state, platform clients, AI content
//! generation, campaign planning, RSS ingestion, OAuth flows, and the
//! scheduler that ties them together.

pub mod ai;
pub mod campaigns;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod hashtags;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod poster;
pub mod rss;
pub mod scheduler;
pub mod scheduling;
pub mod stats;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialConfig, CredentialManager, StorageBackend};
pub use error::{DeckError, Result};
pub use store::Store;
pub use types::{AppState, Platform, Post, PostStatus};
