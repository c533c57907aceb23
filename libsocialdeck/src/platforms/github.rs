//! GitHub gists
//!
//! Each post becomes a gist holding one Markdown file; the gist id is the
//! platform post id.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::http;
use super::PlatformClient;
use crate::config::PlatformConfig;
use crate::credentials::CredentialManager;
use crate::error::Result;
use crate::types::{Platform, Post};

const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Longest gist description taken from the first line of a post
const DESCRIPTION_LIMIT: usize = 100;

pub struct GitHubClient {
    http: Client,
    base_url: String,
    access_token: Option<SecretString>,
    public: bool,
}

impl GitHubClient {
    pub fn new(access_token: Option<SecretString>, public: bool, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, DEFAULT_BASE_URL),
            access_token,
            public,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::GitHub, "access_token")?;
        Self::new(token, settings.public, settings.api_base.as_deref())
    }

    fn gist_body(&self, post: &Post) -> Value {
        let description: String = post
            .content
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches('#')
            .trim()
            .chars()
            .take(DESCRIPTION_LIMIT)
            .collect();
        let file_name = format!("socialdeck-{}.md", post.id);

        json!({
            "description": description,
            "public": self.public,
            "files": { file_name: { "content": post.content } },
        })
    }
}

#[async_trait]
impl PlatformClient for GitHubClient {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .access_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::GitHub, "an access token"))?;

        let request = self
            .http
            .post(format!("{}/gists", self.base_url))
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&self.gist_body(post));

        let body = http::send_json(Platform::GitHub, request).await?;
        if let Some(url) = body.get("html_url").and_then(|v| v.as_str()) {
            tracing::info!("Created gist {}", url);
        }
        http::id_at(Platform::GitHub, &body, "/id")
    }
}
