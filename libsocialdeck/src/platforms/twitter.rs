//! Twitter / X via the v2 API

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::http;
use super::PlatformClient;
use crate::config::PlatformConfig;
use crate::credentials::CredentialManager;
use crate::error::Result;
use crate::types::{Platform, Post};

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

pub struct TwitterClient {
    http: Client,
    base_url: String,
    /// OAuth 2.0 user-context token with `tweet.write`
    access_token: Option<SecretString>,
}

impl TwitterClient {
    pub fn new(access_token: Option<SecretString>, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, DEFAULT_BASE_URL),
            access_token,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::Twitter, "access_token")?;
        Self::new(token, settings.api_base.as_deref())
    }
}

#[async_trait]
impl PlatformClient for TwitterClient {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .access_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::Twitter, "an access token"))?;

        let request = self
            .http
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(token.expose_secret())
            .json(&json!({ "text": post.content }));

        let body = http::send_json(Platform::Twitter, request).await?;
        let id = http::id_at(Platform::Twitter, &body, "/data/id")?;
        tracing::debug!("Published tweet {}", id);
        Ok(id)
    }
}
