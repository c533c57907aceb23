//! LinkedIn member shares through the UGC Posts API

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

const DEFAULT_BASE_URL: &str = "https://api.linkedin.com";

pub struct LinkedInClient {
    http: Client,
    base_url: String,
    access_token: Option<SecretString>,
    /// "urn:li:person:{id}" or "urn:li:organization:{id}"
    author_urn: Option<String>,
}

impl LinkedInClient {
    pub fn new(
        access_token: Option<SecretString>,
        author_urn: Option<String>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, DEFAULT_BASE_URL),
            access_token,
            author_urn,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::LinkedIn, "access_token")?;
        Self::new(
            token,
            settings.author_urn.clone(),
            settings.api_base.as_deref(),
        )
    }

    fn share_body(author: &str, post: &Post) -> Value {
        let media_category = if post.source_url.is_some() {
            "ARTICLE"
        } else {
            "NONE"
        };
        let mut share = json!({
            "shareCommentary": { "text": post.content },
            "shareMediaCategory": media_category,
        });
        if let Some(url) = &post.source_url {
            share["media"] = json!([{ "status": "READY", "originalUrl": url }]);
        }

        json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
        })
    }
}

#[async_trait]
impl PlatformClient for LinkedInClient {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.author_urn.is_some()
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .access_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::LinkedIn, "an access token"))?;
        let author = self
            .author_urn
            .as_deref()
            .ok_or_else(|| http::not_configured(Platform::LinkedIn, "platforms.linkedin.author_urn"))?;

        let request = self
            .http
            .post(format!("{}/v2/ugcPosts", self.base_url))
            .bearer_auth(token.expose_secret())
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&Self::share_body(author, post));

        let response = http::send(Platform::LinkedIn, request).await?;

        // The share URN comes back in a header; older API versions echo it in the body
        if let Some(id) = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
        {
            return Ok(id.to_string());
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        http::id_at(Platform::LinkedIn, &body, "/id")
    }
}
