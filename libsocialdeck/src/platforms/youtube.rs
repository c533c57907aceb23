//! YouTube channel announcements
//!
//! The Data API has no endpoint for community posts, so an announcement is
//! published as a top-level comment on a configured video of the channel.

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

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

pub struct YouTubeClient {
    http: Client,
    base_url: String,
    access_token: Option<SecretString>,
    video_id: Option<String>,
}

impl YouTubeClient {
    pub fn new(
        access_token: Option<SecretString>,
        video_id: Option<String>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, DEFAULT_BASE_URL),
            access_token,
            video_id,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::YouTube, "access_token")?;
        Self::new(token, settings.video_id.clone(), settings.api_base.as_deref())
    }
}

#[async_trait]
impl PlatformClient for YouTubeClient {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.video_id.is_some()
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .access_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::YouTube, "an access token"))?;
        let video_id = self
            .video_id
            .as_deref()
            .ok_or_else(|| http::not_configured(Platform::YouTube, "platforms.youtube.video_id"))?;

        let request = self
            .http
            .post(format!("{}/youtube/v3/commentThreads", self.base_url))
            .query(&[("part", "snippet")])
            .bearer_auth(token.expose_secret())
            .json(&json!({
                "snippet": {
                    "videoId": video_id,
                    "topLevelComment": {
                        "snippet": { "textOriginal": post.content }
                    }
                }
            }));

        let body = http::send_json(Platform::YouTube, request).await?;
        http::id_at(Platform::YouTube, &body, "/id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_publish_comment_thread() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/youtube/v3/commentThreads"))
            .and(query_param("part", "snippet"))
            .and(body_partial_json(json!({"snippet": {"videoId": "dQw4w9WgXcQ"}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"kind": "youtube#commentThread", "id": "Ugx123"})),
            )
            .mount(&server)
            .await;

        let client = YouTubeClient::new(
            Some(SecretString::from("yt-token".to_string())),
            Some("dQw4w9WgXcQ".to_string()),
            Some(&server.uri()),
        )
        .unwrap();
        let post = Post::new("New video out now".to_string(), Platform::YouTube, chrono::Utc::now());
        assert_eq!(client.publish(&post).await.unwrap(), "Ugx123");
    }

    #[test]
    fn test_requires_video() {
        let client = YouTubeClient::new(Some(SecretString::from("t".to_string())), None, None).unwrap();
        assert!(!client.is_configured());
    }
}
