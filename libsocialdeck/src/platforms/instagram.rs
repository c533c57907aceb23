//! Instagram business accounts through the Graph API
//!
//! Publishing is two calls: create a media container from a public image
//! URL, then publish the container. Text-only posts are not possible.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::facebook::GRAPH_BASE_URL;
use super::http;
use super::{validate_length, PlatformClient};
use crate::config::PlatformConfig;
use crate::credentials::CredentialManager;
use crate::error::{PlatformError, Result};
use crate::types::{Platform, Post};

pub struct InstagramClient {
    http: Client,
    base_url: String,
    access_token: Option<SecretString>,
    ig_user_id: Option<String>,
}

impl InstagramClient {
    pub fn new(
        access_token: Option<SecretString>,
        ig_user_id: Option<String>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, GRAPH_BASE_URL),
            access_token,
            ig_user_id,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::Instagram, "access_token")?;
        Self::new(token, settings.ig_user_id.clone(), settings.api_base.as_deref())
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.ig_user_id.is_some()
    }

    fn validate(&self, post: &Post) -> Result<()> {
        validate_length(&post.content, self.character_limit())?;
        if post.image_url.is_none() {
            return Err(PlatformError::Validation(
                "Instagram posts require an image URL".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .access_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::Instagram, "an access token"))?;
        let user_id = self.ig_user_id.as_deref().ok_or_else(|| {
            http::not_configured(Platform::Instagram, "platforms.instagram.ig_user_id")
        })?;
        let image_url = post.image_url.as_deref().ok_or_else(|| {
            PlatformError::Validation("Instagram posts require an image URL".to_string())
        })?;

        let container = self
            .http
            .post(format!("{}/{}/media", self.base_url, user_id))
            .bearer_auth(token.expose_secret())
            .json(&json!({ "image_url": image_url, "caption": post.content }));
        let body = http::send_json(Platform::Instagram, container).await?;
        let creation_id = http::id_at(Platform::Instagram, &body, "/id")?;
        tracing::debug!("Created Instagram media container {}", creation_id);

        let publish = self
            .http
            .post(format!("{}/{}/media_publish", self.base_url, user_id))
            .bearer_auth(token.expose_secret())
            .json(&json!({ "creation_id": creation_id }));
        let body = http::send_json(Platform::Instagram, publish).await?;
        http::id_at(Platform::Instagram, &body, "/id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_with_image() -> Post {
        let mut post = Post::new("New drop".to_string(), Platform::Instagram, chrono::Utc::now());
        post.image_url = Some("https://cdn.example.com/drop.jpg".to_string());
        post
    }

    #[tokio::test]
    async fn test_publish_creates_then_publishes_container() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .and(body_json(json!({
                "image_url": "https://cdn.example.com/drop.jpg",
                "caption": "New drop"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "container-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .and(body_json(json!({"creation_id": "container-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "media-99"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = InstagramClient::new(
            Some(SecretString::from("ig-token".to_string())),
            Some("17841400000000000".to_string()),
            Some(&server.uri()),
        )
        .unwrap();
        assert_eq!(client.publish(&post_with_image()).await.unwrap(), "media-99");
    }

    #[test]
    fn test_validate_requires_image() {
        let client = InstagramClient::new(None, None, None).unwrap();
        let post = Post::new("caption only".to_string(), Platform::Instagram, chrono::Utc::now());
        assert!(matches!(
            client.validate(&post),
            Err(DeckError::Platform(PlatformError::Validation(_)))
        ));
        assert!(client.validate(&post_with_image()).is_ok());
    }
}
