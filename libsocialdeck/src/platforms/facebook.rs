//! Facebook Page posts through the Graph API

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

pub(crate) const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookClient {
    http: Client,
    base_url: String,
    page_token: Option<SecretString>,
    page_id: Option<String>,
}

impl FacebookClient {
    pub fn new(
        page_token: Option<SecretString>,
        page_id: Option<String>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, GRAPH_BASE_URL),
            page_token,
            page_id,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::Facebook, "page_access_token")?;
        Self::new(token, settings.page_id.clone(), settings.api_base.as_deref())
    }
}

#[async_trait]
impl PlatformClient for FacebookClient {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn is_configured(&self) -> bool {
        self.page_token.is_some() && self.page_id.is_some()
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .page_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::Facebook, "a page access token"))?;
        let page_id = self
            .page_id
            .as_deref()
            .ok_or_else(|| http::not_configured(Platform::Facebook, "platforms.facebook.page_id"))?;

        let mut body = json!({ "message": post.content });
        if let Some(link) = &post.source_url {
            body["link"] = json!(link);
        }

        let request = self
            .http
            .post(format!("{}/{}/feed", self.base_url, page_id))
            .bearer_auth(token.expose_secret())
            .json(&body);

        let body = http::send_json(Platform::Facebook, request).await?;
        // "{page_id}_{post_id}"
        http::id_at(Platform::Facebook, &body, "/id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeckError, PlatformError};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_publish_to_page_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1234567890/feed"))
            .and(body_json(json!({
                "message": "Weekend sale!",
                "link": "https://shop.example.com"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "1234567890_987654321"})),
            )
            .mount(&server)
            .await;

        let client = FacebookClient::new(
            Some(SecretString::from("page-token".to_string())),
            Some("1234567890".to_string()),
            Some(&server.uri()),
        )
        .unwrap();

        let mut post = Post::new("Weekend sale!".to_string(), Platform::Facebook, chrono::Utc::now());
        post.source_url = Some("https://shop.example.com".to_string());
        assert_eq!(client.publish(&post).await.unwrap(), "1234567890_987654321");
    }

    #[tokio::test]
    async fn test_graph_error_maps_to_validation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1234567890/feed"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "(#100) Invalid parameter", "type": "OAuthException", "code": 100}
            })))
            .mount(&server)
            .await;

        let client = FacebookClient::new(
            Some(SecretString::from("page-token".to_string())),
            Some("1234567890".to_string()),
            Some(&server.uri()),
        )
        .unwrap();

        let post = Post::new("x".to_string(), Platform::Facebook, chrono::Utc::now());
        let err = client.publish(&post).await.unwrap_err();
        assert!(matches!(err, DeckError::Platform(PlatformError::Validation(_))));
        assert!(err.to_string().contains("Invalid parameter"));
    }
}
