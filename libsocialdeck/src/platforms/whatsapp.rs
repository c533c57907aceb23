//! WhatsApp Business Cloud API text messages

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::facebook::GRAPH_BASE_URL;
use super::http;
use super::PlatformClient;
use crate::config::PlatformConfig;
use crate::credentials::CredentialManager;
use crate::error::Result;
use crate::types::{Platform, Post};

pub struct WhatsAppClient {
    http: Client,
    base_url: String,
    access_token: Option<SecretString>,
    phone_number_id: Option<String>,
    recipient: Option<String>,
}

impl WhatsAppClient {
    pub fn new(
        access_token: Option<SecretString>,
        phone_number_id: Option<String>,
        recipient: Option<String>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, GRAPH_BASE_URL),
            access_token,
            phone_number_id,
            recipient,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::WhatsApp, "access_token")?;
        Self::new(
            token,
            settings.phone_number_id.clone(),
            settings.recipient.clone(),
            settings.api_base.as_deref(),
        )
    }
}

#[async_trait]
impl PlatformClient for WhatsAppClient {
    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.phone_number_id.is_some() && self.recipient.is_some()
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .access_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::WhatsApp, "an access token"))?;
        let phone_number_id = self.phone_number_id.as_deref().ok_or_else(|| {
            http::not_configured(Platform::WhatsApp, "platforms.whatsapp.phone_number_id")
        })?;
        let recipient = self.recipient.as_deref().ok_or_else(|| {
            http::not_configured(Platform::WhatsApp, "platforms.whatsapp.recipient")
        })?;

        let request = self
            .http
            .post(format!("{}/{}/messages", self.base_url, phone_number_id))
            .bearer_auth(token.expose_secret())
            .json(&json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": recipient,
                "type": "text",
                "text": { "preview_url": post.source_url.is_some(), "body": post.content },
            }));

        let body = http::send_json(Platform::WhatsApp, request).await?;
        http::id_at(Platform::WhatsApp, &body, "/messages/0/id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_text_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/106540352242922/messages"))
            .and(header("authorization", "Bearer wa-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "+15551234567",
                "text": {"body": "Order shipped"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "contacts": [{"input": "+15551234567", "wa_id": "15551234567"}],
                "messages": [{"id": "wamid.HBgLMTU1NTEyMzQ1NjcVAgARGBI"}]
            })))
            .mount(&server)
            .await;

        let client = WhatsAppClient::new(
            Some(SecretString::from("wa-token".to_string())),
            Some("106540352242922".to_string()),
            Some("+15551234567".to_string()),
            Some(&server.uri()),
        )
        .unwrap();
        let post = Post::new("Order shipped".to_string(), Platform::WhatsApp, chrono::Utc::now());
        assert_eq!(
            client.publish(&post).await.unwrap(),
            "wamid.HBgLMTU1NTEyMzQ1NjcVAgARGBI"
        );
    }

    #[test]
    fn test_requires_recipient() {
        let client = WhatsAppClient::new(
            Some(SecretString::from("wa-token".to_string())),
            Some("106540352242922".to_string()),
            None,
            None,
        )
        .unwrap();
        assert!(!client.is_configured());
    }
}
