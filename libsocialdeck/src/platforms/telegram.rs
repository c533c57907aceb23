//! Telegram channels and groups through the Bot API

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::http;
use super::PlatformClient;
use crate::config::PlatformConfig;
use crate::credentials::CredentialManager;
use crate::error::{PlatformError, Result};
use crate::types::{Platform, Post};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

pub struct TelegramClient {
    http: Client,
    base_url: String,
    bot_token: Option<SecretString>,
    /// Numeric id or "@channelname"
    chat_id: Option<String>,
}

impl TelegramClient {
    pub fn new(
        bot_token: Option<SecretString>,
        chat_id: Option<String>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            http: http::build_client()?,
            base_url: http::base_url(base_url, DEFAULT_BASE_URL),
            bot_token,
            chat_id,
        })
    }

    pub fn from_config(settings: &PlatformConfig, credentials: &CredentialManager) -> Result<Self> {
        let token = http::secret(credentials, Platform::Telegram, "bot_token")?;
        Self::new(token, settings.chat_id.clone(), settings.api_base.as_deref())
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn publish(&self, post: &Post) -> Result<String> {
        let token = self
            .bot_token
            .as_ref()
            .ok_or_else(|| http::not_configured(Platform::Telegram, "a bot token"))?;
        let chat_id = self
            .chat_id
            .as_deref()
            .ok_or_else(|| http::not_configured(Platform::Telegram, "platforms.telegram.chat_id"))?;

        // The token is part of the path, so it must never reach a log line
        let request = self
            .http
            .post(format!(
                "{}/bot{}/sendMessage",
                self.base_url,
                token.expose_secret()
            ))
            .json(&json!({ "chat_id": chat_id, "text": post.content }));

        let body = http::send_json(Platform::Telegram, request).await?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = body
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(PlatformError::Posting(format!("telegram: {}", description)).into());
        }
        http::id_at(Platform::Telegram, &body, "/result/message_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(
            Some(SecretString::from("123:abc".to_string())),
            Some("@deckchannel".to_string()),
            Some(&server.uri()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({"chat_id": "@deckchannel", "text": "Hello channel"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 815, "chat": {"id": -1001}}
            })))
            .mount(&server)
            .await;

        let post = Post::new("Hello channel".to_string(), Platform::Telegram, chrono::Utc::now());
        assert_eq!(client(&server).publish(&post).await.unwrap(), "815");
    }

    #[tokio::test]
    async fn test_ok_false_is_posting_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let post = Post::new("Hello".to_string(), Platform::Telegram, chrono::Utc::now());
        let err = client(&server).publish(&post).await.unwrap_err();
        assert!(matches!(err, DeckError::Platform(PlatformError::Posting(_))));
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_unauthorized_bot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let post = Post::new("Hello".to_string(), Platform::Telegram, chrono::Utc::now());
        let err = client(&server).publish(&post).await.unwrap_err();
        assert!(matches!(
            err,
            DeckError::Platform(PlatformError::Authentication(_))
        ));
    }
}
