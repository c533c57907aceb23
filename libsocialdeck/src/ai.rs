//! AI content generation
//!
//! Posts are written by any OpenAI-compatible chat-completion endpoint. The
//! prompt carries the platform's tone and length limit, a topic, and
//! optionally the feed article a post should summarize.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{AiConfig, Config};
use crate::credentials::{CredentialManager, AI_SERVICE};
use crate::error::{AiError, Result};
use crate::types::Platform;

/// Article a post is based on
#[derive(Debug, Clone, PartialEq)]
pub struct SourceArticle {
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub platform: Platform,
    pub topic: String,
    pub source: Option<SourceArticle>,
    /// Extra steer, e.g. a campaign phase ("teaser")
    pub context: Option<String>,
}

impl GenerationRequest {
    pub fn new(platform: Platform, topic: impl Into<String>) -> Self {
        Self {
            platform,
            topic: topic.into(),
            source: None,
            context: None,
        }
    }

    pub fn with_source(mut self, source: SourceArticle) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

fn platform_voice(platform: Platform) -> &'static str {
    match platform {
        Platform::Twitter => "punchy and conversational, one or two hashtags at most",
        Platform::LinkedIn => "professional and insightful, short paragraphs",
        Platform::Facebook => "friendly and engaging, invite comments",
        Platform::Instagram => "visual and upbeat, suited to an image caption, a few hashtags",
        Platform::YouTube => "enthusiastic community update for subscribers",
        Platform::Telegram => "concise channel announcement",
        Platform::WhatsApp => "personal and brief, like a message to a customer",
        Platform::GitHub => "technical Markdown with a heading, suited to developers",
    }
}

/// System and user messages for a request
pub fn build_prompt(request: &GenerationRequest) -> (String, String) {
    let limit = match request.platform.character_limit() {
        Some(limit) => format!("Stay under {} characters.", limit),
        None => "Keep it reasonably short.".to_string(),
    };
    let system = format!(
        "You write social media posts for {}. Style: {}. {} Reply with the post text only, without quotes or commentary.",
        request.platform,
        platform_voice(request.platform),
        limit
    );

    let mut user = format!("Write a {} post about: {}.", request.platform, request.topic);
    if let Some(context) = &request.context {
        user.push_str(&format!(" Context: {}.", context));
    }
    if let Some(source) = &request.source {
        user.push_str(&format!(
            "\n\nBase it on this article and include the link.\nTitle: {}\nLink: {}",
            source.title, source.link
        ));
        if let Some(summary) = &source.summary {
            user.push_str(&format!("\nSummary: {}", summary));
        }
    }
    (system, user)
}

/// Trim whitespace and wrapping quotes, then cut to `limit` characters
pub fn clean_generated(raw: &str, limit: Option<usize>) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim();

    match limit {
        Some(limit) if unquoted.chars().count() > limit => {
            let cut: String = unquoted.chars().take(limit.saturating_sub(1)).collect();
            format!("{}…", cut.trim_end())
        }
        _ => unquoted.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Client for `{base_url}/chat/completions`
#[derive(Debug)]
pub struct ChatCompletionClient {
    http: Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionClient {
    pub fn new(api_key: SecretString, config: &AiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("socialdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// API key from `SOCIALDECK_AI_API_KEY` or the `socialdeck.ai` credential
    pub fn from_config(config: &AiConfig, credentials: &CredentialManager) -> Result<Self> {
        let key = credentials.retrieve(AI_SERVICE, "api_key")?;
        Self::new(SecretString::from(key), config)
    }

    async fn complete(&self, system: &str, user: &str) -> std::result::Result<String, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        match res.status() {
            s if s.is_success() => {
                let body: ChatResponse = res
                    .json()
                    .await
                    .map_err(|e| AiError::Serde(e.to_string()))?;
                body.choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .filter(|content| !content.trim().is_empty())
                    .ok_or(AiError::EmptyResponse)
            }
            StatusCode::UNAUTHORIZED => Err(AiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(AiError::RateLimited),
            s => Err(AiError::Http {
                status: s.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let (system, user) = build_prompt(request);
        let raw = self.complete(&system, &user).await?;
        Ok(clean_generated(&raw, request.platform.character_limit()))
    }
}

/// Canned content, used in mock mode and tests
#[derive(Debug, Clone, Default)]
pub struct StaticGenerator {
    failing: Vec<Platform>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl StaticGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request for `platform`
    pub fn failing_for(mut self, platform: Platform) -> Self {
        self.failing.push(platform);
        self
    }

    /// Every request seen so far, failed ones included
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ContentGenerator for StaticGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if self.failing.contains(&request.platform) {
            return Err(AiError::Http {
                status: 503,
                body: "generator unavailable".to_string(),
            }
            .into());
        }

        let text = match &request.source {
            Some(source) => format!("{}: {}", source.title, source.link),
            None => format!("Fresh thoughts on {} for our {} audience.", request.topic, request.platform),
        };
        Ok(clean_generated(&text, request.platform.character_limit()))
    }
}

/// The generator the tools should use under `config`
pub fn create_generator(
    config: &Config,
    credentials: &CredentialManager,
) -> Result<Arc<dyn ContentGenerator>> {
    if config.mock_mode {
        return Ok(Arc::new(StaticGenerator::new()));
    }
    Ok(Arc::new(ChatCompletionClient::from_config(
        &config.ai,
        credentials,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatCompletionClient {
        let config = AiConfig {
            base_url: format!("{}/v1", server.uri()),
            ..AiConfig::default()
        };
        ChatCompletionClient::new(SecretString::from("sk-test".to_string()), &config).unwrap()
    }

    #[test]
    fn test_prompt_mentions_limit_and_source() {
        let request = GenerationRequest::new(Platform::Twitter, "rust async").with_source(
            SourceArticle {
                title: "Tokio 2.0".to_string(),
                link: "https://tokio.rs/blog".to_string(),
                summary: Some("A new release".to_string()),
            },
        );
        let (system, user) = build_prompt(&request);
        assert!(system.contains("280 characters"));
        assert!(user.contains("rust async"));
        assert!(user.contains("https://tokio.rs/blog"));
        assert!(user.contains("A new release"));

        let (system, _) = build_prompt(&GenerationRequest::new(Platform::GitHub, "release"));
        assert!(system.contains("reasonably short"));
    }

    #[test]
    fn test_clean_generated() {
        assert_eq!(clean_generated("  \"Hello world\"\n", Some(280)), "Hello world");
        let cut = clean_generated(&"word ".repeat(100), Some(50));
        assert_eq!(cut.chars().count(), 50);
        assert!(cut.ends_with('…'));
        assert_eq!(clean_generated("no limit", None), "no limit");
    }

    #[tokio::test]
    async fn test_generate_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 400})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "  Ship it! #rust \n"}}]
            })))
            .mount(&server)
            .await;

        let text = client(&server)
            .generate(&GenerationRequest::new(Platform::Twitter, "shipping"))
            .await
            .unwrap();
        assert_eq!(text, "Ship it! #rust");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate(&GenerationRequest::new(Platform::Twitter, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::Ai(AiError::InvalidApiKey)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_and_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = client(&server);
        let request = GenerationRequest::new(Platform::LinkedIn, "x");
        assert!(matches!(
            client.generate(&request).await,
            Err(DeckError::Ai(AiError::RateLimited))
        ));
        assert!(matches!(
            client.generate(&request).await,
            Err(DeckError::Ai(AiError::EmptyResponse))
        ));
    }

    #[tokio::test]
    async fn test_static_generator() {
        let generator = StaticGenerator::new().failing_for(Platform::WhatsApp);

        let text = generator
            .generate(&GenerationRequest::new(Platform::Telegram, "launch day"))
            .await
            .unwrap();
        assert!(text.contains("launch day"));

        assert!(generator
            .generate(&GenerationRequest::new(Platform::WhatsApp, "launch day"))
            .await
            .is_err());
        assert_eq!(generator.requests().len(), 2);
    }

    #[test]
    fn test_mock_mode_needs_no_key() {
        let mut config = Config::default_config();
        config.mock_mode = true;
        assert!(create_generator(&config, &CredentialManager::in_memory()).is_ok());
    }
}
