//! HTTP plumbing shared by the REST clients

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::SecretString;
use serde_json::Value;

use crate::credentials::{service_name, CredentialManager};
use crate::error::{PlatformError, Result};
use crate::types::Platform;

const USER_AGENT: &str = concat!("socialdeck/", env!("CARGO_PKG_VERSION"));

/// Longest vendor error body echoed into an error message
const MAX_ERROR_BODY: usize = 300;

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PlatformError::Network(format!("failed to build HTTP client: {}", e)).into())
}

/// Base URL without a trailing slash, falling back to `default`
pub(crate) fn base_url(configured: Option<&str>, default: &str) -> String {
    configured
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Look up a platform secret; absence leaves the client unconfigured
pub(crate) fn secret(
    credentials: &CredentialManager,
    platform: Platform,
    key: &str,
) -> Result<Option<SecretString>> {
    Ok(credentials
        .retrieve_optional(&service_name(platform), key)?
        .map(SecretString::from))
}

pub(crate) fn not_configured(platform: Platform, missing: &str) -> PlatformError {
    PlatformError::NotConfigured(format!("{} requires {}", platform, missing))
}

/// Map a non-success status onto the shared error taxonomy
pub fn error_for_status(platform: Platform, status: StatusCode, body: &str) -> PlatformError {
    let detail: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("{} returned {}: {}", platform, status.as_u16(), detail.trim());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PlatformError::Validation(message)
        }
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(message),
        _ => PlatformError::Posting(message),
    }
}

/// Send a request and fail on transport errors or non-2xx status
pub(crate) async fn send(platform: Platform, request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(|e| {
        PlatformError::Network(format!("request to {} failed: {}", platform, e))
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!("{} error response ({}): {}", platform, status, body);
    Err(error_for_status(platform, status, &body).into())
}

/// Send and decode the JSON body
pub(crate) async fn send_json(platform: Platform, request: RequestBuilder) -> Result<Value> {
    let response = send(platform, request).await?;
    response.json().await.map_err(|e| {
        PlatformError::Posting(format!("unreadable response from {}: {}", platform, e)).into()
    })
}

/// Extract an id at a JSON pointer; vendors return both strings and numbers
pub(crate) fn id_at(platform: Platform, body: &Value, pointer: &str) -> Result<String> {
    match body.pointer(pointer) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(PlatformError::Posting(format!(
            "{} response is missing {}: {}",
            platform, pointer, body
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;
    use serde_json::json;

    #[test]
    fn test_error_for_status_mapping() {
        let p = Platform::Twitter;
        assert!(matches!(
            error_for_status(p, StatusCode::UNAUTHORIZED, ""),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            error_for_status(p, StatusCode::FORBIDDEN, ""),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            error_for_status(p, StatusCode::BAD_REQUEST, ""),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            error_for_status(p, StatusCode::UNPROCESSABLE_ENTITY, ""),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            error_for_status(p, StatusCode::TOO_MANY_REQUESTS, ""),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            error_for_status(p, StatusCode::INTERNAL_SERVER_ERROR, ""),
            PlatformError::Posting(_)
        ));
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "x".repeat(5000);
        let err = error_for_status(Platform::GitHub, StatusCode::BAD_GATEWAY, &body);
        assert!(err.to_string().len() < 400);
        assert!(err.to_string().contains("github returned 502"));
    }

    #[test]
    fn test_id_at_accepts_strings_and_numbers() {
        let body = json!({"data": {"id": "1445880548472328192"}, "result": {"message_id": 42}});
        assert_eq!(
            id_at(Platform::Twitter, &body, "/data/id").unwrap(),
            "1445880548472328192"
        );
        assert_eq!(
            id_at(Platform::Telegram, &body, "/result/message_id").unwrap(),
            "42"
        );
        assert!(matches!(
            id_at(Platform::Telegram, &body, "/missing"),
            Err(DeckError::Platform(PlatformError::Posting(_)))
        ));
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        assert_eq!(
            base_url(Some("http://localhost:1234/"), "https://api.github.com"),
            "http://localhost:1234"
        );
        assert_eq!(base_url(None, "https://api.github.com"), "https://api.github.com");
    }
}
