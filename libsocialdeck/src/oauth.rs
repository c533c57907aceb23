//! OAuth 2.0 authorization-code flows for LinkedIn and Twitter
//!
//! `initiate` builds the vendor authorize URL and remembers the state nonce
//! (and, for Twitter, the PKCE verifier) in the credential store. `callback`
//! checks the returned state, exchanges the code for tokens, stores them
//! under the platform's credential service, and marks the platform
//! connected.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::{Config, OAuthClientConfig};
use crate::credentials::{primary_credential_key, service_name, CredentialManager};
use crate::error::{OAuthError, Result};
use crate::store::Store;
use crate::types::Platform;

/// Credential service holding in-flight authorizations
pub const OAUTH_SERVICE: &str = "socialdeck.oauth";

const LINKEDIN_AUTHORIZE_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const TWITTER_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
const TWITTER_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";

fn default_scopes(platform: Platform) -> Vec<String> {
    let scopes: &[&str] = match platform {
        Platform::LinkedIn => &["openid", "profile", "w_member_social"],
        Platform::Twitter => &["tweet.read", "tweet.write", "users.read", "offline.access"],
        _ => &[],
    };
    scopes.iter().map(|s| s.to_string()).collect()
}

/// Whether `platform` has an authorization-code flow here
pub fn supports_oauth(platform: Platform) -> bool {
    matches!(platform, Platform::LinkedIn | Platform::Twitter)
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Random URL-safe nonce for the `state` parameter
pub fn generate_state() -> String {
    random_token(24)
}

/// PKCE code verifier (43 characters from 32 random bytes)
pub fn generate_code_verifier() -> String {
    random_token(32)
}

/// S256 code challenge for `verifier`
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn verify_state(expected: &str, received: &str) -> Result<()> {
    if expected.is_empty() || expected != received {
        return Err(OAuthError::StateMismatch.into());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// One registered OAuth application
pub struct OAuthProvider {
    platform: Platform,
    client_id: String,
    client_secret: Option<SecretString>,
    redirect_uri: String,
    scopes: Vec<String>,
    authorize_url: String,
    token_url: String,
    http: Client,
}

impl OAuthProvider {
    pub fn new(
        platform: Platform,
        client: &OAuthClientConfig,
        client_secret: Option<SecretString>,
    ) -> Result<Self> {
        let (authorize_default, token_default) = match platform {
            Platform::LinkedIn => (LINKEDIN_AUTHORIZE_URL, LINKEDIN_TOKEN_URL),
            Platform::Twitter => (TWITTER_AUTHORIZE_URL, TWITTER_TOKEN_URL),
            other => return Err(OAuthError::UnsupportedPlatform(other.to_string()).into()),
        };
        if client.client_id.trim().is_empty() || client.redirect_uri.trim().is_empty() {
            return Err(OAuthError::NotConfigured(platform.to_string()).into());
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("socialdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        Ok(Self {
            platform,
            client_id: client.client_id.clone(),
            client_secret,
            redirect_uri: client.redirect_uri.clone(),
            scopes: if client.scopes.is_empty() {
                default_scopes(platform)
            } else {
                client.scopes.clone()
            },
            authorize_url: client
                .authorize_url
                .clone()
                .unwrap_or_else(|| authorize_default.to_string()),
            token_url: client
                .token_url
                .clone()
                .unwrap_or_else(|| token_default.to_string()),
            http,
        })
    }

    /// Provider from `[oauth.<platform>]` plus the `client_secret` credential
    pub fn from_config(
        platform: Platform,
        config: &Config,
        credentials: &CredentialManager,
    ) -> Result<Self> {
        if !supports_oauth(platform) {
            return Err(OAuthError::UnsupportedPlatform(platform.to_string()).into());
        }
        let client = config
            .oauth
            .client(platform)
            .ok_or_else(|| OAuthError::NotConfigured(platform.to_string()))?;
        let secret = credentials
            .retrieve_optional(&service_name(platform), "client_secret")?
            .map(SecretString::from);
        Self::new(platform, client, secret)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Twitter requires PKCE; LinkedIn uses a confidential client
    pub fn uses_pkce(&self) -> bool {
        self.platform == Platform::Twitter
    }

    pub fn authorization_url(&self, state: &str, code_verifier: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.authorize_url).map_err(OAuthError::from)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", state);
            if let Some(verifier) = code_verifier {
                query
                    .append_pair("code_challenge", &code_challenge(verifier))
                    .append_pair("code_challenge_method", "S256");
            }
        }
        Ok(url)
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        let mut request = self.http.post(&self.token_url);
        match (self.platform, &self.client_secret) {
            (Platform::Twitter, Some(secret)) => {
                request = request.basic_auth(&self.client_id, Some(secret.expose_secret()));
            }
            (Platform::Twitter, None) => {}
            (_, Some(secret)) => form.push(("client_secret", secret.expose_secret())),
            (_, None) => return Err(OAuthError::NotConfigured(self.platform.to_string()).into()),
        }

        let res = request
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(OAuthError::TokenExchange {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let tokens: TokenResponse =
            serde_json::from_str(&body).map_err(|e| OAuthError::TokenExchange {
                status: status.as_u16(),
                body: format!("unreadable token response: {}", e),
            })?;
        Ok(tokens)
    }
}

fn state_key(platform: Platform) -> String {
    format!("{}_state", platform)
}

fn verifier_key(platform: Platform) -> String {
    format!("{}_verifier", platform)
}

/// Start an authorization: remember state (and verifier) and return the
/// URL the user must open
pub fn initiate(provider: &OAuthProvider, credentials: &CredentialManager) -> Result<Url> {
    let platform = provider.platform();
    let state = generate_state();
    credentials.store(OAUTH_SERVICE, &state_key(platform), &state)?;

    let verifier = if provider.uses_pkce() {
        let verifier = generate_code_verifier();
        credentials.store(OAUTH_SERVICE, &verifier_key(platform), &verifier)?;
        Some(verifier)
    } else {
        None
    };

    tracing::info!("Started {} authorization", platform);
    provider.authorization_url(&state, verifier.as_deref())
}

/// Finish an authorization started by [`initiate`]
pub async fn callback(
    provider: &OAuthProvider,
    credentials: &CredentialManager,
    store: &Store,
    code: &str,
    state: &str,
) -> Result<TokenResponse> {
    let platform = provider.platform();
    let pending = credentials
        .retrieve_optional(OAUTH_SERVICE, &state_key(platform))?
        .ok_or_else(|| OAuthError::NoPendingAuthorization(platform.to_string()))?;
    verify_state(&pending, state)?;

    let verifier = if provider.uses_pkce() {
        Some(
            credentials
                .retrieve_optional(OAUTH_SERVICE, &verifier_key(platform))?
                .ok_or_else(|| OAuthError::NoPendingAuthorization(platform.to_string()))?,
        )
    } else {
        None
    };

    let tokens = provider.exchange_code(code, verifier.as_deref()).await?;
    store_tokens(credentials, platform, &tokens, Utc::now())?;

    credentials.delete(OAUTH_SERVICE, &state_key(platform))?;
    credentials.delete(OAUTH_SERVICE, &verifier_key(platform))?;

    store
        .update(move |state| {
            state.platform_settings_mut(platform).connected = true;
            Ok(())
        })
        .await?;

    tracing::info!("Connected {}", platform);
    Ok(tokens)
}

/// Save tokens under the platform's credential service
pub fn store_tokens(
    credentials: &CredentialManager,
    platform: Platform,
    tokens: &TokenResponse,
    now: DateTime<Utc>,
) -> Result<()> {
    let service = service_name(platform);
    credentials.store(&service, "access_token", &tokens.access_token)?;
    if let Some(refresh) = &tokens.refresh_token {
        credentials.store(&service, "refresh_token", refresh)?;
    }
    if let Some(seconds) = tokens.expires_in {
        let expires_at = i64::try_from(seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        match expires_at {
            Some(at) => credentials.store(&service, "token_expires_at", &at.to_rfc3339())?,
            None => tracing::warn!("Ignoring out-of-range token lifetime for {}: {}s", platform, seconds),
        }
    }
    Ok(())
}

/// What is known about a platform's stored token
///
/// `has_token` looks at the key the platform client publishes with, so it
/// also covers bot and page tokens stored by hand.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub platform: Platform,
    pub has_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub pending_authorization: bool,
}

impl TokenStatus {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub fn token_status(credentials: &CredentialManager, platform: Platform) -> Result<TokenStatus> {
    let service = service_name(platform);
    let expires_at = credentials
        .retrieve_optional(&service, "token_expires_at")?
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|at| at.with_timezone(&Utc));

    Ok(TokenStatus {
        platform,
        has_token: credentials.exists(&service, primary_credential_key(platform))?,
        expires_at,
        pending_authorization: credentials.exists(OAUTH_SERVICE, &state_key(platform))?,
    })
}
