//! Error types for SocialDeck

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeckError>;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DeckError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DeckError::InvalidInput(_) => 3,
            DeckError::Platform(PlatformError::Validation(_)) => 3,
            DeckError::Platform(PlatformError::Authentication(_)) => 2,
            DeckError::Ai(AiError::InvalidApiKey) => 2,
            DeckError::OAuth(OAuthError::StateMismatch) => 2,
            DeckError::Credential(CredentialError::NotFound(_)) => 2,
            DeckError::Platform(_) => 1,
            DeckError::Config(_) => 1,
            DeckError::Store(_) => 1,
            DeckError::Credential(_) => 1,
            DeckError::Ai(_) => 1,
            DeckError::Feed(_) => 1,
            DeckError::OAuth(_) => 1,
        }
    }

    /// Whether retrying the same operation later might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            DeckError::Platform(e) => e.is_transient(),
            DeckError::Ai(AiError::RateLimited) | DeckError::Ai(AiError::Transport(_)) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Stored state is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Platform not configured: {0}")]
    NotConfigured(String),
}

impl PlatformError {
    /// Network issues and rate limits may clear up on their own
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Network(_) | PlatformError::RateLimit(_))
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("OS keyring unavailable: {0}")]
    KeyringUnavailable(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is malformed: {0}")]
    Format(String),

    #[error("No credential storage backend available")]
    NoStoreAvailable,
}

#[derive(Error, Debug, Clone)]
pub enum AiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("rate limited")]
    RateLimited,

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("response contained no content")]
    EmptyResponse,

    #[error("json error: {0}")]
    Serde(String),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP error fetching {url}: {message}")]
    Http { url: String, message: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("malformed feed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid feed URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("OAuth is not supported for {0}")]
    UnsupportedPlatform(String),

    #[error("OAuth client for {0} is not configured (client_id, client_secret, redirect_uri)")]
    NotConfigured(String),

    #[error("state parameter does not match the pending authorization")]
    StateMismatch,

    #[error("no pending authorization for {0}; run initiate first")]
    NoPendingAuthorization(String),

    #[error("token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("network error during token exchange: {0}")]
    Network(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
