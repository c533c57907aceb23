//! deck-auth - Connect platforms and manage their credentials
//!
//! Runs the OAuth authorization-code flow for LinkedIn and Twitter and
//! stores tokens and API keys for every other platform.

use std::io::Read;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use libsocialdeck::config::resolve_db_path;
use libsocialdeck::credentials::{credential_keys, service_name, AI_SERVICE};
use libsocialdeck::logging::LoggingConfig;
use libsocialdeck::oauth::{self, supports_oauth, OAuthProvider};
use libsocialdeck::{Config, CredentialManager, DeckError, Platform, Store};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "deck-auth")]
#[command(version)]
#[command(about = "Connect platforms and manage their credentials")]
#[command(long_about = "\
deck-auth - Connect platforms and manage their credentials

DESCRIPTION:
    deck-auth connects SocialDeck to your accounts. LinkedIn and Twitter use
    the OAuth authorization-code flow: `initiate` prints the URL to open,
    and `callback` finishes with the code and state the platform redirects
    back with. Other platforms take a token stored with `set`.

USAGE EXAMPLES:
    # Connect LinkedIn
    deck-auth initiate linkedin
    deck-auth callback linkedin --code <CODE> --state <STATE>

    # Store a Telegram bot token from stdin
    echo \"$BOT_TOKEN\" | deck-auth set telegram bot_token

    # Store the AI provider key
    deck-auth set ai api_key

    # Show what is connected
    deck-auth status

CONFIGURATION:
    [oauth.linkedin] / [oauth.twitter] hold client_id and redirect_uri.
    The client secret is a credential: deck-auth set linkedin client_secret

    Credentials are stored in the OS keyring or, with
    [credentials] storage = \"plain\", in an owner-only file. Environment
    variables such as SOCIALDECK_TELEGRAM_BOT_TOKEN override both.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication error (state mismatch, missing credential)
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an OAuth authorization and print the URL to open
    Initiate { platform: String },

    /// Finish an OAuth authorization
    Callback {
        platform: String,

        /// Authorization code from the redirect
        #[arg(long)]
        code: String,

        /// State parameter from the redirect
        #[arg(long)]
        state: String,
    },

    /// Show connection and token status for every platform
    Status {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Store a credential ("ai" targets the AI provider)
    Set {
        /// Platform name or "ai"
        target: String,

        /// Credential key, e.g. access_token, bot_token, api_key
        key: String,

        /// Read the value from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },

    /// Delete a stored credential
    Delete {
        /// Platform name or "ai"
        target: String,

        key: String,
    },

    /// Forget a platform's tokens and mark it disconnected
    Disconnect { platform: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::for_cli(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e.downcast_ref::<DeckError>().map_or(1, DeckError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default()?;
    let credentials = CredentialManager::new(config.credentials.clone())?;

    match cli.command {
        Commands::Initiate { platform } => {
            let platform = oauth_platform(&platform)?;
            let provider = OAuthProvider::from_config(platform, &config, &credentials)
                .with_context(|| format!("Cannot authorize {}", platform))?;
            let url = oauth::initiate(&provider, &credentials)?;
            eprintln!("Open this URL to authorize {}:", platform);
            println!("{}", url);
        }
        Commands::Callback {
            platform,
            code,
            state,
        } => {
            let platform = oauth_platform(&platform)?;
            let provider = OAuthProvider::from_config(platform, &config, &credentials)?;
            let store = open_store(&config).await?;
            let tokens = oauth::callback(&provider, &credentials, &store, &code, &state).await?;
            match tokens.expires_in {
                Some(seconds) => println!("Connected {} (token expires in {}s)", platform, seconds),
                None => println!("Connected {}", platform),
            }
        }
        Commands::Status { format } => {
            cmd_status(&config, &credentials, &format).await?;
        }
        Commands::Set { target, key, stdin } => {
            let service = credential_service(&target, &key)?;
            let value = read_secret(&target, &key, stdin)?;
            debug!("Storing {} under service {}", key, service);
            credentials.store(&service, &key, &value)?;
            println!("Stored {} for {}", key, target);
        }
        Commands::Delete { target, key } => {
            let service = credential_service(&target, &key)?;
            credentials.delete(&service, &key)?;
            println!("Deleted {} for {}", key, target);
        }
        Commands::Disconnect { platform } => {
            let platform: Platform = platform.parse()?;
            let service = service_name(platform);
            for key in ["access_token", "refresh_token", "token_expires_at"] {
                credentials.delete(&service, key)?;
            }
            let store = open_store(&config).await?;
            store
                .update(|state| {
                    state.platform_settings_mut(platform).connected = false;
                    Ok(())
                })
                .await?;
            println!("Disconnected {}", platform);
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Store> {
    let path = resolve_db_path(&config.database.path);
    Ok(Store::new(&path.to_string_lossy()).await?)
}

fn oauth_platform(name: &str) -> Result<Platform> {
    let platform: Platform = name.parse()?;
    if !supports_oauth(platform) {
        return Err(DeckError::InvalidInput(format!(
            "{} does not use OAuth here; store its token with `deck-auth set {} <key>`",
            platform, platform
        ))
        .into());
    }
    Ok(platform)
}

/// Credential service for `target`, rejecting keys nothing reads
fn credential_service(target: &str, key: &str) -> Result<String> {
    if target.eq_ignore_ascii_case("ai") {
        if key != "api_key" {
            return Err(DeckError::InvalidInput(format!("Unknown AI key '{}'. Expected: api_key", key)).into());
        }
        return Ok(AI_SERVICE.to_string());
    }

    let platform: Platform = target.parse()?;
    let keys = credential_keys(platform);
    if !keys.contains(&key) {
        return Err(DeckError::InvalidInput(format!(
            "Unknown key '{}' for {}. Expected one of: {}",
            key,
            platform,
            keys.join(", ")
        ))
        .into());
    }
    Ok(service_name(platform))
}

fn read_secret(target: &str, key: &str, use_stdin: bool) -> Result<String> {
    let value = if use_stdin || !atty::is(atty::Stream::Stdin) {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read credential from stdin")?;
        buffer
    } else {
        rpassword::prompt_password(format!("{} {}: ", target, key))
            .context("Failed to read credential")?
    };

    let value = value.trim().to_string();
    if value.is_empty() {
        bail!(DeckError::InvalidInput("Credential value cannot be empty".to_string()));
    }
    Ok(value)
}

async fn cmd_status(config: &Config, credentials: &CredentialManager, format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(DeckError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        ))
        .into());
    }

    let state = open_store(config).await?.load().await?;
    let now = Utc::now();
    let mut rows = Vec::new();
    for platform in Platform::ALL {
        let status = oauth::token_status(credentials, platform)?;
        let settings = state.platform_settings(platform);
        rows.push(serde_json::json!({
            "platform": platform,
            "enabled": settings.is_some_and(|s| s.enabled),
            "connected": settings.is_some_and(|s| s.connected),
            "has_token": status.has_token,
            "expires_at": status.expires_at,
            "expired": status.is_expired(now),
            "pending_authorization": status.pending_authorization,
        }));

        if format == "text" {
            let token = match (status.has_token, status.is_expired(now)) {
                (true, true) => "token expired",
                (true, false) => "token stored",
                (false, _) => "no token",
            };
            let mut line = format!(
                "{:<10} {:<13} {}",
                platform.as_str(),
                if settings.is_some_and(|s| s.connected) { "connected" } else { "not connected" },
                token
            );
            if status.pending_authorization {
                line.push_str(" (authorization pending)");
            }
            println!("{}", line);
        }
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(())
}
