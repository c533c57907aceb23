//! deck-queue - Manage the post queue
//!
//! Unix-style tool for inspecting and editing scheduled posts and the
//! per-platform settings the scheduler works from.

use std::io::{BufRead, Write};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libsocialdeck::config::resolve_db_path;
use libsocialdeck::error::{PlatformError, StoreError};
use libsocialdeck::logging::LoggingConfig;
use libsocialdeck::platforms::create_client;
use libsocialdeck::poster::{publish_post, RetryPolicy};
use libsocialdeck::scheduling::{parse_best_time, parse_schedule};
use libsocialdeck::stats::QueueStats;
use libsocialdeck::types::PlatformSettings;
use libsocialdeck::{Config, CredentialManager, DeckError, Platform, Post, PostStatus, Result, Store};

#[derive(Parser, Debug)]
#[command(name = "deck-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts and platform settings")]
#[command(long_about = "\
deck-queue - Manage scheduled posts and platform settings

DESCRIPTION:
    deck-queue is a Unix-style tool for managing the SocialDeck post queue.
    Use it to list, cancel, reschedule, or publish queued posts, to view
    queue statistics, and to enable platforms and set their best times.

COMMANDS:
    list        List posts (scheduled by default)
    cancel      Remove a post, or every scheduled post
    reschedule  Move a post to a different time
    now         Publish a post immediately
    stats       Show statistics about the queue
    platforms   Enable, disable, and tune platforms

USAGE EXAMPLES:
    # List scheduled posts
    deck-queue list

    # List failed LinkedIn posts as JSON
    deck-queue list --status failed --platform linkedin --format json

    # Cancel a specific post
    deck-queue cancel <POST_ID>

    # Reschedule a post
    deck-queue reschedule <POST_ID> \"tomorrow 3pm\"

    # Publish a queued post right away
    deck-queue now <POST_ID>

    # Enable Telegram and post at 08:00 and 18:30
    deck-queue platforms enable telegram
    deck-queue platforms best-times telegram 08:00,18:30

CONFIGURATION:
    Configuration file: ~/.config/socialdeck/config.toml
    State database:     ~/.local/share/socialdeck/state.db

    Override with environment variables:
        SOCIALDECK_CONFIG    - Path to config file
        SOCIALDECK_DB_PATH   - Path to state database

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication error
    3 - Invalid input (bad post ID, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Filter by platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Filter by status: draft, scheduled, published, failed, or all
        #[arg(short, long, default_value = "scheduled")]
        status: String,
    },

    /// Remove a post from the queue
    Cancel {
        /// Post ID to cancel
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        post_id: Option<String>,

        /// Cancel all scheduled posts
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Reschedule a post
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New schedule time (e.g., "tomorrow 3pm", "2h", "random:1h-3h")
        time: String,
    },

    /// Publish a post immediately
    Now {
        /// Post ID to publish
        post_id: String,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Manage platform settings
    Platforms {
        #[command(subcommand)]
        command: PlatformCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PlatformCommands {
    /// Show every platform with its settings
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Enable a platform for posting and daily scheduling
    Enable { platform: String },

    /// Disable a platform
    Disable { platform: String },

    /// Replace a platform's best posting times
    BestTimes {
        platform: String,

        /// Comma-separated clock times, e.g. "09:00,12:30,17:00"
        times: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::for_cli(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default()?;
    let store = Store::new(&resolve_db_path(&config.database.path).to_string_lossy()).await?;

    match cli.command {
        Commands::List {
            format,
            platform,
            status,
        } => {
            cmd_list(&store, &format, platform.as_deref(), &status).await?;
        }
        Commands::Cancel {
            post_id,
            all,
            force,
        } => {
            cmd_cancel(&store, post_id.as_deref(), all, force).await?;
        }
        Commands::Reschedule { post_id, time } => {
            cmd_reschedule(&store, &post_id, &time).await?;
        }
        Commands::Now { post_id } => {
            cmd_now(&store, &config, &post_id).await?;
        }
        Commands::Stats { format } => {
            cmd_stats(&store, &format).await?;
        }
        Commands::Platforms { command } => {
            cmd_platforms(&store, command).await?;
        }
    }

    Ok(())
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(DeckError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let output = serde_json::to_string_pretty(value).map_err(StoreError::Serialization)?;
    println!("{}", output);
    Ok(())
}

fn post_not_found(post_id: &str) -> DeckError {
    DeckError::InvalidInput(format!("Post not found: {}", post_id))
}

/// List posts
async fn cmd_list(store: &Store, format: &str, platform: Option<&str>, status: &str) -> Result<()> {
    validate_format(format)?;

    let platform = platform.map(|p| p.parse::<Platform>()).transpose()?;
    let status: Option<PostStatus> = match status {
        "all" => None,
        other => Some(other.parse()?),
    };

    let state = store.load().await?;
    let mut posts: Vec<&Post> = state
        .posts
        .iter()
        .filter(|p| status.map_or(true, |s| p.status == s))
        .filter(|p| platform.map_or(true, |pl| p.platform == pl))
        .collect();
    posts.sort_by_key(|p| p.scheduled_time);

    if format == "json" {
        output_list_json(&posts)
    } else {
        output_list_text(&posts);
        Ok(())
    }
}

/// Output posts as JSON
fn output_list_json(posts: &[&Post]) -> Result<()> {
    let json: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "platform": p.platform,
                "content": p.content,
                "status": p.status.as_str(),
                "scheduled_time": p.scheduled_time,
                "created_at": p.created_at,
                "ai_generated": p.ai_generated,
                "campaign_id": p.campaign_id,
                "error": p.error,
            })
        })
        .collect();

    print_json(&serde_json::Value::Array(json))
}

/// Output posts as human-readable text
fn output_list_text(posts: &[&Post]) {
    let now = Utc::now();

    for post in posts {
        let when = match post.status {
            PostStatus::Scheduled => format_time_until(now, post.scheduled_time),
            _ => post.status.to_string(),
        };

        println!(
            "{} | {} | {} | {}",
            post.id,
            post.platform,
            truncate_content(&post.content, 50),
            when
        );
    }
}

/// Truncate content to max characters with ellipsis, on one line
fn truncate_content(content: &str, max_len: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_len {
        single_line
    } else {
        let head: String = single_line.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: DateTime<Utc>, scheduled: DateTime<Utc>) -> String {
    let diff = scheduled - now;

    if diff < chrono::Duration::zero() {
        return "overdue".to_string();
    }

    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Cancel scheduled post(s)
async fn cmd_cancel(store: &Store, post_id: Option<&str>, all: bool, force: bool) -> Result<()> {
    if all {
        let count = store.load().await?.scheduled_posts().len();
        if count == 0 {
            println!("No scheduled posts");
            return Ok(());
        }
        if !force && atty::is(atty::Stream::Stdin) && !confirm(&format!("Cancel {} scheduled posts?", count))? {
            println!("Aborted");
            return Ok(());
        }

        let removed = store
            .update(|state| {
                let before = state.posts.len();
                state.posts.retain(|p| p.status != PostStatus::Scheduled);
                Ok(before - state.posts.len())
            })
            .await?;
        println!("Cancelled {} scheduled posts", removed);
        return Ok(());
    }

    let post_id = post_id
        .ok_or_else(|| DeckError::InvalidInput("Provide a post ID or --all".to_string()))?;
    let removed = store
        .update(|state| state.remove_post(post_id).ok_or_else(|| post_not_found(post_id)))
        .await?;
    tracing::info!("Removed {} post {}", removed.status, removed.id);
    println!("Cancelled {}", removed.id);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout()
        .flush()
        .map_err(|e| DeckError::InvalidInput(format!("Failed to write prompt: {}", e)))?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| DeckError::InvalidInput(format!("Failed to read answer: {}", e)))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Reschedule a post
///
/// Drafts and failed posts are put back in the queue; published posts are
/// left alone.
async fn cmd_reschedule(store: &Store, post_id: &str, time: &str) -> Result<()> {
    let at = store
        .update(|state| {
            let last = state
                .scheduled_posts()
                .iter()
                .filter(|p| p.id != post_id)
                .map(|p| p.scheduled_time)
                .last();
            let at = parse_schedule(time, last)?;

            let post = state.find_post_mut(post_id).ok_or_else(|| post_not_found(post_id))?;
            if post.status == PostStatus::Published {
                return Err(DeckError::InvalidInput(format!(
                    "Post {} is already published",
                    post_id
                )));
            }
            post.status = PostStatus::Scheduled;
            post.scheduled_time = at;
            post.error = None;
            Ok(at)
        })
        .await?;

    println!("Rescheduled {} to {}", post_id, at.to_rfc3339());
    Ok(())
}

/// Publish immediately
async fn cmd_now(store: &Store, config: &Config, post_id: &str) -> Result<()> {
    let state = store.load().await?;
    let post = state.find_post(post_id).ok_or_else(|| post_not_found(post_id))?.clone();
    if post.status == PostStatus::Published {
        return Err(DeckError::InvalidInput(format!(
            "Post {} is already published",
            post_id
        )));
    }

    let credentials = CredentialManager::new(config.credentials.clone())?;
    let client = create_client(post.platform, config, &credentials)?;
    let outcome = publish_post(client.as_ref(), &post, RetryPolicy::default()).await;

    let recorded = outcome.clone();
    store
        .update(move |state| {
            let post = state.find_post_mut(&recorded.post_id).ok_or_else(|| post_not_found(&recorded.post_id))?;
            match recorded.platform_post_id {
                Some(id) if recorded.success => post.mark_published(id, Utc::now()),
                _ => post.mark_failed(recorded.error.unwrap_or_default()),
            }
            Ok(())
        })
        .await?;

    match outcome.platform_post_id {
        Some(id) if outcome.success => {
            println!("{}:{}", outcome.platform, id);
            Ok(())
        }
        _ => Err(PlatformError::Posting(outcome.error.unwrap_or_else(|| "unknown error".to_string())).into()),
    }
}

/// Show queue statistics
async fn cmd_stats(store: &Store, format: &str) -> Result<()> {
    validate_format(format)?;

    let state = store.load().await?;
    let stats = QueueStats::from_state(&state);

    if format == "json" {
        let mut value = serde_json::to_value(&stats).map_err(StoreError::Serialization)?;
        value["success_rate"] = serde_json::json!(stats.success_rate());
        return print_json(&value);
    }

    println!("Total posts: {}", stats.total.total());
    println!(
        "  draft: {}  scheduled: {}  published: {}  failed: {}",
        stats.total.draft, stats.total.scheduled, stats.total.published, stats.total.failed
    );
    println!("AI generated: {}", stats.ai_generated);
    if let Some(rate) = stats.success_rate() {
        println!("Success rate: {:.1}%", rate);
    }

    if !stats.by_platform.is_empty() {
        println!();
        println!("By platform:");
        for (platform, counts) in &stats.by_platform {
            println!(
                "  {:<10} scheduled: {}  published: {}  failed: {}",
                platform.as_str(),
                counts.scheduled,
                counts.published,
                counts.failed
            );
        }
    }

    if let Some(next) = &stats.next_scheduled {
        println!();
        println!(
            "Next post: {} on {} {}",
            next.post_id,
            next.platform,
            format_time_until(Utc::now(), next.scheduled_time)
        );
    }

    Ok(())
}

async fn cmd_platforms(store: &Store, command: PlatformCommands) -> Result<()> {
    match command {
        PlatformCommands::List { format } => {
            validate_format(&format)?;
            let state = store.load().await?;

            if format == "json" {
                let value = serde_json::to_value(&state.platforms).map_err(StoreError::Serialization)?;
                return print_json(&value);
            }

            for platform in Platform::ALL {
                let settings = state
                    .platform_settings(platform)
                    .cloned()
                    .unwrap_or_else(|| PlatformSettings::new(platform));
                let times: Vec<String> = settings
                    .best_times
                    .iter()
                    .map(|t| t.format("%H:%M").to_string())
                    .collect();
                println!(
                    "{:<10} {:<8} {:<12} {}",
                    platform.as_str(),
                    if settings.enabled { "enabled" } else { "disabled" },
                    if settings.connected { "connected" } else { "-" },
                    times.join(",")
                );
            }
        }
        PlatformCommands::Enable { platform } => {
            let platform: Platform = platform.parse()?;
            store
                .update(|state| {
                    state.platform_settings_mut(platform).enabled = true;
                    Ok(())
                })
                .await?;
            println!("Enabled {}", platform);
        }
        PlatformCommands::Disable { platform } => {
            let platform: Platform = platform.parse()?;
            store
                .update(|state| {
                    state.platform_settings_mut(platform).enabled = false;
                    Ok(())
                })
                .await?;
            println!("Disabled {}", platform);
        }
        PlatformCommands::BestTimes { platform, times } => {
            let platform: Platform = platform.parse()?;
            let mut parsed = times
                .split(',')
                .filter(|t| !t.trim().is_empty())
                .map(parse_best_time)
                .collect::<Result<Vec<_>>>()?;
            if parsed.is_empty() {
                return Err(DeckError::InvalidInput(
                    "At least one best time is required".to_string(),
                ));
            }
            parsed.sort();
            parsed.dedup();

            let display: Vec<String> = parsed.iter().map(|t| t.format("%H:%M").to_string()).collect();
            store
                .update(move |state| {
                    state.platform_settings_mut(platform).best_times = parsed;
                    Ok(())
                })
                .await?;
            println!("{} best times: {}", platform, display.join(","));
        }
    }
    Ok(())
}
