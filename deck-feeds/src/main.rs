//! deck-feeds - Follow RSS feeds and manage hashtag groups

use chrono::Utc;
use clap::{Parser, Subcommand};
use libsocialdeck::ai::{create_generator, ContentGenerator};
use libsocialdeck::config::resolve_db_path;
use libsocialdeck::error::StoreError;
use libsocialdeck::hashtags::{remove_group, upsert_group};
use libsocialdeck::logging::LoggingConfig;
use libsocialdeck::rss::{refresh_feed, validate_feed_url, FeedClient};
use libsocialdeck::types::{parse_platform_list, RssFeed};
use libsocialdeck::{Config, CredentialManager, DeckError, Platform, Post, PostStatus, Result, Store};

#[derive(Parser, Debug)]
#[command(name = "deck-feeds")]
#[command(version)]
#[command(about = "Follow RSS feeds and manage hashtag groups")]
#[command(long_about = "\
deck-feeds - Follow RSS feeds and manage hashtag groups

DESCRIPTION:
    deck-feeds turns RSS and Atom feeds into posts. Each fetch adds a post
    per new item and platform; items already posted to a platform are
    skipped. Feeds added with --auto-post queue their posts at the
    platform's next best time, others leave them as drafts for review.

    It also keeps named hashtag groups, which `deck-post --hashtags <group>`
    appends to a post.

USAGE EXAMPLES:
    # Follow a feed
    deck-feeds add rust-blog https://blog.rust-lang.org/feed.xml --platforms twitter,linkedin

    # Fetch every feed, summarizing items with the AI generator
    deck-feeds fetch --generate

    # Hashtag groups
    deck-feeds hashtags add release rustlang release
    deck-feeds hashtags list

CONFIGURATION:
    [rss]
    proxy = \"https://proxy.example/?url=\"   # optional prefix for feed URLs
    timeout_secs = 30
    max_items = 5                          # posts created per feed per fetch

EXIT CODES:
    0 - Success
    1 - Operation failed (network, malformed feed)
    2 - Authentication error (missing AI API key with --generate)
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
    /// Follow a feed
    Add {
        /// Feed name
        name: String,

        /// Feed URL (http or https)
        url: String,

        /// Platforms to post to, comma-separated
        #[arg(short, long)]
        platforms: String,

        /// Queue new items at the next best time instead of saving drafts
        #[arg(long)]
        auto_post: bool,
    },

    /// List followed feeds
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Stop following a feed
    Remove {
        /// Feed ID or name
        feed: String,
    },

    /// Fetch feeds and create posts for new items
    Fetch {
        /// Feed ID or name (default: every feed)
        feed: Option<String>,

        /// Summarize items with the AI generator
        #[arg(short, long)]
        generate: bool,
    },

    /// Manage hashtag groups
    #[command(subcommand)]
    Hashtags(HashtagCommands),
}

#[derive(Subcommand, Debug)]
enum HashtagCommands {
    /// Create a group or replace its tags
    Add {
        name: String,

        /// Tags, with or without the leading #
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// List groups
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a group
    Remove { name: String },
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
        Commands::Add {
            name,
            url,
            platforms,
            auto_post,
        } => {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(DeckError::InvalidInput("Feed name cannot be empty".to_string()));
            }
            let url = validate_feed_url(&url).map_err(|e| DeckError::InvalidInput(e.to_string()))?;
            let platforms = parse_platform_list(&platforms)?;

            let feed = RssFeed::new(name, url.to_string(), platforms, auto_post);
            let id = feed.id.clone();
            store
                .update(move |state| {
                    if state
                        .rss_feeds
                        .iter()
                        .any(|f| f.name.eq_ignore_ascii_case(&feed.name))
                    {
                        return Err(DeckError::InvalidInput(format!(
                            "A feed named '{}' already exists",
                            feed.name
                        )));
                    }
                    state.rss_feeds.push(feed);
                    Ok(())
                })
                .await?;
            println!("{}", id);
        }
        Commands::List { format } => {
            validate_format(&format)?;
            let state = store.load().await?;
            if format == "json" {
                let value = serde_json::to_value(&state.rss_feeds).map_err(StoreError::Serialization)?;
                print_json(&value)?;
            } else {
                for feed in &state.rss_feeds {
                    println!("{}", format_feed(feed));
                }
            }
        }
        Commands::Remove { feed } => {
            let removed = store
                .update(|state| {
                    let index = state
                        .rss_feeds
                        .iter()
                        .position(|f| f.id == feed || f.name.eq_ignore_ascii_case(&feed))
                        .ok_or_else(|| DeckError::InvalidInput(format!("No feed named '{}'", feed)))?;
                    Ok(state.rss_feeds.remove(index))
                })
                .await?;
            println!("Removed feed '{}'", removed.name);
        }
        Commands::Fetch { feed, generate } => {
            cmd_fetch(&config, &store, feed, generate).await?;
        }
        Commands::Hashtags(command) => cmd_hashtags(&store, command).await?,
    }

    Ok(())
}

async fn cmd_fetch(config: &Config, store: &Store, feed: Option<String>, generate: bool) -> Result<()> {
    let offset = config.utc_offset()?;
    let client = FeedClient::new(&config.rss)?;
    let generator = if generate {
        let credentials = CredentialManager::new(config.credentials.clone())?;
        Some(create_generator(config, &credentials)?)
    } else {
        None
    };
    let generator: Option<&dyn ContentGenerator> = generator.as_deref();

    let targets = match feed {
        Some(feed) => vec![feed],
        None => {
            let state = store.load().await?;
            if state.rss_feeds.is_empty() {
                eprintln!("No feeds to fetch. Add one with `deck-feeds add`");
                return Ok(());
            }
            state.rss_feeds.into_iter().map(|f| f.id).collect()
        }
    };

    let mut first_error = None;
    for target in &targets {
        match refresh_feed(store, &client, generator, target, Utc::now(), offset).await {
            Ok(posts) => {
                for post in &posts {
                    println!("{}", format_created(post));
                }
            }
            Err(e) => {
                if targets.len() > 1 {
                    eprintln!("Failed to fetch {}: {}", target, e);
                }
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn cmd_hashtags(store: &Store, command: HashtagCommands) -> Result<()> {
    match command {
        HashtagCommands::Add { name, tags } => {
            let group = store.update(|state| upsert_group(state, &name, &tags)).await?;
            println!("{}: {}", group.name, group.hashtags.join(" "));
        }
        HashtagCommands::List { format } => {
            validate_format(&format)?;
            let state = store.load().await?;
            if format == "json" {
                let value =
                    serde_json::to_value(&state.hashtag_groups).map_err(StoreError::Serialization)?;
                print_json(&value)?;
            } else {
                for group in &state.hashtag_groups {
                    println!("{}: {}", group.name, group.hashtags.join(" "));
                }
            }
        }
        HashtagCommands::Remove { name } => {
            let removed = store.update(|state| remove_group(state, &name)).await?;
            println!("Removed hashtag group '{}'", removed.name);
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

fn format_feed(feed: &RssFeed) -> String {
    let platforms: Vec<&str> = feed.platforms.iter().map(Platform::as_str).collect();
    let fetched = feed
        .last_fetched
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{} | {} | {} | {} | fetched {}{}",
        feed.id,
        feed.name,
        feed.url,
        platforms.join(","),
        fetched,
        if feed.auto_post { " | auto-post" } else { "" }
    )
}

/// `draft:{platform}:{id}` or `scheduled:{platform}:{id}:{time}`
fn format_created(post: &Post) -> String {
    match post.status {
        PostStatus::Scheduled => format!(
            "scheduled:{}:{}:{}",
            post.platform,
            post.id,
            post.scheduled_time.to_rfc3339()
        ),
        status => format!("{}:{}:{}", status, post.platform, post.id),
    }
}
