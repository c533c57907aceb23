//! deck-post - Compose and publish posts
//!
//! Publishes immediately, schedules, or saves drafts for one or more
//! platforms. Content comes from the argument, stdin, or the AI generator.

use std::io::Read;

use chrono::{DateTime, Utc};
use clap::Parser;
use libsocialdeck::ai::{create_generator, GenerationRequest};
use libsocialdeck::config::resolve_db_path;
use libsocialdeck::error::{PlatformError, StoreError};
use libsocialdeck::hashtags::{append_hashtags, find_group};
use libsocialdeck::logging::LoggingConfig;
use libsocialdeck::platforms::{create_client, PlatformClient};
use libsocialdeck::poster::{publish_post, RetryPolicy};
use libsocialdeck::scheduling::parse_schedule;
use libsocialdeck::types::parse_platform_list;
use libsocialdeck::{Config, CredentialManager, DeckError, Post, PostStatus, Result, Store};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "deck-post")]
#[command(version)]
#[command(about = "Compose and publish posts to social platforms")]
#[command(long_about = "\
deck-post - Compose and publish posts to social platforms

DESCRIPTION:
    deck-post publishes content to every enabled platform, or to the platforms
    named with --platform. Content is read from the argument or from stdin.
    With --generate the content for each platform is written by the AI
    generator instead.

USAGE EXAMPLES:
    # Publish to all enabled platforms
    deck-post \"Shipping v2 today!\"

    # Publish from stdin to selected platforms
    echo \"Hello\" | deck-post --platform twitter,linkedin

    # Schedule for later
    deck-post \"See you tomorrow\" --schedule \"tomorrow 9am\"

    # Save a draft with a hashtag group appended
    deck-post \"Release notes are up\" --draft --hashtags launch

    # Let the AI write it
    deck-post --generate \"rust async runtimes\" --platform twitter

CONFIGURATION:
    Configuration file: ~/.config/socialdeck/config.toml
    State database:     ~/.local/share/socialdeck/state.db

    Override with environment variables:
        SOCIALDECK_CONFIG    - Path to config file
        SOCIALDECK_DB_PATH   - Path to state database

EXIT CODES:
    0 - Success on all platforms
    1 - Posting failed on at least one platform
    2 - Authentication error
    3 - Invalid input (empty content, too long, unknown platform)
")]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    #[arg(conflicts_with = "generate")]
    content: Option<String>,

    /// Target platform(s), comma-separated (default: all enabled)
    #[arg(short, long)]
    platform: Option<String>,

    /// Schedule instead of publishing ("30m", "tomorrow 9am", RFC 3339, "random:1h-2h")
    #[arg(short, long, conflicts_with = "draft")]
    schedule: Option<String>,

    /// Save as draft without posting
    #[arg(short, long)]
    draft: bool,

    /// Generate content about TOPIC for each platform
    #[arg(short, long, value_name = "TOPIC")]
    generate: Option<String>,

    /// Append the hashtags of a saved group
    #[arg(long, value_name = "GROUP")]
    hashtags: Option<String>,

    /// Image to attach (default: platforms.<name>.default_image_url)
    #[arg(long)]
    image_url: Option<String>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
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

/// What happened to one post, for output
struct PostReport {
    post: Post,
    error: Option<String>,
}

async fn run(cli: Cli) -> Result<()> {
    if cli.format != "text" && cli.format != "json" {
        return Err(DeckError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        )));
    }

    let config = Config::load_or_default()?;
    let credentials = CredentialManager::new(config.credentials.clone())?;
    let store = Store::new(&resolve_db_path(&config.database.path).to_string_lossy()).await?;
    let state = store.load().await?;

    let platforms = match cli.platform.as_deref() {
        Some(list) => parse_platform_list(list)?,
        None => state.enabled_platforms(),
    };
    if platforms.is_empty() {
        return Err(DeckError::InvalidInput(
            "No platforms selected. Use --platform or `deck-queue platforms enable <name>`"
                .to_string(),
        ));
    }

    let hashtags = match cli.hashtags.as_deref() {
        Some(name) => find_group(&state, name)
            .map(|group| group.hashtags.clone())
            .ok_or_else(|| DeckError::InvalidInput(format!("Unknown hashtag group '{}'", name)))?,
        None => Vec::new(),
    };

    let base_content = match cli.generate {
        Some(_) => None,
        None => Some(read_content(cli.content)?),
    };
    let generator = match cli.generate {
        Some(_) => Some(create_generator(&config, &credentials)?),
        None => None,
    };

    let now = Utc::now();
    let mut drafts: Vec<(Post, Box<dyn PlatformClient>)> = Vec::new();
    for platform in platforms {
        let (content, ai_generated) = match (&generator, &cli.generate) {
            (Some(generator), Some(topic)) => {
                let request = GenerationRequest::new(platform, topic.clone());
                (generator.generate(&request).await?, true)
            }
            _ => (base_content.clone().unwrap_or_default(), false),
        };

        let mut post = Post::new(
            append_hashtags(&content, &hashtags, platform.character_limit()),
            platform,
            now,
        );
        post.ai_generated = ai_generated;
        post.image_url = cli
            .image_url
            .clone()
            .or_else(|| config.platform(platform).default_image_url);

        // Validate everything up front so nothing is saved on bad input
        let client = create_client(platform, &config, &credentials)?;
        client.validate(&post)?;
        debug!("Validated {} post ({} chars)", platform, post.content.chars().count());
        drafts.push((post, client));
    }

    let reports = if cli.draft {
        drafts
            .into_iter()
            .map(|(post, _)| PostReport { post, error: None })
            .collect::<Vec<_>>()
    } else if let Some(schedule) = cli.schedule.as_deref() {
        let last = state.scheduled_posts().last().map(|post| post.scheduled_time);
        let at = parse_schedule(schedule, last)?;
        drafts
            .into_iter()
            .map(|(mut post, _)| {
                post.status = PostStatus::Scheduled;
                post.scheduled_time = at;
                PostReport { post, error: None }
            })
            .collect()
    } else {
        let mut reports = Vec::new();
        for (mut post, client) in drafts {
            let outcome = publish_post(client.as_ref(), &post, RetryPolicy::default()).await;
            match (outcome.success, outcome.platform_post_id) {
                (true, Some(id)) => post.mark_published(id, Utc::now()),
                _ => post.mark_failed(outcome.error.clone().unwrap_or_default()),
            }
            reports.push(PostReport {
                post,
                error: outcome.error,
            });
        }
        reports
    };

    let posts: Vec<Post> = reports.iter().map(|report| report.post.clone()).collect();
    store
        .update(move |state| {
            state.posts.extend(posts);
            Ok(())
        })
        .await?;

    if cli.format == "json" {
        output_json(&reports)?;
    } else {
        output_text(&reports);
    }

    let failed = reports.iter().filter(|r| r.post.status == PostStatus::Failed).count();
    if failed > 0 {
        return Err(PlatformError::Posting(format!(
            "{} of {} platforms failed",
            failed,
            reports.len()
        ))
        .into());
    }
    Ok(())
}

/// Take content from the argument, or from stdin when it is piped
fn read_content(content: Option<String>) -> Result<String> {
    let content = match content {
        Some(content) => content,
        None if atty::is(atty::Stream::Stdin) => {
            return Err(DeckError::InvalidInput(
                "No content provided. Pass it as an argument or pipe it via stdin".to_string(),
            ))
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| DeckError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            buffer
        }
    };

    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(DeckError::InvalidInput("Content cannot be empty".to_string()));
    }
    Ok(content)
}

fn output_text(reports: &[PostReport]) {
    for report in reports {
        let post = &report.post;
        match post.status {
            PostStatus::Draft => println!("draft:{}:{}", post.platform, post.id),
            PostStatus::Scheduled => println!(
                "scheduled:{}:{}:{}",
                post.platform,
                post.id,
                post.scheduled_time.to_rfc3339()
            ),
            PostStatus::Published => println!(
                "{}:{}",
                post.platform,
                post.platform_post_id.as_deref().unwrap_or_default()
            ),
            PostStatus::Failed => eprintln!(
                "{}: failed: {}",
                post.platform,
                report.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

fn output_json(reports: &[PostReport]) -> Result<()> {
    let json: Vec<serde_json::Value> = reports
        .iter()
        .map(|report| {
            let post = &report.post;
            serde_json::json!({
                "post_id": post.id,
                "platform": post.platform,
                "status": post.status.as_str(),
                "scheduled_time": scheduled_time(post),
                "platform_post_id": post.platform_post_id,
                "error": report.error,
            })
        })
        .collect();

    let output = serde_json::to_string_pretty(&json).map_err(StoreError::Serialization)?;
    println!("{}", output);
    Ok(())
}

fn scheduled_time(post: &Post) -> Option<DateTime<Utc>> {
    (post.status == PostStatus::Scheduled).then_some(post.scheduled_time)
}
