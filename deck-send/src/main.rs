//! deck-send - Background daemon for scheduled posting
//!
//! Creates the day's AI posts once per local day and publishes queued posts
//! as they fall due.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use libsocialdeck::ai::create_generator;
use libsocialdeck::config::resolve_db_path;
use libsocialdeck::events::{Event, EventBus, EventReceiver};
use libsocialdeck::logging::LoggingConfig;
use libsocialdeck::platforms::ConfiguredClients;
use libsocialdeck::scheduler::{Scheduler, SchedulerOptions};
use libsocialdeck::{Config, CredentialManager, DeckError, Result, Store};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "deck-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
deck-send - Background daemon for scheduled posting

DESCRIPTION:
    deck-send is a long-running daemon that keeps the SocialDeck queue moving.

    Once per local day it asks the AI generator for posts on every enabled
    platform and queues them at the platform's remaining best times. Every
    poll interval it publishes the posts that are due, retrying transient
    failures, and records each result.

USAGE:
    # Run in foreground (logs to stderr)
    deck-send

    # Run with custom poll interval
    deck-send --poll-interval 30

    # Run one scheduling and publishing pass, then exit
    deck-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current pass)

CONFIGURATION:
    Configuration file: ~/.config/socialdeck/config.toml
    State database:     ~/.local/share/socialdeck/state.db

    [scheduling]
    poll_interval = 60            # seconds between due-post checks
    max_posts_per_platform = 3    # daily AI posts per platform
    utc_offset = \"+00:00\"         # offset for best times and the day boundary
    topics = [\"industry news\"]    # topics the daily posts rotate through

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Authentication error (missing AI API key)
    3 - Invalid input
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due posts (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit
    #[arg(long)]
    #[arg(help = "Schedule today's posts and publish due posts once, then exit")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default()?;

    let mut options = SchedulerOptions::from_config(&config)?;
    if let Some(seconds) = cli.poll_interval {
        if seconds == 0 {
            return Err(DeckError::InvalidInput(
                "Poll interval must be at least 1 second".to_string(),
            ));
        }
        options.poll_interval = Duration::from_secs(seconds);
    }

    let credentials = Arc::new(CredentialManager::new(config.credentials.clone())?);
    let generator = create_generator(&config, &credentials)?;
    let store = Arc::new(Store::new(&resolve_db_path(&config.database.path).to_string_lossy()).await?);
    let clients = Arc::new(ConfiguredClients::new(config.clone(), credentials));

    let events = EventBus::default();
    let logger = tokio::spawn(log_events(events.subscribe()));

    info!("deck-send daemon starting");
    info!("Poll interval: {}s", options.poll_interval.as_secs());
    if config.mock_mode {
        warn!("Mock mode is on: nothing will reach the platforms");
    }

    let scheduler = Scheduler::new(store, clients, generator, events, options);

    if cli.once {
        let scheduled = scheduler.schedule_posts_for_today(Utc::now()).await?;
        let outcomes = scheduler.publish_due_posts(Utc::now()).await?;
        let failed = outcomes.iter().filter(|o| !o.success).count();
        println!(
            "scheduled: {}, published: {}, failed: {}",
            scheduled.len(),
            outcomes.len() - failed,
            failed
        );
    } else {
        let (stop, shutdown) = watch::channel(false);
        watch_signals(stop)?;
        scheduler.run(shutdown).await?;
    }

    // Closing the bus lets the logger drain and finish
    drop(scheduler);
    let _ = logger.await;

    info!("deck-send daemon stopped");
    Ok(())
}

/// Log scheduler events until the bus closes
async fn log_events(mut rx: EventReceiver) {
    loop {
        match rx.recv().await {
            Ok(Event::PostScheduled {
                post_id,
                platform,
                scheduled_time,
            }) => info!("Scheduled {} post {} for {}", platform, post_id, scheduled_time),
            Ok(Event::PostPublished {
                post_id,
                platform,
                platform_post_id,
            }) => info!("Published {} on {} as {}", post_id, platform, platform_post_id),
            Ok(Event::PostFailed {
                post_id,
                platform,
                error,
            }) => warn!("Failed to publish {} on {}: {}", post_id, platform, error),
            Ok(Event::GenerationFailed { platform, error }) => {
                warn!("Skipped a {} slot, generation failed: {}", platform, error)
            }
            Ok(Event::DailyScheduleCompleted { date, scheduled }) => {
                info!("Daily schedule for {} complete: {} posts", date, scheduled)
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event logger fell behind, {} events not logged", missed)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Flip `stop` on SIGINT or SIGTERM
#[cfg(unix)]
fn watch_signals(stop: watch::Sender<bool>) -> Result<()> {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| DeckError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!("Received signal {}, stopping gracefully...", signal);
            let _ = stop.send(true);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn watch_signals(stop: watch::Sender<bool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            let _ = stop.send(true);
        }
    });
    Ok(())
}
