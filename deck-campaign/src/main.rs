//! deck-campaign - Plan and create posting campaigns

use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use libsocialdeck::ai::create_generator;
use libsocialdeck::campaigns::{plan_phases, schedule_campaign_posts, CampaignInput, CampaignPlanner};
use libsocialdeck::config::resolve_db_path;
use libsocialdeck::error::StoreError;
use libsocialdeck::logging::LoggingConfig;
use libsocialdeck::scheduling::parse_date;
use libsocialdeck::types::{parse_platform_list, Campaign, CampaignType};
use libsocialdeck::{AppState, Config, CredentialManager, DeckError, Platform, PostStatus, Result, Store};

#[derive(Parser, Debug)]
#[command(name = "deck-campaign")]
#[command(version)]
#[command(about = "Plan and create multi-phase posting campaigns")]
#[command(long_about = "\
deck-campaign - Plan and create multi-phase posting campaigns

DESCRIPTION:
    A campaign spreads a number of AI-written posts over a date range. The
    range is split into phases by campaign type, and each phase gets its
    share of the posts:

        product-launch    teaser 20% / launch 50% / follow-up 30%
        brand-awareness   introduction 30% / engagement 40% / reinforcement 30%
        event-promotion   announcement 25% / countdown 50% / recap 25%
        seasonal          build-up 40% / peak 40% / wrap-up 20%
        content-series    series 100%

    Posts rotate through the campaign's platforms and are queued at each
    platform's earliest best time. deck-send publishes them when due.

USAGE EXAMPLES:
    # Preview the phases of a two-week launch
    deck-campaign phases --type product-launch --start 2026-11-01 --end 2026-11-15 --posts 12

    # Create it
    deck-campaign create \"v2 launch\" --type product-launch \\
        --start 2026-11-01 --end 2026-11-15 --platforms twitter,linkedin \\
        --posts 12 --description \"faster sync, new dashboard\"

    # Inspect
    deck-campaign list
    deck-campaign show \"v2 launch\"

DATES:
    YYYY-MM-DD is local midnight in [scheduling] utc_offset. RFC 3339
    timestamps and phrases such as \"next monday\" are accepted too.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication error (missing AI API key)
    3 - Invalid input (dates, type, platforms)
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
    /// Generate and queue a campaign's posts
    Create {
        /// Campaign name
        name: String,

        /// Campaign type
        #[arg(short = 't', long = "type", default_value = "product-launch")]
        campaign_type: String,

        /// First day (default: now)
        #[arg(long)]
        start: Option<String>,

        /// Last day (exclusive)
        #[arg(long)]
        end: String,

        /// Target platforms, comma-separated (default: all enabled)
        #[arg(short, long)]
        platforms: Option<String>,

        /// Total number of posts
        #[arg(short = 'n', long, default_value_t = 10)]
        posts: usize,

        /// What the campaign is about; steers the generated content
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List campaigns
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show a campaign and its posts
    Show {
        /// Campaign ID or name
        campaign: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Preview how posts would be split into phases, without creating anything
    Phases {
        #[arg(short = 't', long = "type", default_value = "product-launch")]
        campaign_type: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: String,

        #[arg(short = 'n', long, default_value_t = 10)]
        posts: usize,

        /// Also list each post's platform and time
        #[arg(short, long)]
        platforms: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
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
    let offset = config.utc_offset()?;
    let store = Store::new(&resolve_db_path(&config.database.path).to_string_lossy()).await?;

    match cli.command {
        Commands::Create {
            name,
            campaign_type,
            start,
            end,
            platforms,
            posts,
            description,
        } => {
            let state = store.load().await?;
            let input = CampaignInput {
                name,
                campaign_type: campaign_type.parse()?,
                start: resolve_start(start.as_deref(), offset)?,
                end: parse_date(&end, offset)?,
                platforms: resolve_platforms(platforms.as_deref(), &state)?,
                total_posts: posts,
                description,
            };
            input.validate()?;
            if find_campaign(&state, &input.name).is_some() {
                return Err(DeckError::InvalidInput(format!(
                    "A campaign named '{}' already exists",
                    input.name
                )));
            }

            let credentials = CredentialManager::new(config.credentials.clone())?;
            let generator = create_generator(&config, &credentials)?;
            let planner = CampaignPlanner::new(generator, offset)
                .with_default_images(config.default_images());
            let campaign = planner.create(&store, input).await?;

            println!("{}", campaign.id);
            eprintln!(
                "Created campaign '{}' with {} posts",
                campaign.name,
                campaign.post_ids.len()
            );
        }
        Commands::List { format } => {
            validate_format(&format)?;
            let state = store.load().await?;
            cmd_list(&state, &format)?;
        }
        Commands::Show { campaign, format } => {
            validate_format(&format)?;
            let state = store.load().await?;
            let campaign = find_campaign(&state, &campaign)
                .ok_or_else(|| DeckError::InvalidInput(format!("Campaign not found: {}", campaign)))?;
            cmd_show(&state, campaign, &format)?;
        }
        Commands::Phases {
            campaign_type,
            start,
            end,
            posts,
            platforms,
            format,
        } => {
            validate_format(&format)?;
            let campaign_type: CampaignType = campaign_type.parse()?;
            let start = resolve_start(start.as_deref(), offset)?;
            let end = parse_date(&end, offset)?;
            let phases = plan_phases(start, end, posts, campaign_type)?;

            let state = store.load().await?;
            let platforms = match platforms.as_deref() {
                Some(list) => parse_platform_list(list)?,
                None => Vec::new(),
            };
            let slots = schedule_campaign_posts(&phases, &platforms, &state, offset);

            if format == "json" {
                print_json(&serde_json::json!({
                    "campaign_type": campaign_type,
                    "phases": phases,
                    "posts": slots,
                }))?;
            } else {
                for phase in &phases {
                    println!(
                        "{:<14} {} -> {}  {} posts",
                        phase.name,
                        local_day(phase.start, offset),
                        local_day(phase.end, offset),
                        phase.post_count
                    );
                }
                if !slots.is_empty() {
                    println!();
                    for slot in &slots {
                        println!(
                            "{:<14} {:<10} {}",
                            slot.phase,
                            slot.platform.as_str(),
                            slot.scheduled_time.with_timezone(&offset).format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }
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

fn resolve_start(start: Option<&str>, offset: FixedOffset) -> Result<DateTime<Utc>> {
    match start {
        Some(start) => parse_date(start, offset),
        None => Ok(Utc::now()),
    }
}

fn resolve_platforms(list: Option<&str>, state: &AppState) -> Result<Vec<Platform>> {
    match list {
        Some(list) => parse_platform_list(list),
        None => {
            let enabled = state.enabled_platforms();
            if enabled.is_empty() {
                return Err(DeckError::InvalidInput(
                    "No platforms selected. Use --platforms or `deck-queue platforms enable <name>`"
                        .to_string(),
                ));
            }
            Ok(enabled)
        }
    }
}

fn find_campaign<'a>(state: &'a AppState, id_or_name: &str) -> Option<&'a Campaign> {
    state
        .campaigns
        .iter()
        .find(|c| c.id == id_or_name || c.name.eq_ignore_ascii_case(id_or_name))
}

fn local_day(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%Y-%m-%d").to_string()
}

fn cmd_list(state: &AppState, format: &str) -> Result<()> {
    if format == "json" {
        let value = serde_json::to_value(&state.campaigns).map_err(StoreError::Serialization)?;
        return print_json(&value);
    }

    for campaign in &state.campaigns {
        let published = state
            .posts
            .iter()
            .filter(|p| p.campaign_id.as_deref() == Some(campaign.id.as_str()))
            .filter(|p| p.status == PostStatus::Published)
            .count();
        println!(
            "{} | {} | {} | {} to {} | {}/{} published",
            campaign.id,
            campaign.name,
            campaign.campaign_type,
            campaign.start_date.format("%Y-%m-%d"),
            campaign.end_date.format("%Y-%m-%d"),
            published,
            campaign.post_ids.len()
        );
    }
    Ok(())
}

fn cmd_show(state: &AppState, campaign: &Campaign, format: &str) -> Result<()> {
    let posts: Vec<_> = state
        .posts
        .iter()
        .filter(|p| p.campaign_id.as_deref() == Some(campaign.id.as_str()))
        .collect();

    if format == "json" {
        return print_json(&serde_json::json!({
            "campaign": campaign,
            "posts": posts,
        }));
    }

    let platforms: Vec<&str> = campaign.platforms.iter().map(Platform::as_str).collect();
    println!("Campaign:    {}", campaign.name);
    println!("ID:          {}", campaign.id);
    println!("Type:        {}", campaign.campaign_type);
    println!(
        "Dates:       {} to {}",
        campaign.start_date.to_rfc3339(),
        campaign.end_date.to_rfc3339()
    );
    println!("Platforms:   {}", platforms.join(", "));
    if !campaign.description.is_empty() {
        println!("Description: {}", campaign.description);
    }
    println!();
    for post in posts {
        println!(
            "{} | {} | {} | {}",
            post.scheduled_time.format("%Y-%m-%d %H:%M"),
            post.platform,
            post.status,
            post.id
        );
    }
    Ok(())
}
