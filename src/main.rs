//! # NGO Mentions
//!
//! Collects social-media posts, videos and comments that mention a fixed
//! roster of NGOs, and cleans two government datasets for loading next to
//! them.
//!
//! ## Features
//!
//! - Scrapes Reddit (subreddit top posts), YouTube (channel uploads) and
//!   Bluesky (keyword search)
//! - Matches every item against the NGO registry with exact, whole-word
//!   acronym and fuzzy matching
//! - Writes `content.csv`, `ngo_content.csv` and `comments.csv`
//! - Cleans the Form 990 charity financials and QCEW nonprofit employment
//!   CSV exports
//!
//! ## Usage
//!
//! ```sh
//! ngo_mentions reddit --target-date 2025-03-10
//! ngo_mentions youtube --channel-names "UNICEF"
//! ngo_mentions bluesky --keyword "Red Cross"
//! ngo_mentions clean-charities --input core.csv --ein-mapping eins.csv
//! ngo_mentions match "We support WWF and the Red Cross"
//! ```
//!
//! ## Architecture
//!
//! 1. **Registry**: Load the NGO list once (bundled or from `--registry`)
//! 2. **Fetching**: Pull posts/videos and comments from one platform
//! 3. **Matching**: Run each item's title and body through the matcher
//! 4. **Output**: Write the three CSV tables into `--output-dir`

use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cleaners;
mod cli;
mod comments;
mod error;
mod matcher;
mod mentions;
mod models;
mod outputs;
mod registry;
mod scrapers;
mod utils;

use cli::{BlueskyArgs, Cli, Command, MatchArgs, RedditArgs, YoutubeArgs};
use matcher::{MatchOptions, NgoMatcher};
use models::{NgoId, Platform};
use outputs::tables::{WriteMode, write_batch};
use registry::NgoRegistry;
use scrapers::ScrapeBatch;
use scrapers::bluesky::{self, BlueskyClient, BlueskyOptions};
use scrapers::reddit::{self, RedditClient, RedditCredentials, RedditOptions};
use scrapers::youtube::{self, YouTubeClient, YouTubeOptions};
use utils::{DateWindow, ensure_writable_dir, truncate_for_log};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct MatchedNgo<'a> {
    id: NgoId,
    name: &'a str,
}

fn load_registry(path: Option<&Path>) -> error::Result<NgoRegistry> {
    let registry = match path {
        Some(path) => NgoRegistry::load(path)?,
        None => NgoRegistry::builtin()?,
    };
    if registry.is_empty() {
        warn!("NGO registry is empty; nothing will match");
    }
    info!(count = registry.len(), custom = path.is_some(), "Loaded NGO registry");
    Ok(registry)
}

fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

async fn scrape_reddit(args: RedditArgs, registry: &NgoRegistry) -> Result<ScrapeBatch, Box<dyn Error>> {
    let credentials = RedditCredentials {
        client_id: args.client_id,
        client_secret: args.client_secret,
        user_agent: args.user_agent,
    };
    let client = RedditClient::connect(&credentials).await?;

    let subreddits: Vec<String> = if args.subreddit.is_empty() {
        reddit::DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect()
    } else {
        args.subreddit
    };
    let options = RedditOptions {
        max_posts: args.max_posts,
        comment_limits: comments::TraversalLimits {
            max_depth: args.max_comment_depth,
            max_siblings: args.max_comments_per_depth,
        },
        window: DateWindow::from_args(args.date.target_date, args.date_range),
    };
    let matcher = NgoMatcher::new(
        registry,
        args.matching.options(MatchOptions::subreddit_posts(args.matching.fuzzy_threshold)),
    );
    debug!(?options, subreddits = subreddits.len(), "Reddit options");

    Ok(reddit::scrape_subreddits(&client, &subreddits, &matcher, &options).await)
}

async fn scrape_youtube(args: YoutubeArgs, registry: &NgoRegistry) -> Result<ScrapeBatch, Box<dyn Error>> {
    youtube::check_api_key(&args.api_key)?;
    let client = YouTubeClient::new(http_client()?, args.api_key);

    let targets = if args.channel_names.is_empty() {
        info!("No channels given; resolving channels from the registry");
        youtube::resolve_channels_from_registry(&client, registry, args.max_channels).await
    } else {
        youtube::resolve_channels_by_name(&client, &args.channel_names).await
    };
    if targets.is_empty() {
        warn!("No channels could be resolved; nothing to scrape");
        return Ok(ScrapeBatch::default());
    }

    let options = YouTubeOptions {
        max_results: args.max_results,
        max_comments: args.max_comments,
        nested_comments: args.nested_comments,
        window: DateWindow::from_args(args.date.target_date, args.date_range),
    };
    let matcher = NgoMatcher::new(
        registry,
        args.matching.options(MatchOptions::videos(args.matching.fuzzy_threshold)),
    );
    Ok(youtube::scrape_channels(&client, &targets, &matcher, &options).await)
}

async fn scrape_bluesky(args: BlueskyArgs, registry: &NgoRegistry) -> Result<ScrapeBatch, Box<dyn Error>> {
    let client = BlueskyClient::new(http_client()?);
    let queries = match &args.keyword {
        Some(keyword) => bluesky::queries_for_keyword(registry, keyword),
        None => {
            info!("No keyword given; searching every registry keyword");
            bluesky::queries_for_registry(registry)
        }
    };
    let options = BlueskyOptions {
        max_results: args.max_results,
        sort: args.sort,
        window: DateWindow::from_args(args.date.target_date, args.date_range),
    };
    let matcher = NgoMatcher::new(registry, args.matching.options(MatchOptions::exact_only()));
    Ok(bluesky::scrape_keywords(&client, &queries, &matcher, &options).await)
}

fn print_matches(args: MatchArgs, registry: &NgoRegistry) -> Result<(), Box<dyn Error>> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let found = matcher::find_ngos(&text, registry, args.matching.options(MatchOptions::exact_only()));
    debug!(text = %truncate_for_log(&text, 200), count = found.len(), "Matched text");

    let matched: Vec<MatchedNgo<'_>> = found
        .into_iter()
        .filter_map(|id| registry.get(id))
        .map(|ngo| MatchedNgo { id: ngo.id, name: &ngo.name })
        .collect();
    println!("{}", serde_json::to_string_pretty(&matched)?);
    Ok(())
}

async fn save(
    platform: Platform,
    batch: &ScrapeBatch,
    output_dir: &str,
    mode: WriteMode,
) -> Result<(), Box<dyn Error>> {
    ensure_writable_dir(output_dir).await?;
    let summary = write_batch(Path::new(output_dir), batch, mode)?;
    info!(
        unique_ngos = batch.ngos_found().len(),
        contents = summary.contents,
        mentions = summary.mentions,
        comments = summary.comments,
        %platform,
        %output_dir,
        "Scrape complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Best effort: a missing .env is fine.
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "Loaded environment file");
    }

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args.registry, output_dir = %args.output_dir, "Parsed CLI arguments");

    match args.command {
        Command::Reddit(cmd) => {
            let registry = load_registry(args.registry.as_deref())?;
            let batch = scrape_reddit(cmd, &registry).await?;
            save(Platform::Reddit, &batch, &args.output_dir, WriteMode::Overwrite).await?;
        }
        Command::Youtube(cmd) => {
            let registry = load_registry(args.registry.as_deref())?;
            let batch = scrape_youtube(cmd, &registry).await?;
            save(Platform::YouTube, &batch, &args.output_dir, WriteMode::Append).await?;
        }
        Command::Bluesky(cmd) => {
            let registry = load_registry(args.registry.as_deref())?;
            let batch = scrape_bluesky(cmd, &registry).await?;
            save(Platform::Bluesky, &batch, &args.output_dir, WriteMode::Overwrite).await?;
        }
        Command::CleanCharities(cmd) => {
            cleaners::charities::run(&cmd.input, &cmd.ein_mapping, &cmd.output)?;
        }
        Command::CleanEmployment(cmd) => {
            cleaners::employment::run(&cmd.input, &cmd.output, cmd.row_limit)?;
        }
        Command::Match(cmd) => {
            let registry = load_registry(args.registry.as_deref())?;
            print_matches(cmd, &registry)?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs(),
        elapsed_ms = elapsed.as_millis(),
        "Run complete"
    );
    Ok(())
}
