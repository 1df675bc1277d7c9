//! Command-line interface definitions for NGO Mentions.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Credentials and paths can be provided via flags, environment
//! variables, or a `.env` file in the working directory.

use crate::matcher::{AcronymCase, FuzzyPolicy, MatchOptions};
use crate::scrapers::bluesky::{self, SortMethod};
use crate::scrapers::{reddit, youtube};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the NGO Mentions application.
///
/// # Examples
///
/// ```sh
/// # Scrape the default subreddits for posts from the week around a date
/// ngo_mentions reddit --target-date 2025-03-10
///
/// # Scrape two YouTube channels, including comment replies
/// ngo_mentions youtube --channel-names "UNICEF" "Doctors Without Borders" --nested-comments
///
/// # Search Bluesky for a single keyword
/// ngo_mentions bluesky --keyword "Red Cross" --sort top
///
/// # Check which NGOs a piece of text mentions
/// echo "We support WWF" | ngo_mentions match
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// NGO registry file (YAML, or JSON with a .json extension); defaults to the bundled list
    #[arg(long, global = true, env = "NGO_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Directory content.csv, ngo_content.csv and comments.csv are written to
    #[arg(short, long, global = true, default_value = ".")]
    pub output_dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape subreddits for posts mentioning NGOs
    Reddit(RedditArgs),
    /// Scrape YouTube channels for videos mentioning NGOs
    Youtube(YoutubeArgs),
    /// Search Bluesky posts for NGO keywords
    Bluesky(BlueskyArgs),
    /// Clean the Form 990 charity financials dataset
    CleanCharities(CleanCharitiesArgs),
    /// Clean the QCEW nonprofit employment dataset
    CleanEmployment(CleanEmploymentArgs),
    /// Print the NGOs a piece of text mentions, as JSON
    Match(MatchArgs),
}

/// Matcher settings shared by the scraping subcommands.
#[derive(Args, Debug, Clone)]
pub struct MatchingArgs {
    /// Minimum fuzzy similarity (0-100) for a fuzzy match
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub fuzzy_threshold: u8,

    /// Override the fuzzy fallback used by this subcommand
    #[arg(long, value_enum)]
    pub fuzzy_policy: Option<FuzzyPolicy>,

    /// Override acronym case handling used by this subcommand
    #[arg(long, value_enum)]
    pub acronym_case: Option<AcronymCase>,
}

impl MatchingArgs {
    /// Apply the overrides to a call-site preset.
    pub fn options(&self, preset: MatchOptions) -> MatchOptions {
        MatchOptions {
            fuzzy_threshold: self.fuzzy_threshold,
            ..preset
        }
        .with_overrides(self.fuzzy_policy, self.acronym_case)
    }
}

/// Date window shared by the scraping subcommands.
#[derive(Args, Debug, Clone)]
pub struct DateArgs {
    /// Only keep content published around this date (YYYY-MM-DD)
    #[arg(long)]
    pub target_date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct RedditArgs {
    #[arg(long, env = "REDDIT_CLIENT_ID", hide_env_values = true)]
    pub client_id: String,

    #[arg(long, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    #[arg(long, env = "REDDIT_USER_AGENT")]
    pub user_agent: String,

    /// Subreddits to scrape; defaults to a built-in list of charity communities
    #[arg(long, num_args = 1..)]
    pub subreddit: Vec<String>,

    #[command(flatten)]
    pub date: DateArgs,

    /// Days either side of --target-date
    #[arg(long, default_value_t = reddit::DEFAULT_DATE_RANGE)]
    pub date_range: u32,

    /// Posts to fetch per subreddit
    #[arg(long, default_value_t = reddit::DEFAULT_MAX_POSTS)]
    pub max_posts: usize,

    #[arg(long, default_value_t = reddit::DEFAULT_MAX_COMMENT_DEPTH)]
    pub max_comment_depth: usize,

    #[arg(long, default_value_t = reddit::DEFAULT_MAX_COMMENTS_PER_DEPTH)]
    pub max_comments_per_depth: usize,

    #[command(flatten)]
    pub matching: MatchingArgs,
}

#[derive(Args, Debug)]
pub struct YoutubeArgs {
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Channel names to scrape; defaults to channels found for registry NGOs
    #[arg(long, num_args = 1..)]
    pub channel_names: Vec<String>,

    /// Videos to fetch per channel
    #[arg(long, default_value_t = youtube::DEFAULT_MAX_RESULTS)]
    pub max_results: usize,

    /// Channels to resolve from the registry
    #[arg(long, default_value_t = youtube::DEFAULT_MAX_CHANNELS)]
    pub max_channels: usize,

    /// Top-level comments to fetch per video
    #[arg(long, default_value_t = youtube::DEFAULT_MAX_COMMENTS)]
    pub max_comments: usize,

    /// Also store replies to top-level comments
    #[arg(long)]
    pub nested_comments: bool,

    #[command(flatten)]
    pub date: DateArgs,

    /// Days either side of --target-date
    #[arg(long, default_value_t = youtube::DEFAULT_DATE_RANGE)]
    pub date_range: u32,

    #[command(flatten)]
    pub matching: MatchingArgs,
}

#[derive(Args, Debug)]
pub struct BlueskyArgs {
    /// Search only this keyword; defaults to every keyword in the registry
    #[arg(long)]
    pub keyword: Option<String>,

    /// Posts to fetch per keyword
    #[arg(long, default_value_t = bluesky::DEFAULT_MAX_RESULTS)]
    pub max_results: usize,

    /// Result ordering, ignored when --target-date is given
    #[arg(long, value_enum, default_value_t = SortMethod::Latest)]
    pub sort: SortMethod,

    #[command(flatten)]
    pub date: DateArgs,

    /// Days either side of --target-date
    #[arg(long, default_value_t = bluesky::DEFAULT_DATE_RANGE)]
    pub date_range: u32,

    #[command(flatten)]
    pub matching: MatchingArgs,
}

#[derive(Args, Debug)]
pub struct CleanCharitiesArgs {
    /// NCCS core charities CSV
    #[arg(long)]
    pub input: PathBuf,

    /// CSV with `Ein` and `State` columns
    #[arg(long)]
    pub ein_mapping: PathBuf,

    #[arg(long, default_value = "cleaned_charities.csv")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct CleanEmploymentArgs {
    /// QCEW nonprofit employment CSV export
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "cleaned_nonprofit_employment.csv")]
    pub output: PathBuf,

    /// Keep at most this many cleaned rows
    #[arg(long)]
    pub row_limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Text to match; read from stdin when omitted
    pub text: Option<String>,

    #[command(flatten)]
    pub matching: MatchingArgs,
}
