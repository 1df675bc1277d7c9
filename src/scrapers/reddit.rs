//! Reddit subreddit scraper.
//!
//! Uses app-only OAuth (`client_credentials`) against `oauth.reddit.com`.
//! For each subreddit the all-time top posts are paged through, filtered by
//! the optional date window, and matched against the registry with
//! [`MatchOptions::subreddit_posts`](crate::matcher::MatchOptions::subreddit_posts).
//! Only matched posts are kept, and only their comment trees are fetched.
//!
//! # Comment limits
//!
//! Comment trees are flattened with
//! [`collect_bounded`](crate::comments::collect_bounded): by default three
//! comments per level, two levels deep. "Load more" stubs are ignored.

use super::ScrapeBatch;
use crate::api::{FetchJson, HttpJson, RetryFetch, retrying};
use crate::comments::{CommentNode, TraversalLimits, collect_bounded};
use crate::error::{Error, Result};
use crate::matcher::NgoMatcher;
use crate::models::{CommentRecord, ContentRecord, ContentType, Platform};
use crate::utils::{DateWindow, format_timestamp, from_unix_seconds};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
/// Reddit's maximum listing page size.
const PAGE_SIZE: usize = 100;

pub const DEFAULT_MAX_POSTS: usize = 300;
pub const DEFAULT_MAX_COMMENTS_PER_DEPTH: usize = 3;
pub const DEFAULT_MAX_COMMENT_DEPTH: usize = 2;
pub const DEFAULT_DATE_RANGE: u32 = 3;

/// Subreddits scraped when none are given on the command line.
pub const DEFAULT_SUBREDDITS: &[&str] = &[
    "nonprofit",
    "charity",
    "charities",
    "CharitableDonations",
    "NGOs",
    "socialgood",
    "volunteer",
    "Philanthropy",
    "fundraiser",
    "community",
    "GlobalDevelopment",
    "humanrights",
    "Assistance",
    "Fundraisers",
    "GoFundMe",
    "MutualAid",
    "helpit",
    "humanitarian",
    "Donation",
    "donate",
    "volunteering",
    "nycvolunteers",
    "volunteertoronto",
];

/// Script-app credentials.
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

/// Per-run limits.
#[derive(Debug, Clone, Copy)]
pub struct RedditOptions {
    pub max_posts: usize,
    pub comment_limits: TraversalLimits,
    pub window: Option<DateWindow>,
}

impl Default for RedditOptions {
    fn default() -> Self {
        Self {
            max_posts: DEFAULT_MAX_POSTS,
            comment_limits: TraversalLimits {
                max_depth: DEFAULT_MAX_COMMENT_DEPTH,
                max_siblings: DEFAULT_MAX_COMMENTS_PER_DEPTH,
            },
            window: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

/// A submission as returned inside a listing's `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    pub author: Option<String>,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    pub ups: Option<i64>,
    #[serde(default)]
    pub num_comments: i64,
}

/// A comment with its already-parsed replies.
#[derive(Debug, Clone)]
pub struct RedditComment {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub created_utc: f64,
    pub ups: i64,
    pub parent_id: Option<String>,
    pub permalink: String,
    pub replies: Vec<RedditComment>,
}

impl CommentNode for RedditComment {
    fn replies(&self) -> &[Self] {
        &self.replies
    }
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    author: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    ups: i64,
    parent_id: Option<String>,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    replies: Value,
}

/// Authenticated Reddit API client.
#[derive(Debug)]
pub struct RedditClient {
    api: RetryFetch<HttpJson>,
}

impl RedditClient {
    /// Obtain an app-only access token.
    #[instrument(level = "info", skip_all)]
    pub async fn connect(credentials: &RedditCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let response = http
            .post(TOKEN_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!("token endpoint returned {status}")));
        }
        let token: TokenResponse = response.json().await?;
        let access_token = match (token.access_token, token.error) {
            (Some(t), _) => t,
            (None, Some(e)) => return Err(Error::Auth(e)),
            (None, None) => return Err(Error::Auth("no access token in response".into())),
        };
        info!("Obtained Reddit access token");
        Ok(Self {
            api: retrying(HttpJson::with_bearer(http, access_token)),
        })
    }

    /// All-time top posts of `subreddit`, up to `limit`.
    #[instrument(level = "info", skip(self))]
    pub async fn top_posts(&self, subreddit: &str, limit: usize) -> Result<Vec<RedditPost>> {
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let page_size = PAGE_SIZE.min(limit - posts.len()).to_string();
            let mut url = Url::parse(&format!("{API_BASE}/r/{subreddit}/top"))?;
            url.query_pairs_mut()
                .append_pair("t", "all")
                .append_pair("limit", &page_size)
                .append_pair("raw_json", "1");
            if let Some(cursor) = &after {
                url.query_pairs_mut().append_pair("after", cursor);
            }

            let listing = self.api.fetch_json(url.as_str()).await?;
            let children = listing["data"]["children"]
                .as_array()
                .ok_or_else(|| Error::Malformed(format!("listing for r/{subreddit} has no children")))?;
            if children.is_empty() {
                break;
            }
            for child in children {
                match serde_json::from_value::<RedditPost>(child["data"].clone()) {
                    Ok(post) => posts.push(post),
                    Err(e) => warn!(error = %e, "Skipping malformed post"),
                }
            }
            after = listing["data"]["after"].as_str().map(str::to_string);
            if after.is_none() {
                break;
            }
        }
        posts.truncate(limit);
        debug!(count = posts.len(), "Fetched top posts");
        Ok(posts)
    }

    /// Comment forest of a post, as deep as `max_depth`.
    #[instrument(level = "debug", skip(self))]
    pub async fn comments(&self, post_id: &str, max_depth: usize) -> Result<Vec<RedditComment>> {
        let mut url = Url::parse(&format!("{API_BASE}/comments/{post_id}"))?;
        url.query_pairs_mut()
            .append_pair("depth", &max_depth.max(1).to_string())
            .append_pair("raw_json", "1");
        let response = self.api.fetch_json(url.as_str()).await?;
        // [post listing, comment listing]
        let listing = response
            .get(1)
            .ok_or_else(|| Error::Malformed(format!("no comment listing for post {post_id}")))?;
        Ok(parse_comment_listing(listing))
    }
}

/// Turn a listing of `t1` things into comment trees, dropping "more" stubs
/// and anything that does not parse.
pub fn parse_comment_listing(listing: &Value) -> Vec<RedditComment> {
    let Some(children) = listing["data"]["children"].as_array() else {
        return Vec::new();
    };
    children
        .iter()
        .filter(|child| child["kind"] == "t1")
        .filter_map(|child| match serde_json::from_value::<RawComment>(child["data"].clone()) {
            Ok(raw) => Some(RedditComment {
                replies: parse_comment_listing(&raw.replies),
                id: raw.id,
                author: raw.author,
                body: raw.body,
                created_utc: raw.created_utc,
                ups: raw.ups,
                parent_id: raw.parent_id,
                permalink: raw.permalink,
            }),
            Err(e) => {
                warn!(error = %e, "Skipping malformed comment");
                None
            }
        })
        .collect()
}

/// Normalise a post into a content row.
pub fn post_to_content(post: &RedditPost) -> ContentRecord {
    let published_at = from_unix_seconds(post.created_utc)
        .map(format_timestamp)
        .unwrap_or_default();
    ContentRecord {
        external_content_id: post.id.clone(),
        platform_id: Platform::Reddit.id(),
        title: post.title.clone(),
        description: post.selftext.clone(),
        url: post.url.clone(),
        author: post.author.clone(),
        published_at,
        view_count: post.score,
        like_count: post.ups.unwrap_or(post.score),
        comment_count: post.num_comments,
        content_type: ContentType::Post,
        metadata: json!({ "url": post.url, "author": post.author }).to_string(),
    }
}

/// Flatten a comment forest into rows within `limits`.
pub fn flatten_comments(
    post_id: &str,
    forest: &[RedditComment],
    limits: TraversalLimits,
) -> Vec<CommentRecord> {
    collect_bounded(forest, limits)
        .into_iter()
        .map(|visited| {
            let comment = visited.node;
            CommentRecord {
                comment_id: comment.id.clone(),
                post_external_id: post_id.to_string(),
                author: comment.author.clone(),
                body: comment.body.clone(),
                created_at: from_unix_seconds(comment.created_utc)
                    .map(format_timestamp)
                    .unwrap_or_default(),
                like_count: comment.ups,
                reply_count: comment.replies.len() as i64,
                parent_id: comment.parent_id.clone(),
                metadata: json!({ "permalink": comment.permalink, "depth": visited.depth }).to_string(),
            }
        })
        .collect()
}

/// Whether a post falls inside the optional date window.
fn in_window(post: &RedditPost, window: Option<&DateWindow>) -> bool {
    match window {
        None => true,
        Some(w) => from_unix_seconds(post.created_utc).is_some_and(|t| w.contains(t)),
    }
}

/// Scrape one subreddit. Access failures are logged and yield an empty batch.
#[instrument(level = "info", skip(client, matcher, options))]
pub async fn scrape_subreddit(
    client: &RedditClient,
    subreddit: &str,
    matcher: &NgoMatcher,
    options: &RedditOptions,
) -> ScrapeBatch {
    let mut batch = ScrapeBatch::default();
    let posts = match client.top_posts(subreddit, options.max_posts).await {
        Ok(posts) => posts,
        Err(e) => {
            error!(%subreddit, error = %e, "Error accessing subreddit");
            return batch;
        }
    };

    let total = posts.len();
    for (idx, post) in posts.iter().enumerate() {
        if (idx + 1) % 100 == 0 {
            info!(processed = idx + 1, total, %subreddit, "Processed posts");
        }
        if !in_window(post, options.window.as_ref()) {
            continue;
        }
        let content = post_to_content(post);
        let matched = matcher.find(&content.searchable_text());
        if matched.is_empty() {
            continue;
        }
        batch.mentions.record(&post.id, matched);
        batch.contents.push(content);

        match client.comments(&post.id, options.comment_limits.max_depth).await {
            Ok(forest) => batch
                .comments
                .extend(flatten_comments(&post.id, &forest, options.comment_limits)),
            Err(e) => warn!(post_id = %post.id, error = %e, "Failed to fetch comments; keeping post"),
        }
    }

    info!(
        %subreddit,
        matched_posts = batch.contents.len(),
        unique_ngos = batch.mentions.ngo_ids().len(),
        "Finished subreddit"
    );
    batch
}

/// Scrape several subreddits in order and merge the results.
pub async fn scrape_subreddits(
    client: &RedditClient,
    subreddits: &[String],
    matcher: &NgoMatcher,
    options: &RedditOptions,
) -> ScrapeBatch {
    debug!(options = ?matcher.options(), "Matching subreddit posts");
    let mut all = ScrapeBatch::default();
    for subreddit in subreddits {
        info!(%subreddit, "Starting to scrape subreddit");
        all.merge(scrape_subreddit(client, subreddit, matcher, options).await);
    }
    all
}
