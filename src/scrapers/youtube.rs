//! YouTube channel scraper using the Data API v3.
//!
//! # Channel Selection
//!
//! Channels are either given by name on the command line, or derived from
//! the registry: NGOs are shuffled and each is resolved by its name, then by
//! each keyword in turn, until enough channels are found.
//!
//! # Per Channel
//!
//! 1. `search` for the channel's most recent videos (optionally inside a date
//!    window), 50 ids per page
//! 2. `videos` for title, description, statistics and duration of each id
//! 3. Every video is kept; matched ones also get mention records
//! 4. `commentThreads` for up to `max_comments` top-level comments, with
//!    their inline replies when nested comments are requested
//!
//! A failure on one channel is logged and the next channel is scraped.

use super::ScrapeBatch;
use crate::api::{FetchJson, HttpJson, RetryFetch, retrying};
use crate::error::{Error, Result};
use crate::matcher::NgoMatcher;
use crate::models::{CommentRecord, ContentRecord, ContentType, Ngo, NgoId, Platform};
use crate::registry::NgoRegistry;
use crate::utils::{DateWindow, normalize_timestamp};
use futures::stream::{self, StreamExt};
use rand::rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const SEARCH_PAGE_SIZE: usize = 50;
const COMMENT_PAGE_SIZE: usize = 100;

pub const DEFAULT_MAX_RESULTS: usize = 20;
pub const DEFAULT_MAX_CHANNELS: usize = 10;
pub const DEFAULT_MAX_COMMENTS: usize = 30;
pub const DEFAULT_DATE_RANGE: u32 = 14;

/// A channel to scrape and the NGO it was resolved from, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub ngo_id: Option<NgoId>,
    /// Name or keyword the channel was found by.
    pub channel_name: String,
    pub channel_id: String,
}

/// Per-run limits.
#[derive(Debug, Clone, Copy)]
pub struct YouTubeOptions {
    pub max_results: usize,
    pub max_comments: usize,
    pub nested_comments: bool,
    pub window: Option<DateWindow>,
}

impl Default for YouTubeOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            max_comments: DEFAULT_MAX_COMMENTS,
            nested_comments: false,
            window: None,
        }
    }
}

/// Data API client, generic over the JSON transport.
#[derive(Debug)]
pub struct YouTubeClient<F = RetryFetch<HttpJson>> {
    api: F,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self::with_fetcher(retrying(HttpJson::new(http)), api_key)
    }
}

impl<F: FetchJson> YouTubeClient<F> {
    pub fn with_fetcher(api: F, api_key: String) -> Self {
        Self { api, api_key }
    }

    fn endpoint(&self, resource: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{API_BASE}/{resource}"))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("key", &self.api_key);
        }
        Ok(url)
    }

    /// First channel the search API returns for `name`.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_channel(&self, name: &str) -> Result<Option<String>> {
        let url = self.endpoint(
            "search",
            &[
                ("part", "snippet".into()),
                ("q", name.into()),
                ("type", "channel".into()),
                ("maxResults", "1".into()),
            ],
        )?;
        let response = self.api.fetch_json(url.as_str()).await?;
        let channel_id = response["items"]
            .get(0)
            .and_then(|item| {
                item["snippet"]["channelId"]
                    .as_str()
                    .or_else(|| item["id"]["channelId"].as_str())
            })
            .map(str::to_string);
        Ok(channel_id)
    }

    /// Ids of the channel's newest videos, up to `max_results`.
    #[instrument(level = "info", skip(self, window))]
    pub async fn video_ids(
        &self,
        channel_id: &str,
        max_results: usize,
        window: Option<&DateWindow>,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < max_results {
            let mut params = vec![
                ("part", "snippet".to_string()),
                ("channelId", channel_id.to_string()),
                ("maxResults", SEARCH_PAGE_SIZE.min(max_results - ids.len()).to_string()),
                ("order", "date".to_string()),
                ("type", "video".to_string()),
            ];
            if let Some(w) = window {
                params.push(("publishedAfter", w.start_rfc3339()));
                params.push(("publishedBefore", w.end_rfc3339()));
            }
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self.api.fetch_json(self.endpoint("search", &params)?.as_str()).await?;
            let items = response["items"].as_array().cloned().unwrap_or_default();
            if items.is_empty() {
                break;
            }
            ids.extend(
                items
                    .iter()
                    .filter_map(|item| item["id"]["videoId"].as_str())
                    .map(str::to_string),
            );
            page_token = response["nextPageToken"].as_str().map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        ids.truncate(max_results);
        debug!(count = ids.len(), "Listed channel videos");
        Ok(ids)
    }

    /// Details of one video as content rows (empty when the id is unknown).
    #[instrument(level = "debug", skip(self))]
    pub async fn video_details(&self, video_id: &str) -> Result<Vec<ContentRecord>> {
        let url = self.endpoint(
            "videos",
            &[
                ("part", "snippet,statistics,contentDetails".into()),
                ("id", video_id.into()),
            ],
        )?;
        let response = self.api.fetch_json(url.as_str()).await?;
        let items = response["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .filter_map(|item| {
                let record = video_to_content(video_id, item);
                if record.is_none() {
                    warn!(%video_id, "Skipping video with malformed details");
                }
                record
            })
            .collect())
    }

    /// Up to `max_comments` top-level comments, by relevance, as plain text.
    #[instrument(level = "debug", skip(self))]
    pub async fn video_comments(
        &self,
        video_id: &str,
        max_comments: usize,
        nested: bool,
    ) -> Result<Vec<CommentRecord>> {
        let mut comments = Vec::new();
        let mut top_level = 0usize;
        let mut page_token: Option<String> = None;

        while top_level < max_comments {
            let mut params = vec![
                ("part", "snippet,replies".to_string()),
                ("videoId", video_id.to_string()),
                ("maxResults", COMMENT_PAGE_SIZE.min(max_comments - top_level).to_string()),
                ("order", "relevance".to_string()),
                ("textFormat", "plainText".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .api
                .fetch_json(self.endpoint("commentThreads", &params)?.as_str())
                .await?;
            let threads = response["items"].as_array().cloned().unwrap_or_default();
            if threads.is_empty() {
                break;
            }
            for thread in threads.iter().take(max_comments - top_level) {
                let rows = thread_to_comments(video_id, thread, nested, max_comments);
                if rows.is_empty() {
                    warn!(%video_id, "Skipping malformed comment thread");
                    continue;
                }
                top_level += 1;
                comments.extend(rows);
            }
            page_token = response["nextPageToken"].as_str().map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(comments)
    }
}

fn count(statistics: &Value, field: &str) -> i64 {
    match &statistics[field] {
        Value::String(s) => s.parse().unwrap_or(0),
        Value::Number(n) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

/// Normalise one `videos` item.
pub fn video_to_content(video_id: &str, item: &Value) -> Option<ContentRecord> {
    let snippet = item.get("snippet")?;
    let published_at = normalize_timestamp(snippet["publishedAt"].as_str()?)?;
    let statistics = &item["statistics"];
    Some(ContentRecord {
        external_content_id: video_id.to_string(),
        platform_id: Platform::YouTube.id(),
        title: snippet["title"].as_str().unwrap_or_default().to_string(),
        description: snippet["description"].as_str().unwrap_or_default().to_string(),
        url: format!("https://www.youtube.com/watch?v={video_id}"),
        author: snippet["channelTitle"].as_str().map(str::to_string),
        published_at,
        view_count: count(statistics, "viewCount"),
        like_count: count(statistics, "likeCount"),
        comment_count: count(statistics, "commentCount"),
        content_type: ContentType::Video,
        metadata: json!({ "duration": item["contentDetails"]["duration"] }).to_string(),
    })
}

fn comment_row(
    video_id: &str,
    comment: &Value,
    reply_count: i64,
    parent_id: Option<String>,
) -> Option<CommentRecord> {
    let snippet = &comment["snippet"];
    Some(CommentRecord {
        comment_id: comment["id"].as_str()?.to_string(),
        post_external_id: video_id.to_string(),
        author: snippet["authorDisplayName"].as_str().map(str::to_string),
        body: snippet["textDisplay"].as_str().unwrap_or_default().to_string(),
        created_at: snippet["publishedAt"]
            .as_str()
            .and_then(normalize_timestamp)
            .unwrap_or_default(),
        like_count: snippet["likeCount"].as_i64().unwrap_or(0),
        reply_count,
        parent_id,
        metadata: "{}".to_string(),
    })
}

/// Rows for one comment thread: the top-level comment, then (when `nested`)
/// up to `max_replies` of the replies the API returned inline.
///
/// Returns nothing when the top-level comment is malformed.
pub fn thread_to_comments(
    video_id: &str,
    thread: &Value,
    nested: bool,
    max_replies: usize,
) -> Vec<CommentRecord> {
    let snippet = &thread["snippet"];
    let reply_count = snippet["totalReplyCount"].as_i64().unwrap_or(0);
    let Some(top) = comment_row(video_id, &snippet["topLevelComment"], reply_count, None) else {
        return Vec::new();
    };
    let mut rows = vec![top];
    if nested {
        if let Some(replies) = thread["replies"]["comments"].as_array() {
            rows.extend(replies.iter().take(max_replies).filter_map(|reply| {
                let parent = reply["snippet"]["parentId"].as_str().map(str::to_string);
                comment_row(video_id, reply, 0, parent)
            }));
        }
    }
    rows
}

/// Resolve channel names given on the command line; unknown names are skipped.
#[instrument(level = "info", skip_all, fields(count = names.len()))]
pub async fn resolve_channels_by_name<F: FetchJson>(
    client: &YouTubeClient<F>,
    names: &[String],
) -> Vec<ChannelTarget> {
    let mut targets = Vec::new();
    for name in names {
        match client.resolve_channel(name).await {
            Ok(Some(channel_id)) => {
                info!(channel_name = %name, %channel_id, "Resolved channel");
                targets.push(ChannelTarget {
                    ngo_id: None,
                    channel_name: name.clone(),
                    channel_id,
                });
            }
            Ok(None) => warn!(channel_name = %name, "Could not resolve channel; skipping"),
            Err(e) => error!(channel_name = %name, error = %e, "Channel lookup failed; skipping"),
        }
    }
    targets
}

/// Look up a channel for `name`, treating lookup errors as "not found".
async fn lookup<F: FetchJson>(client: &YouTubeClient<F>, name: &str) -> Option<String> {
    match client.resolve_channel(name).await {
        Ok(found) => found,
        Err(e) => {
            warn!(%name, error = %e, "Channel lookup failed");
            None
        }
    }
}

/// Resolve channels for NGOs in `order`, by name then by keyword, stopping at
/// `max_channels`.
pub async fn resolve_channels_in_order<F: FetchJson>(
    client: &YouTubeClient<F>,
    order: &[&Ngo],
    max_channels: usize,
) -> Vec<ChannelTarget> {
    let mut targets = Vec::new();
    for ngo in order {
        if targets.len() >= max_channels {
            info!(max_channels, "Reached the channel limit");
            break;
        }
        let mut resolved = None;
        for candidate in std::iter::once(&ngo.name).chain(&ngo.keywords) {
            if candidate.trim().is_empty() {
                continue;
            }
            if let Some(channel_id) = lookup(client, candidate).await {
                resolved = Some((candidate.clone(), channel_id));
                break;
            }
        }
        match resolved {
            Some((channel_name, channel_id)) => {
                info!(ngo = %ngo.name, %channel_name, %channel_id, "Resolved NGO channel");
                targets.push(ChannelTarget {
                    ngo_id: Some(ngo.id),
                    channel_name,
                    channel_id,
                });
            }
            None => warn!(ngo = %ngo.name, "No channel found by name or keywords"),
        }
    }
    targets
}

/// Shuffle the registry and resolve up to `max_channels` channels from it.
#[instrument(level = "info", skip_all, fields(max_channels = max_channels))]
pub async fn resolve_channels_from_registry<F: FetchJson>(
    client: &YouTubeClient<F>,
    registry: &NgoRegistry,
    max_channels: usize,
) -> Vec<ChannelTarget> {
    let mut order: Vec<_> = registry.iter().collect();
    order.shuffle(&mut rng());
    resolve_channels_in_order(client, &order, max_channels).await
}

/// Scrape a single channel.
#[instrument(level = "info", skip_all, fields(channel = %target.channel_name))]
pub async fn scrape_channel<F: FetchJson>(
    client: &YouTubeClient<F>,
    target: &ChannelTarget,
    matcher: &NgoMatcher,
    options: &YouTubeOptions,
) -> Result<ScrapeBatch> {
    let ids = client
        .video_ids(&target.channel_id, options.max_results, options.window.as_ref())
        .await?;
    info!(count = ids.len(), "Found channel videos");

    let per_video: Vec<ScrapeBatch> = stream::iter(ids)
        .then(|video_id| async move {
            let mut batch = ScrapeBatch::default();
            match client.video_details(&video_id).await {
                Ok(details) => {
                    for content in details {
                        let matched = matcher.find(&content.searchable_text());
                        batch.mentions.record(&content.external_content_id, matched);
                        batch.contents.push(content);
                    }
                }
                Err(e) => warn!(%video_id, error = %e, "Failed to fetch video details"),
            }
            match client
                .video_comments(&video_id, options.max_comments, options.nested_comments)
                .await
            {
                Ok(comments) => batch.comments.extend(comments),
                Err(e) => warn!(%video_id, error = %e, "Failed to fetch comments"),
            }
            batch
        })
        .collect()
        .await;

    let mut batch = ScrapeBatch::default();
    for video in per_video {
        batch.merge(video);
    }
    Ok(batch)
}

/// Scrape every channel in order, isolating per-channel failures.
pub async fn scrape_channels<F: FetchJson>(
    client: &YouTubeClient<F>,
    targets: &[ChannelTarget],
    matcher: &NgoMatcher,
    options: &YouTubeOptions,
) -> ScrapeBatch {
    let mut all = ScrapeBatch::default();
    for target in targets {
        info!(channel = %target.channel_name, channel_id = %target.channel_id, "Scraping channel");
        match scrape_channel(client, target, matcher, options).await {
            Ok(batch) => {
                info!(
                    channel = %target.channel_name,
                    videos = batch.contents.len(),
                    comments = batch.comments.len(),
                    "Completed channel"
                );
                all.merge(batch);
            }
            Err(e) => error!(channel = %target.channel_name, error = %e, "Error scraping channel"),
        }
    }
    all
}

/// Fail early on an obviously unusable key.
pub fn check_api_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(Error::Auth("YouTube API key is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchOptions;

    /// Serves canned responses keyed on URL substrings; unknown URLs 404.
    struct Canned(Vec<(&'static str, Value)>);

    impl FetchJson for Canned {
        async fn fetch_json(&self, url: &str) -> Result<Value> {
            self.0
                .iter()
                .find(|(needle, _)| url.contains(needle))
                .map(|(_, value)| value.clone())
                .ok_or_else(|| Error::Status { status: 404, url: url.to_string() })
        }
    }

    fn registry() -> NgoRegistry {
        NgoRegistry::from_ngos(vec![
            Ngo {
                id: 1,
                name: "American Red Cross".into(),
                keywords: vec!["American Red Cross".into(), "Red Cross".into(), "ARC".into()],
            },
            Ngo {
                id: 4,
                name: "World Wildlife Fund".into(),
                keywords: vec!["World Wildlife Fund".into(), "WWF".into()],
            },
        ])
        .unwrap()
    }

    fn video_item(title: &str) -> Value {
        json!({
            "snippet": {
                "title": title,
                "description": "",
                "channelTitle": "Some Channel",
                "publishedAt": "2025-04-14T13:50:14Z"
            },
            "statistics": { "viewCount": "1200", "likeCount": "34" },
            "contentDetails": { "duration": "PT4M13S" }
        })
    }

    fn thread() -> Value {
        json!({
            "snippet": {
                "totalReplyCount": 2,
                "topLevelComment": {
                    "id": "top1",
                    "snippet": {
                        "authorDisplayName": "viewer",
                        "textDisplay": "great video",
                        "publishedAt": "2025-04-15T08:00:00Z",
                        "likeCount": 3
                    }
                }
            },
            "replies": { "comments": [
                { "id": "r1", "snippet": { "textDisplay": "agreed", "parentId": "top1", "publishedAt": "2025-04-15T09:00:00Z" } },
                { "id": "r2", "snippet": { "textDisplay": "same", "parentId": "top1", "publishedAt": "2025-04-15T10:00:00Z" } }
            ] }
        })
    }

    #[test]
    fn test_video_to_content() {
        let content = video_to_content("vid1", &video_item("Hello")).unwrap();
        assert_eq!(content.platform_id, 2);
        assert_eq!(content.url, "https://www.youtube.com/watch?v=vid1");
        assert_eq!(content.view_count, 1200);
        assert_eq!(content.like_count, 34);
        assert_eq!(content.comment_count, 0);
        assert_eq!(content.published_at, "2025-04-14 13:50:14");
        assert_eq!(content.metadata, r#"{"duration":"PT4M13S"}"#);
        assert_eq!(content.content_type, ContentType::Video);
    }

    #[test]
    fn test_video_without_snippet_is_skipped() {
        assert!(video_to_content("vid1", &json!({ "statistics": {} })).is_none());
    }

    #[test]
    fn test_thread_to_comments_nested_and_flat() {
        let flat = thread_to_comments("vid1", &thread(), false, 30);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].reply_count, 2);
        assert_eq!(flat[0].parent_id, None);
        assert_eq!(flat[0].created_at, "2025-04-15 08:00:00");

        let nested = thread_to_comments("vid1", &thread(), true, 1);
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[1].comment_id, "r1");
        assert_eq!(nested[1].parent_id.as_deref(), Some("top1"));
        assert_eq!(nested[1].reply_count, 0);
    }

    #[tokio::test]
    async fn test_resolve_channel_reads_first_item() {
        let client = YouTubeClient::with_fetcher(
            Canned(vec![("search", json!({ "items": [{ "snippet": { "channelId": "UC123" } }] }))]),
            "key".into(),
        );
        assert_eq!(client.resolve_channel("Red Cross").await.unwrap().as_deref(), Some("UC123"));
    }

    #[tokio::test]
    async fn test_resolve_in_order_falls_back_to_keywords() {
        let client = YouTubeClient::with_fetcher(
            Canned(vec![
                ("q=WWF", json!({ "items": [{ "id": { "channelId": "UCwwf" } }] })),
                ("search", json!({ "items": [] })),
            ]),
            "key".into(),
        );
        let registry = registry();
        let order: Vec<_> = registry.iter().collect();
        let targets = resolve_channels_in_order(&client, &order, 10).await;
        assert_eq!(
            targets,
            vec![ChannelTarget {
                ngo_id: Some(4),
                channel_name: "WWF".into(),
                channel_id: "UCwwf".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_scrape_channel_keeps_all_videos_and_records_matches() {
        let client = YouTubeClient::with_fetcher(
            Canned(vec![
                (
                    "search",
                    json!({ "items": [
                        { "id": { "videoId": "v1" } },
                        { "id": { "videoId": "v2" } }
                    ] }),
                ),
                ("id=v1", json!({ "items": [video_item("Support the red cross")] })),
                ("id=v2", json!({ "items": [video_item("Cooking pasta")] })),
                ("commentThreads", json!({ "items": [thread()] })),
            ]),
            "key".into(),
        );
        let registry = registry();
        let matcher = NgoMatcher::new(&registry, MatchOptions::videos(90));
        let target = ChannelTarget {
            ngo_id: None,
            channel_name: "test".into(),
            channel_id: "UC1".into(),
        };
        let batch = scrape_channel(&client, &target, &matcher, &YouTubeOptions::default())
            .await
            .unwrap();
        assert_eq!(batch.contents.len(), 2);
        assert_eq!(batch.comments.len(), 2);
        let mentions: Vec<_> = batch.mentions.iter().cloned().collect();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].ngo_id, 1);
        assert_eq!(mentions[0].external_content_id, "v1");
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_abort_run() {
        let client = YouTubeClient::with_fetcher(Canned(vec![]), "key".into());
        let registry = registry();
        let matcher = NgoMatcher::new(&registry, MatchOptions::videos(90));
        let targets = vec![ChannelTarget {
            ngo_id: None,
            channel_name: "gone".into(),
            channel_id: "UCgone".into(),
        }];
        let batch = scrape_channels(&client, &targets, &matcher, &YouTubeOptions::default()).await;
        assert!(batch.is_empty());
    }

    #[test]
    fn test_check_api_key() {
        assert!(check_api_key("  ").is_err());
        assert!(check_api_key("abc").is_ok());
    }
}
