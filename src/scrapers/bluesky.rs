//! Bluesky keyword search via the public AppView.
//!
//! `app.bsky.feed.searchPosts` needs no authentication. Each keyword is
//! searched as a quoted phrase, either sorted (`top` / `latest`) or within a
//! `since` / `until` window when a target date is given.
//!
//! Posts found for a keyword are attributed to the NGO(s) that keyword was
//! searched for. The text is also run through the matcher so posts that name
//! further NGOs pick those up too.

use super::ScrapeBatch;
use crate::api::{FetchJson, HttpJson, RetryFetch, retrying};
use crate::error::{Error, Result};
use crate::matcher::NgoMatcher;
use crate::models::{ContentRecord, ContentType, NgoId, Platform};
use crate::registry::NgoRegistry;
use crate::utils::{DateWindow, normalize_timestamp};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

const SEARCH_URL: &str = "https://public.api.bsky.app/xrpc/app.bsky.feed.searchPosts";

pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_DATE_RANGE: u32 = 0;

/// Result ordering when no date window is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortMethod {
    Top,
    #[default]
    Latest,
}

impl SortMethod {
    fn as_str(self) -> &'static str {
        match self {
            SortMethod::Top => "top",
            SortMethod::Latest => "latest",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlueskyOptions {
    pub max_results: usize,
    pub sort: SortMethod,
    pub window: Option<DateWindow>,
}

impl Default for BlueskyOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            sort: SortMethod::default(),
            window: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
struct PostView {
    uri: Option<String>,
    author: Option<Author>,
    #[serde(default)]
    record: PostBody,
    #[serde(rename = "likeCount", default)]
    like_count: i64,
    #[serde(rename = "replyCount", default)]
    reply_count: i64,
}

#[derive(Debug, Deserialize)]
struct Author {
    handle: String,
}

#[derive(Debug, Default, Deserialize)]
struct PostBody {
    text: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
}

/// Build the search URL for one keyword.
pub fn search_url(keyword: &str, options: &BlueskyOptions) -> Result<Url> {
    let query = format!("\"{keyword}\"");
    let limit = options.max_results.to_string();
    let mut params = vec![("q", query), ("limit", limit)];
    match &options.window {
        Some(w) => {
            params.push(("since", w.start_rfc3339()));
            params.push(("until", w.end_rfc3339()));
        }
        None => params.push(("sort", options.sort.as_str().to_string())),
    }
    Ok(Url::parse_with_params(SEARCH_URL, &params)?)
}

/// Web URL of a post, from its `at://<did>/app.bsky.feed.post/<rkey>` URI.
pub fn post_url(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("at://")?;
    let mut parts = rest.split('/');
    let did = parts.next().filter(|s| !s.is_empty())?;
    let _collection = parts.next()?;
    let post_id = parts.next().filter(|s| !s.is_empty())?;
    Some(format!("https://bsky.app/profile/{did}/post/{post_id}"))
}

/// Public search client, generic over the JSON transport.
#[derive(Debug)]
pub struct BlueskyClient<F = RetryFetch<HttpJson>> {
    api: F,
}

impl BlueskyClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_fetcher(retrying(HttpJson::new(http)))
    }
}

impl<F: FetchJson> BlueskyClient<F> {
    pub fn with_fetcher(api: F) -> Self {
        Self { api }
    }

    /// Posts matching `keyword`. Posts without a URI, text or a parseable
    /// creation date are dropped.
    #[instrument(level = "info", skip(self, options))]
    pub async fn search_posts(&self, keyword: &str, options: &BlueskyOptions) -> Result<Vec<ContentRecord>> {
        if keyword.trim().is_empty() {
            return Err(Error::Malformed("empty search keyword".into()));
        }
        let url = search_url(keyword, options)?;
        let value = self.api.fetch_json(url.as_str()).await?;
        let response: SearchResponse = serde_json::from_value(value)
            .map_err(|e| Error::Malformed(format!("searchPosts response: {e}")))?;

        let total = response.posts.len();
        let records: Vec<ContentRecord> = response.posts.into_iter().filter_map(post_to_content).collect();
        if records.len() < total {
            warn!(dropped = total - records.len(), "Dropped posts missing a URI, text or valid date");
        }
        debug!(count = records.len(), "Found posts");
        Ok(records)
    }
}

fn post_to_content(post: PostView) -> Option<ContentRecord> {
    let uri = post.uri.filter(|u| !u.is_empty())?;
    let text = post.record.text.filter(|t| !t.is_empty())?;
    let published_at = post
        .record
        .created_at
        .as_deref()
        .filter(|raw| *raw != "0000-00-00 00:00:00")
        .and_then(normalize_timestamp)?;
    Some(ContentRecord {
        url: post_url(&uri).unwrap_or_default(),
        external_content_id: uri,
        platform_id: Platform::Bluesky.id(),
        title: String::new(),
        description: text,
        author: post.author.map(|a| a.handle),
        published_at,
        view_count: 0,
        like_count: post.like_count,
        comment_count: post.reply_count,
        content_type: ContentType::Post,
        metadata: "{}".to_string(),
    })
}

/// One search to run and the NGOs its results are attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuery {
    pub keyword: String,
    pub ngo_ids: Vec<NgoId>,
}

/// Searches for a single keyword given on the command line, attributed to
/// every NGO that lists it.
pub fn queries_for_keyword(registry: &NgoRegistry, keyword: &str) -> Vec<KeywordQuery> {
    let ngo_ids: Vec<NgoId> = registry.with_keyword(keyword).iter().map(|n| n.id).collect();
    if ngo_ids.is_empty() {
        warn!(%keyword, "Keyword is not listed by any NGO; only matcher hits will be recorded");
    }
    vec![KeywordQuery {
        keyword: keyword.to_string(),
        ngo_ids,
    }]
}

/// One search per keyword of every NGO, in registry order.
pub fn queries_for_registry(registry: &NgoRegistry) -> Vec<KeywordQuery> {
    registry
        .iter()
        .flat_map(|ngo| {
            ngo.keywords
                .iter()
                .filter(|kw| !kw.trim().is_empty())
                .map(|kw| KeywordQuery {
                    keyword: kw.clone(),
                    ngo_ids: vec![ngo.id],
                })
        })
        .collect()
}

/// Run every query in order. A failed search is logged and skipped.
#[instrument(level = "info", skip_all, fields(queries = queries.len()))]
pub async fn scrape_keywords<F: FetchJson>(
    client: &BlueskyClient<F>,
    queries: &[KeywordQuery],
    matcher: &NgoMatcher,
    options: &BlueskyOptions,
) -> ScrapeBatch {
    let batches: Vec<ScrapeBatch> = stream::iter(queries)
        .then(|query| async move {
            let mut batch = ScrapeBatch::default();
            match client.search_posts(&query.keyword, options).await {
                Ok(posts) => {
                    for post in posts {
                        let found = matcher.find(&post.searchable_text());
                        batch.mentions.record(
                            &post.external_content_id,
                            query.ngo_ids.iter().copied().chain(found),
                        );
                        batch.contents.push(post);
                    }
                }
                Err(e) => warn!(keyword = %query.keyword, error = %e, "Search failed; skipping keyword"),
            }
            batch
        })
        .collect()
        .await;

    let mut all = ScrapeBatch::default();
    for batch in batches {
        all.merge(batch);
    }
    info!(
        posts = all.contents.len(),
        mentions = all.mentions.len(),
        unique_ngos = all.ngos_found().len(),
        "Finished Bluesky search"
    );
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchOptions;
    use crate::models::Ngo;
    use chrono::NaiveDate;
    use serde_json::{Value, json};

    struct Canned(Value);

    impl FetchJson for Canned {
        async fn fetch_json(&self, url: &str) -> Result<Value> {
            if url.contains("q=%22broken%22") {
                return Err(Error::Status { status: 400, url: url.to_string() });
            }
            Ok(self.0.clone())
        }
    }

    fn registry() -> NgoRegistry {
        NgoRegistry::from_ngos(vec![
            Ngo {
                id: 1,
                name: "American Red Cross".into(),
                keywords: vec!["Red Cross".into()],
            },
            Ngo {
                id: 4,
                name: "World Wildlife Fund".into(),
                keywords: vec!["WWF".into()],
            },
            Ngo {
                id: 7,
                name: "Red Cross Chapter".into(),
                keywords: vec!["Red Cross".into()],
            },
        ])
        .unwrap()
    }

    fn response() -> Value {
        json!({
            "posts": [
                {
                    "uri": "at://did:plc:abc123/app.bsky.feed.post/3kxyz",
                    "author": { "handle": "someone.bsky.social" },
                    "record": { "text": "Donated to the Red Cross and WWF", "createdAt": "2025-04-14T13:50:14.61812900+00:00" },
                    "likeCount": 5,
                    "replyCount": 2
                },
                {
                    "uri": "at://did:plc:abc123/app.bsky.feed.post/3knotext",
                    "author": { "handle": "someone.bsky.social" },
                    "record": { "createdAt": "2025-04-14T13:50:14Z" }
                },
                {
                    "uri": "at://did:plc:abc123/app.bsky.feed.post/3kbaddate",
                    "author": { "handle": "someone.bsky.social" },
                    "record": { "text": "hello", "createdAt": "0000-00-00 00:00:00" }
                },
                {
                    "author": { "handle": "nouri.bsky.social" },
                    "record": { "text": "no uri", "createdAt": "2025-04-14T13:50:14Z" }
                }
            ]
        })
    }

    #[test]
    fn test_post_url() {
        assert_eq!(
            post_url("at://did:plc:abc123/app.bsky.feed.post/3kxyz").as_deref(),
            Some("https://bsky.app/profile/did:plc:abc123/post/3kxyz")
        );
        assert_eq!(post_url("https://example.com"), None);
        assert_eq!(post_url("at://did:plc:abc123"), None);
        assert_eq!(
            post_url("at://did:web:example.com/app.bsky.feed.post/3kabc").as_deref(),
            Some("https://bsky.app/profile/did:web:example.com/post/3kabc")
        );
    }

    #[test]
    fn test_search_url_sort_and_window() {
        let url = search_url("Red Cross", &BlueskyOptions::default()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://public.api.bsky.app/xrpc/app.bsky.feed.searchPosts?q=%22Red+Cross%22&limit=10&sort=latest"
        );

        let options = BlueskyOptions {
            window: Some(DateWindow::around(NaiveDate::from_ymd_opt(2025, 4, 14).unwrap(), 0)),
            ..BlueskyOptions::default()
        };
        let url = search_url("WWF", &options).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("since".into(), "2025-04-14T00:00:00Z".into())));
        assert!(pairs.contains(&("until".into(), "2025-04-15T00:00:00Z".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "sort"));
    }

    #[tokio::test]
    async fn test_search_posts_drops_incomplete_posts() {
        let client = BlueskyClient::with_fetcher(Canned(response()));
        let posts = client.search_posts("Red Cross", &BlueskyOptions::default()).await.unwrap();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.platform_id, 3);
        assert_eq!(post.published_at, "2025-04-14 13:50:14");
        assert_eq!(post.url, "https://bsky.app/profile/did:plc:abc123/post/3kxyz");
        assert_eq!(post.author.as_deref(), Some("someone.bsky.social"));
        assert_eq!(post.like_count, 5);
        assert_eq!(post.comment_count, 2);
        assert_eq!(post.title, "");
    }

    #[test]
    fn test_queries_for_keyword_attributes_all_owners() {
        let queries = queries_for_keyword(&registry(), "Red Cross");
        assert_eq!(queries[0].ngo_ids, vec![1, 7]);
        assert_eq!(queries_for_registry(&registry()).len(), 3);
    }

    #[tokio::test]
    async fn test_scrape_keywords_unions_attribution_and_matches() {
        let registry = registry();
        let matcher = NgoMatcher::new(&registry, MatchOptions::exact_only());
        let client = BlueskyClient::with_fetcher(Canned(response()));
        let queries = vec![
            KeywordQuery { keyword: "broken".into(), ngo_ids: vec![1] },
            KeywordQuery { keyword: "WWF".into(), ngo_ids: vec![4] },
        ];
        let batch = scrape_keywords(&client, &queries, &matcher, &BlueskyOptions::default()).await;
        assert_eq!(batch.contents.len(), 1);
        assert_eq!(batch.ngos_found().into_iter().collect::<Vec<_>>(), vec![1, 4, 7]);
        assert_eq!(batch.mentions.len(), 3);
    }
}
