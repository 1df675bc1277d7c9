//! Platform fetchers that collect posts, videos and comments mentioning NGOs.
//!
//! Each fetcher pulls content from one platform, normalises it into
//! [`ContentRecord`]s and [`CommentRecord`]s, runs every item through the
//! [`NgoMatcher`](crate::matcher::NgoMatcher) and returns a [`ScrapeBatch`].
//!
//! # Supported Platforms
//!
//! | Platform | Module | Method | Matching | Notes |
//! |----------|--------|--------|----------|-------|
//! | Reddit | [`reddit`] | OAuth API | global fuzzy fallback | Only matched posts kept |
//! | YouTube | [`youtube`] | Data API v3 | per-keyword fuzzy | Every video kept |
//! | Bluesky | [`bluesky`] | Public search API | exact only | No auth required |
//!
//! # Common Patterns
//!
//! - Items are fetched and matched one at a time, never concurrently
//! - A failure on one subreddit, channel, keyword or item is logged and
//!   skipped; the run carries on with the rest
//! - Timestamps are rendered as `YYYY-MM-DD HH:MM:SS`

pub mod bluesky;
pub mod reddit;
pub mod youtube;

use crate::mentions::MentionSet;
use crate::models::{CommentRecord, ContentRecord, NgoId};
use std::collections::BTreeSet;

/// Everything one scraping run produced.
#[derive(Debug, Clone, Default)]
pub struct ScrapeBatch {
    pub contents: Vec<ContentRecord>,
    pub comments: Vec<CommentRecord>,
    pub mentions: MentionSet,
}

impl ScrapeBatch {
    pub fn merge(&mut self, other: ScrapeBatch) {
        self.contents.extend(other.contents);
        self.comments.extend(other.comments);
        self.mentions.merge(other.mentions);
    }

    /// Distinct NGOs mentioned anywhere in the batch.
    pub fn ngos_found(&self) -> BTreeSet<NgoId> {
        self.mentions.ngo_ids()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty() && self.comments.is_empty() && self.mentions.is_empty()
    }
}
