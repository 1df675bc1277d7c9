//! Data models for NGOs, scraped content and the records written to disk.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Ngo`]: One entry of the NGO registry
//! - [`ContentRecord`]: A post or video normalised across platforms
//! - [`CommentRecord`]: A comment attached to a content item
//! - [`MentionRecord`]: An (NGO, content) association produced by the matcher
//!
//! Field names follow the column names of the CSV files the records are
//! written to, so they serialize without renaming.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an NGO in the registry.
pub type NgoId = u32;

/// A non-governmental organization tracked by id, display name and aliases.
///
/// # Fields
///
/// * `id` - Stable identifier, unique within a registry
/// * `name` - Display name, also the candidate for global fuzzy matching
/// * `keywords` - Alias strings searched for in content text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ngo {
    pub id: NgoId,
    pub name: String,
    pub keywords: Vec<String>,
}

/// Platforms content is collected from, with their database ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Reddit,
    YouTube,
    Bluesky,
}

impl Platform {
    /// The `platform_id` stored alongside each content row.
    pub fn id(self) -> u32 {
        match self {
            Platform::Reddit => 1,
            Platform::YouTube => 2,
            Platform::Bluesky => 3,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Reddit => "reddit",
            Platform::YouTube => "youtube",
            Platform::Bluesky => "bluesky",
        };
        f.write_str(name)
    }
}

/// Kind of content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ContentType {
    Post,
    Video,
}

/// A post or video normalised across platforms.
///
/// Only `title` and `description` matter to the matcher; the rest is carried
/// through to `content.csv` untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentRecord {
    /// Platform-native id (Reddit post id, YouTube video id, Bluesky URI).
    pub external_content_id: String,
    pub platform_id: u32,
    pub title: String,
    pub description: String,
    pub url: String,
    pub author: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`
    pub published_at: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub content_type: ContentType,
    /// Free-form JSON object serialized to a string.
    pub metadata: String,
}

impl ContentRecord {
    /// Title and description joined into the blob the matcher searches.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// A comment (or reply) attached to a content item.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommentRecord {
    pub comment_id: String,
    /// `external_content_id` of the post or video the comment belongs to.
    pub post_external_id: String,
    pub author: Option<String>,
    pub body: String,
    pub created_at: String,
    pub like_count: i64,
    pub reply_count: i64,
    /// Platform id of the parent; `None` for top-level YouTube comments.
    pub parent_id: Option<String>,
    pub metadata: String,
}

/// An (NGO, content) association, ordered so sets iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct MentionRecord {
    pub ngo_id: NgoId,
    pub external_content_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_content() -> ContentRecord {
        ContentRecord {
            external_content_id: "abc123".to_string(),
            platform_id: Platform::Reddit.id(),
            title: "Flood relief".to_string(),
            description: "The Red Cross is on site".to_string(),
            url: "https://example.com".to_string(),
            author: Some("someone".to_string()),
            published_at: "2025-04-14 13:50:14".to_string(),
            view_count: 10,
            like_count: 5,
            comment_count: 2,
            content_type: ContentType::Post,
            metadata: "{}".to_string(),
        }
    }

    #[test]
    fn test_platform_ids() {
        assert_eq!(Platform::Reddit.id(), 1);
        assert_eq!(Platform::YouTube.id(), 2);
        assert_eq!(Platform::Bluesky.id(), 3);
        assert_eq!(Platform::YouTube.to_string(), "youtube");
    }

    #[test]
    fn test_searchable_text_joins_title_and_description() {
        let content = sample_content();
        assert_eq!(content.searchable_text(), "Flood relief The Red Cross is on site");
    }

    #[test]
    fn test_ngo_deserialization() {
        let json = r#"{"id": 4, "name": "World Wildlife Fund", "keywords": ["World Wildlife Fund", "WWF"]}"#;
        let ngo: Ngo = serde_json::from_str(json).unwrap();
        assert_eq!(ngo.id, 4);
        assert_eq!(ngo.keywords.len(), 2);
    }

    #[test]
    fn test_mention_ordering() {
        let a = MentionRecord { ngo_id: 1, external_content_id: "z".into() };
        let b = MentionRecord { ngo_id: 2, external_content_id: "a".into() };
        assert!(a < b);
    }

    #[test]
    fn test_content_type_serialization() {
        let json = serde_json::to_string(&ContentType::Video).unwrap();
        assert_eq!(json, "\"Video\"");
    }
}
