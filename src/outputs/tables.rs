//! CSV writers for scraped records and cleaned datasets.
//!
//! Fresh files start with a UTF-8 byte order mark so spreadsheet tools pick
//! the right encoding. In [`WriteMode::Append`] a file that already has
//! content gets neither BOM nor header, only rows.

use crate::error::Result;
use crate::scrapers::ScrapeBatch;
use csv::WriterBuilder;
use itertools::Itertools;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const CONTENT_FILE: &str = "content.csv";
pub const MENTIONS_FILE: &str = "ngo_content.csv";
pub const COMMENTS_FILE: &str = "comments.csv";

const BOM: &[u8] = b"\xEF\xBB\xBF";

pub const CONTENT_COLUMNS: [&str; 12] = [
    "external_content_id",
    "platform_id",
    "title",
    "description",
    "url",
    "author",
    "published_at",
    "view_count",
    "like_count",
    "comment_count",
    "content_type",
    "metadata",
];
pub const MENTION_COLUMNS: [&str; 2] = ["ngo_id", "external_content_id"];
pub const COMMENT_COLUMNS: [&str; 9] = [
    "comment_id",
    "post_external_id",
    "author",
    "body",
    "created_at",
    "like_count",
    "reply_count",
    "parent_id",
    "metadata",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

/// Rows written per file by [`write_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub contents: usize,
    pub mentions: usize,
    pub comments: usize,
}

/// Serialize `records` to `path`. Nothing is written (and the file is left
/// untouched) when there are no records.
///
/// Returns the number of rows written.
pub fn write_records<T, I>(path: &Path, records: I, mode: WriteMode) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut records = records.into_iter().peekable();
    if records.peek().is_none() {
        debug!(path = %path.display(), "No records; skipping file");
        return Ok(0);
    }

    let has_content = mode == WriteMode::Append && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    let mut file = match mode {
        WriteMode::Overwrite => OpenOptions::new().write(true).create(true).truncate(true).open(path)?,
        WriteMode::Append => OpenOptions::new().append(true).create(true).open(path)?,
    };
    if !has_content {
        file.write_all(BOM)?;
    }

    let mut writer = WriterBuilder::new().has_headers(!has_content).from_writer(file);
    let mut written = 0usize;
    for record in records {
        writer.serialize(record)?;
        written += 1;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = written, append = has_content, "Wrote CSV");
    Ok(written)
}

/// Like [`write_records`], but an empty overwrite still replaces `path` with
/// a header-only file so no rows from an earlier run are left behind.
pub fn write_table<T, I>(path: &Path, columns: &[&str], records: I, mode: WriteMode) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut records = records.into_iter().peekable();
    if records.peek().is_none() && mode == WriteMode::Overwrite {
        let mut file = File::create(path)?;
        file.write_all(BOM)?;
        let mut writer = WriterBuilder::new().from_writer(file);
        writer.write_record(columns)?;
        writer.flush()?;
        debug!(path = %path.display(), "No records; wrote header only");
        return Ok(0);
    }
    write_records(path, records, mode)
}

fn in_dir(dir: &Path, file: &str) -> PathBuf {
    dir.join(file)
}

/// Write the three scrape tables into `dir`.
///
/// Content rows are de-duplicated by `external_content_id`, first one wins.
/// In [`WriteMode::Overwrite`] every table is replaced, empty or not.
#[instrument(level = "info", skip(batch), fields(dir = %dir.display()))]
pub fn write_batch(dir: &Path, batch: &ScrapeBatch, mode: WriteMode) -> Result<WriteSummary> {
    let contents = batch.contents.iter().unique_by(|c| c.external_content_id.as_str());
    let summary = WriteSummary {
        contents: write_table(&in_dir(dir, CONTENT_FILE), &CONTENT_COLUMNS, contents, mode)?,
        mentions: write_table(&in_dir(dir, MENTIONS_FILE), &MENTION_COLUMNS, batch.mentions.iter(), mode)?,
        comments: write_table(&in_dir(dir, COMMENTS_FILE), &COMMENT_COLUMNS, &batch.comments, mode)?,
    };
    info!(
        contents = summary.contents,
        mentions = summary.mentions,
        comments = summary.comments,
        "Saved scrape results"
    );
    Ok(summary)
}
