//! Output writers.
//!
//! # Submodules
//!
//! - [`tables`]: CSV files consumed by the SQL loader
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── content.csv       # one row per post or video
//! ├── ngo_content.csv   # (ngo_id, external_content_id) mentions
//! └── comments.csv      # comments and replies
//! ```
//!
//! The cleaner subcommands write a single CSV to the path they are given.

pub mod tables;
