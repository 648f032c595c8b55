//! Core data models used throughout the site content pipeline.
//!
//! These types represent the documents held in the in-memory store and the
//! ephemeral repository listing records that flow through a refresh pass.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which content repository a pipeline serves.
///
/// Posts and cheatsheets share the same document shape and pipeline; the
/// kind only selects configuration, routes, and log labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Cheatsheet,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Post, ContentKind::Cheatsheet];

    /// Plural label used in routes and CLI arguments (`posts`, `cheatsheets`).
    pub fn plural(&self) -> &'static str {
        match self {
            ContentKind::Post => "posts",
            ContentKind::Cheatsheet => "cheatsheets",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

impl FromStr for ContentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "post" | "posts" => Ok(ContentKind::Post),
            "cheatsheet" | "cheatsheets" => Ok(ContentKind::Cheatsheet),
            other => anyhow::bail!(
                "Unknown content kind: '{}'. Must be posts or cheatsheets.",
                other
            ),
        }
    }
}

/// A parsed post or cheatsheet.
///
/// `slug` is the store key. `content` always holds sanitized HTML and
/// `raw_content` the Markdown body it was rendered from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub date: DateTime<Utc>,
    pub display_date: String,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub published: bool,
    pub content: String,
    pub raw_content: String,
}

impl Document {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Kind of a repository listing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// One record of a repository contents listing.
///
/// Only lives for the duration of a refresh pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryEntry {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
}
