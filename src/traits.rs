//! Extension trait for content sources.
//!
//! A refresh pass only needs two operations from the remote side: list the
//! entries of a directory and fetch the bytes of one file. [`ContentSource`]
//! captures exactly that, so the orchestrator can run against the GitHub
//! contents API in production and an in-memory source in tests.
//!
//! ```text
//! ┌──────────────────┐      ┌─────────────────┐      ┌──────────────┐
//! │  ContentSource   │─────▶│ ContentPipeline │─────▶│ ContentStore │
//! │ GitHub / custom  │      │ list→fetch→parse│      │  slug → doc  │
//! └──────────────────┘      └─────────────────┘      └──────────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RepositoryEntry;

/// A remote repository of Markdown documents.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use site_content::models::RepositoryEntry;
/// use site_content::traits::ContentSource;
///
/// struct Empty;
///
/// #[async_trait]
/// impl ContentSource for Empty {
///     fn describe(&self) -> String { "empty".to_string() }
///     async fn list_content(&self, _path: &str) -> Result<Vec<RepositoryEntry>> { Ok(vec![]) }
///     async fn fetch_file(&self, path: &str) -> Result<Vec<u8>> {
///         anyhow::bail!("no such file: {}", path)
///     }
/// }
/// ```
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Human-readable identifier used in logs (e.g. `"owner/repo"`).
    fn describe(&self) -> String;

    /// List the entries under `path`. The empty path is the repository root.
    ///
    /// A path naming a single file yields a one-element listing.
    async fn list_content(&self, path: &str) -> Result<Vec<RepositoryEntry>>;

    /// Fetch the decoded contents of the file at `path`.
    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>>;
}
