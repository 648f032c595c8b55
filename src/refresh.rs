//! Refresh orchestration.
//!
//! A [`ContentPipeline`] owns one [`ContentStore`] and the [`ContentSource`]
//! it is filled from. A refresh is a full resync:
//!
//! ```text
//! Listing ──▶ Fetching ──▶ Parsing ──▶ Swapping ──▶ Idle
//!    │            │           │
//!    └────────────┴───────────┴──▶ Failed (store untouched)
//! ```
//!
//! The new document map is built off to the side and swapped in only when
//! every candidate file was fetched and parsed. Any listing, fetch, UTF-8 or
//! front matter error aborts the pass and the previous generation keeps
//! serving. Refreshes of one pipeline are serialized by an async mutex; a
//! trigger that arrives mid-refresh waits and then runs its own resync.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::markdown::parse_document;
use crate::models::{ContentKind, Document, EntryType, RepositoryEntry};
use crate::store::ContentStore;
use crate::traits::ContentSource;

/// Repository files that are never treated as documents.
const IGNORED_FILES: &[&str] = &["readme.md", "license.md", "license", ".gitignore"];

/// Where a pipeline currently is in its refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPhase {
    Idle,
    Listing,
    Fetching,
    Parsing,
    Swapping,
    /// The last refresh aborted; the store still holds the previous generation.
    Failed,
}

/// Snapshot of a pipeline's refresh state, reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub phase: RefreshPhase,
    pub last_success: Option<DateTime<Utc>>,
    pub documents: usize,
    pub last_error: Option<String>,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self {
            phase: RefreshPhase::Idle,
            last_success: None,
            documents: 0,
            last_error: None,
        }
    }
}

/// Outcome of one successful refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub kind: ContentKind,
    /// Entries returned by the root listing.
    pub listed: usize,
    /// Entries that passed the Markdown file filter.
    pub candidates: usize,
    pub stored: usize,
    pub skipped_unpublished: usize,
    pub skipped_invalid: usize,
    /// Documents that replaced an earlier document with the same slug.
    pub duplicate_slugs: usize,
    pub elapsed: Duration,
}

/// Whether a listing entry should be fetched and parsed.
pub fn is_candidate(entry: &RepositoryEntry) -> bool {
    if entry.entry_type != EntryType::File {
        return false;
    }
    let name = entry.name.to_ascii_lowercase();
    name.ends_with(".md") && !IGNORED_FILES.contains(&name.as_str())
}

/// One content kind's source, store, and refresh state.
pub struct ContentPipeline {
    kind: ContentKind,
    source: Arc<dyn ContentSource>,
    store: ContentStore,
    gate: tokio::sync::Mutex<()>,
    status: RwLock<RefreshStatus>,
}

impl ContentPipeline {
    pub fn new(kind: ContentKind, source: Arc<dyn ContentSource>) -> Self {
        Self {
            kind,
            source,
            store: ContentStore::new(),
            gate: tokio::sync::Mutex::new(()),
            status: RwLock::new(RefreshStatus::default()),
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn status(&self) -> RefreshStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Search the current generation, newest first.
    pub fn search(&self, query: &str) -> Vec<Document> {
        self.store.search(query)
    }

    /// Resync the store from the source. On error the store is unchanged.
    pub async fn refresh_content(&self) -> Result<RefreshReport> {
        let _flight = self.gate.lock().await;
        let started = Instant::now();
        info!(kind = %self.kind, source = %self.source.describe(), "refresh started");

        match self.run_refresh(started).await {
            Ok(report) => {
                self.update_status(|status| {
                    status.phase = RefreshPhase::Idle;
                    status.last_success = Some(Utc::now());
                    status.documents = report.stored;
                    status.last_error = None;
                });
                info!(
                    kind = %self.kind,
                    stored = report.stored,
                    skipped_unpublished = report.skipped_unpublished,
                    skipped_invalid = report.skipped_invalid,
                    duplicates = report.duplicate_slugs,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "refresh complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.update_status(|status| {
                    status.phase = RefreshPhase::Failed;
                    status.last_error = Some(format!("{:#}", e));
                });
                error!(kind = %self.kind, "refresh failed: {:#}", e);
                Err(e)
            }
        }
    }

    async fn run_refresh(&self, started: Instant) -> Result<RefreshReport> {
        self.set_phase(RefreshPhase::Listing);
        let mut entries = self
            .source
            .list_content("")
            .await
            .with_context(|| format!("failed to list {} repository", self.kind))?;

        // Name order makes "last duplicate slug wins" deterministic.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let listed = entries.len();

        let candidates: Vec<RepositoryEntry> = entries
            .into_iter()
            .filter(|entry| {
                let keep = is_candidate(entry);
                if !keep {
                    debug!(kind = %self.kind, name = %entry.name, "skipping non-document entry");
                }
                keep
            })
            .collect();

        self.set_phase(RefreshPhase::Fetching);
        let mut files = Vec::with_capacity(candidates.len());
        for entry in &candidates {
            let path = if entry.path.is_empty() {
                entry.name.as_str()
            } else {
                entry.path.as_str()
            };
            let bytes = self.source.fetch_file(path).await?;
            let text = String::from_utf8(bytes)
                .with_context(|| format!("{} is not valid UTF-8", path))?;
            files.push((path, text));
        }

        self.set_phase(RefreshPhase::Parsing);
        let mut docs: HashMap<String, Document> = HashMap::with_capacity(files.len());
        let mut skipped_unpublished = 0;
        let mut skipped_invalid = 0;
        let mut duplicate_slugs = 0;

        for (path, text) in files {
            let doc =
                parse_document(&text).with_context(|| format!("failed to parse {}", path))?;

            if doc.slug.trim().is_empty() {
                warn!(kind = %self.kind, path, "document has no slug; skipping");
                skipped_invalid += 1;
                continue;
            }
            if !doc.published {
                debug!(kind = %self.kind, path, slug = %doc.slug, "document unpublished; skipping");
                skipped_unpublished += 1;
                continue;
            }
            if let Some(previous) = docs.insert(doc.slug.clone(), doc) {
                warn!(
                    kind = %self.kind,
                    path,
                    slug = %previous.slug,
                    "duplicate slug; replacing earlier document"
                );
                duplicate_slugs += 1;
            }
        }

        self.set_phase(RefreshPhase::Swapping);
        let stored = docs.len();
        self.store.replace_all(docs);

        Ok(RefreshReport {
            kind: self.kind,
            listed,
            candidates: candidates.len(),
            stored,
            skipped_unpublished,
            skipped_invalid,
            duplicate_slugs,
            elapsed: started.elapsed(),
        })
    }

    fn set_phase(&self, phase: RefreshPhase) {
        self.update_status(|status| status.phase = phase);
    }

    fn update_status(&self, f: impl FnOnce(&mut RefreshStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}
