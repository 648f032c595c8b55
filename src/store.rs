//! In-memory content store.
//!
//! Holds the current generation of documents as an immutable
//! `Arc<HashMap<slug, Document>>` behind a `std::sync::RwLock`. A refresh
//! builds a brand-new map and swaps the `Arc` in under the write lock, so:
//!
//! - the write lock is held only for a pointer swap, never during I/O
//! - readers clone the `Arc` under the read lock and then work lock-free on a
//!   snapshot that can never change underneath them
//! - a reader sees either the old generation or the new one, never a mix

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::Document;
use crate::search;

/// Immutable view of one store generation.
pub type Snapshot = Arc<HashMap<String, Document>>;

/// Thread-safe `slug → Document` collection.
pub struct ContentStore {
    docs: RwLock<Snapshot>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Replace the entire collection with `docs`.
    pub fn replace_all(&self, docs: HashMap<String, Document>) {
        let next = Arc::new(docs);
        // A poisoned lock still guards a whole, valid map.
        let mut guard = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
    }

    /// The current generation.
    pub fn snapshot(&self) -> Snapshot {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// All documents, newest first.
    pub fn get_all(&self) -> Vec<Document> {
        let snapshot = self.snapshot();
        let mut docs: Vec<Document> = snapshot.values().cloned().collect();
        sort_newest_first(&mut docs);
        docs
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<Document> {
        self.snapshot().get(slug).cloned()
    }

    /// Documents carrying `tag`, newest first.
    pub fn get_by_tag(&self, tag: &str) -> Vec<Document> {
        let snapshot = self.snapshot();
        let mut docs: Vec<Document> = snapshot
            .values()
            .filter(|doc| doc.has_tag(tag))
            .cloned()
            .collect();
        sort_newest_first(&mut docs);
        docs
    }

    /// The `n` newest documents, newest first.
    pub fn get_recent(&self, n: usize) -> Vec<Document> {
        let mut docs = self.get_all();
        docs.truncate(n);
        docs
    }

    /// The `n` oldest documents, oldest first.
    pub fn get_oldest(&self, n: usize) -> Vec<Document> {
        let snapshot = self.snapshot();
        let mut docs: Vec<Document> = snapshot.values().cloned().collect();
        sort_oldest_first(&mut docs);
        docs.truncate(n);
        docs
    }

    /// Search the current generation. See [`search::search`].
    pub fn search(&self, query: &str) -> Vec<Document> {
        search::search(&self.snapshot(), query)
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Date descending; ties broken by slug so output is stable.
pub fn sort_newest_first(docs: &mut [Document]) {
    docs.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug)));
}

fn sort_oldest_first(docs: &mut [Document]) {
    docs.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.slug.cmp(&b.slug)));
}
