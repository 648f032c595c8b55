//! Term search over a store snapshot.
//!
//! A query is lower-cased and split on whitespace. A document matches when
//! every term is a substring of its searchable text (title, summary, raw
//! Markdown body and tags, lower-cased).
//!
//! Matching fans out over the snapshot with rayon: each document is checked
//! by its own task and matches are collected into a mutex-guarded vector.
//! `for_each` returns only after every task has finished. Results are ordered
//! newest first; relevance scoring is not implemented, date order stands in
//! for it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;

use crate::models::Document;
use crate::store::sort_newest_first;

/// Split a query into lower-cased terms.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Lower-cased concatenation of every searchable field.
pub fn searchable_text(doc: &Document) -> String {
    [
        doc.title.as_str(),
        doc.summary.as_str(),
        doc.raw_content.as_str(),
        &doc.tags.join(" "),
    ]
    .join(" ")
    .to_lowercase()
}

pub fn matches_all_terms(doc: &Document, terms: &[String]) -> bool {
    let text = searchable_text(doc);
    terms.iter().all(|term| text.contains(term.as_str()))
}

/// Return every document in `snapshot` matching all terms of `query`,
/// newest first. An empty query matches nothing.
pub fn search(snapshot: &HashMap<String, Document>, query: &str) -> Vec<Document> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let matches = Mutex::new(Vec::new());
    snapshot.par_iter().for_each(|(_, doc)| {
        if matches_all_terms(doc, &terms) {
            matches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(doc.clone());
        }
    });

    let mut results = matches.into_inner().unwrap_or_else(PoisonError::into_inner);
    sort_newest_first(&mut results);
    results
}
