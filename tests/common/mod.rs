//! Shared fixtures: an in-memory `ContentSource` and a local fake of the
//! GitHub contents API.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use serde_json::json;
use tokio::sync::Semaphore;

use site_content::models::{EntryType, RepositoryEntry};
use site_content::traits::ContentSource;

/// Markdown document with front matter.
pub fn markdown(slug: &str, date: &str, published: bool, title: &str, tags: &[&str]) -> String {
    format!(
        "---\nid: {slug}-id\ndate: {date}\ntitle: {title}\nauthor: Tester\n\
         summary: About {title}\nslug: {slug}\ntags: [{tags}]\npublished: {published}\n\
         ---\n# {title}\n\nBody of {slug}.\n",
        tags = tags.join(", "),
    )
}

fn entry(name: &str, entry_type: EntryType) -> RepositoryEntry {
    RepositoryEntry {
        entry_type,
        name: name.to_string(),
        path: name.to_string(),
        size: 0,
    }
}

/// In-memory source. Lists entries in reverse name order so callers must
/// sort for themselves.
#[derive(Default)]
pub struct FakeSource {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    hold: Mutex<Option<Arc<Semaphore>>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, name: &str, content: &str) -> Self {
        self.set_file(name, content);
        self
    }

    pub fn with_dir(self, name: &str) -> Self {
        self.dirs.lock().unwrap().push(name.to_string());
        self
    }

    pub fn set_file(&self, name: &str, content: &str) {
        self.set_bytes(name, content.as_bytes().to_vec());
    }

    pub fn set_bytes(&self, name: &str, content: Vec<u8>) {
        self.files.lock().unwrap().insert(name.to_string(), content);
    }

    pub fn clear(&self) {
        self.files.lock().unwrap().clear();
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Make every fetch wait for a permit on the returned semaphore.
    pub fn hold_fetches(&self) -> Arc<Semaphore> {
        let sem = Arc::new(Semaphore::new(0));
        *self.hold.lock().unwrap() = Some(sem.clone());
        sem
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn describe(&self) -> String {
        "fake".to_string()
    }

    async fn list_content(&self, _path: &str) -> Result<Vec<RepositoryEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries: Vec<RepositoryEntry> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .map(|name| entry(name, EntryType::File))
            .collect();
        for dir in self.dirs.lock().unwrap().iter() {
            entries.push(entry(dir, EntryType::Dir));
        }
        entries.reverse();
        Ok(entries)
    }

    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().clone();
        if let Some(sem) = hold {
            sem.acquire().await?.forget();
        }
        if self.failing.lock().unwrap().contains(path) {
            anyhow::bail!("simulated fetch failure for {}", path);
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", path))
    }
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

// ============ Fake GitHub contents API ============

#[derive(Default)]
pub struct FakeGitHubState {
    /// repo name → file name → content
    repos: Mutex<HashMap<String, BTreeMap<String, String>>>,
    /// Number of upcoming requests answered with 500.
    failures_remaining: AtomicUsize,
    requests: AtomicUsize,
    last_authorization: Mutex<Option<String>>,
    last_accept: Mutex<Option<String>>,
}

impl FakeGitHubState {
    pub fn set_file(&self, repo: &str, name: &str, content: &str) {
        self.repos
            .lock()
            .unwrap()
            .entry(repo.to_string())
            .or_default()
            .insert(name.to_string(), content.to_string());
    }

    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }

    pub fn last_accept(&self) -> Option<String> {
        self.last_accept.lock().unwrap().clone()
    }

    fn record(&self, headers: &HeaderMap) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        *self.last_authorization.lock().unwrap() = header("authorization");
        *self.last_accept.lock().unwrap() = header("accept");

        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct FakeGitHub {
    pub base_url: String,
    pub state: Arc<FakeGitHubState>,
}

impl FakeGitHub {
    pub async fn start() -> Self {
        let state = Arc::new(FakeGitHubState::default());
        let app = Router::new()
            .route("/repos/{owner}/{repo}/contents", get(handle_listing))
            .route("/repos/{owner}/{repo}/contents/{*path}", get(handle_file))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }
}

async fn handle_listing(
    State(state): State<Arc<FakeGitHubState>>,
    Path((_owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if state.record(&headers) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let repos = state.repos.lock().unwrap();
    let Some(files) = repos.get(&repo) else {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    };
    let entries: Vec<_> = files
        .iter()
        .map(|(name, content)| {
            json!({"type": "file", "name": name, "path": name, "size": content.len(), "sha": "0"})
        })
        .collect();
    Json(entries).into_response()
}

async fn handle_file(
    State(state): State<Arc<FakeGitHubState>>,
    Path((_owner, repo, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if state.record(&headers) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let repos = state.repos.lock().unwrap();
    let Some(content) = repos.get(&repo).and_then(|files| files.get(&path)) else {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    };

    // The real API wraps base64 at 60 columns.
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    let wrapped: Vec<String> = encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();

    Json(json!({
        "type": "file",
        "name": path,
        "path": path,
        "size": content.len(),
        "encoding": "base64",
        "content": wrapped.join("\n") + "\n",
    }))
    .into_response()
}
