//! GitHub contents API connector.
//!
//! Lists repository entries and fetches Markdown files through
//! `GET /repos/{owner}/{repo}/contents/{path}`. Every request goes through
//! [`retry_with_backoff`]; transport failures and non-2xx statuses are
//! retried, decode failures are not.
//!
//! Authentication is optional. Without a token the API applies the
//! unauthenticated rate limit (60 requests/hour).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{GitHubConfig, RepoConfig};
use crate::models::RepositoryEntry;
use crate::retry::{retry_with_backoff, RetryPolicy, Retryable};
use crate::traits::ContentSource;

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Failure of a single contents API call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GitHub API returned status {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Status { .. })
    }
}

/// File payload returned by the contents endpoint for a single file.
#[derive(Debug, Deserialize)]
struct FilePayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// [`ContentSource`] backed by one GitHub repository.
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: Url,
    owner: String,
    repo: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, repo: &RepoConfig, retry: RetryPolicy) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let api_base = Url::parse(&config.api_base)
            .with_context(|| format!("Invalid GitHub API base URL: {}", config.api_base))?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("GitHub API base URL cannot be a base: {}", config.api_base);
        }

        let token = config.token().map(str::to_string);

        Ok(Self {
            client,
            api_base,
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            token,
            retry,
        })
    }

    /// Build the contents URL for `path`, percent-encoding each segment.
    pub fn contents_url(&self, path: &str) -> Result<Url> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("GitHub API base URL cannot be a base"))?;
            segments
                .pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"]);
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut request = self.client.get(url.clone()).header(ACCEPT, GITHUB_ACCEPT);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }

        let response = request.send().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl ContentSource for GitHubClient {
    fn describe(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    async fn list_content(&self, path: &str) -> Result<Vec<RepositoryEntry>> {
        let url = self.contents_url(path)?;
        debug!("fetching content listing from: {}", url);

        let url = &url;
        let label = format!("list {}", url);
        retry_with_backoff(&self.retry, &label, move || async move {
            let body = self.get_bytes(url).await?;
            parse_listing(url.as_str(), &body)
        })
        .await
        .with_context(|| format!("failed to list content of {} at '{}'", self.describe(), path))
    }

    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.contents_url(path)?;

        let url = &url;
        let label = format!("fetch {}", url);
        retry_with_backoff(&self.retry, &label, move || async move {
            let body = self.get_bytes(url).await?;
            decode_file_payload(url.as_str(), &body)
        })
        .await
        .with_context(|| format!("failed to fetch {} from {}", path, self.describe()))
    }
}

/// Decode a contents listing: a directory yields an array, a file path
/// yields a single object.
pub fn parse_listing(url: &str, body: &[u8]) -> Result<Vec<RepositoryEntry>, FetchError> {
    if let Ok(entries) = serde_json::from_slice::<Vec<RepositoryEntry>>(body) {
        return Ok(entries);
    }

    serde_json::from_slice::<RepositoryEntry>(body)
        .map(|entry| vec![entry])
        .map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: format!("not a directory listing or a single entry: {}", e),
        })
}

/// Decode a single-file payload, base64-decoding when the API says so.
pub fn decode_file_payload(url: &str, body: &[u8]) -> Result<Vec<u8>, FetchError> {
    let payload: FilePayload = serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if payload.encoding.eq_ignore_ascii_case("base64") {
        // The API wraps base64 content at 60 columns.
        let compact: String = payload
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| FetchError::Decode {
                url: url.to_string(),
                message: format!("invalid base64 content: {}", e),
            })
    } else {
        Ok(payload.content.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryType;

    fn client(api_base: &str) -> GitHubClient {
        let config = GitHubConfig {
            api_base: api_base.to_string(),
            token: Some("tok".to_string()),
            ..GitHubConfig::default()
        };
        let repo = RepoConfig {
            owner: "octo".to_string(),
            repo: "posts".to_string(),
        };
        GitHubClient::new(&config, &repo, RetryPolicy::default()).unwrap()
    }

    #[test]
    fn test_contents_url_root_and_nested() {
        let c = client("https://api.github.com");
        assert_eq!(
            c.contents_url("").unwrap().as_str(),
            "https://api.github.com/repos/octo/posts/contents"
        );
        assert_eq!(
            c.contents_url("drafts/hello world.md").unwrap().as_str(),
            "https://api.github.com/repos/octo/posts/contents/drafts/hello%20world.md"
        );
    }

    #[test]
    fn test_contents_url_with_base_path() {
        let c = client("http://127.0.0.1:9999/api/v3/");
        assert_eq!(
            c.contents_url("a.md").unwrap().as_str(),
            "http://127.0.0.1:9999/api/v3/repos/octo/posts/contents/a.md"
        );
    }

    #[test]
    fn test_parse_listing_array() {
        let body = br#"[
            {"type": "file", "name": "a.md", "path": "a.md", "size": 12, "sha": "x"},
            {"type": "dir", "name": "img", "path": "img", "size": 0}
        ]"#;
        let entries = parse_listing("u", body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, EntryType::File);
        assert_eq!(entries[0].size, 12);
        assert_eq!(entries[1].entry_type, EntryType::Dir);
    }

    #[test]
    fn test_parse_listing_single_object() {
        let body = br#"{"type": "file", "name": "a.md", "path": "docs/a.md",
            "size": 3, "content": "eA=="}"#;
        let entries = parse_listing("u", body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "docs/a.md");
    }

    #[test]
    fn test_parse_listing_garbage_is_not_retryable() {
        let err = parse_listing("u", br#"{"message": "weird"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        // "---\ntitle: Hi\n---\nbody" split across lines like the API does.
        let body = br#"{"encoding": "base64", "content": "LS0tCnRpdGxlOiBI\naQotLS0KYm9keQ==\n"}"#;
        let bytes = decode_file_payload("u", body).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "---\ntitle: Hi\n---\nbody");
    }

    #[test]
    fn test_decode_plain_content() {
        let body = br#"{"encoding": "", "content": "plain text"}"#;
        assert_eq!(decode_file_payload("u", body).unwrap(), b"plain text");
    }

    #[test]
    fn test_decode_invalid_base64() {
        let body = br#"{"encoding": "base64", "content": "!!!not base64"}"#;
        let err = decode_file_payload("u", body).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn test_status_errors_are_retryable() {
        let err = FetchError::Status {
            url: "u".to_string(),
            status: StatusCode::BAD_GATEWAY,
        };
        assert!(err.is_retryable());
    }
}
