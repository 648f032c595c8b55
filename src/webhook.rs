//! GitHub push webhook gateway.
//!
//! A push to one of the content repositories triggers a background refresh of
//! the matching pipeline. Requests are authenticated with the
//! `X-Hub-Signature-256` header: `sha256=` followed by the hex HMAC-SHA256 of
//! the raw body under the shared secret. The payload is only parsed after the
//! signature checks out.
//!
//! A push is acted on when it targets a configured branch and adds or
//! modifies at least one Markdown file. The repository name selects the
//! pipeline; a push from an unrecognized repository refreshes both.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ContentConfig, RepoConfig, WebhookConfig};
use crate::models::ContentKind;
use crate::site::Site;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook secret not configured")]
    SecretNotConfigured,
    #[error("missing {} header", SIGNATURE_HEADER)]
    MissingSignature,
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("invalid push payload: {0}")]
    BadPayload(String),
}

/// Check `header` against the HMAC-SHA256 of `body` under `secret`.
///
/// The comparison is constant-time.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let hex_digest = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(WebhookError::InvalidSignature)?;
    let expected = hex::decode(hex_digest.trim()).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// `sha256=<hex>` signature for `body`, as GitHub sends it.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// The parts of a GitHub push event the gateway looks at.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: PushRepository,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Deserialize)]
pub struct PushRepository {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PushCommit {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl PushEvent {
    /// Whether any commit adds or modifies a Markdown file.
    pub fn touches_documents(&self) -> bool {
        self.commits
            .iter()
            .flat_map(|c| c.added.iter().chain(c.modified.iter()))
            .any(|path| path.to_ascii_lowercase().ends_with(".md"))
    }
}

/// What to do about a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    IgnoredBranch(String),
    NoDocumentChanges,
    Refresh(Vec<ContentKind>),
}

fn repo_matches(repo: &RepoConfig, event: &PushRepository) -> bool {
    event.name.eq_ignore_ascii_case(&repo.repo)
        || event.full_name.eq_ignore_ascii_case(&repo.full_name())
}

/// Decide which pipelines, if any, a push should refresh.
pub fn decide(event: &PushEvent, branches: &[String], content: &ContentConfig) -> Decision {
    let on_branch = event
        .git_ref
        .strip_prefix("refs/heads/")
        .is_some_and(|branch| branches.iter().any(|b| b == branch));
    if !on_branch {
        return Decision::IgnoredBranch(event.git_ref.clone());
    }

    if !event.touches_documents() {
        return Decision::NoDocumentChanges;
    }

    let matched: Vec<ContentKind> = ContentKind::ALL
        .into_iter()
        .filter(|kind| repo_matches(content.repo(*kind), &event.repository))
        .collect();

    if matched.is_empty() {
        Decision::Refresh(ContentKind::ALL.to_vec())
    } else {
        Decision::Refresh(matched)
    }
}

/// Response body for an accepted webhook request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub message: String,
    pub triggered: Vec<ContentKind>,
}

/// Authenticates push events and triggers background refreshes.
pub struct WebhookGateway {
    secret: Option<String>,
    branches: Vec<String>,
    site: Arc<Site>,
}

impl WebhookGateway {
    pub fn new(config: &WebhookConfig, site: Arc<Site>) -> Self {
        Self {
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            branches: config.branches.clone(),
            site,
        }
    }

    /// Verify, parse and dispatch one webhook delivery.
    pub fn handle(&self, signature: Option<&str>, body: &[u8]) -> Result<WebhookAck, WebhookError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(WebhookError::SecretNotConfigured)?;
        verify_signature(secret.as_bytes(), body, signature)?;

        let event: PushEvent =
            serde_json::from_slice(body).map_err(|e| WebhookError::BadPayload(e.to_string()))?;

        match decide(&event, &self.branches, self.site.content_config()) {
            Decision::IgnoredBranch(git_ref) => {
                debug!(git_ref = %git_ref, "ignoring push to non-content branch");
                Ok(WebhookAck {
                    message: format!("ignoring push to {}", git_ref),
                    triggered: Vec::new(),
                })
            }
            Decision::NoDocumentChanges => {
                debug!(repository = %event.repository.name, "push has no markdown changes");
                Ok(WebhookAck {
                    message: "no markdown files changed".to_string(),
                    triggered: Vec::new(),
                })
            }
            Decision::Refresh(kinds) => {
                info!(
                    repository = %event.repository.name,
                    git_ref = %event.git_ref,
                    "push received; refreshing {:?}",
                    kinds
                );
                self.trigger(&kinds);
                Ok(WebhookAck {
                    message: "refresh triggered".to_string(),
                    triggered: kinds,
                })
            }
        }
    }

    /// Spawn one refresh task per kind. Outcomes are logged when each ends.
    pub fn trigger(&self, kinds: &[ContentKind]) -> Vec<JoinHandle<()>> {
        kinds
            .iter()
            .map(|kind| {
                let kind = *kind;
                let pipeline = self.site.pipeline(kind).clone();
                tokio::spawn(async move {
                    match pipeline.refresh_content().await {
                        Ok(report) => {
                            info!(kind = %kind, stored = report.stored, "webhook refresh finished")
                        }
                        Err(e) => error!(kind = %kind, "webhook refresh failed: {:#}", e),
                    }
                })
            })
            .collect()
    }
}

impl WebhookError {
    pub fn log(&self) {
        match self {
            WebhookError::SecretNotConfigured => error!("{}", self),
            _ => warn!("rejected webhook request: {}", self),
        }
    }
}
