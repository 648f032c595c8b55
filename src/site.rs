//! The two content pipelines a site serves.
//!
//! [`Site`] wires one [`ContentPipeline`] per [`ContentKind`] to its
//! repository and exposes them to the HTTP server, the webhook gateway and
//! the CLI.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::{Config, ContentConfig, RepoConfig};
use crate::connector_github::GitHubClient;
use crate::models::ContentKind;
use crate::refresh::{ContentPipeline, RefreshReport};
use crate::retry::RetryPolicy;
use crate::traits::ContentSource;

pub struct Site {
    posts: Arc<ContentPipeline>,
    cheatsheets: Arc<ContentPipeline>,
    content: ContentConfig,
}

impl Site {
    /// Build a site whose pipelines read from GitHub.
    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryPolicy::from(&config.retry);
        let posts = GitHubClient::new(&config.github, &config.content.posts, retry)
            .context("Failed to build posts GitHub client")?;
        let cheatsheets = GitHubClient::new(&config.github, &config.content.cheatsheets, retry)
            .context("Failed to build cheatsheets GitHub client")?;

        Ok(Self::new(
            config.content.clone(),
            Arc::new(posts),
            Arc::new(cheatsheets),
        ))
    }

    /// Build a site from arbitrary sources.
    pub fn new(
        content: ContentConfig,
        posts: Arc<dyn ContentSource>,
        cheatsheets: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            posts: Arc::new(ContentPipeline::new(ContentKind::Post, posts)),
            cheatsheets: Arc::new(ContentPipeline::new(ContentKind::Cheatsheet, cheatsheets)),
            content,
        }
    }

    pub fn posts(&self) -> &Arc<ContentPipeline> {
        &self.posts
    }

    pub fn cheatsheets(&self) -> &Arc<ContentPipeline> {
        &self.cheatsheets
    }

    pub fn pipeline(&self, kind: ContentKind) -> &Arc<ContentPipeline> {
        match kind {
            ContentKind::Post => &self.posts,
            ContentKind::Cheatsheet => &self.cheatsheets,
        }
    }

    /// Repository a kind is served from.
    pub fn repo(&self, kind: ContentKind) -> &RepoConfig {
        self.content.repo(kind)
    }

    pub fn content_config(&self) -> &ContentConfig {
        &self.content
    }

    /// Refresh both pipelines concurrently.
    pub async fn refresh_all(&self) -> Vec<(ContentKind, Result<RefreshReport>)> {
        let (posts, cheatsheets) = tokio::join!(
            self.posts.refresh_content(),
            self.cheatsheets.refresh_content()
        );
        vec![
            (ContentKind::Post, posts),
            (ContentKind::Cheatsheet, cheatsheets),
        ]
    }

    /// Initial load. Failures are logged and the site starts with whatever
    /// loaded; a later webhook can fill the gap.
    pub async fn refresh_on_startup(&self) {
        for (kind, result) in self.refresh_all().await {
            match result {
                Ok(report) => info!(kind = %kind, stored = report.stored, "initial load complete"),
                Err(e) => error!(kind = %kind, "initial load failed, serving empty store: {:#}", e),
            }
        }
    }
}

/// Warn about settings that degrade the service without preventing startup.
pub fn warn_on_missing_settings(config: &Config) {
    if config.github.token().is_none() {
        warn!("GITHUB_TOKEN is not set; GitHub API requests are rate limited");
    }
    if config.webhook.secret.is_none() {
        warn!("GITHUB_WEBHOOK_SECRET is not set; webhook requests will be rejected");
    }
}
