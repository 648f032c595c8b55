use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::models::ContentKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Personal access token. Usually supplied through `GITHUB_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout. Unset means the transport default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

impl GitHubConfig {
    /// The configured token, or `None` when it is unset or blank.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_user_agent() -> String {
    format!("site-content/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Shared HMAC secret. Usually supplied through `GITHUB_WEBHOOK_SECRET`.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            branches: default_branches(),
        }
    }
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    #[serde(default = "default_posts_repo")]
    pub posts: RepoConfig,
    #[serde(default = "default_cheatsheets_repo")]
    pub cheatsheets: RepoConfig,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            posts: default_posts_repo(),
            cheatsheets: default_cheatsheets_repo(),
        }
    }
}

impl ContentConfig {
    pub fn repo(&self, kind: ContentKind) -> &RepoConfig {
        match kind {
            ContentKind::Post => &self.posts,
            ContentKind::Cheatsheet => &self.cheatsheets,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub owner: String,
    pub repo: String,
}

impl RepoConfig {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

fn default_posts_repo() -> RepoConfig {
    RepoConfig {
        owner: "jgndev".to_string(),
        repo: "posts".to_string(),
    }
}
fn default_cheatsheets_repo() -> RepoConfig {
    RepoConfig {
        owner: "jgndev".to_string(),
        repo: "cheatsheets".to_string(),
    }
}

impl Config {
    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = var("SITE_BIND") {
            self.server.bind = bind;
        }
        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(secret) = var("GITHUB_WEBHOOK_SECRET") {
            self.webhook.secret = Some(secret);
        }
        if let Some(owner) = var("POSTS_REPO_OWNER") {
            self.content.posts.owner = owner;
        }
        if let Some(repo) = var("POSTS_REPO_NAME") {
            self.content.posts.repo = repo;
        }
        if let Some(owner) = var("CHEATSHEETS_REPO_OWNER") {
            self.content.cheatsheets.owner = owner;
        }
        if let Some(repo) = var("CHEATSHEETS_REPO_NAME") {
            self.content.cheatsheets.repo = repo;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for kind in ContentKind::ALL {
            let repo = self.content.repo(kind);
            if repo.owner.trim().is_empty() || repo.repo.trim().is_empty() {
                anyhow::bail!("content.{}: owner and repo must not be empty", kind);
            }
        }

        if self.webhook.branches.is_empty() {
            anyhow::bail!("webhook.branches must list at least one branch");
        }

        if self.github.timeout_secs == Some(0) {
            anyhow::bail!("github.timeout_secs must be > 0 when set");
        }

        url::Url::parse(&self.github.api_base).with_context(|| {
            format!("github.api_base is not a valid URL: {}", self.github.api_base)
        })?;

        Ok(())
    }
}

/// Load configuration from an optional TOML file, then apply environment
/// overrides from the process environment and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}
