//! # Site content
//!
//! Content backend for a personal site: blog posts and cheatsheets are
//! Markdown files with YAML front matter kept in two GitHub repositories.
//! Each repository is read through the GitHub contents API into an in-memory
//! store, kept fresh by push webhooks, and served as JSON.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ GitHub repo  │──▶│ ContentPipeline  │──▶│ ContentStore │
//! │ contents API │   │ list→fetch→parse │   │  slug → doc  │
//! └──────────────┘   └────────▲─────────┘   └──────┬───────┘
//!                             │                    │
//!                      ┌──────┴─────┐        ┌─────┴──────┐
//!                      │  webhook   │        │ HTTP / CLI │
//!                      │ push event │        │  queries   │
//!                      └────────────┘        └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`models`] | Documents, content kinds, listing entries |
//! | [`retry`] | Exponential backoff for transient failures |
//! | [`traits`] | `ContentSource` extension trait |
//! | [`connector_github`] | GitHub contents API client |
//! | [`markdown`] | Front matter parsing, rendering, sanitization |
//! | [`store`] | Snapshot-swapped in-memory document store |
//! | [`search`] | Parallel term search |
//! | [`refresh`] | All-or-nothing refresh orchestration |
//! | [`webhook`] | Push webhook verification and dispatch |
//! | [`site`] | The posts and cheatsheets pipelines |
//! | [`server`] | JSON HTTP server |

pub mod config;
pub mod connector_github;
pub mod markdown;
pub mod models;
pub mod refresh;
pub mod retry;
pub mod search;
pub mod server;
pub mod site;
pub mod store;
pub mod traits;
pub mod webhook;
