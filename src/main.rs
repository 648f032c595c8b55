//! # Site content CLI (`site`)
//!
//! Serves posts and cheatsheets loaded from GitHub, or runs a one-off sync
//! and query from the command line.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `site serve` | Load both repositories and start the HTTP server |
//! | `site sync [posts\|cheatsheets\|all]` | Run one refresh and print the report |
//! | `site list <kind>` | List documents, newest first |
//! | `site search <kind> "<query>"` | Term search |
//! | `site get <kind> <slug>` | Print one document as JSON |
//!
//! Every command except `serve` performs one refresh before it queries.
//!
//! ## Examples
//!
//! ```bash
//! GITHUB_TOKEN=... site serve --config ./config/site.toml
//! site sync posts
//! site search posts "tokio channels" --limit 5
//! RUST_LOG=site_content=debug site --log-json list cheatsheets --tag git
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use site_content::config;
use site_content::models::{ContentKind, Document};
use site_content::refresh::RefreshReport;
use site_content::server;
use site_content::site::{self, Site};

#[derive(Parser)]
#[command(
    name = "site",
    about = "Serve and query posts and cheatsheets stored in GitHub repositories",
    version
)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply when
    /// omitted; environment variables override both.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Refresh one or both repositories and print the report.
    Sync {
        /// `posts`, `cheatsheets`, or `all`.
        #[arg(default_value = "all")]
        target: String,
    },

    /// List documents, newest first.
    List {
        kind: ContentKind,

        #[arg(long)]
        tag: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search documents for all terms of a query.
    Search {
        kind: ContentKind,

        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Print one document as JSON.
    Get { kind: ContentKind, slug: String },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = config::load_config(cli.config.as_deref())?;
    site::warn_on_missing_settings(&cfg);
    let site = Arc::new(Site::from_config(&cfg)?);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg, site).await?;
        }
        Commands::Sync { target } => {
            let results = if target.eq_ignore_ascii_case("all") {
                site.refresh_all().await
            } else {
                let kind: ContentKind = target.parse()?;
                vec![(kind, site.pipeline(kind).refresh_content().await)]
            };

            let mut failed = Vec::new();
            for (kind, result) in results {
                match result {
                    Ok(report) => print_report(&report),
                    Err(e) => {
                        eprintln!("sync {} failed: {:#}", kind, e);
                        failed.push(kind.to_string());
                    }
                }
            }
            if !failed.is_empty() {
                anyhow::bail!("sync failed for {}", failed.join(", "));
            }
            println!("ok");
        }
        Commands::List { kind, tag, limit } => {
            let pipeline = site.pipeline(kind);
            pipeline.refresh_content().await?;
            let mut docs = match tag {
                Some(tag) => pipeline.store().get_by_tag(&tag),
                None => pipeline.store().get_all(),
            };
            if let Some(limit) = limit {
                docs.truncate(limit);
            }
            print_documents(&docs);
        }
        Commands::Search { kind, query, limit } => {
            let pipeline = site.pipeline(kind);
            pipeline.refresh_content().await?;
            let mut results = pipeline.search(&query);
            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            results.truncate(limit);
            print_documents(&results);
        }
        Commands::Get { kind, slug } => {
            let pipeline = site.pipeline(kind);
            pipeline.refresh_content().await?;
            match pipeline.store().get_by_slug(&slug) {
                Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
                None => anyhow::bail!("no {} document with slug '{}'", kind, slug),
            }
        }
    }

    Ok(())
}

fn print_report(report: &RefreshReport) {
    println!("sync {}", report.kind);
    println!("  listed: {} entries", report.listed);
    println!("  candidates: {} markdown files", report.candidates);
    println!("  stored: {} documents", report.stored);
    if report.skipped_unpublished > 0 {
        println!("  skipped unpublished: {}", report.skipped_unpublished);
    }
    if report.skipped_invalid > 0 {
        println!("  skipped without slug: {}", report.skipped_invalid);
    }
    if report.duplicate_slugs > 0 {
        println!("  duplicate slugs replaced: {}", report.duplicate_slugs);
    }
    println!("  elapsed: {:.2}s", report.elapsed.as_secs_f64());
}

fn print_documents(docs: &[Document]) {
    for (i, doc) in docs.iter().enumerate() {
        println!("{}. {}  ({})", i + 1, doc.title, doc.slug);
        println!("    date: {}", doc.display_date);
        if !doc.tags.is_empty() {
            println!("    tags: {}", doc.tags.join(", "));
        }
        if !doc.summary.is_empty() {
            println!("    {}", doc.summary);
        }
    }
}
