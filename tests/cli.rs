mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use common::{markdown, FakeGitHub};
use tempfile::TempDir;

fn site_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_site"))
}

fn write_config(dir: &Path, api_base: &str) -> PathBuf {
    let path = dir.join("site.toml");
    fs::write(
        &path,
        format!(
            r#"
[github]
api_base = "{api_base}"
timeout_secs = 5

[retry]
max_retries = 1
base_delay_ms = 1

[content.posts]
owner = "jgndev"
repo = "posts"

[content.cheatsheets]
owner = "jgndev"
repo = "cheatsheets"
"#
        ),
    )
    .unwrap();
    path
}

async fn run(config: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(site_binary());
    cmd.arg("--config").arg(config).args(args);
    for key in [
        "GITHUB_TOKEN",
        "GITHUB_WEBHOOK_SECRET",
        "POSTS_REPO_OWNER",
        "POSTS_REPO_NAME",
        "CHEATSHEETS_REPO_OWNER",
        "CHEATSHEETS_REPO_NAME",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("RUST_LOG", "warn");
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

async fn setup() -> (TempDir, PathBuf, FakeGitHub) {
    let github = FakeGitHub::start().await;
    github.state.set_file(
        "posts",
        "hello.md",
        &markdown("hello", "2024-01-01", true, "Hello Rust", &["rust"]),
    );
    github.state.set_file(
        "posts",
        "draft.md",
        &markdown("draft", "2024-01-02", false, "Draft", &[]),
    );
    github.state.set_file(
        "posts",
        "tokio.md",
        &markdown("tokio", "2024-02-01", true, "Tokio tasks", &["rust", "async"]),
    );
    github.state.set_file(
        "cheatsheets",
        "git.md",
        &markdown("git", "2024-01-10", true, "Git", &["git"]),
    );

    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &github.base_url);
    (tmp, config, github)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_all_prints_reports() {
    let (_tmp, config, _github) = setup().await;
    let output = run(&config, &["sync"]).await;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sync posts"));
    assert!(stdout.contains("stored: 2 documents"));
    assert!(stdout.contains("skipped unpublished: 1"));
    assert!(stdout.contains("sync cheatsheets"));
    assert!(stdout.contains("stored: 1 documents"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_all_reports_each_kind_when_one_fails() {
    let github = FakeGitHub::start().await;
    github.state.set_file(
        "posts",
        "hello.md",
        &markdown("hello", "2024-01-01", true, "Hello Rust", &["rust"]),
    );
    // No cheatsheets repository: its listing is a 404.
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &github.base_url);

    let output = run(&config, &["sync"]).await;
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sync posts"), "{}", stdout);
    assert!(stdout.contains("stored: 1 documents"), "{}", stdout);
    assert!(!stdout.trim_end().ends_with("ok"), "{}", stdout);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sync cheatsheets failed"), "{}", stderr);
    assert!(stderr.contains("sync failed for cheatsheets"), "{}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_and_search() {
    let (_tmp, config, _github) = setup().await;

    let output = run(&config, &["list", "posts", "--tag", "async"]).await;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tokio tasks"));
    assert!(!stdout.contains("Hello Rust"));

    let output = run(&config, &["search", "posts", "rust"]).await;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let tokio_pos = stdout.find("Tokio tasks").unwrap();
    let hello_pos = stdout.find("Hello Rust").unwrap();
    assert!(tokio_pos < hello_pos, "newest result should come first");

    let output = run(&config, &["search", "posts", "nothing-matches-this"]).await;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No results."));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_prints_json_and_fails_on_missing_slug() {
    let (_tmp, config, _github) = setup().await;

    let output = run(&config, &["get", "cheatsheets", "git"]).await;
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["slug"], "git");
    assert_eq!(doc["published"], true);

    let output = run(&config, &["get", "posts", "draft"]).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("draft"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_github_fails_sync() {
    let tmp = TempDir::new().unwrap();
    // Nothing listens on port 9 locally.
    let config = write_config(tmp.path(), "http://127.0.0.1:9");

    let output = run(&config, &["sync", "posts"]).await;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to list posts repository"), "{}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.toml");
    fs::write(&path, "[webhook]\nbranches = []\n").unwrap();

    let output = Command::new(site_binary())
        .arg("--config")
        .arg(&path)
        .args(["list", "posts"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("webhook.branches"));
}
