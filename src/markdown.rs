//! Document parsing: front matter, Markdown rendering and sanitization.
//!
//! A document is a Markdown file with an optional YAML front matter block:
//!
//! ```text
//! ---
//! title: Hello
//! slug: hello
//! date: 2024-01-15
//! tags: [rust, web]
//! published: true
//! ---
//! Body in **Markdown**.
//! ```
//!
//! The input is split on the literal `---` into at most three segments
//! (preamble, front matter, body). With fewer than three segments there is
//! no front matter and the whole input is the body.
//!
//! The body is rendered with pulldown-cmark (tables, strikethrough, task
//! lists, footnotes, raw HTML passthrough). Bare URLs, `www.` hosts and
//! email addresses are autolinked, and the result is cleaned with ammonia,
//! because posts may embed arbitrary HTML.

use std::borrow::Cow;
use std::sync::LazyLock;

use ammonia::UrlRelative;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use pulldown_cmark::{
    html::push_html, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::debug;
use url::Url;

use crate::models::Document;

const FRONT_MATTER_DELIMITER: &str = "---";

static LANGUAGE_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^language-[a-zA-Z0-9]+$").expect("valid regex"));

/// Bare URLs, `www.` hosts and email addresses, GitHub-linkify style.
static BARE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?P<url>https?://[^\s<>"'`]+)"#,
        r#"|(?P<www>\bwww\.[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)+[^\s<>"'`]*)"#,
        r"|(?P<email>[a-zA-Z0-9._%+-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)+)",
    ))
    .expect("valid regex")
});

static ANCHOR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a\s[^>]*>").expect("valid regex"));

static RELATIVE_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://localhost/").expect("valid base URL"));

/// Metadata decoded from the front matter block.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    #[serde(alias = "ID", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "optional_date")]
    pub date: Option<DateTime<Utc>>,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub slug: String,
    #[serde(deserialize_with = "lenient_tags")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub published: bool,
}

/// Parse a raw Markdown file into a [`Document`].
///
/// Fails only when a front matter block is present but cannot be decoded.
pub fn parse_document(raw: &str) -> Result<Document> {
    let (front_matter, body) = match split_front_matter(raw) {
        Some((block, body)) => (parse_front_matter(block)?, body),
        None => {
            debug!("No front matter found in markdown content (length: {})", raw.len());
            (FrontMatter::default(), raw)
        }
    };

    let date = front_matter.date.unwrap_or_default();

    Ok(Document {
        id: front_matter.id,
        date,
        display_date: date.to_rfc3339_opts(SecondsFormat::Secs, true),
        title: front_matter.title,
        author: front_matter.author,
        summary: front_matter.summary,
        slug: front_matter.slug,
        tags: front_matter.tags,
        published: front_matter.published,
        content: render_markdown(body),
        raw_content: body.to_string(),
    })
}

/// Split `raw` into `(front_matter_block, body)`, or `None` when the input
/// has fewer than three `---`-separated segments.
pub fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.splitn(3, FRONT_MATTER_DELIMITER);
    let _preamble = parts.next()?;
    let block = parts.next()?;
    let body = parts.next()?;
    Some((block, body))
}

/// Decode a front matter block. An empty block yields default metadata.
pub fn parse_front_matter(block: &str) -> Result<FrontMatter> {
    if block.trim().is_empty() {
        return Ok(FrontMatter::default());
    }
    serde_yaml_ng::from_str(block).with_context(|| "Failed to parse YAML front matter")
}

/// Parse a front matter date: RFC 3339, `YYYY-MM-DD HH:MM:SS[ ±zzzz]`,
/// `YYYY-MM-DDTHH:MM:SS`, or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z") {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("unrecognized date: '{}'", value))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn optional_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(value) if !value.trim().is_empty() => parse_date(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// Accept strings, numbers and booleans for identifier-like fields
/// (`ID: 42` is common in hand-written front matter).
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml_ng::Value::deserialize(deserializer)?;
    match value {
        serde_yaml_ng::Value::Null => Ok(String::new()),
        serde_yaml_ng::Value::String(s) => Ok(s),
        serde_yaml_ng::Value::Number(n) => Ok(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar identifier, found {:?}",
            other
        ))),
    }
}

fn scalar_to_string(value: serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Some(s),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tags as a YAML list, or a single comma-separated string
/// (`tags: rust` or `tags: rust, web`).
fn lenient_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml_ng::Value::deserialize(deserializer)?;
    match value {
        serde_yaml_ng::Value::Null => Ok(Vec::new()),
        serde_yaml_ng::Value::Sequence(items) => items
            .into_iter()
            .map(|item| {
                scalar_to_string(item)
                    .ok_or_else(|| serde::de::Error::custom("tags must be scalar values"))
            })
            .collect(),
        other => {
            let joined = scalar_to_string(other).ok_or_else(|| {
                <D::Error as serde::de::Error>::custom("expected a list of tags")
            })?;
            Ok(joined
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect())
        }
    }
}

/// Booleans, boolean-looking strings (`"true"`, `"False"`, `"1"`) and 0/1.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml_ng::Value::deserialize(deserializer)?;
    match value {
        serde_yaml_ng::Value::Null => Ok(false),
        serde_yaml_ng::Value::Bool(b) => Ok(b),
        serde_yaml_ng::Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        serde_yaml_ng::Value::String(s) => match s.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, found '{}'",
                other
            ))),
        },
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean, found {:?}",
            other
        ))),
    }
}

// ============ Rendering ============

/// Render Markdown to sanitized HTML.
pub fn render_markdown(body: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;

    let parser = TextMergeStream::new(Parser::new_ext(body, options));
    let events = autolink_bare_urls(parser);

    let mut html = String::with_capacity(body.len() * 2);
    push_html(&mut html, events.into_iter());

    sanitize_html(&html)
}

/// Turn bare URLs, `www.` hosts and email addresses in text into links,
/// skipping text that is already inside a link, image, or code block.
fn autolink_bare_urls<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut out = Vec::new();
    let mut suppress = 0usize;

    for event in events {
        match event {
            Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. } | Tag::CodeBlock(_))) => {
                suppress += 1;
                out.push(Event::Start(tag));
            }
            Event::End(tag @ (TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock)) => {
                suppress = suppress.saturating_sub(1);
                out.push(Event::End(tag));
            }
            Event::Text(text) if suppress == 0 && BARE_LINK.is_match(&text) => {
                linkify_text(&text, &mut out);
            }
            other => out.push(other),
        }
    }

    out
}

fn linkify_text<'a>(text: &str, out: &mut Vec<Event<'a>>) {
    let mut cursor = 0;
    for caps in BARE_LINK.captures_iter(text) {
        let Some(found) = caps.get(0) else { continue };
        let (label, dest, link_type) = if caps.name("email").is_some() {
            let label = found.as_str();
            (label, format!("mailto:{}", label), LinkType::Email)
        } else {
            let label = found
                .as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']']);
            let dest = if caps.name("www").is_some() {
                format!("http://{}", label)
            } else {
                label.to_string()
            };
            (label, dest, LinkType::Autolink)
        };
        let start = found.start();
        let end = start + label.len();

        if start > cursor {
            out.push(Event::Text(CowStr::from(text[cursor..start].to_string())));
        }
        out.push(Event::Start(Tag::Link {
            link_type,
            dest_url: CowStr::from(dest),
            title: CowStr::from(""),
            id: CowStr::from(""),
        }));
        out.push(Event::Text(CowStr::from(label.to_string())));
        out.push(Event::End(TagEnd::Link));
        cursor = end;
    }
    if cursor < text.len() {
        out.push(Event::Text(CowStr::from(text[cursor..].to_string())));
    }
}

/// Clean rendered HTML for display.
///
/// - ammonia's default safelist of tags and attributes
/// - `class="language-*"` kept on `<code>` for syntax highlighting
/// - `href`/`src` values that do not parse as URLs are dropped
/// - fully-qualified links open in a new tab
pub fn sanitize_html(html: &str) -> String {
    let cleaned = ammonia::Builder::default()
        .add_tag_attributes("code", &["class"])
        .url_relative(UrlRelative::PassThrough)
        .attribute_filter(filter_attribute)
        .clean(html)
        .to_string();

    add_target_blank(&cleaned)
}

fn filter_attribute<'u>(element: &str, attribute: &str, value: &'u str) -> Option<Cow<'u, str>> {
    match (element, attribute) {
        ("code", "class") => LANGUAGE_CLASS
            .is_match(value)
            .then_some(Cow::Borrowed(value)),
        (_, "href" | "src") => is_parseable_url(value).then_some(Cow::Borrowed(value)),
        _ => Some(Cow::Borrowed(value)),
    }
}

fn is_parseable_url(value: &str) -> bool {
    Url::parse(value).is_ok() || RELATIVE_BASE.join(value).is_ok()
}

fn is_fully_qualified(href: &str) -> bool {
    href.starts_with("http://") || href.starts_with("https://") || href.starts_with("//")
}

fn add_target_blank(html: &str) -> String {
    ANCHOR_TAG
        .replace_all(html, |caps: &regex::Captures| {
            let tag = &caps[0];
            let external = tag
                .split("href=\"")
                .nth(1)
                .is_some_and(is_fully_qualified);
            if external && !tag.contains("target=") {
                tag.replacen("<a ", "<a target=\"_blank\" ", 1)
            } else {
                tag.to_string()
            }
        })
        .into_owned()
}
