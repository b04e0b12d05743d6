// src/ingest/providers/rss.rs
//! RSS 2.0 / Atom / RDF (RSS 1.0) feeds.
//!
//! Parsing walks quick-xml events instead of deserializing, because the three
//! shapes only share element names, not structure. Entity decoding is done by
//! `html_escape` so HTML entities that are not valid XML (`&nbsp;`) survive.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::counter;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{Source, SourceItem, SourceSettings};
use crate::stats::RunStats;

const FEED_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";
const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Rss,
    Atom,
    Rdf,
}

impl FeedKind {
    fn from_root(local: &str) -> Option<Self> {
        match local {
            "rss" => Some(Self::Rss),
            "feed" => Some(Self::Atom),
            "RDF" => Some(Self::Rdf),
            _ => None,
        }
    }

    fn item_tag(self) -> &'static str {
        match self {
            Self::Atom => "entry",
            Self::Rss | Self::Rdf => "item",
        }
    }
}

/// Item fields collected while inside one `<item>`/`<entry>`.
#[derive(Default)]
struct Draft {
    item: SourceItem,
    updated: Option<String>,
}

impl Draft {
    fn set_text(&mut self, field: &str, parent: Option<&str>, value: String) {
        if value.is_empty() {
            return;
        }
        let it = &mut self.item;
        match field {
            "title" if it.title.is_empty() => it.title = value,
            "link" if it.url.is_empty() => it.url = value,
            "description" | "summary" if it.description.is_none() => it.description = Some(value),
            "pubDate" | "published" | "date" if it.published.is_none() => {
                it.published = Some(value)
            }
            "updated" if self.updated.is_none() => self.updated = Some(value),
            "guid" | "id" if it.id.is_empty() => it.id = value,
            "author" | "creator" if it.author.is_none() => it.author = Some(value),
            "name" if parent == Some("author") && it.author.is_none() => it.author = Some(value),
            "category" | "subject" => it.categories.push(value),
            _ => {}
        }
    }

    fn set_attrs(&mut self, field: &str, e: &BytesStart<'_>) {
        match field {
            "link" if self.item.url.is_empty() => {
                let rel = attr(e, "rel");
                if rel.as_deref().map_or(true, |r| r == "alternate") {
                    if let Some(href) = attr(e, "href").filter(|h| !h.is_empty()) {
                        self.item.url = href;
                    }
                }
            }
            "category" => {
                if let Some(term) = attr(e, "term").filter(|t| !t.is_empty()) {
                    self.item.categories.push(term);
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> SourceItem {
        let mut item = self.item;
        if item.published.is_none() {
            item.published = self.updated;
        }
        item.kind = Some("entry".to_string());
        item
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .map(|a| decode(&a.value))
}

fn decode(raw: &[u8]) -> String {
    let s = String::from_utf8_lossy(raw);
    html_escape::decode_html_entities(&s).trim().to_string()
}

/// Element open below the current item, with the text gathered so far
/// (its own text plus that of its children).
struct Open {
    name: String,
    text: String,
}

fn push_chunk(buf: &mut String, chunk: &str) {
    if chunk.is_empty() {
        return;
    }
    if !buf.is_empty() && !buf.ends_with(char::is_whitespace) {
        buf.push(' ');
    }
    buf.push_str(chunk);
}

/// Parse any supported feed shape into items (unfiltered, feed order).
pub fn parse_feed(xml: &str) -> Result<Vec<SourceItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut kind: Option<FeedKind> = None;
    let mut out = Vec::new();
    let mut draft: Option<Draft> = None;
    let mut open: Vec<Open> = Vec::new();

    loop {
        let ev = reader
            .read_event()
            .map_err(|e| anyhow!("xml error at {}: {e}", reader.buffer_position()))?;
        match ev {
            Event::Start(e) => {
                let name = local_name(&e);
                let Some(k) = kind else {
                    let root = FeedKind::from_root(&name)
                        .ok_or_else(|| anyhow!("unsupported feed root <{name}>"))?;
                    kind = Some(root);
                    continue;
                };
                if let Some(d) = draft.as_mut() {
                    d.set_attrs(&name, &e);
                    open.push(Open {
                        name,
                        text: String::new(),
                    });
                } else if name == k.item_tag() {
                    draft = Some(Draft::default());
                    open.clear();
                }
            }
            Event::Empty(e) => {
                if let Some(d) = draft.as_mut() {
                    d.set_attrs(&local_name(&e), &e);
                }
            }
            Event::Text(t) => {
                if let Some(top) = open.last_mut() {
                    push_chunk(&mut top.text, &decode(&t.into_inner()));
                }
            }
            Event::CData(c) => {
                if let Some(top) = open.last_mut() {
                    push_chunk(&mut top.text, String::from_utf8_lossy(&c.into_inner()).trim());
                }
            }
            Event::End(_) => {
                if draft.is_none() {
                    continue;
                }
                let Some(done) = open.pop() else {
                    // Closing the item itself.
                    if let Some(d) = draft.take() {
                        out.push(d.finish());
                    }
                    continue;
                };
                // Markup inside a field (xhtml titles, inline tags) still
                // contributes its text to the enclosing field.
                if let Some(parent) = open.last_mut() {
                    push_chunk(&mut parent.text, &done.text);
                }
                let parent = open.last().map(|o| o.name.as_str());
                if let Some(d) = draft.as_mut() {
                    d.set_text(&done.name, parent, done.text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if kind.is_none() {
        return Err(anyhow!("empty feed document"));
    }
    Ok(out)
}

/// Unix seconds from the date formats feeds commonly use.
pub fn parse_feed_date(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Some(dt.unix_timestamp());
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(dt.unix_timestamp());
    }
    // Lenient fallbacks: named zones like "GMT"/"EST", then zone-less forms.
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
    }
    None
}

/// Missing or unparseable dates count as recent.
pub fn within_age(published: Option<&str>, max_age_days: u64, now: DateTime<Utc>) -> bool {
    let Some(ts) = published.and_then(parse_feed_date) else {
        return true;
    };
    let age_days = now.timestamp().saturating_sub(ts) / 86_400;
    age_days <= max_age_days as i64
}

pub struct RssSource {
    settings: SourceSettings,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RssSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        if settings.url.trim().is_empty() {
            return Err(anyhow!("rss source '{}' requires a url", settings.name));
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(FEED_ACCEPT),
        );
        let client = reqwest::Client::builder()
            .user_agent(FEED_USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("building rss client")?;
        Ok(Self {
            settings,
            mode: Mode::Http { client },
        })
    }

    pub fn from_fixture(settings: SourceSettings, xml: &str) -> Self {
        Self {
            settings,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    /// `filter_posts` against a fixed clock.
    pub fn filter_posts_at(
        &self,
        items: Vec<SourceItem>,
        stats: &mut RunStats,
        now: DateTime<Utc>,
    ) -> Vec<SourceItem> {
        let total = items.len();
        let kept: Vec<SourceItem> = items
            .into_iter()
            .filter(|p| !p.title.trim().is_empty() && !p.url.trim().is_empty())
            .filter(|p| {
                let desc = p.description.as_deref().unwrap_or_default();
                !self
                    .settings
                    .reject_if_blacklisted(&[p.title.as_str(), desc], stats)
            })
            .filter(|p| match self.settings.max_age_days {
                Some(days) => within_age(p.published.as_deref(), days, now),
                None => true,
            })
            .collect();
        tracing::debug!(source = %self.settings.name, total, kept = kept.len(), "rss items filtered");
        kept
    }
}

#[async_trait]
impl Source for RssSource {
    fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    async fn fetch_posts(&self) -> Result<Vec<SourceItem>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client } => {
                let resp = client
                    .get(&self.settings.url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                let text = match resp {
                    Ok(r) => r.text().await,
                    Err(e) => Err(e),
                };
                match text {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(source = %self.settings.name, error = %e, "rss fetch failed");
                        counter!("pasture_source_errors_total").increment(1);
                        return Ok(Vec::new());
                    }
                }
            }
        };
        let items = parse_feed(&body)
            .with_context(|| format!("parsing feed for '{}'", self.settings.name))?;
        tracing::info!(source = %self.settings.name, count = items.len(), "fetched feed items");
        Ok(items)
    }

    fn filter_posts(&self, items: Vec<SourceItem>, stats: &mut RunStats) -> Vec<SourceItem> {
        self.filter_posts_at(items, stats, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_formats() {
        let want = 1_704_067_200; // 2024-01-01T00:00:00Z
        assert_eq!(parse_feed_date("Mon, 01 Jan 2024 00:00:00 +0000"), Some(want));
        assert_eq!(parse_feed_date("2024-01-01T00:00:00Z"), Some(want));
        assert_eq!(parse_feed_date("2024-01-01T01:00:00+0100"), Some(want));
        assert_eq!(parse_feed_date("2024-01-01 00:00:00"), Some(want));
        assert_eq!(parse_feed_date("2024-01-01"), Some(want));
        assert_eq!(parse_feed_date("yesterday"), None);
    }

    #[test]
    fn age_filter_keeps_unknown_dates() {
        let now = DateTime::parse_from_rfc3339("2024-01-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(within_age(Some("2024-01-08"), 3, now));
        assert!(!within_age(Some("2023-12-01"), 3, now));
        assert!(within_age(Some("garbage"), 3, now));
        assert!(within_age(None, 3, now));
    }

    #[test]
    fn lenient_entities_and_cdata() {
        let xml = r#"<rss><channel><item><title>A&nbsp;B &amp; C</title><link>https://x.com/1</link><description><![CDATA[<p>hi</p>]]></description></item></channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "A\u{a0}B & C");
        assert_eq!(items[0].description.as_deref(), Some("<p>hi</p>"));
    }

    #[test]
    fn unknown_root_is_an_error() {
        assert!(parse_feed("<html><body/></html>").is_err());
    }
}
