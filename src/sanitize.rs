// src/sanitize.rs
//! Content Sanitizer: fetched HTML -> minimal HTML -> Markdown.
//!
//! The cleaned tree is written out by hand instead of mutating the parsed DOM:
//! removed tags are skipped with their subtree, comments/doctypes vanish,
//! anchors keep only `href`, images only `src`, every other element loses all
//! attributes.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{node::Node, ElementRef, Html, Selector};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::blacklist::matching_terms;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Effective per-source rules handed to the sanitizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentRules {
    pub tags_to_remove: Vec<String>,
    pub blacklist: Vec<String>,
}

impl ContentRules {
    pub fn new(tags_to_remove: Vec<String>, blacklist: Vec<String>) -> Self {
        Self {
            tags_to_remove,
            blacklist,
        }
    }
}

#[derive(Debug)]
pub enum SanitizeOutcome {
    /// Markdown written, raw HTML deleted.
    Converted(PathBuf),
    /// Derived title hit the blacklist; both files deleted.
    Rejected(Vec<String>),
    /// Processing error; raw HTML left on disk for inspection.
    Failed(anyhow::Error),
}

/// Title text plus serialized body of a cleaned document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedHtml {
    pub title: String,
    pub body: String,
}

fn selector(cell: &'static OnceCell<Selector>, css: &'static str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).unwrap())
}

/// Strip `tags_to_remove` (case-insensitive) and attributes, rewrite links.
pub fn clean_html(html: &str, tags_to_remove: &[String]) -> CleanedHtml {
    static TITLE: OnceCell<Selector> = OnceCell::new();
    static BODY: OnceCell<Selector> = OnceCell::new();

    let remove: HashSet<String> = tags_to_remove
        .iter()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    // Removing the root removes everything.
    if remove.contains("html") {
        return CleanedHtml::default();
    }
    let doc = Html::parse_document(html);

    let title = if remove.contains("title") || remove.contains("head") {
        String::new()
    } else {
        doc.select(selector(&TITLE, "title"))
            .next()
            .map(|t| collapse_ws(&t.text().collect::<String>()))
            .unwrap_or_default()
    };

    let mut body = String::new();
    if !remove.contains("body") {
        if let Some(b) = doc.select(selector(&BODY, "body")).next() {
            write_children(b, &remove, &mut body);
        }
    }

    CleanedHtml { title, body }
}

fn write_children(el: ElementRef<'_>, remove: &HashSet<String>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(&html_escape::encode_text(&**t)),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, remove, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(el: ElementRef<'_>, remove: &HashSet<String>, out: &mut String) {
    let name = el.value().name().to_ascii_lowercase();
    if remove.contains(&name) {
        return;
    }

    out.push('<');
    out.push_str(&name);
    let kept = match name.as_str() {
        "a" => el.value().attr("href").map(|h| ("href", rewrite_href(h))),
        "img" => el.value().attr("src").map(|s| ("src", asset_basename(s))),
        _ => None,
    };
    if let Some((attr, value)) = kept {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(&value));
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name.as_str()) {
        return;
    }
    write_children(el, remove, out);
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// Absolute `http(s)://host/rest` becomes `/rest`; anything else is kept.
pub fn rewrite_href(href: &str) -> String {
    let trimmed = href.trim();
    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return trimmed.to_string();
    }
    match trimmed.splitn(4, '/').nth(3) {
        Some(rest) => format!("/{rest}"),
        None => "/".to_string(),
    }
}

/// Last path segment of an image source.
pub fn asset_basename(src: &str) -> String {
    let trimmed = src.trim();
    trimmed
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title line, blank line, converted body. Runs of 3+ newlines collapse to 2.
pub fn render_markdown(title: &str, body_html: &str) -> Result<String> {
    static RE_NL: OnceCell<Regex> = OnceCell::new();
    let re_nl = RE_NL.get_or_init(|| Regex::new(r"\n{3,}").unwrap());

    let body = if body_html.trim().is_empty() {
        String::new()
    } else {
        htmd::convert(body_html).context("converting html to markdown")?
    };
    let body = body.replace("\r\n", "\n");
    let body = re_nl.replace_all(body.trim(), "\n\n");

    let mut out = String::new();
    let title = title.trim();
    if !title.is_empty() {
        out.push_str(title);
        out.push_str("\n\n");
    }
    out.push_str(&body);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// First non-blank line of a converted document.
pub fn inferred_title(doc: &str) -> Option<&str> {
    doc.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Convert `html_path` to `<stem>.md` next to it, then run the post-fetch
/// blacklist check on the derived title.
pub fn sanitize(html_path: &Path, rules: &ContentRules) -> SanitizeOutcome {
    let md_path = match convert_file(html_path, rules) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(path = %html_path.display(), error = ?e, "sanitize failed, raw html kept");
            return SanitizeOutcome::Failed(e);
        }
    };

    let doc = match fs::read_to_string(&md_path)
        .with_context(|| format!("reading back {}", md_path.display()))
    {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(path = %md_path.display(), error = ?e, "post-check failed, raw html kept");
            return SanitizeOutcome::Failed(e);
        }
    };

    let hits = inferred_title(&doc)
        .map(|t| matching_terms(&rules.blacklist, &[t]))
        .unwrap_or_default();
    if !hits.is_empty() {
        tracing::info!(path = %md_path.display(), terms = ?hits, "document rejected by blacklist");
        remove_quietly(&md_path);
        remove_quietly(html_path);
        return SanitizeOutcome::Rejected(hits);
    }

    remove_quietly(html_path);
    SanitizeOutcome::Converted(md_path)
}

fn convert_file(html_path: &Path, rules: &ContentRules) -> Result<PathBuf> {
    let bytes =
        fs::read(html_path).with_context(|| format!("reading {}", html_path.display()))?;
    let raw = String::from_utf8_lossy(&bytes);
    let cleaned = clean_html(&raw, &rules.tags_to_remove);
    let doc = render_markdown(&cleaned.title, &cleaned.body)?;

    let md_path = html_path.with_extension("md");
    fs::write(&md_path, doc).with_context(|| format!("writing {}", md_path.display()))?;
    Ok(md_path)
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not delete file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn removing_html_empties_the_document() {
        let c = clean_html(
            "<html><head><title>T</title></head><body><p>x</p></body></html>",
            &tags(&["HTML"]),
        );
        assert_eq!(c, CleanedHtml::default());
        assert_eq!(render_markdown(&c.title, &c.body).unwrap(), "");
    }

    #[test]
    fn href_rewrite_keeps_path_after_host() {
        assert_eq!(rewrite_href("https://site.com/a/b/c"), "/a/b/c");
        assert_eq!(rewrite_href("HTTP://site.com/x?y=1"), "/x?y=1");
        assert_eq!(rewrite_href("https://site.com"), "/");
        assert_eq!(rewrite_href("/local/page"), "/local/page");
        assert_eq!(rewrite_href("#frag"), "#frag");
    }

    #[test]
    fn image_src_becomes_basename() {
        assert_eq!(asset_basename("https://cdn.x.com/img/pic.png"), "pic.png");
        assert_eq!(asset_basename("pic.png"), "pic.png");
    }

    #[test]
    fn removed_tags_vanish_with_children() {
        let html = "<html><body><p>keep</p><nav><p>menu item</p></nav><script>var x=1;</script></body></html>";
        let c = clean_html(html, &tags(&["nav", "SCRIPT"]));
        assert_eq!(c.body, "<p>keep</p>");
    }

    #[test]
    fn attributes_are_stripped_except_href_and_src() {
        let html = r#"<body><div class="x" onclick="y"><a href="https://s.com/a/b" class="l">l</a><img src="/i/p.jpg" alt="p"><br></div></body>"#;
        let c = clean_html(html, &[]);
        assert_eq!(
            c.body,
            r#"<div><a href="/a/b">l</a><img src="p.jpg"><br></div>"#
        );
    }

    #[test]
    fn text_is_escaped_and_comments_dropped() {
        let c = clean_html("<body><!-- hi --><p>a &lt; b</p></body>", &[]);
        assert_eq!(c.body, "<p>a &lt; b</p>");
    }

    #[test]
    fn title_is_collapsed_and_first_line() {
        let c = clean_html(
            "<html><head><title>  Big\n  News </title></head><body><p>Body text</p></body></html>",
            &[],
        );
        assert_eq!(c.title, "Big News");
        let md = render_markdown(&c.title, &c.body).unwrap();
        assert!(md.starts_with("Big News\n\n"));
        assert!(md.contains("Body text"));
        assert_eq!(inferred_title(&md), Some("Big News"));
    }

    #[test]
    fn blank_lines_collapse() {
        let md = render_markdown("", "<p>a</p><br><br><br><br><p>b</p>").unwrap();
        assert!(!md.contains("\n\n\n"));
    }
}
