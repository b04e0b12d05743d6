// tests/ingest_e2e.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pasture::dedup::{DedupStore, DEDUP_FILE_NAME};
use pasture::ingest::providers::RedditSource;
use pasture::stats::STATS_FILE_NAME;
use pasture::{
    run_once, run_selected, url_hash, Config, FetchError, Fetcher, PageRenderer, RunStats,
    Source, SourceItem, SourceRegistry, SourceSettings, StatsStore,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const LISTING: &str = include_str!("fixtures/reddit_listing.json");
const ARTICLE: &str = include_str!("fixtures/article.html");
const ELIGIBLE_URL: &str =
    "https://blog.example.org/posts/faster-html-parser/?utm_source=reddit&utm_medium=social";

struct MockRenderer {
    html: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn render(&self, _url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.html.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn mock_fetcher() -> (Fetcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mock = MockRenderer {
        html: ARTICLE.to_string(),
        calls: calls.clone(),
    };
    (Fetcher::new(Box::new(mock), None), calls)
}

/// Hands out a fixed list of links, or fails when `items` is `None`.
struct StaticSource {
    settings: SourceSettings,
    items: Option<Vec<&'static str>>,
}

#[async_trait]
impl Source for StaticSource {
    fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    async fn fetch_posts(&self) -> Result<Vec<SourceItem>> {
        let urls = self
            .items
            .as_ref()
            .ok_or_else(|| anyhow!("upstream returned garbage"))?;
        Ok(urls
            .iter()
            .enumerate()
            .map(|(i, u)| SourceItem {
                id: i.to_string(),
                title: format!("link {i}"),
                url: u.to_string(),
                ..Default::default()
            })
            .collect())
    }

    fn filter_posts(&self, items: Vec<SourceItem>, stats: &mut RunStats) -> Vec<SourceItem> {
        items
            .into_iter()
            .filter(|p| !self.settings.reject_if_blacklisted(&[p.title.as_str()], stats))
            .collect()
    }
}

fn registry() -> SourceRegistry {
    let mut reg = SourceRegistry::empty();
    reg.register("reddit", |s| Ok(Box::new(RedditSource::from_fixture(s, LISTING))));
    reg.register("static", |s| {
        Ok(Box::new(StaticSource {
            settings: s,
            items: Some(vec![
                "https://i.redd.it/cat.png",
                "https://static.example.com/page",
            ]),
        }))
    });
    reg.register("broken", |s| {
        Ok(Box::new(StaticSource {
            settings: s,
            items: None,
        }))
    });
    reg
}

const REDDIT_ONLY: &str = r#"
[rust]
url = "https://www.reddit.com/r/rust/.json"
blacklist = ["politics"]
remove_tags = ["script", "style", "nav", "footer"]
"#;

fn files_with_ext(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let p = entry.unwrap().path();
            if p.is_dir() {
                stack.push(p);
            } else if p.extension().and_then(|e| e.to_str()) == Some(ext) {
                out.push(p);
            }
        }
    }
    out
}

#[tokio::test]
async fn one_eligible_post_becomes_one_markdown_file() {
    let cfg = Config::parse(REDDIT_ONLY, "toml").unwrap();
    let (fetcher, calls) = mock_fetcher();
    let tmp = tempfile::tempdir().unwrap();

    let stats = run_once(&cfg, &registry(), &fetcher, tmp.path()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.articles_scraped, 1);
    assert_eq!(stats.scraped_for("rust"), 1);
    assert_eq!(stats.sources_processed, vec!["rust"]);

    let md = files_with_ext(tmp.path(), "md");
    assert_eq!(md.len(), 1);
    let rel = md[0].strip_prefix(tmp.path()).unwrap();
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    assert_eq!(parts.len(), 5, "rust/YYYY/MM/DD/<hash>.md, got {rel:?}");
    assert_eq!(parts[0], "rust");
    assert_eq!(parts[1].len(), 4);
    assert_eq!(parts[2].len(), 2);
    assert_eq!(parts[3].len(), 2);
    assert_eq!(parts[4], format!("{}.md", url_hash(ELIGIBLE_URL)));
    assert!(files_with_ext(tmp.path(), "html").is_empty());

    let dedup = DedupStore::load_in(tmp.path());
    assert_eq!(dedup.len(), 1);
    assert!(dedup.contains(&url_hash(ELIGIBLE_URL)));
    assert!(tmp.path().join(DEDUP_FILE_NAME).exists());

    let saved = StatsStore::in_dir(tmp.path()).load();
    assert_eq!(saved.sessions.len(), 1);
    assert_eq!(saved.sessions[0].articles_scraped, 1);
    assert!(tmp.path().join(STATS_FILE_NAME).exists());
}

#[tokio::test]
async fn second_run_skips_already_processed_links() {
    let cfg = Config::parse(REDDIT_ONLY, "toml").unwrap();
    let (fetcher, calls) = mock_fetcher();
    let tmp = tempfile::tempdir().unwrap();

    run_once(&cfg, &registry(), &fetcher, tmp.path()).await.unwrap();
    let second = run_once(&cfg, &registry(), &fetcher, tmp.path()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.articles_scraped, 0);
    assert_eq!(second.articles_skipped_duplicate, 1);
    assert_eq!(files_with_ext(tmp.path(), "md").len(), 1);

    let saved = StatsStore::in_dir(tmp.path()).load();
    assert_eq!(saved.sessions.len(), 2);
    let day = saved.daily.values().next().unwrap();
    assert_eq!(day.sessions_count, 2);
    assert_eq!(day.articles_scraped, 1);
    assert_eq!(day.articles_skipped_duplicate, 1);
}

#[tokio::test]
async fn pre_fetch_blacklist_prevents_fetch() {
    let cfg = Config::parse(
        r#"
[global]
blacklist = ["parser"]

[rust]
url = "https://www.reddit.com/r/rust/.json"
"#,
        "toml",
    )
    .unwrap();
    let (fetcher, calls) = mock_fetcher();
    let tmp = tempfile::tempdir().unwrap();

    let stats = run_once(&cfg, &registry(), &fetcher, tmp.path()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(stats.articles_rejected_blacklist, 1);
    assert_eq!(stats.blacklist_hits_by_term.get("parser"), Some(&1));
    assert!(DedupStore::load_in(tmp.path()).is_empty());
}

#[tokio::test]
async fn post_fetch_rejection_is_remembered() {
    // Feed titles are "link N"; the rendered page title is what matches.
    let cfg = Config::parse(
        r#"
[links]
url = "https://static.example.com/"
type = "static"
blacklist = ["faster html"]
"#,
        "toml",
    )
    .unwrap();
    let (fetcher, calls) = mock_fetcher();
    let tmp = tempfile::tempdir().unwrap();

    let stats = run_once(&cfg, &registry(), &fetcher, tmp.path()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.articles_rejected_blacklist, 1);
    assert_eq!(stats.articles_scraped, 0);
    assert!(files_with_ext(tmp.path(), "md").is_empty());
    assert!(files_with_ext(tmp.path(), "html").is_empty());

    let dedup = DedupStore::load_in(tmp.path());
    assert!(dedup.contains(&url_hash("https://static.example.com/page")));
    assert!(!dedup.contains(&url_hash("https://i.redd.it/cat.png")));
}

#[tokio::test]
async fn failing_sources_do_not_stop_the_run() {
    let cfg = Config::parse(
        r#"
[ghost]
url = "gopher://ghost.example.com/"
type = "gopher"

[flaky]
url = "https://flaky.example.com/"
type = "broken"

[links]
url = "https://static.example.com/"
type = "static"
"#,
        "toml",
    )
    .unwrap();
    let (fetcher, calls) = mock_fetcher();
    let tmp = tempfile::tempdir().unwrap();

    let stats = run_once(&cfg, &registry(), &fetcher, tmp.path()).await.unwrap();
    // The media link is skipped without a render.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.articles_scraped, 1);
    assert_eq!(stats.scraped_for("links"), 1);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.source_breakdown["ghost"].errors, 1);
    assert_eq!(stats.source_breakdown["flaky"].errors, 1);
}

#[tokio::test]
async fn selected_run_touches_only_named_sources() {
    let cfg = Config::parse(
        r#"
[rust]
url = "https://www.reddit.com/r/rust/.json"

[links]
url = "https://static.example.com/"
type = "static"
"#,
        "toml",
    )
    .unwrap();
    let (fetcher, _) = mock_fetcher();
    let tmp = tempfile::tempdir().unwrap();

    let names = vec!["links".to_string(), "missing".to_string()];
    let stats = run_selected(&cfg, &registry(), &fetcher, tmp.path(), &names)
        .await
        .unwrap();
    assert_eq!(stats.sources_processed, vec!["links"]);
    assert!(!tmp.path().join("rust").exists());
}
