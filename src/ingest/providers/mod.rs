// src/ingest/providers/mod.rs
pub mod hackernews;
pub mod reddit;
pub mod rss;

pub use hackernews::HackerNewsSource;
pub use reddit::RedditSource;
pub use rss::RssSource;
