// tests/dedup_store.rs
use pasture::dedup::{DedupStore, DEDUP_FILE_NAME};
use std::fs;

#[test]
fn missing_file_is_empty_set() {
    let tmp = tempfile::tempdir().unwrap();
    let s = DedupStore::load_in(tmp.path());
    assert!(s.is_empty());
    assert_eq!(s.path(), tmp.path().join(DEDUP_FILE_NAME));
}

#[test]
fn corrupt_file_is_empty_set() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(DEDUP_FILE_NAME), "{not json").unwrap();
    let s = DedupStore::load_in(tmp.path());
    assert!(s.is_empty());
}

#[test]
fn saved_set_survives_reload_and_gates_variants() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = DedupStore::load_in(tmp.path());
    s.mark_processed("https://x.com/a?utm_source=feed");
    s.mark_processed("https://x.com/b");
    s.save().unwrap();

    let raw = fs::read_to_string(tmp.path().join(DEDUP_FILE_NAME)).unwrap();
    let hashes: Vec<String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(hashes.len(), 2);
    assert!(hashes.windows(2).all(|w| w[0] <= w[1]), "sorted on disk");
    assert!(hashes.iter().all(|h| h.len() == 64));

    let reloaded = DedupStore::load_in(tmp.path());
    assert_eq!(reloaded.len(), 2);
    assert!(!reloaded.should_fetch("https://x.com/a/"));
    assert!(!reloaded.should_fetch("https://x.com/b?fbclid=zzz"));
    assert!(reloaded.should_fetch("https://x.com/c"));
}

#[test]
fn save_overwrites_previous_content() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = DedupStore::load_in(tmp.path());
    s.mark_processed("https://x.com/a");
    s.save().unwrap();
    s.clear();
    s.save().unwrap();
    assert!(DedupStore::load_in(tmp.path()).is_empty());
    assert!(!tmp.path().join("processed_urls.json.tmp").exists());
}
