// tests/ingest_config.rs
use pasture::ingest::config::{Config, SectionConfig, ENV_CONFIG_PATH};
use serial_test::serial;
use std::fs;

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn global_terms_merge_into_sources() {
    let cfg = Config::from_sections(vec![
        (
            "global".to_string(),
            SectionConfig {
                blacklist: strings(&["spam"]),
                remove_tags: strings(&["script", "style"]),
                ..Default::default()
            },
        ),
        (
            "rust".to_string(),
            SectionConfig {
                url: Some("https://www.reddit.com/r/rust/.json".into()),
                blacklist: strings(&["ads"]),
                remove_tags: strings(&["-style"]),
                ..Default::default()
            },
        ),
    ])
    .unwrap();

    let resolved = cfg.resolved_sources();
    assert_eq!(resolved.len(), 1);
    let s = &resolved[0];
    assert_eq!(s.name, "rust");
    assert!(s.blacklist.contains(&"spam".to_string()));
    assert!(s.blacklist.contains(&"ads".to_string()));
    assert_eq!(s.remove_tags, vec!["script"]);
    assert_eq!(s.kind, "reddit");
}

#[test]
fn toml_file_round_trip_through_loader() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("pasture.toml");
    fs::write(
        &path,
        r#"
[global]
blacklist = ["spam"]
remove_tags = "script, style"

[zeta]
url = "https://eng.example.com/feed.xml"
type = "RSS"
blacklist = "ads"
remove_tags = "-style"
max_age_days = 14

[alpha]
url = "https://news.ycombinator.com/"
"#,
    )
    .unwrap();

    let cfg = Config::load_from(&path).unwrap();
    // File order, not alphabetical.
    assert_eq!(cfg.source_names(), vec!["zeta", "alpha"]);
    assert!(!cfg.wants_schedule());

    let rs = cfg.resolved_sources();
    assert_eq!(rs[0].kind, "rss");
    assert_eq!(rs[0].blacklist, vec!["spam", "ads"]);
    assert_eq!(rs[0].remove_tags, vec!["script"]);
    assert_eq!(rs[0].max_age_days, Some(14));
    assert_eq!(rs[1].kind, "hackernews");
    assert_eq!(rs[1].remove_tags, vec!["script", "style"]);
}

#[test]
fn json_file_by_extension() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("pasture.json");
    fs::write(
        &path,
        r#"{"global": {"interval": 15}, "rust": {"url": "https://www.reddit.com/r/rust/.json"}}"#,
    )
    .unwrap();
    let cfg = Config::load_from(&path).unwrap();
    assert!(cfg.wants_schedule());
    assert_eq!(cfg.resolved_sources()[0].interval_minutes, Some(15));
}

#[test]
fn unknown_keys_and_duplicates_are_rejected() {
    let typo = Config::parse("[a]\nurl = \"https://x.com\"\nblaklist = \"x\"\n", "toml");
    assert!(typo.is_err());

    let dup = Config::from_sections(vec![
        (
            "a".to_string(),
            SectionConfig {
                url: Some("https://x.com".into()),
                ..Default::default()
            },
        ),
        (
            "a".to_string(),
            SectionConfig {
                url: Some("https://y.com".into()),
                ..Default::default()
            },
        ),
    ]);
    assert!(dup.is_err());
}

#[test]
#[serial]
fn env_var_path_must_exist() {
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/pasture.toml");
    let res = Config::load_default();
    std::env::remove_var(ENV_CONFIG_PATH);
    assert!(res.is_err());
}

#[test]
#[serial]
fn env_var_path_is_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("custom.toml");
    fs::write(&path, "[a]\nurl = \"https://x.com\"\n").unwrap();
    std::env::set_var(ENV_CONFIG_PATH, &path);
    let res = Config::load_default();
    std::env::remove_var(ENV_CONFIG_PATH);
    let (cfg, loaded_from) = res.unwrap();
    assert_eq!(loaded_from, path);
    assert_eq!(cfg.source_names(), vec!["a"]);
}
