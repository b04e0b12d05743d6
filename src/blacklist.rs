// src/blacklist.rs
//! Case-insensitive term lists: blacklist matching and global/source merging.

/// Prefix that turns a source-level entry into an opt-out of a global entry.
pub const KEEP_PREFIX: char = '-';

/// Terms from `terms` contained (case-insensitively) in any of `haystacks`.
/// Each matching term appears once, in list order.
pub fn matching_terms(terms: &[String], haystacks: &[&str]) -> Vec<String> {
    let lowered: Vec<String> = haystacks.iter().map(|h| h.to_lowercase()).collect();
    terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .filter(|t| {
            let needle = t.trim().to_lowercase();
            lowered.iter().any(|h| h.contains(&needle))
        })
        .cloned()
        .collect()
}

/// Merge a global list with a source list.
///
/// Source entries starting with `-` remove that entry from the global list;
/// everything else is unioned (global first) with case-insensitive duplicates
/// dropped.
pub fn merge_terms(global: &[String], local: &[String]) -> Vec<String> {
    let mut keep: Vec<String> = Vec::new();
    let mut added: Vec<&str> = Vec::new();
    for entry in local.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        match entry.strip_prefix(KEEP_PREFIX) {
            Some(kept) if !kept.trim().is_empty() => keep.push(kept.trim().to_lowercase()),
            Some(_) => {}
            None => added.push(entry),
        }
    }

    let mut out: Vec<String> = Vec::new();
    let candidates = global
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| !keep.contains(&s.to_lowercase()))
        .chain(added);
    for term in candidates {
        if !out.iter().any(|o| o.eq_ignore_ascii_case(term)) {
            out.push(term.to_string());
        }
    }
    out
}
