// src/normalize.rs
//! URL canonicalization and the SHA-256 key used for deduplication.
//!
//! Normalization never fails: anything `url` cannot parse is returned as-is,
//! so every item still gets a stable hash.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use url::Url;

/// Query parameters that only carry tracking/referral state.
/// Matched case-insensitively against the parameter name.
pub const TRACKING_PARAMS: &[&str] = &[
    // Google Analytics / UTM
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "utm_name",
    "utm_brand",
    "utm_social",
    "utm_social-type",
    "utm_reader",
    "utm_referrer",
    "utm_viz_id",
    "utm_pubreferrer",
    "utm_swu",
    "utm_cid",
    "_ga",
    "_gl",
    "gclid",
    "gclsrc",
    "dclid",
    "gbraid",
    "wbraid",
    "gad_source",
    // Microsoft / Bing / Yandex
    "msclkid",
    "yclid",
    "_openstat",
    // Social referral
    "fbclid",
    "igshid",
    "igsh",
    "twclid",
    "ttclid",
    "li_fat_id",
    "trk",
    "trkcampaign",
    "sc_channel",
    "sc_campaign",
    "sc_content",
    "sc_medium",
    "sc_outcome",
    "sc_geo",
    "sc_country",
    "share",
    "share_id",
    "si",
    "s_cid",
    "ref_src",
    "ref_url",
    "rdt_cid",
    // Email / marketing automation
    "mc_cid",
    "mc_eid",
    "mkt_tok",
    "_hsenc",
    "_hsmi",
    "__hssc",
    "__hstc",
    "__hsfp",
    "hsctatracking",
    "vero_conv",
    "vero_id",
    "oly_anon_id",
    "oly_enc_id",
    "rb_clickid",
    "wickedid",
    "ml_subscriber",
    "ml_subscriber_hash",
    "ck_subscriber_id",
    // Matomo / Piwik
    "pk_campaign",
    "pk_kwd",
    "pk_source",
    "pk_medium",
    "pk_content",
    "mtm_campaign",
    "mtm_keyword",
    "mtm_source",
    "mtm_medium",
    "mtm_content",
    "mtm_cid",
    "mtm_group",
    "mtm_placement",
    // Affiliate
    "affiliate_id",
    "aff_id",
    "irclickid",
    "irgwc",
    "cmpid",
    "ncid",
    "spm",
    "scm",
];

fn is_tracking_param(name: &str) -> bool {
    TRACKING_PARAMS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(name))
}

/// Canonicalize `raw` for stable hashing.
///
/// Drops tracking query parameters (keeping the rest in their original order
/// and encoding) and trailing slashes on non-root paths. Scheme, host, the
/// rest of the path and the fragment are left alone.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };

    if let Some(query) = url.query().map(str::to_owned) {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let name = pair.split('=').next().unwrap_or_default();
                !is_tracking_param(name)
            })
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&kept.join("&")));
        }
    }

    if !url.cannot_be_a_base() {
        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            // Collapse every trailing slash so a second pass is a no-op.
            let trimmed = path.trim_end_matches('/');
            let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
            url.set_path(&trimmed);
        }
    }

    url.to_string()
}

/// Hex-encoded SHA-256 of an already normalized URL.
pub fn hash_normalized(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Dedup key for `raw`: `hash_normalized(normalize_url(raw))`.
pub fn url_hash(raw: &str) -> String {
    hash_normalized(&normalize_url(raw))
}
