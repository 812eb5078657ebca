//! Site identifier extraction from configured pharmacy endpoint URLs
//!
//! BareMeds endpoints embed the pharmacy site id in several historical URL
//! shapes. This is the single parser every caller goes through.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

static SITE_SEGMENT_REGEX: OnceLock<Regex> = OnceLock::new();
static DIGITS_BEFORE_API_REGEX: OnceLock<Regex> = OnceLock::new();

fn site_segment_regex() -> &'static Regex {
    SITE_SEGMENT_REGEX.get_or_init(|| Regex::new(r"/site/(\d+)(?:/|$)").expect("valid site pattern"))
}

fn digits_before_api_regex() -> &'static Regex {
    DIGITS_BEFORE_API_REGEX.get_or_init(|| Regex::new(r"/(\d+)/api(?:/|$)").expect("valid api pattern"))
}

/// Extract the pharmacy site id from an endpoint URL.
///
/// First match wins:
/// 1. `site_id` query parameter
/// 2. `/site/<digits>/` or `/<digits>/api` in the path
/// 3. the last path segment, when it is all digits
///
/// Returns `None` for anything else, including URLs that fail to parse.
pub fn extract_site_id_from_url(url: &str) -> Option<String> {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Could not parse endpoint URL for site id");
            return None;
        }
    };

    if let Some((_, site_id)) = parsed
        .query_pairs()
        .find(|(key, value)| key == "site_id" && !value.trim().is_empty())
    {
        return Some(site_id.trim().to_string());
    }

    let path = parsed.path();
    for regex in [site_segment_regex(), digits_before_api_regex()] {
        if let Some(captures) = regex.captures(path) {
            return Some(captures[1].to_string());
        }
    }

    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .filter(|segment| segment.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Path and query of an endpoint URL, for use against a configured base URL.
///
/// Falls back to the input when it is not an absolute URL (already a path).
pub fn endpoint_path(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.trim().to_string(),
    }
}
