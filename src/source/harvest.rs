//! Deep scan of untrusted JSON for URL-shaped strings.

use super::url::normalize_url;
use std::collections::HashSet;

pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Substrings that mark a field as URL-bearing.
const URL_KEY_HINTS: &[&str] = &["url", "src", "file", "embed", "stream", "video", "link"];

fn is_url_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    URL_KEY_HINTS.iter().any(|hint| key.contains(hint))
}

/// Collect normalized URLs from `value`, first occurrence order, no duplicates.
///
/// A string passed directly is always considered. Inside objects a string is
/// only taken when its field name carries a URL hint; array elements inherit
/// the decision of the field holding the array. Branches deeper than
/// `max_depth` are not expanded.
pub fn harvest_urls(value: &serde_json::Value, max_depth: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    walk(value, true, 0, max_depth, &mut out, &mut seen);
    out
}

fn walk(
    v: &serde_json::Value,
    key_allows: bool,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    if depth > max_depth {
        return;
    }
    match v {
        serde_json::Value::String(s) => {
            if !key_allows {
                return;
            }
            let url = normalize_url(s);
            if !url.is_empty() && seen.insert(url.clone()) {
                out.push(url);
            }
        }
        serde_json::Value::Array(a) => {
            for x in a {
                walk(x, key_allows, depth + 1, max_depth, out, seen);
            }
        }
        serde_json::Value::Object(o) => {
            for (k, x) in o {
                walk(x, is_url_key(k), depth + 1, max_depth, out, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ignores_fields_without_url_hint() {
        let v = json!({
            "meta": { "note": "contact us" },
            "stream": { "file": "good.cdn/a.m3u8" }
        });
        assert_eq!(harvest_urls(&v, DEFAULT_MAX_DEPTH), vec!["https://good.cdn/a.m3u8"]);
    }

    #[test]
    fn unrelated_fields_are_skipped_even_when_url_shaped() {
        let v = json!({ "title": "example.com", "embed_url": "//player.tv/e/1" });
        assert_eq!(harvest_urls(&v, DEFAULT_MAX_DEPTH), vec!["https://player.tv/e/1"]);
    }

    #[test]
    fn direct_string_is_harvested() {
        let v = json!("cdn.example.com/video.mp4");
        assert_eq!(
            harvest_urls(&v, DEFAULT_MAX_DEPTH),
            vec!["https://cdn.example.com/video.mp4"]
        );
    }

    #[test]
    fn arrays_inherit_field_decision() {
        let v = json!({
            "links": ["a.com/1", "a.com/1", "b.com/2"],
            "tags": ["c.com/3"]
        });
        assert_eq!(
            harvest_urls(&v, DEFAULT_MAX_DEPTH),
            vec!["https://a.com/1", "https://b.com/2"]
        );
    }

    #[test]
    fn depth_limit_stops_expansion() {
        let v = json!({ "a": { "b": { "c": { "url": "deep.io/x" } } } });
        assert!(harvest_urls(&v, 3).is_empty());
        assert_eq!(harvest_urls(&v, 4), vec!["https://deep.io/x"]);
    }
}
