//! URL canonicalization for loosely-formed upstream strings.

/// Extensions a native player can open directly.
const DIRECT_MEDIA_EXTENSIONS: &[&str] = &["m3u8", "mp4", "webm"];

/// Canonicalize `raw` into an absolute `http(s)://` URL.
///
/// Returns an empty string when the input is not usable. Escaped slashes
/// (`https:\/\/host\/x`, common in scraped JSON) are unescaped first.
pub fn normalize_url(raw: &str) -> String {
    let value = raw.trim().replace("\\/", "/");
    if value.is_empty() {
        return String::new();
    }
    if has_http_scheme(&value) {
        return value;
    }
    if let Some(rest) = value.strip_prefix("//") {
        if rest.is_empty() {
            return String::new();
        }
        return format!("https:{value}");
    }
    if is_bare_domain(&value) {
        return format!("https://{value}");
    }
    String::new()
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `label.tld[/path]`: host chars are `[a-z0-9.-]`, the last label is at
/// least two ASCII letters, and anything after the first `/` is accepted.
fn is_bare_domain(value: &str) -> bool {
    let host = match value.find('/') {
        Some(idx) => &value[..idx],
        None => value,
    };
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }
    let Some((label, tld)) = host.rsplit_once('.') else {
        return false;
    };
    !label.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// True when an extension from `exts` appears right before `?` or the end.
fn has_extension(url: &str, exts: &[&str]) -> bool {
    let lower = url.to_ascii_lowercase();
    exts.iter().any(|ext| {
        let needle = format!(".{ext}");
        lower.match_indices(&needle).any(|(idx, _)| {
            let after = &lower[idx + needle.len()..];
            after.is_empty() || after.starts_with('?')
        })
    })
}

/// Direct media file (`.m3u8`, `.mp4`, `.webm`).
pub fn is_direct_media(url: &str) -> bool {
    has_extension(url, DIRECT_MEDIA_EXTENSIONS)
}

/// Adaptive-streaming manifest (HLS).
pub fn is_hls_manifest(url: &str) -> bool {
    has_extension(url, &["m3u8"])
}

/// Progressive file a plain `<video>`-style player opens (no manifest).
pub fn is_progressive_file(url: &str) -> bool {
    has_extension(url, &["mp4", "webm"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_absolute_urls() {
        assert_eq!(normalize_url("https://a.com/x"), "https://a.com/x");
        assert_eq!(normalize_url("  HTTP://A.com  "), "HTTP://A.com");
    }

    #[test]
    fn fixes_protocol_relative_and_bare_domains() {
        assert_eq!(normalize_url("//cdn.io/v.mp4"), "https://cdn.io/v.mp4");
        assert_eq!(normalize_url("ok.ru/embed/123"), "https://ok.ru/embed/123");
        assert_eq!(
            normalize_url("https:\\/\\/host.tv\\/e\\/abc"),
            "https://host.tv/e/abc"
        );
    }

    #[test]
    fn rejects_non_urls() {
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("contact us"), "");
        assert_eq!(normalize_url("HD-2"), "");
        assert_eq!(normalize_url("file.1"), "");
        assert_eq!(normalize_url("//"), "");
        assert_eq!(normalize_url("/relative/path"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "ok.ru/embed/1",
            "//x.y/z",
            "https://a.b/c?d=1",
            "junk",
            "  good.cdn/a.m3u8 ",
            "a\\/b.com",
            "",
        ] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn media_extension_checks() {
        assert!(is_direct_media("https://c.com/v.mp4"));
        assert!(is_direct_media("https://c.com/master.M3U8?token=1"));
        assert!(!is_direct_media("https://c.com/v.mp4.html"));
        assert!(!is_direct_media("https://ok.ru/embed/123"));
        assert!(is_hls_manifest("https://good.cdn/a.m3u8"));
        assert!(!is_hls_manifest("https://good.cdn/a.mp4"));
        assert!(is_progressive_file("https://good.cdn/a.webm?x"));
    }
}
