//! Decides how a resolved URL is rendered: native player, embedded page, or
//! not at all.

use crate::source::Candidate;
use crate::source::url::{is_direct_media, is_hls_manifest, is_progressive_file, normalize_url};
use reqwest::Url;
use serde::Serialize;

/// Hosts whose pages are known to embed a player.
const EMBED_HOSTS: &[&str] = &[
    "ok.ru",
    "dailymotion.com",
    "rumble.com",
    "vidhide",
    "rubyvid",
    "listeamed.net",
    "vidguard",
    "streamwish",
    "filemoon",
    "dood",
    "mixdrop",
    "streamtape",
    "mp4upload",
    "turbovidhls.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackMode {
    DirectMedia,
    Embed,
    Unavailable,
}

impl PlaybackMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackMode::DirectMedia => "direct-media",
            PlaybackMode::Embed => "embed",
            PlaybackMode::Unavailable => "unavailable",
        }
    }
}

/// What the render target can do on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCaps {
    /// Player opens HLS manifests without a segment loader.
    pub native_hls: bool,
}

impl Default for RuntimeCaps {
    fn default() -> Self {
        Self { native_hls: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaLoader {
    /// Hand the URL straight to the player.
    Native,
    /// Manifest needs segment-aware loading.
    Segmented,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PlaybackDirective {
    DirectMedia { url: String, loader: MediaLoader },
    Embed { url: String, source_url: String },
    Unavailable { open_url: Option<String> },
}

impl PlaybackDirective {
    pub fn mode(&self) -> PlaybackMode {
        match self {
            PlaybackDirective::DirectMedia { .. } => PlaybackMode::DirectMedia,
            PlaybackDirective::Embed { .. } => PlaybackMode::Embed,
            PlaybackDirective::Unavailable { .. } => PlaybackMode::Unavailable,
        }
    }
}

/// Embeddable form of `url`, if it is a page we know how to frame.
///
/// YouTube watch / short links are rewritten to `/embed/{id}`.
pub fn embed_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path();

    if host.contains("youtube.com") {
        if path.starts_with("/embed/") {
            return Some(parsed.to_string());
        }
        if path == "/watch" {
            let id = parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())?;
            return Some(format!("https://www.youtube.com/embed/{id}"));
        }
    }

    if host == "youtu.be" {
        let id = path.trim_start_matches('/');
        if id.is_empty() {
            return None;
        }
        return Some(format!("https://www.youtube.com/embed/{id}"));
    }

    let short_embed_path = path
        .strip_prefix("/e/")
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));

    if EMBED_HOSTS.iter().any(|h| host.contains(h))
        || short_embed_path
        || path.contains("/embed")
        || path.contains("videoembed")
    {
        return Some(parsed.to_string());
    }
    None
}

/// Pure classification of a playback URL.
pub fn classify(url: &str) -> PlaybackMode {
    if url.is_empty() {
        PlaybackMode::Unavailable
    } else if is_direct_media(url) {
        PlaybackMode::DirectMedia
    } else if embed_url(url).is_some() {
        PlaybackMode::Embed
    } else {
        PlaybackMode::Unavailable
    }
}

/// The active candidate's URL, or the first progressive file in the list.
pub fn pick_playback_url(active: Option<&Candidate>, candidates: &[Candidate]) -> String {
    let raw = active
        .map(|c| c.url.as_str())
        .filter(|u| !u.is_empty())
        .or_else(|| {
            candidates
                .iter()
                .map(|c| c.url.as_str())
                .find(|u| is_progressive_file(u))
        })
        .unwrap_or_default();
    normalize_url(raw)
}

pub fn resolve(url: &str, caps: RuntimeCaps) -> PlaybackDirective {
    match classify(url) {
        PlaybackMode::DirectMedia => {
            let loader = if is_hls_manifest(url) && !caps.native_hls {
                MediaLoader::Segmented
            } else {
                MediaLoader::Native
            };
            PlaybackDirective::DirectMedia {
                url: url.to_string(),
                loader,
            }
        }
        PlaybackMode::Embed => PlaybackDirective::Embed {
            url: embed_url(url).unwrap_or_else(|| url.to_string()),
            source_url: url.to_string(),
        },
        PlaybackMode::Unavailable => PlaybackDirective::Unavailable {
            open_url: (!url.is_empty()).then(|| url.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_url_shape() {
        assert_eq!(classify("https://cdn.example.com/video.mp4"), PlaybackMode::DirectMedia);
        assert_eq!(classify("https://ok.ru/embed/123"), PlaybackMode::Embed);
        assert_eq!(classify("https://x.host/e/abc"), PlaybackMode::Embed);
        assert_eq!(classify("https://x.host/player/videoembed/9"), PlaybackMode::Embed);
        assert_eq!(classify("https://x.host/watch/9"), PlaybackMode::Unavailable);
        assert_eq!(classify(""), PlaybackMode::Unavailable);
    }

    #[test]
    fn youtube_links_become_embeds() {
        assert_eq!(
            embed_url("https://www.youtube.com/watch?v=abc123&t=4").as_deref(),
            Some("https://www.youtube.com/embed/abc123")
        );
        assert_eq!(
            embed_url("https://youtu.be/xyz").as_deref(),
            Some("https://www.youtube.com/embed/xyz")
        );
        assert_eq!(embed_url("https://www.youtube.com/watch"), None);
        assert_eq!(embed_url("https://www.youtube.com/feed"), None);
    }

    #[test]
    fn hls_needs_segment_loader_only_without_native_support() {
        let url = "https://good.cdn/a.m3u8";
        assert_eq!(
            resolve(url, RuntimeCaps { native_hls: false }),
            PlaybackDirective::DirectMedia {
                url: url.to_string(),
                loader: MediaLoader::Segmented
            }
        );
        assert_eq!(
            resolve(url, RuntimeCaps { native_hls: true }),
            PlaybackDirective::DirectMedia {
                url: url.to_string(),
                loader: MediaLoader::Native
            }
        );
        let mp4 = resolve("https://good.cdn/a.mp4", RuntimeCaps { native_hls: false });
        assert!(matches!(
            mp4,
            PlaybackDirective::DirectMedia {
                loader: MediaLoader::Native,
                ..
            }
        ));
    }

    #[test]
    fn unavailable_keeps_outbound_link() {
        let d = resolve("https://site.tv/page", RuntimeCaps::default());
        assert_eq!(
            d,
            PlaybackDirective::Unavailable {
                open_url: Some("https://site.tv/page".into())
            }
        );
        assert_eq!(d.mode(), PlaybackMode::Unavailable);
    }

    #[test]
    fn playback_url_falls_back_to_first_progressive_file() {
        let list = vec![
            Candidate {
                id: "a".into(),
                label: "A".into(),
                url: "https://a.tv/page".into(),
            },
            Candidate {
                id: "b".into(),
                label: "B".into(),
                url: "https://b.tv/v.webm".into(),
            },
        ];
        assert_eq!(pick_playback_url(None, &list), "https://b.tv/v.webm");
        assert_eq!(pick_playback_url(Some(&list[0]), &list), "https://a.tv/page");
        assert_eq!(pick_playback_url(None, &[]), "");
    }
}
