//! Series detail payloads: usability check, episode listing and the
//! episode the viewer most likely wants.

use crate::playback::resolver::embed_url;
use crate::source::url::normalize_url;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeEntry {
    pub id: String,
    pub episode_id: String,
    pub number: Option<u32>,
    pub title: String,
    pub series: String,
}

/// Strings as-is, numbers printed, anything else empty.
fn text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn first_text(obj: &Value, keys: &[&str]) -> String {
    keys.iter()
        .map(|k| text(obj.get(k)))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// `"martial-peak-episode-12-subtitle"` -> `"martial-peak"`.
pub fn derive_series_slug(slug: &str) -> String {
    let raw = slug.trim();
    let lower = raw.to_ascii_lowercase();
    let mut search = 0;
    while let Some(pos) = lower[search..].find("-episode-") {
        let at = search + pos;
        let after = &lower[at + "-episode-".len()..];
        if after.starts_with(|c: char| c.is_ascii_digit()) {
            let base = raw[..at].trim();
            return if base.is_empty() { raw.to_string() } else { base.to_string() };
        }
        search = at + 1;
    }
    raw.to_string()
}

/// First run of ASCII digits in `text`.
pub fn parse_episode_number(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// A detail payload worth showing: a real name, episodes, or a synopsis.
pub fn is_usable_detail(payload: &Value) -> bool {
    let Some(result) = payload.get("result").filter(|r| r.is_object()) else {
        return false;
    };

    let name = text(result.get("name")).trim().to_lowercase();
    if !name.is_empty() && name != "unknown title" {
        return true;
    }
    if result
        .get("episode")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty())
    {
        return true;
    }
    let synopsis = result.get("sinopsis");
    if !text(synopsis).trim().is_empty() {
        return true;
    }
    synopsis
        .and_then(|s| s.get("paragraphs"))
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty())
}

pub fn series_title(payload: &Value) -> String {
    let name = text(payload.pointer("/result/name"));
    if name.trim().is_empty() {
        "Untitled".to_string()
    } else {
        name.trim().to_string()
    }
}

/// Where to send the viewer when no stream plays here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeriesLinks {
    /// Series page, trailer page, or the site's own page for the series.
    pub page: Option<String>,
    pub trailer_embed: Option<String>,
}

fn first_url(payload: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .map(|p| normalize_url(&text(payload.pointer(p))))
        .find(|u| !u.is_empty())
}

/// Outbound links from a detail payload. `site_url` (may be empty) gives
/// the last-resort page `{site_url}/{series}`.
pub fn series_links(payload: &Value, series: &str, site_url: &str) -> SeriesLinks {
    let site = site_url.trim().trim_end_matches('/');
    let site_page = (!site.is_empty() && !series.trim().is_empty())
        .then(|| format!("{site}/{}", urlencoding::encode(series.trim())));

    let page = first_url(
        payload,
        &["/result/url", "/url", "/result/trailer/url", "/trailer/url"],
    )
    .or(site_page);

    let trailer_embed = [
        "/result/trailer/embed_url",
        "/result/trailer/url",
        "/trailer/embed_url",
        "/trailer/url",
    ]
    .iter()
    .filter_map(|p| first_url(payload, &[*p]))
    .find_map(|u| embed_url(&u));

    SeriesLinks { page, trailer_embed }
}

pub fn extract_episodes(payload: &Value) -> Vec<EpisodeEntry> {
    let list = payload
        .pointer("/result/episode")
        .and_then(Value::as_array)
        .or_else(|| payload.pointer("/data/episodes").and_then(Value::as_array));
    let Some(list) = list else {
        return Vec::new();
    };
    let payload_slug = text(payload.get("slug"));

    list.iter()
        .filter(|e| e.is_object())
        .map(|episode| {
            let episode_id = first_text(episode, &["slug", "episodeId", "id"]);
            let number_src = {
                let s = first_text(episode, &["episode", "subtitle", "name"]);
                if s.is_empty() { episode_id.clone() } else { s }
            };
            let number = parse_episode_number(&number_src);
            let shown_no = number.or_else(|| parse_episode_number(&episode_id));
            let raw_title = first_text(episode, &["subtitle", "name"]);
            let title = episode_title(&raw_title, shown_no);

            let root = text(episode.get("root"));
            EpisodeEntry {
                id: if episode_id.is_empty() { title.clone() } else { episode_id.clone() },
                episode_id,
                number,
                title,
                series: if root.is_empty() { payload_slug.clone() } else { root },
            }
        })
        .collect()
}

fn episode_title(raw: &str, number: Option<u32>) -> String {
    let number = number.filter(|n| *n > 0);
    if raw.is_empty() {
        return match number {
            Some(n) => format!("Episode {n}"),
            None => "Episode".to_string(),
        };
    }
    if starts_with_episode_number(raw) {
        return raw.to_string();
    }
    match number {
        Some(n) => format!("Episode {n} - {raw}"),
        None => raw.to_string(),
    }
}

fn starts_with_episode_number(s: &str) -> bool {
    let lower = s.to_lowercase();
    lower
        .strip_prefix("episode")
        .map(str::trim_start)
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// Numbered episodes ascending, then the rest by title ignoring case.
pub fn sort_episodes(mut list: Vec<EpisodeEntry>) -> Vec<EpisodeEntry> {
    list.sort_by(|a, b| {
        let an = a.number.filter(|n| *n > 0);
        let bn = b.number.filter(|n| *n > 0);
        match (an, bn) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        }
    });
    list
}

/// Explicit id, else the episode with `by_number`, else the lowest-numbered one.
pub fn pick_episode_id(
    episodes: &[EpisodeEntry],
    by_id: Option<&str>,
    by_number: Option<u32>,
) -> Option<String> {
    if let Some(id) = by_id.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(id.to_string());
    }

    if let Some(n) = by_number.filter(|n| *n > 0)
        && let Some(hit) = episodes
            .iter()
            .find(|e| e.number == Some(n) && !e.episode_id.is_empty())
    {
        return Some(hit.episode_id.clone());
    }

    episodes
        .iter()
        .filter(|e| !e.episode_id.is_empty())
        .min_by_key(|e| e.number.unwrap_or(0))
        .map(|e| e.episode_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn series_slug_drops_episode_suffix() {
        assert_eq!(derive_series_slug("martial-peak-episode-12-subtitle"), "martial-peak");
        assert_eq!(derive_series_slug("Martial-Peak-Episode-3"), "Martial-Peak");
        assert_eq!(derive_series_slug("martial-peak"), "martial-peak");
        assert_eq!(derive_series_slug("show-episode-x"), "show-episode-x");
        assert_eq!(derive_series_slug("-episode-4"), "-episode-4");
        assert_eq!(derive_series_slug("  "), "");
    }

    #[test]
    fn episode_number_is_first_digit_run() {
        assert_eq!(parse_episode_number("Episode 12 END"), Some(12));
        assert_eq!(parse_episode_number("ep-007"), Some(7));
        assert_eq!(parse_episode_number("special"), None);
    }

    #[test]
    fn detail_usability_rules() {
        assert!(!is_usable_detail(&json!(null)));
        assert!(!is_usable_detail(&json!({"result": {"name": "Unknown Title"}})));
        assert!(is_usable_detail(&json!({"result": {"name": "Soul Land"}})));
        assert!(is_usable_detail(&json!({"result": {"episode": [{}]}})));
        assert!(is_usable_detail(&json!({"result": {"sinopsis": {"paragraphs": ["x"]}}})));
        assert!(!is_usable_detail(&json!({"result": {"sinopsis": {"paragraphs": []}}})));
    }

    #[test]
    fn episodes_get_numbers_and_titles() {
        let payload = json!({
            "slug": "soul-land",
            "result": {
                "episode": [
                    {"slug": "soul-land-episode-2", "episode": "2", "subtitle": "The Trial"},
                    {"slug": "soul-land-episode-1", "name": "Episode 1 Begins", "root": "soul-land-2"},
                    {"slug": "soul-land-special"},
                    "garbage"
                ]
            }
        });
        let eps = extract_episodes(&payload);
        assert_eq!(eps.len(), 3);
        assert_eq!(eps[0].number, Some(2));
        assert_eq!(eps[0].title, "Episode 2 - The Trial");
        assert_eq!(eps[0].series, "soul-land");
        assert_eq!(eps[1].title, "Episode 1 Begins");
        assert_eq!(eps[1].series, "soul-land-2");
        assert_eq!(eps[2].number, None);
        assert_eq!(eps[2].title, "Episode");
        assert_eq!(eps[2].id, "soul-land-special");
    }

    #[test]
    fn sorting_puts_numbered_first() {
        let e = |id: &str, n: Option<u32>, title: &str| EpisodeEntry {
            id: id.into(),
            episode_id: id.into(),
            number: n,
            title: title.into(),
            series: "s".into(),
        };
        let sorted = sort_episodes(vec![
            e("z", None, "zeta"),
            e("b", Some(2), "two"),
            e("a", None, "Alpha"),
            e("c", Some(1), "one"),
        ]);
        let ids: Vec<&str> = sorted.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a", "z"]);
    }

    #[test]
    fn episode_pick_order() {
        let eps = extract_episodes(&json!({"result": {"episode": [
            {"slug": "s-episode-3", "episode": 3},
            {"slug": "s-episode-1", "episode": 1},
            {"slug": "s-episode-2", "episode": 2}
        ]}}));
        assert_eq!(pick_episode_id(&eps, Some(" given "), Some(2)).as_deref(), Some("given"));
        assert_eq!(pick_episode_id(&eps, None, Some(2)).as_deref(), Some("s-episode-2"));
        assert_eq!(pick_episode_id(&eps, None, Some(9)).as_deref(), Some("s-episode-1"));
        assert_eq!(pick_episode_id(&[], None, None), None);
    }

    #[test]
    fn links_prefer_detail_page_then_trailer_then_site() {
        let payload = json!({"result": {
            "url": "//site.example/soul-land",
            "trailer": {"url": "https://www.youtube.com/watch?v=t1"}
        }});
        let links = series_links(&payload, "soul-land", "https://fallback.example/");
        assert_eq!(links.page.as_deref(), Some("https://site.example/soul-land"));
        assert_eq!(
            links.trailer_embed.as_deref(),
            Some("https://www.youtube.com/embed/t1")
        );

        let trailer_only = json!({"result": {"trailer": {"url": "https://youtu.be/t2"}}});
        let links = series_links(&trailer_only, "soul-land", "");
        assert_eq!(links.page.as_deref(), Some("https://youtu.be/t2"));

        let bare = json!({"result": {}});
        let links = series_links(&bare, "soul land", "https://fallback.example/");
        assert_eq!(links.page.as_deref(), Some("https://fallback.example/soul%20land"));
        assert_eq!(links.trailer_embed, None);
        assert_eq!(series_links(&bare, "x", ""), SeriesLinks::default());
    }
}
