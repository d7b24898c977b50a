//! Turns upstream `players` / `medias` records into a single candidate list.

use super::harvest::{DEFAULT_MAX_DEPTH, harvest_urls};
use super::models::{
    Candidate, Category, EpisodePayload, MediaPayload, Player, ServerBuckets, ServerDescriptor,
};
use super::url::normalize_url;
use std::collections::HashSet;

/// Scraper hostnames that leak into player labels.
const UPSTREAM_HOSTS: &[&str] = &["anichin.care", "anichin.club", "anichin.moe"];

/// Strip hostnames, URLs, the word "mega" and `[..ads..]` / `(..ads..)` markers
/// from an upstream label. Falls back to `fallback` when nothing is left.
///
/// A label that is *only* "mega" (plus noise) keeps the word rather than
/// collapsing to the placeholder.
pub fn clean_source_name(raw: Option<&str>, fallback: &str) -> String {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return fallback.to_string();
    }
    let full = clean_label(raw, true);
    if !full.is_empty() {
        return full;
    }
    let soft = clean_label(raw, false);
    if soft.is_empty() {
        fallback.to_string()
    } else {
        soft
    }
}

fn clean_label(raw: &str, strip_mega: bool) -> String {
    let mut text = strip_urls(raw);
    for host in UPSTREAM_HOSTS {
        text = remove_ci(&text, &format!("www.{host}"));
        text = remove_ci(&text, host);
    }
    if strip_mega {
        text = remove_word_ci(&text, "mega");
    }
    text = remove_marked_groups(&text, '[', ']');
    text = remove_marked_groups(&text, '(', ')');
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_urls(text: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            let lower = token.to_ascii_lowercase();
            match [lower.find("http://"), lower.find("https://")]
                .into_iter()
                .flatten()
                .min()
            {
                Some(idx) => &token[..idx],
                None => token,
            }
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn remove_ci(text: &str, needle: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (idx, _) in lower.match_indices(&needle) {
        out.push_str(&text[last..idx]);
        last = idx + needle.len();
    }
    out.push_str(&text[last..]);
    out
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn remove_word_ci(text: &str, word: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (idx, m) in lower.match_indices(word) {
        let end = idx + m.len();
        let left_ok = idx == 0 || !is_word_byte(bytes[idx - 1]);
        let right_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok && idx >= last {
            out.push_str(&text[last..idx]);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Drop `open..close` groups whose content mentions "ads".
fn remove_marked_groups(text: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let Some(len) = rest[start..].find(close) else {
            break;
        };
        let end = start + len + close.len_utf8();
        let inner = &rest[start + open.len_utf8()..start + len];
        out.push_str(&rest[..start]);
        if !inner.to_ascii_lowercase().contains("ads") {
            out.push_str(&rest[start..end]);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Comparison key for server names: cleaned, lowercased, alphanumerics only.
pub fn source_key(name: Option<&str>) -> String {
    clean_source_name(name, "")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Group the episode's players into per-category server buckets.
///
/// Players without a recognised category land in `sub`.
pub fn servers_from_players(players: &[Player]) -> ServerBuckets {
    let mut buckets = ServerBuckets::default();
    for (idx, player) in players.iter().enumerate() {
        let name = clean_source_name(player.name.as_deref(), &format!("Server {}", idx + 1));
        let category = player
            .category
            .as_deref()
            .and_then(Category::parse)
            .unwrap_or(Category::Sub);
        let bucket = buckets.get_mut(category);
        if bucket.iter().any(|s| s.id == name) {
            continue;
        }
        bucket.push(ServerDescriptor {
            id: name.clone(),
            name,
        });
    }
    buckets
}

/// Players matching `requested`: exact key matches, else containment either
/// way, else the whole list.
pub fn filter_players<'a>(players: &'a [Player], requested: &str) -> Vec<&'a Player> {
    let wanted = source_key(Some(requested));
    if wanted.is_empty() {
        return players.iter().collect();
    }

    let exact: Vec<&Player> = players
        .iter()
        .filter(|p| source_key(p.name.as_deref()) == wanted)
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let fuzzy: Vec<&Player> = players
        .iter()
        .filter(|p| {
            let key = source_key(p.name.as_deref());
            !key.is_empty() && (key.contains(&wanted) || wanted.contains(&key))
        })
        .collect();
    if fuzzy.is_empty() {
        players.iter().collect()
    } else {
        fuzzy
    }
}

fn media_candidates(media: &MediaPayload) -> Vec<Candidate> {
    media
        .medias
        .iter()
        .enumerate()
        .filter_map(|(idx, m)| {
            let url = normalize_url(m.url.as_deref().unwrap_or_default());
            if url.is_empty() {
                return None;
            }
            let label = [&m.quality, &m.resolution, &m.format]
                .into_iter()
                .map(|f| clean_source_name(f.as_deref(), ""))
                .find(|l| !l.is_empty())
                .unwrap_or_else(|| format!("Media {}", idx + 1));
            Some(Candidate {
                id: format!("media-{idx}"),
                label,
                url,
            })
        })
        .collect()
}

fn player_candidates(players: &[&Player]) -> Vec<Candidate> {
    players
        .iter()
        .enumerate()
        .filter_map(|(idx, p)| {
            let url = normalize_url(p.raw_url().unwrap_or_default());
            if url.is_empty() {
                return None;
            }
            Some(Candidate {
                id: format!("player-{idx}"),
                label: clean_source_name(p.name.as_deref(), &format!("Player {}", idx + 1)),
                url,
            })
        })
        .collect()
}

/// URLs buried in fields we don't model (nested `sources`, `embed` objects...).
fn harvested_candidates(players: &[&Player], media: Option<&MediaPayload>) -> Vec<Candidate> {
    let mut roots: Vec<serde_json::Value> = players
        .iter()
        .map(|p| serde_json::Value::Object(p.extra.clone()))
        .collect();
    if let Some(media) = media {
        roots.extend(
            media
                .medias
                .iter()
                .map(|m| serde_json::Value::Object(m.extra.clone())),
        );
    }

    harvest_urls(&serde_json::Value::Array(roots), DEFAULT_MAX_DEPTH)
        .into_iter()
        .enumerate()
        .map(|(idx, url)| Candidate {
            id: format!("auto-{idx}"),
            label: format!("Auto {}", idx + 1),
            url,
        })
        .collect()
}

/// Media list first, then matching players, then harvested URLs; the first
/// occurrence of a URL wins.
pub fn collect_candidates(
    episode: &EpisodePayload,
    media: Option<&MediaPayload>,
    requested_server: &str,
) -> Vec<Candidate> {
    let players = filter_players(&episode.result.players, requested_server);

    let mut merged = Vec::new();
    if let Some(media) = media {
        merged.extend(media_candidates(media));
    }
    merged.extend(player_candidates(&players));
    merged.extend(harvested_candidates(&players, media));

    dedupe_by_url(merged)
}

pub fn dedupe_by_url(list: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|c| !c.url.is_empty() && seen.insert(c.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn episode(v: serde_json::Value) -> EpisodePayload {
        EpisodePayload::from_value(json!({ "result": { "players": v } }))
    }

    #[test]
    fn cleans_noise_from_labels() {
        assert_eq!(clean_source_name(Some("HD-2 [ads]"), "x"), "HD-2");
        assert_eq!(clean_source_name(Some("Mega HD (with ADS)"), "x"), "HD");
        assert_eq!(clean_source_name(Some("Ok.ru anichin.club"), "x"), "Ok.ru");
        assert_eq!(clean_source_name(Some("www.Anichin.moe Vidguard"), "x"), "Vidguard");
        assert_eq!(
            clean_source_name(Some("Server https://foo.com/x 2"), "x"),
            "Server 2"
        );
        assert_eq!(clean_source_name(Some("Megacloud"), "x"), "Megacloud");
        assert_eq!(clean_source_name(Some("[ads]"), "Player 1"), "Player 1");
        assert_eq!(clean_source_name(None, "Player 3"), "Player 3");
    }

    #[test]
    fn mega_only_label_is_kept() {
        assert_eq!(clean_source_name(Some("Mega"), "Player 2"), "Mega");
        assert_eq!(clean_source_name(Some(" mega [ads] "), "Player 2"), "mega");
    }

    #[test]
    fn source_keys_ignore_case_and_punctuation() {
        assert_eq!(source_key(Some("HD-2 [ads]")), "hd2");
        assert_eq!(source_key(Some("OK.ru")), "okru");
        assert_eq!(source_key(None), "");
    }

    #[test]
    fn filter_prefers_exact_then_fuzzy_then_all() {
        let ep = episode(json!([
            {"name": "Ok.ru", "url": "ok.ru/embed/1"},
            {"name": "Ok.ru Backup", "url": "ok.ru/embed/2"},
            {"name": "Dailymotion", "url": "dailymotion.com/embed/video/3"}
        ]));
        let players = &ep.result.players;

        let exact = filter_players(players, "ok.ru");
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].name.as_deref(), Some("Ok.ru"));

        let fuzzy = filter_players(players, "daily");
        assert_eq!(fuzzy.len(), 1);

        assert_eq!(filter_players(players, "rumble").len(), 3);
        assert_eq!(filter_players(players, "").len(), 3);
    }

    #[test]
    fn media_first_then_players_then_harvested_without_duplicates() {
        let ep = episode(json!([
            {"name": "HD-1", "url": "a.com/1.mp4", "mirror": {"link": "c.com/3"}},
            {"name": "HD-2", "file": "b.com/2", "backup": {"stream_url": "a.com/1.mp4"}},
            {"name": "Broken"}
        ]));
        let media = MediaPayload::from_value(json!({
            "medias": [
                {"url": "b.com/2", "quality": "720p"},
                {"url": "nonsense"},
                {"url": "d.com/4.m3u8", "resolution": 1080}
            ]
        }));

        let list = collect_candidates(&ep, Some(&media), "");
        let urls: Vec<&str> = list.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://b.com/2",
                "https://d.com/4.m3u8",
                "https://a.com/1.mp4",
                "https://c.com/3",
            ]
        );
        assert_eq!(list[0].label, "720p");
        assert_eq!(list[1].label, "1080");
        assert_eq!(list[2].label, "HD-1");
        assert_eq!(list[3].label, "Auto 1");
    }

    #[test]
    fn media_without_descriptive_fields_gets_index_label() {
        let media = MediaPayload::from_value(json!({ "medias": [{"url": "e.com/x.mp4"}] }));
        let list = collect_candidates(&EpisodePayload::default(), Some(&media), "");
        assert_eq!(list[0].label, "Media 1");
    }

    #[test]
    fn server_filter_limits_player_candidates() {
        let ep = episode(json!([
            {"name": "Ok.ru", "url": "ok.ru/embed/1"},
            {"name": "Rumble", "url": "rumble.com/embed/2"}
        ]));
        let list = collect_candidates(&ep, None, "Rumble");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].url, "https://rumble.com/embed/2");
    }

    #[test]
    fn servers_are_bucketed_by_category() {
        let ep = episode(json!([
            {"name": "Ok.ru", "url": "ok.ru/embed/1"},
            {"name": "Ok.ru", "url": "ok.ru/embed/9"},
            {"name": "Rumble", "type": "dub", "url": "rumble.com/embed/2"},
            {"url": "x.com/3"}
        ]));
        let buckets = servers_from_players(&ep.result.players);
        let sub: Vec<&str> = buckets.sub.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(sub, vec!["Ok.ru", "Server 4"]);
        assert_eq!(buckets.dub.len(), 1);
        assert!(buckets.raw.is_empty());
    }

    #[test]
    fn output_never_holds_duplicate_urls() {
        let ep = episode(json!([
            {"name": "a", "url": "x.com/1"},
            {"name": "b", "url": "https://x.com/1"},
            {"name": "c", "url": "//x.com/1", "embed": "x.com/1"}
        ]));
        let list = collect_candidates(&ep, None, "");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].label, "a");
    }
}
