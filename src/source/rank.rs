//! Heuristic preference order for candidates. Lower score plays first.

use super::models::Candidate;
use super::url::is_direct_media;

const BASELINE: i32 = 100;

/// Third-party players that tend to stay up.
const RELIABLE_HOSTS: &[&str] = &["ok.ru", "dailymotion.com", "rumble.com"];
/// Short-link and ad-redirect fragments.
const AD_MARKERS: &[&str] = &["short.", "rpmvid"];

pub fn score(candidate: &Candidate) -> i32 {
    let label = candidate.label.to_lowercase();
    let url = candidate.url.to_lowercase();
    let mut score = BASELINE;

    if is_direct_media(&url) {
        score -= 60;
    }
    if RELIABLE_HOSTS.iter().any(|h| url.contains(h)) {
        score -= 30;
    }
    if url.contains("videoembed") || url.contains("/embed") {
        score -= 20;
    }
    if label.contains("new player") {
        score -= 10;
    }
    if label.contains("ads") || AD_MARKERS.iter().any(|m| url.contains(m)) {
        score += 25;
    }
    score
}

/// Stable sort by [`score`]; ties keep input order.
pub fn rank(mut list: Vec<Candidate>) -> Vec<Candidate> {
    list.sort_by_cached_key(score);
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(label: &str, url: &str) -> Candidate {
        Candidate {
            id: label.to_string(),
            label: label.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn direct_media_beats_reliable_embed() {
        let ranked = rank(vec![
            cand("HD-2", "https://ok.ru/embed/123"),
            cand("Mega", "https://cdn.example.com/video.mp4"),
        ]);
        assert_eq!(ranked[0].url, "https://cdn.example.com/video.mp4");
        assert_eq!(score(&ranked[0]), 40);
        assert_eq!(score(&ranked[1]), 50);
    }

    #[test]
    fn ad_markers_push_candidates_back() {
        let ranked = rank(vec![
            cand("Ads mirror", "https://host.tv/e/1"),
            cand("Plain", "https://short.link/x"),
            cand("Other", "https://host.tv/e/2"),
        ]);
        let order: Vec<&str> = ranked.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(order, vec!["Other", "Ads mirror", "Plain"]);
    }

    #[test]
    fn new_player_label_gets_small_boost() {
        let ranked = rank(vec![
            cand("Server", "https://a.tv/v"),
            cand("New Player", "https://b.tv/v"),
        ]);
        assert_eq!(ranked[0].label, "New Player");
    }

    #[test]
    fn ties_keep_input_order_and_nothing_is_lost() {
        let input = vec![
            cand("a", "https://x.tv/1"),
            cand("b", "https://x.tv/2"),
            cand("c", "https://x.tv/3.mp4"),
            cand("d", "https://x.tv/4"),
        ];
        let ranked = rank(input.clone());
        let order: Vec<&str> = ranked.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b", "d"]);

        let mut a = input.clone();
        let mut b = ranked.clone();
        a.sort_by(|x, y| x.id.cmp(&y.id));
        b.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(a, b);
    }
}
