//! Source pipeline: raw upstream records in, ranked candidates out.

pub mod harvest;
pub mod models;
pub mod normalize;
pub mod rank;
pub mod url;

pub use models::{Candidate, Category, EpisodePayload, MediaPayload, ServerBuckets, ServerDescriptor};

/// Normalize, merge and rank the candidates for one requested server.
pub fn build_candidates(
    episode: &EpisodePayload,
    media: Option<&MediaPayload>,
    requested_server: &str,
) -> Vec<Candidate> {
    let merged = normalize::collect_candidates(episode, media, requested_server);
    let ranked = rank::rank(merged);
    tracing::debug!(
        server = requested_server,
        count = ranked.len(),
        "built candidate list"
    );
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ads_labelled_embed_ranks_after_direct_file() {
        let episode = EpisodePayload::from_value(json!({
            "result": {
                "players": [
                    {"name": "HD-2 [ads]", "url": "ok.ru/embed/123"},
                    {"name": "Mega", "url": "cdn.example.com/video.mp4"}
                ]
            }
        }));

        let list = build_candidates(&episode, None, "");
        let pairs: Vec<(&str, &str)> = list
            .iter()
            .map(|c| (c.label.as_str(), c.url.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Mega", "https://cdn.example.com/video.mp4"),
                ("HD-2", "https://ok.ru/embed/123"),
            ]
        );
    }
}
