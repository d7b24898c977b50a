//! Picks the (category, server) pair whose source list is used for playback.

use super::policy::ViewerPolicy;
use crate::api::SourceFetcher;
use crate::error::{ResolveError, ResolveResult};
use crate::source::{Candidate, Category, ServerBuckets, ServerDescriptor};
use serde::Serialize;

/// The viewer-visible category/server choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub category: Category,
    pub server_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalStep {
    pub category: Category,
    pub server: ServerDescriptor,
}

/// Lower is tried first. Unknown names sit behind every known host.
pub fn rank_server_name(name: &str) -> u32 {
    let key = name.trim().to_lowercase();
    if key.is_empty() {
        return 999;
    }
    if key.contains("ok.ru") || key.contains("okru") {
        return 1;
    }
    if key.contains("dailymotion") {
        return 2;
    }
    if key.contains("rumble") {
        return 3;
    }
    match key.as_str() {
        "hd-2" => return 1,
        "hd-1" => return 2,
        "hd-3" => return 3,
        _ => {}
    }
    if key.contains("vid") {
        return 6;
    }
    if key.contains("mega") {
        return 7;
    }
    50
}

fn server_rank(server: &ServerDescriptor) -> u32 {
    if server.name.trim().is_empty() {
        rank_server_name(&server.id)
    } else {
        rank_server_name(&server.name)
    }
}

/// Servers in try order; equal ranks keep upstream order.
pub fn sorted_servers(servers: &[ServerDescriptor]) -> Vec<ServerDescriptor> {
    let mut out: Vec<ServerDescriptor> = servers
        .iter()
        .filter(|s| !s.id.is_empty())
        .cloned()
        .collect();
    out.sort_by_key(server_rank);
    out
}

pub fn pick_best_server(servers: &[ServerDescriptor]) -> Option<&ServerDescriptor> {
    servers
        .iter()
        .filter(|s| !s.id.is_empty())
        .min_by_key(|s| server_rank(s))
}

/// First non-empty category and the server the policy would show for it.
pub fn default_selection(buckets: &ServerBuckets, policy: &dyn ViewerPolicy) -> Selection {
    let category = buckets
        .available()
        .first()
        .copied()
        .unwrap_or(Category::Sub);
    Selection {
        category,
        server_id: policy.server_for_category(buckets.get(category), None),
    }
}

/// The pair that produced sources, and how many pairs it took.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub category: Category,
    pub server: ServerDescriptor,
    pub candidates: Vec<Candidate>,
    pub attempts: usize,
    /// Fetch errors seen on earlier pairs.
    pub failures: Vec<String>,
}

impl Resolution {
    pub fn selection(&self) -> Selection {
        Selection {
            category: self.category,
            server_id: Some(self.server.id.clone()),
        }
    }
}

/// Walk the policy's traversal plan one pair at a time and stop at the first
/// non-empty candidate list. A later pair is only requested after the earlier
/// one answered empty or failed.
pub async fn resolve_initial<F: SourceFetcher>(
    fetcher: &F,
    episode_id: &str,
    buckets: &ServerBuckets,
    selection: &Selection,
    policy: &dyn ViewerPolicy,
) -> ResolveResult<Resolution> {
    let plan = policy.traversal_plan(buckets, selection);
    if plan.is_empty() {
        return Err(ResolveError::NothingToTry);
    }

    let mut failures = Vec::new();
    let mut attempts = 0;
    for step in plan {
        attempts += 1;
        match fetcher
            .episode_sources(episode_id, step.category, &step.server)
            .await
        {
            Ok(candidates) if !candidates.is_empty() => {
                tracing::info!(
                    category = %step.category,
                    server = %step.server.id,
                    attempts,
                    count = candidates.len(),
                    "sources resolved"
                );
                return Ok(Resolution {
                    category: step.category,
                    server: step.server,
                    candidates,
                    attempts,
                    failures,
                });
            }
            Ok(_) => {
                tracing::debug!(category = %step.category, server = %step.server.id, "no sources");
            }
            Err(e) => {
                tracing::warn!(
                    category = %step.category,
                    server = %step.server.id,
                    "source fetch failed: {e:#}"
                );
                failures.push(format!("{e:#}"));
            }
        }
    }

    match failures.pop() {
        Some(last) => Err(ResolveError::Upstream { last, attempts }),
        None => Err(ResolveError::NoCandidates { attempts }),
    }
}
