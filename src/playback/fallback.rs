//! Runtime recovery when the chosen source stops playing.

use super::policy::ViewerPolicy;
use crate::source::Candidate;
use crate::source::url::normalize_url;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStatus {
    #[default]
    NoError,
    TryingFallback,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// `next` is now the active candidate.
    Switched { failed: String, next: Candidate },
    /// Nothing left to try for this episode/server/category.
    Exhausted { failed: String },
}

/// Tracks failed URLs for one episode/server/category session.
#[derive(Debug, Clone, Default)]
pub struct FallbackController {
    exhausted: HashSet<String>,
    status: FallbackStatus,
}

impl FallbackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every failure; called on any episode/server/category change.
    pub fn reset(&mut self) {
        self.exhausted.clear();
        self.status = FallbackStatus::NoError;
    }

    pub fn status(&self) -> FallbackStatus {
        self.status
    }

    pub fn is_exhausted(&self, url: &str) -> bool {
        self.exhausted.contains(&normalize_url(url))
    }

    pub fn exhausted_count(&self) -> usize {
        self.exhausted.len()
    }

    /// Record that `failed_url` could not be played and pick the next
    /// untried candidate after it.
    ///
    /// Once exhausted, further errors are absorbed without any action until
    /// [`reset`](Self::reset).
    pub fn on_playback_error(
        &mut self,
        failed_url: &str,
        candidates: &mut Vec<Candidate>,
        selected_source_id: &mut Option<String>,
        policy: &dyn ViewerPolicy,
    ) -> FallbackOutcome {
        let failed = normalize_url(failed_url);
        if self.status == FallbackStatus::Exhausted {
            return FallbackOutcome::Exhausted { failed };
        }
        if !failed.is_empty() {
            self.exhausted.insert(failed.clone());
        }

        let start = candidates
            .iter()
            .position(|c| normalize_url(&c.url) == failed)
            .map(|idx| idx + 1)
            .unwrap_or(0);

        let next = candidates
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, c)| !c.url.is_empty() && !self.exhausted.contains(&normalize_url(&c.url)))
            .map(|(idx, _)| idx);

        match next {
            Some(idx) => {
                let next = candidates[idx].clone();
                policy.promote(candidates, selected_source_id, idx);
                self.status = FallbackStatus::TryingFallback;
                tracing::info!(failed = %failed, next = %next.url, "switching to next source");
                FallbackOutcome::Switched { failed, next }
            }
            None => {
                self.status = FallbackStatus::Exhausted;
                tracing::error!(failed = %failed, tried = self.exhausted.len(), "all sources failed");
                FallbackOutcome::Exhausted { failed }
            }
        }
    }
}
