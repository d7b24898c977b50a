//! The one mutable playback state of a watch session.
//!
//! Every selection change starts a new generation. Resolution results carry
//! the generation they were started for and are ignored once superseded.

use super::fallback::{FallbackController, FallbackOutcome, FallbackStatus};
use super::policy::SharedPolicy;
use super::resolver::{self, PlaybackDirective, PlaybackMode, RuntimeCaps};
use super::selector::{Resolution, Selection, default_selection};
use crate::catalog::SeriesLinks;
use crate::error::ResolveError;
use crate::source::url::normalize_url;
use crate::source::{Candidate, Category, ServerBuckets};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub category: Category,
    pub server_id: Option<String>,
    pub source_id: Option<String>,
    pub playback_url: String,
    pub mode: PlaybackMode,
    pub fallback: FallbackStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Transient, e.g. a silent switch to the next source.
    Info(String),
    /// Needs the viewer: change episode/server/category or open the link.
    Blocking {
        message: String,
        open_url: Option<String>,
    },
}

/// Everything a background resolution task needs.
#[derive(Debug, Clone)]
pub struct ResolveTicket {
    pub generation: u64,
    pub episode_id: String,
    pub buckets: ServerBuckets,
    pub selection: Selection,
}

#[derive(Debug)]
pub struct PlaybackSession {
    policy: SharedPolicy,
    caps: RuntimeCaps,
    episode_id: String,
    buckets: ServerBuckets,
    selection: Selection,
    candidates: Vec<Candidate>,
    selected_source_id: Option<String>,
    fallback: FallbackController,
    generation: u64,
    resolving: bool,
    notice: Option<Notice>,
    links: SeriesLinks,
}

impl PlaybackSession {
    pub fn new(policy: SharedPolicy, caps: RuntimeCaps) -> Self {
        Self {
            policy,
            caps,
            episode_id: String::new(),
            buckets: ServerBuckets::default(),
            selection: Selection {
                category: Category::Sub,
                server_id: None,
            },
            candidates: Vec::new(),
            selected_source_id: None,
            fallback: FallbackController::new(),
            generation: 0,
            resolving: false,
            notice: None,
            links: SeriesLinks::default(),
        }
    }

    /// Outbound page and trailer used when no stream plays.
    pub fn set_links(&mut self, links: SeriesLinks) {
        self.links = links;
    }

    pub fn policy(&self) -> &SharedPolicy {
        &self.policy
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn buckets(&self) -> &ServerBuckets {
        &self.buckets
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn is_resolving(&self) -> bool {
        self.resolving
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// New episode: fresh server buckets and the policy's default selection.
    pub fn load_episode(&mut self, episode_id: &str, buckets: ServerBuckets) -> ResolveTicket {
        self.episode_id = episode_id.to_string();
        self.selection = default_selection(&buckets, self.policy.as_ref());
        self.buckets = buckets;
        self.begin()
    }

    pub fn select_category(&mut self, category: Category) -> ResolveTicket {
        let server_id = self.policy.server_for_category(
            self.buckets.get(category),
            self.selection.server_id.as_deref(),
        );
        self.selection = Selection {
            category,
            server_id,
        };
        self.begin()
    }

    /// Manual server pick; restricted viewers stay on the automatic choice.
    pub fn select_server(&mut self, server_id: &str) -> anyhow::Result<ResolveTicket> {
        anyhow::ensure!(
            self.policy.is_privileged(),
            "server selection is not available for this viewer"
        );
        self.selection.server_id = Some(server_id.to_string());
        Ok(self.begin())
    }

    /// Run the same selection again from scratch.
    pub fn retry(&mut self) -> ResolveTicket {
        self.begin()
    }

    /// Manual source pick; only privileged viewers have a source picker.
    pub fn select_source(&mut self, index: usize) -> anyhow::Result<&Candidate> {
        anyhow::ensure!(
            self.policy.is_privileged(),
            "source selection is not available for this viewer"
        );
        let len = self.candidates.len();
        let c = self
            .candidates
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("no source #{index} (have {len})"))?;
        self.selected_source_id = Some(c.id.clone());
        self.notice = None;
        Ok(c)
    }

    fn begin(&mut self) -> ResolveTicket {
        self.generation += 1;
        self.fallback.reset();
        self.candidates.clear();
        self.selected_source_id = None;
        self.resolving = true;
        self.notice = None;
        tracing::debug!(
            generation = self.generation,
            category = %self.selection.category,
            server = self.selection.server_id.as_deref().unwrap_or("-"),
            "resolution started"
        );
        ResolveTicket {
            generation: self.generation,
            episode_id: self.episode_id.clone(),
            buckets: self.buckets.clone(),
            selection: self.selection.clone(),
        }
    }

    /// Apply a finished resolution. Returns `false` when it was superseded.
    pub fn apply_resolution(&mut self, generation: u64, resolution: Resolution) -> bool {
        if !self.is_current(generation) {
            tracing::debug!(generation, current = self.generation, "dropping stale resolution");
            return false;
        }

        if self.policy.adopts_resolved_selection() {
            let resolved = resolution.selection();
            if resolved != self.selection {
                tracing::info!(
                    category = %resolved.category,
                    server = resolved.server_id.as_deref().unwrap_or("-"),
                    "selection follows the server that answered"
                );
            }
            self.selection = resolved;
        }

        self.candidates = resolution.candidates;
        self.selected_source_id = self.candidates.first().map(|c| c.id.clone());
        self.resolving = false;
        self.notice = None;
        true
    }

    /// Apply a failed resolution. Returns `false` when it was superseded.
    pub fn apply_failure(&mut self, generation: u64, err: &ResolveError) -> bool {
        if !self.is_current(generation) {
            tracing::debug!(generation, current = self.generation, "dropping stale failure");
            return false;
        }
        self.candidates.clear();
        self.selected_source_id = None;
        self.resolving = false;
        self.notice = Some(Notice::Blocking {
            message: err.to_string(),
            open_url: self.links.page.clone(),
        });
        true
    }

    /// Runtime playback error for `failed_url` (player error or fatal
    /// segment-loader error).
    ///
    /// `failed_url` may be the candidate URL or the rewritten form the player
    /// was given; both count against the same candidate.
    pub fn on_playback_error(&mut self, failed_url: &str) -> FallbackOutcome {
        let was_exhausted = self.fallback.status() == FallbackStatus::Exhausted;
        let failed_url = self.candidate_url(failed_url);
        let outcome = self.fallback.on_playback_error(
            &failed_url,
            &mut self.candidates,
            &mut self.selected_source_id,
            self.policy.as_ref(),
        );
        match &outcome {
            FallbackOutcome::Switched { next, .. } => {
                self.notice = Some(Notice::Info(format!(
                    "Source failed, switched to {}",
                    next.label
                )));
            }
            FallbackOutcome::Exhausted { failed } if !was_exhausted => {
                self.notice = Some(Notice::Blocking {
                    message: "Every source for this server failed. Pick another episode, server or category."
                        .to_string(),
                    open_url: Some(failed.clone())
                        .filter(|u| !u.is_empty())
                        .or_else(|| self.links.page.clone()),
                });
            }
            FallbackOutcome::Exhausted { .. } => {}
        }
        outcome
    }

    pub fn active(&self) -> Option<&Candidate> {
        self.policy
            .active(&self.candidates, self.selected_source_id.as_deref())
    }

    pub fn playback_url(&self) -> String {
        resolver::pick_playback_url(self.active(), &self.candidates)
    }

    /// Candidate URL behind `url`, which may be the rewritten player URL.
    fn candidate_url(&self, url: &str) -> String {
        if self.candidates.iter().any(|c| c.url == url) {
            return url.to_string();
        }
        self.candidates
            .iter()
            .find(|c| {
                match resolver::resolve(&normalize_url(&c.url), self.caps) {
                    PlaybackDirective::DirectMedia { url: u, .. }
                    | PlaybackDirective::Embed { url: u, .. } => u == url,
                    PlaybackDirective::Unavailable { .. } => false,
                }
            })
            .map(|c| c.url.clone())
            .unwrap_or_else(|| url.to_string())
    }

    /// With no stream URL the series trailer plays instead; anything
    /// unplayable points at an outbound page.
    pub fn directive(&self) -> PlaybackDirective {
        let url = self.playback_url();
        if url.is_empty()
            && let Some(trailer) = &self.links.trailer_embed
        {
            return PlaybackDirective::Embed {
                url: trailer.clone(),
                source_url: trailer.clone(),
            };
        }
        match resolver::resolve(&url, self.caps) {
            PlaybackDirective::Unavailable { open_url } => PlaybackDirective::Unavailable {
                open_url: open_url.or_else(|| self.links.page.clone()),
            },
            d => d,
        }
    }

    pub fn state(&self) -> PlaybackState {
        let playback_url = self.playback_url();
        PlaybackState {
            category: self.selection.category,
            server_id: self.selection.server_id.clone(),
            source_id: self.active().map(|c| c.id.clone()),
            mode: self.directive().mode(),
            playback_url,
            fallback: self.fallback.status(),
        }
    }
}
