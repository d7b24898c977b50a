//! Entitlement-dependent behaviour, kept in one place.
//!
//! A privileged viewer drives category/server/source by hand and sees
//! failures; a restricted viewer gets automatic selection and silent
//! fallback.

use super::selector::{Selection, TraversalStep, pick_best_server, sorted_servers};
use crate::source::{Candidate, Category, ServerBuckets, ServerDescriptor};
use std::sync::Arc;

pub trait ViewerPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Manual category/server/source pickers are available.
    fn is_privileged(&self) -> bool;

    /// Ordered (category, server) pairs the selector may try.
    fn traversal_plan(&self, buckets: &ServerBuckets, selection: &Selection) -> Vec<TraversalStep>;

    /// The visible selection follows whatever pair actually produced sources.
    fn adopts_resolved_selection(&self) -> bool;

    /// Server to show after the category changed (or the server list did).
    fn server_for_category(
        &self,
        servers: &[ServerDescriptor],
        current: Option<&str>,
    ) -> Option<String>;

    /// Candidate that is currently meant to play.
    fn active<'a>(
        &self,
        candidates: &'a [Candidate],
        selected_source_id: Option<&str>,
    ) -> Option<&'a Candidate>;

    /// Make `candidates[next]` the active candidate.
    fn promote(
        &self,
        candidates: &mut Vec<Candidate>,
        selected_source_id: &mut Option<String>,
        next: usize,
    );
}

pub type SharedPolicy = Arc<dyn ViewerPolicy>;

pub fn for_entitlement(premium: bool) -> SharedPolicy {
    if premium {
        Arc::new(Privileged)
    } else {
        Arc::new(Restricted)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Privileged;

#[derive(Debug, Clone, Copy, Default)]
pub struct Restricted;

impl ViewerPolicy for Privileged {
    fn name(&self) -> &'static str {
        "privileged"
    }

    fn is_privileged(&self) -> bool {
        true
    }

    fn traversal_plan(&self, buckets: &ServerBuckets, selection: &Selection) -> Vec<TraversalStep> {
        let category = selection.category;
        match selection.server_id.as_deref() {
            Some(id) => {
                let server = buckets
                    .find(category, id)
                    .cloned()
                    .unwrap_or_else(|| ServerDescriptor {
                        id: id.to_string(),
                        name: id.to_string(),
                    });
                vec![TraversalStep { category, server }]
            }
            None => sorted_servers(buckets.get(category))
                .into_iter()
                .map(|server| TraversalStep { category, server })
                .collect(),
        }
    }

    fn adopts_resolved_selection(&self) -> bool {
        false
    }

    fn server_for_category(
        &self,
        servers: &[ServerDescriptor],
        current: Option<&str>,
    ) -> Option<String> {
        if let Some(id) = current
            && servers.iter().any(|s| s.id == id)
        {
            return Some(id.to_string());
        }
        pick_best_server(servers).map(|s| s.id.clone())
    }

    fn active<'a>(
        &self,
        candidates: &'a [Candidate],
        selected_source_id: Option<&str>,
    ) -> Option<&'a Candidate> {
        selected_source_id
            .and_then(|id| candidates.iter().find(|c| c.id == id))
            .or_else(|| candidates.first())
    }

    fn promote(
        &self,
        candidates: &mut Vec<Candidate>,
        selected_source_id: &mut Option<String>,
        next: usize,
    ) {
        if let Some(c) = candidates.get(next) {
            *selected_source_id = Some(c.id.clone());
        }
    }
}

impl ViewerPolicy for Restricted {
    fn name(&self) -> &'static str {
        "restricted"
    }

    fn is_privileged(&self) -> bool {
        false
    }

    fn traversal_plan(&self, buckets: &ServerBuckets, selection: &Selection) -> Vec<TraversalStep> {
        let mut categories: Vec<Category> = Vec::new();
        for category in std::iter::once(selection.category).chain(Category::PRIORITY) {
            if categories.contains(&category) || buckets.get(category).is_empty() {
                continue;
            }
            categories.push(category);
        }

        categories
            .into_iter()
            .flat_map(|category| {
                sorted_servers(buckets.get(category))
                    .into_iter()
                    .map(move |server| TraversalStep { category, server })
            })
            .collect()
    }

    fn adopts_resolved_selection(&self) -> bool {
        true
    }

    fn server_for_category(
        &self,
        servers: &[ServerDescriptor],
        _current: Option<&str>,
    ) -> Option<String> {
        pick_best_server(servers).map(|s| s.id.clone())
    }

    fn active<'a>(
        &self,
        candidates: &'a [Candidate],
        _selected_source_id: Option<&str>,
    ) -> Option<&'a Candidate> {
        candidates.first()
    }

    fn promote(
        &self,
        candidates: &mut Vec<Candidate>,
        selected_source_id: &mut Option<String>,
        next: usize,
    ) {
        if next < candidates.len() && next > 0 {
            let picked = candidates.remove(next);
            candidates.insert(0, picked);
        }
        *selected_source_id = candidates.first().map(|c| c.id.clone());
    }
}
