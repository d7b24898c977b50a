pub mod cache;
pub mod client;

pub use cache::ResponseCache;
pub use client::UpstreamClient;

use crate::source::{Candidate, Category, ServerBuckets, ServerDescriptor};
use std::future::Future;

/// Where the selector gets its per-server candidate lists from.
pub trait SourceFetcher: Send + Sync {
    fn episode_servers(
        &self,
        episode_id: &str,
    ) -> impl Future<Output = anyhow::Result<ServerBuckets>> + Send;

    /// Normalized and ranked candidates for one (category, server) pair.
    fn episode_sources(
        &self,
        episode_id: &str,
        category: Category,
        server: &ServerDescriptor,
    ) -> impl Future<Output = anyhow::Result<Vec<Candidate>>> + Send;
}
