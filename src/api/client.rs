use super::SourceFetcher;
use super::cache::ResponseCache;
use crate::catalog::{derive_series_slug, is_usable_detail};
use crate::config::Config;
use crate::source::{
    self, Candidate, Category, EpisodePayload, MediaPayload, ServerBuckets, ServerDescriptor,
};
use crate::storage::StorageHandle;
use anyhow::Context;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: String,
    cache: Option<ResponseCache>,
    episode_ttl: Duration,
    detail_ttl: Duration,
}

/// JSON client for the upstream catalog API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    inner: Arc<Inner>,
}

impl UpstreamClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).context("invalid user agent")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                cache: None,
                episode_ttl: Duration::from_secs(300),
                detail_ttl: Duration::from_secs(600),
            }),
        })
    }

    /// Route GETs through `cache` with per-endpoint TTLs.
    pub fn with_cache(self, cache: ResponseCache, episode_ttl: Duration, detail_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: self.inner.http.clone(),
                base_url: self.inner.base_url.clone(),
                cache: Some(cache),
                episode_ttl,
                detail_ttl,
            }),
        }
    }

    /// Client plus the shared response cache, as configured.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = cfg.api.resolved_base_url().with_context(|| {
            format!(
                "upstream API base URL is not set (config [api].base_url or {})",
                crate::config::API_BASE_ENV
            )
        })?;

        let client = Self::new(
            &base_url,
            Duration::from_secs(cfg.api.timeout_secs.max(1)),
            &cfg.api.user_agent,
        )?;
        if !cfg.cache.enabled {
            return Ok(client);
        }

        let cache = ResponseCache::new(
            cfg.cache.memory_entries,
            Some(StorageHandle::in_dir(&cfg.paths.data_dir)),
            cfg.cache.stale_if_error,
        );
        let client = client.with_cache(
            cache,
            Duration::from_secs(cfg.cache.episode_ttl_secs),
            Duration::from_secs(cfg.cache.detail_ttl_secs),
        );
        Ok(client)
    }

    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.inner.base_url.clone();
        for s in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(s));
        }
        url
    }

    async fn get_json(&self, url: &str, ttl: Duration) -> anyhow::Result<Value> {
        match &self.inner.cache {
            Some(cache) if !ttl.is_zero() => {
                cache
                    .get_or_fetch(url, ttl, || self.fetch_json(url))
                    .await
            }
            _ => self.fetch_json(url).await,
        }
    }

    async fn fetch_json(&self, url: &str) -> anyhow::Result<Value> {
        tracing::debug!(url, "GET");
        let v: Value = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("send GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} http status"))?
            .json()
            .await
            .with_context(|| format!("parse json from {url}"))?;
        Ok(v)
    }

    /// `GET /episode/{id}` as sent by upstream.
    pub async fn episode_raw(&self, episode_id: &str) -> anyhow::Result<Value> {
        let url = self.endpoint(&["episode", episode_id]);
        self.get_json(&url, self.inner.episode_ttl)
            .await
            .with_context(|| format!("fetch episode {episode_id}"))
    }

    pub async fn episode(&self, episode_id: &str) -> anyhow::Result<EpisodePayload> {
        Ok(EpisodePayload::from_value(self.episode_raw(episode_id).await?))
    }

    /// `GET /video-source/{id}`; any failure means "no media list".
    pub async fn video_source(&self, episode_id: &str) -> Option<MediaPayload> {
        let url = self.endpoint(&["video-source", episode_id]);
        match self.get_json(&url, self.inner.episode_ttl).await {
            Ok(v) => Some(MediaPayload::from_value(v)),
            Err(e) => {
                tracing::debug!(episode_id, "no media list: {e:#}");
                None
            }
        }
    }

    /// Series detail for a series or episode slug.
    ///
    /// When `/{series}` comes back unusable the episode's `root` series is
    /// looked up and fetched instead. Never fails: an empty `result` object
    /// is returned when nothing usable was found.
    pub async fn series_detail(&self, slug: &str) -> Value {
        let requested = slug.trim();
        let series = {
            let s = derive_series_slug(requested);
            if s.is_empty() { requested.to_string() } else { s }
        };

        let mut detail = match self.detail(&series).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(series = %series, "series detail failed: {e:#}");
                None
            }
        };

        if !detail.as_ref().is_some_and(is_usable_detail) {
            match self.detail_via_episode_root(requested, &series).await {
                Ok(mut v) => {
                    if let Value::Object(map) = &mut v {
                        map.insert("selectedEpisodeSlug".into(), json!(requested));
                    }
                    detail = Some(v);
                }
                Err(e) => tracing::warn!(slug = requested, "root series lookup failed: {e:#}"),
            }
        }

        let mut payload = match detail {
            Some(v @ Value::Object(_)) => v,
            _ => json!({ "result": {} }),
        };
        let fallback_slug = if series.is_empty() { requested } else { series.as_str() };
        if let Value::Object(map) = &mut payload {
            let result = map.entry("result").or_insert_with(|| json!({}));
            if let Value::Object(r) = result
                && !r.get("slug").is_some_and(|s| s.as_str().is_some_and(|s| !s.is_empty()))
            {
                r.insert("slug".into(), json!(fallback_slug));
            }
            if !map.get("slug").is_some_and(|s| s.as_str().is_some_and(|s| !s.is_empty())) {
                map.insert("slug".into(), json!(fallback_slug));
            }
        }
        payload
    }

    async fn detail(&self, series: &str) -> anyhow::Result<Value> {
        let url = self.endpoint(&[series]);
        self.get_json(&url, self.inner.detail_ttl).await
    }

    async fn detail_via_episode_root(&self, requested: &str, series: &str) -> anyhow::Result<Value> {
        let episode = self.episode(requested).await?;
        let root = episode
            .result
            .root
            .as_deref()
            .map(derive_series_slug)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| series.to_string());
        tracing::debug!(requested, root = %root, "fetching root series");
        self.detail(&root).await
    }
}

/// Keep only the players listed under `category`; untagged players are `sub`.
fn players_in_category(episode: &EpisodePayload, category: Category) -> EpisodePayload {
    let mut filtered = episode.clone();
    filtered.result.players.retain(|p| {
        p.category
            .as_deref()
            .and_then(Category::parse)
            .unwrap_or(Category::Sub)
            == category
    });
    filtered
}

impl SourceFetcher for UpstreamClient {
    async fn episode_servers(&self, episode_id: &str) -> anyhow::Result<ServerBuckets> {
        let episode = self.episode(episode_id).await?;
        Ok(source::normalize::servers_from_players(&episode.result.players))
    }

    async fn episode_sources(
        &self,
        episode_id: &str,
        category: Category,
        server: &ServerDescriptor,
    ) -> anyhow::Result<Vec<Candidate>> {
        let episode = self.episode(episode_id).await?;
        let media = self.video_source(episode_id).await;
        let scoped = players_in_category(&episode, category);
        let requested = if server.name.is_empty() { &server.id } else { &server.name };
        Ok(source::build_candidates(&scoped, media.as_ref(), requested))
    }
}
