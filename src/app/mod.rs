pub mod actions;
pub mod events;

use crate::api::{SourceFetcher, UpstreamClient};
use crate::catalog::{self, EpisodeEntry, SeriesLinks};
use crate::config::Config;
use crate::input::{self, HELP};
use crate::playback::{
    self, FallbackOutcome, Notice, PlaybackDirective, PlaybackSession, ResolveTicket, RuntimeCaps,
    SharedPolicy,
};
use crate::player::mpv::{MpvHandle, MpvOptions};
use crate::source::Category;
use crate::storage::{StorageHandle, WatchEntry};
use actions::Action;
use anyhow::Context;
use events::{Event, NetworkEvent, PlayerEvent};
use tokio::sync::mpsc;

/// The episode a watch session is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub series: String,
    pub series_title: String,
    pub episode_id: String,
    pub episode_number: Option<u32>,
    pub episode_title: String,
    pub links: SeriesLinks,
}

/// Work out which episode `target` (series or episode slug) means.
pub fn pick_target(
    target: &str,
    detail: &serde_json::Value,
    episode_number: Option<u32>,
    site_url: &str,
) -> Option<WatchTarget> {
    let target = target.trim();
    let episodes = catalog::sort_episodes(catalog::extract_episodes(detail));
    let is_episode_slug = catalog::derive_series_slug(target) != target;
    let by_id = (is_episode_slug && episode_number.is_none()).then_some(target);

    let episode_id = catalog::pick_episode_id(&episodes, by_id, episode_number)?;
    let entry: Option<&EpisodeEntry> = episodes.iter().find(|e| e.episode_id == episode_id);

    let series = detail
        .get("slug")
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| catalog::derive_series_slug(target));

    Some(WatchTarget {
        links: catalog::series_links(detail, &series, site_url),
        series,
        series_title: catalog::series_title(detail),
        episode_number: entry
            .and_then(|e| e.number)
            .or_else(|| catalog::parse_episode_number(&episode_id).filter(|_| entry.is_none())),
        episode_title: entry.map(|e| e.title.clone()).unwrap_or_default(),
        episode_id,
    })
}

/// Starting point requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct InitialSelection {
    pub category: Option<Category>,
    pub server: Option<String>,
}

pub struct App {
    cfg: Config,
    client: UpstreamClient,
    session: PlaybackSession,
    target: WatchTarget,
    storage: StorageHandle,
    mpv: Option<MpvHandle>,
    loaded_url: Option<String>,
    position_secs: f64,
    duration_secs: f64,
    history_recorded: bool,
    should_quit: bool,
}

impl App {
    pub fn new(cfg: Config, client: UpstreamClient, policy: SharedPolicy, target: WatchTarget) -> Self {
        let caps = RuntimeCaps {
            native_hls: cfg.player.native_hls,
        };
        let storage = StorageHandle::in_dir(&cfg.paths.data_dir);
        let mut session = PlaybackSession::new(policy, caps);
        session.set_links(target.links.clone());
        Self {
            cfg,
            client,
            session,
            target,
            storage,
            mpv: None,
            loaded_url: None,
            position_secs: 0.0,
            duration_secs: 0.0,
            history_recorded: false,
            should_quit: false,
        }
    }

    pub async fn run(&mut self, initial: InitialSelection) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::channel::<Event>(256);

        input::spawn_input_task(tx.clone());

        // Without mpv the session still resolves and prints URLs.
        let opts = MpvOptions {
            audio_device: self.cfg.player.audio_device.clone(),
            volume: self.cfg.player.volume,
            ytdl: self.cfg.player.ytdl,
            log_file: Some(self.cfg.paths.data_dir.join("mpv.log")),
        };
        match MpvHandle::spawn(tx.clone(), &opts).await {
            Ok(h) => self.mpv = Some(h),
            Err(e) => {
                tracing::warn!("mpv disabled: {e:#}");
                println!("mpv unavailable, playback URLs will be printed instead");
            }
        }

        let episode_id = self.target.episode_id.clone();
        let buckets = self
            .client
            .episode_servers(&episode_id)
            .await
            .with_context(|| format!("load servers for {episode_id}"))?;

        println!(
            "{} - {} [{} viewer]",
            self.target.series_title,
            self.episode_label(),
            self.session.policy().name()
        );

        let mut ticket = self.session.load_episode(&episode_id, buckets);
        if let Some(category) = initial.category {
            ticket = self.session.select_category(category);
        }
        if let Some(server) = initial.server.as_deref() {
            match self.session.select_server(server) {
                Ok(t) => ticket = t,
                Err(e) => println!("{e}"),
            }
        }
        self.spawn_resolve(ticket, &tx);
        println!("{HELP}");

        while let Some(ev) = rx.recv().await {
            match ev {
                Event::Input(line) => match input::map_input_to_action(&line) {
                    Ok(Some(action)) => self.handle_action(action, &tx).await,
                    Ok(None) => {}
                    Err(msg) => println!("{msg}"),
                },
                Event::Player(pe) => self.handle_player(pe).await,
                Event::Network(ne) => self.handle_network(ne).await,
            }

            if self.should_quit {
                break;
            }
        }

        if let Some(mpv) = &self.mpv {
            let _ = mpv.stop().await;
        }
        Ok(())
    }

    fn episode_label(&self) -> String {
        match (self.target.episode_title.is_empty(), self.target.episode_number) {
            (false, _) => self.target.episode_title.clone(),
            (true, Some(n)) => format!("Episode {n}"),
            (true, None) => self.target.episode_id.clone(),
        }
    }

    /// Resolve in the background; the result comes back tagged with the
    /// ticket's generation.
    fn spawn_resolve(&mut self, ticket: ResolveTicket, tx: &mpsc::Sender<Event>) {
        self.loaded_url = None;
        let client = self.client.clone();
        let policy = self.session.policy().clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let ev = match playback::resolve_initial(
                &client,
                &ticket.episode_id,
                &ticket.buckets,
                &ticket.selection,
                policy.as_ref(),
            )
            .await
            {
                Ok(resolution) => NetworkEvent::Resolved {
                    generation: ticket.generation,
                    resolution,
                },
                Err(error) => NetworkEvent::ResolveFailed {
                    generation: ticket.generation,
                    error,
                },
            };
            let _ = tx.send(Event::Network(ev)).await;
        });
    }

    async fn handle_action(&mut self, action: Action, tx: &mpsc::Sender<Event>) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::Help => println!("{HELP}"),
            Action::Status => self.print_status(),
            Action::Retry => {
                let ticket = self.session.retry();
                self.spawn_resolve(ticket, tx);
            }
            Action::SelectCategory(category) => {
                if self.session.buckets().get(category).is_empty() {
                    println!("no {category} servers for this episode");
                    return;
                }
                let ticket = self.session.select_category(category);
                self.spawn_resolve(ticket, tx);
            }
            Action::SelectServer(name) => {
                let category = self.session.selection().category;
                let known = self
                    .session
                    .buckets()
                    .get(category)
                    .iter()
                    .find(|s| s.id.eq_ignore_ascii_case(&name) || s.name.eq_ignore_ascii_case(&name))
                    .map(|s| s.id.clone());
                let Some(server_id) = known else {
                    println!("no server {name:?} under {category}");
                    return;
                };
                match self.session.select_server(&server_id) {
                    Ok(ticket) => self.spawn_resolve(ticket, tx),
                    Err(e) => println!("{e}"),
                }
            }
            Action::SelectSource(index) => {
                let picked = self.session.select_source(index).map(|c| c.label.clone());
                match picked {
                    Ok(label) => {
                        println!("source {}: {label}", index + 1);
                        self.render().await;
                    }
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    async fn handle_network(&mut self, ne: NetworkEvent) {
        match ne {
            NetworkEvent::Resolved {
                generation,
                resolution,
            } => {
                let attempts = resolution.attempts;
                let count = resolution.candidates.len();
                if !self.session.apply_resolution(generation, resolution) {
                    return;
                }
                let sel = self.session.selection();
                println!(
                    "{count} source(s) from {}/{} ({attempts} server(s) tried)",
                    sel.category,
                    sel.server_id.as_deref().unwrap_or("-")
                );
                self.render().await;
            }
            NetworkEvent::ResolveFailed { generation, error } => {
                if !self.session.apply_failure(generation, &error) {
                    return;
                }
                tracing::error!("no playable source: {error}");
                self.print_notice();
                if let PlaybackDirective::Embed { url, .. } = self.session.directive() {
                    println!("playing the series trailer instead");
                    self.load(&url, &url).await;
                } else {
                    self.stop_player().await;
                }
            }
        }
    }

    async fn handle_player(&mut self, pe: PlayerEvent) {
        match pe {
            PlayerEvent::Started => {
                self.position_secs = 0.0;
                if let Some(c) = self.session.active() {
                    println!("playing {}", c.label);
                }
            }
            PlayerEvent::Position { seconds } => self.position_secs = seconds,
            PlayerEvent::Duration { seconds } => self.duration_secs = seconds,
            PlayerEvent::Ended => {
                println!("episode finished");
                self.should_quit = true;
            }
            PlayerEvent::Failed(reason) => {
                let Some(url) = self.loaded_url.take() else {
                    return;
                };
                tracing::warn!(url = %url, "playback failed: {reason}");
                match self.session.on_playback_error(&url) {
                    FallbackOutcome::Switched { .. } => {
                        self.print_notice();
                        self.render().await;
                    }
                    FallbackOutcome::Exhausted { .. } => self.print_notice(),
                }
            }
            PlayerEvent::Warning(msg) => tracing::debug!("{msg}"),
        }
    }

    /// Hand the current directive to the render target.
    async fn render(&mut self) {
        match self.session.directive() {
            PlaybackDirective::DirectMedia { url, loader } => {
                tracing::debug!(loader = ?loader, "direct media");
                self.load(&url, &url).await;
            }
            PlaybackDirective::Embed { url, source_url } => {
                tracing::debug!(source = %source_url, "embed");
                self.load(&url, &source_url).await;
            }
            PlaybackDirective::Unavailable { open_url } => {
                self.stop_player().await;
                match open_url {
                    Some(u) => println!("cannot play this source here; open it directly: {u}"),
                    None => println!("no playable source"),
                }
            }
        }
    }

    /// Load `url` in the player. Failures are reported against `source_url`,
    /// the candidate URL before any embed rewrite.
    async fn load(&mut self, url: &str, source_url: &str) {
        if self.loaded_url.as_deref() == Some(source_url) {
            return;
        }
        self.loaded_url = Some(source_url.to_string());
        match &self.mpv {
            Some(mpv) => {
                if let Err(e) = mpv.load_url(url).await {
                    tracing::warn!("mpv load failed: {e:#}");
                    println!("play: {url}");
                }
            }
            None => println!("play: {url}"),
        }
        if self.session.active().is_some() {
            self.record_history();
        }
    }

    async fn stop_player(&mut self) {
        self.loaded_url = None;
        if let Some(mpv) = &self.mpv
            && let Err(e) = mpv.stop().await
        {
            tracing::debug!("mpv stop: {e:#}");
        }
    }

    fn record_history(&mut self) {
        if self.history_recorded {
            return;
        }
        self.history_recorded = true;

        let entry = WatchEntry::new(
            &self.target.series,
            &self.target.episode_id,
            &self.target.series_title,
            self.target.episode_number,
            time::OffsetDateTime::now_utc().unix_timestamp(),
        );
        let storage = self.storage.clone();
        let limit = self.cfg.history.limit;
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || storage.record_watch(&entry, limit)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("record watch history: {e:#}"),
                Err(e) => tracing::warn!("join watch history write: {e}"),
            }
        });
    }

    fn print_notice(&mut self) {
        match self.session.take_notice() {
            Some(Notice::Info(msg)) => println!("{msg}"),
            Some(Notice::Blocking { message, open_url }) => {
                println!("error: {message}");
                if let Some(u) = open_url {
                    println!("open directly: {u}");
                }
            }
            None => {}
        }
    }

    fn print_status(&self) {
        let state = self.session.state();
        println!("episode {}", self.session.episode_id());
        println!(
            "{}/{} mode={} fallback={:?}{}",
            state.category,
            state.server_id.as_deref().unwrap_or("-"),
            state.mode.as_str(),
            state.fallback,
            if self.session.is_resolving() { " (resolving)" } else { "" }
        );
        if !state.playback_url.is_empty() {
            println!("url: {}", state.playback_url);
        }
        if self.duration_secs > 0.0 {
            println!("at {:.0}s / {:.0}s", self.position_secs, self.duration_secs);
        }
        for (i, c) in self.session.candidates().iter().enumerate() {
            let marker = if state.source_id.as_deref() == Some(c.id.as_str()) { "*" } else { " " };
            println!("{marker}{:>2}. {}  {}", i + 1, c.label, c.url);
        }
        for category in Category::PRIORITY {
            let servers = self.session.buckets().get(category);
            if !servers.is_empty() {
                let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
                println!("{category}: {}", names.join(", "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail() -> serde_json::Value {
        json!({
            "slug": "soul-land",
            "result": {
                "name": "Soul Land",
                "episode": [
                    {"slug": "soul-land-episode-2", "episode": "2"},
                    {"slug": "soul-land-episode-1", "episode": "1", "subtitle": "Start"}
                ]
            }
        })
    }

    #[test]
    fn series_target_starts_at_lowest_episode() {
        let t = pick_target("soul-land", &detail(), None, "").expect("target");
        assert_eq!(t.episode_id, "soul-land-episode-1");
        assert_eq!(t.episode_number, Some(1));
        assert_eq!(t.series, "soul-land");
        assert_eq!(t.series_title, "Soul Land");
        assert_eq!(t.episode_title, "Episode 1 - Start");
    }

    #[test]
    fn episode_slug_and_number_flag() {
        let t = pick_target("soul-land-episode-2", &detail(), None, "").expect("target");
        assert_eq!(t.episode_id, "soul-land-episode-2");
        assert_eq!(t.episode_number, Some(2));

        let t = pick_target("soul-land-episode-2", &detail(), Some(1), "").expect("target");
        assert_eq!(t.episode_id, "soul-land-episode-1");
    }

    #[test]
    fn unlisted_episode_slug_is_still_watchable() {
        let empty = json!({"slug": "x", "result": {}});
        let t = pick_target("x-episode-7", &empty, None, "https://site.example").expect("target");
        assert_eq!(t.episode_id, "x-episode-7");
        assert_eq!(t.episode_number, Some(7));
        assert_eq!(t.links.page.as_deref(), Some("https://site.example/x"));
        assert!(pick_target("x", &empty, None, "").is_none());
    }
}
