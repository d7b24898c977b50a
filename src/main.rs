mod api;
mod app;
mod catalog;
mod config;
mod error;
mod input;
mod playback;
mod player;
mod source;
mod storage;

use anyhow::Context;
use api::{ResponseCache, SourceFetcher, UpstreamClient};
use clap::{Args, Parser, Subcommand};
use playback::{PlaybackSession, RuntimeCaps, SharedPolicy};
use source::Category;
use storage::StorageHandle;

#[derive(Debug, Parser)]
#[command(name = "reelpick", version, about = "Pick a playable stream for an episode and watch it")]
struct Cli {
    /// Override config file path.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List servers per category for an episode.
    Servers { episode: String },
    /// Normalized, ranked sources for an episode.
    Sources {
        episode: String,
        /// Only this server (id or name).
        #[arg(long)]
        server: Option<String>,
    },
    /// Run source resolution once and print the playback decision.
    Resolve {
        episode: String,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        server: Option<String>,
        #[command(flatten)]
        viewer: ViewerArgs,
        /// Print the playback state as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the episodes of a series.
    Episodes { series: String },
    /// Interactive watch session in mpv.
    Watch {
        /// Series or episode slug.
        target: String,
        /// Episode number within the series.
        #[arg(long = "ep")]
        episode: Option<u32>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        server: Option<String>,
        #[command(flatten)]
        viewer: ViewerArgs,
    },
    /// Recently watched episodes, newest first.
    History,
    /// Response cache maintenance.
    Cache {
        #[command(subcommand)]
        cmd: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Drop every cached upstream response.
    Clear,
}

#[derive(Debug, Clone, Copy, Args)]
struct ViewerArgs {
    /// Treat the viewer as privileged for this run.
    #[arg(long, conflicts_with = "restricted")]
    premium: bool,
    /// Treat the viewer as restricted for this run.
    #[arg(long)]
    restricted: bool,
}

impl ViewerArgs {
    fn policy(self, cfg: &config::Config) -> SharedPolicy {
        let premium = match (self.premium, self.restricted) {
            (true, _) => true,
            (_, true) => false,
            _ => cfg.viewer.premium,
        };
        playback::for_entitlement(premium)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    match cli.command {
        Command::Servers { episode } => {
            let client = UpstreamClient::from_config(&cfg)?;
            let buckets = client.episode_servers(&episode).await?;
            if buckets.is_empty() {
                println!("no servers");
            }
            for category in Category::PRIORITY {
                let servers = playback::selector::sorted_servers(buckets.get(category));
                if servers.is_empty() {
                    continue;
                }
                println!("{category}:");
                for s in servers {
                    println!("  {:<16} {}", s.id, s.name);
                }
            }
        }
        Command::Sources { episode, server } => {
            let client = UpstreamClient::from_config(&cfg)?;
            let buckets = client.episode_servers(&episode).await?;
            for category in Category::PRIORITY {
                for s in buckets.get(category) {
                    if let Some(want) = server.as_deref()
                        && !s.id.eq_ignore_ascii_case(want)
                        && !s.name.eq_ignore_ascii_case(want)
                    {
                        continue;
                    }
                    let candidates = match client.episode_sources(&episode, category, s).await {
                        Ok(c) => c,
                        Err(e) => {
                            println!("{category}/{}: error: {e:#}", s.id);
                            continue;
                        }
                    };
                    println!("{category}/{} ({} sources)", s.id, candidates.len());
                    for (i, c) in candidates.iter().enumerate() {
                        println!("  {:>2}. {:<20} {}", i + 1, c.label, c.url);
                    }
                }
            }
        }
        Command::Resolve {
            episode,
            category,
            server,
            viewer,
            json,
        } => {
            let client = UpstreamClient::from_config(&cfg)?;
            let policy = viewer.policy(&cfg);
            let caps = RuntimeCaps {
                native_hls: cfg.player.native_hls,
            };
            let mut session = PlaybackSession::new(policy.clone(), caps);

            let detail = client.series_detail(&episode).await;
            let series = catalog::derive_series_slug(&episode);
            session.set_links(catalog::series_links(&detail, &series, &cfg.api.site_url));

            let buckets = client.episode_servers(&episode).await?;
            let mut ticket = session.load_episode(&episode, buckets);
            if let Some(c) = category {
                ticket = session.select_category(c);
            }
            if let Some(s) = server.as_deref() {
                match session.select_server(s) {
                    Ok(t) => ticket = t,
                    Err(e) => tracing::warn!("{e}"),
                }
            }

            let result = playback::resolve_initial(
                &client,
                &ticket.episode_id,
                &ticket.buckets,
                &ticket.selection,
                policy.as_ref(),
            )
            .await;
            let attempts = match result {
                Ok(resolution) => {
                    let attempts = resolution.attempts;
                    session.apply_resolution(ticket.generation, resolution);
                    Some(attempts)
                }
                Err(e) => {
                    session.apply_failure(ticket.generation, &e);
                    None
                }
            };

            if json {
                let out = serde_json::json!({
                    "viewer": policy.name(),
                    "state": session.state(),
                    "directive": session.directive(),
                    "candidates": session.candidates(),
                    "attempts": attempts,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_resolution(&session, attempts);
            }
        }
        Command::Episodes { series } => {
            let client = UpstreamClient::from_config(&cfg)?;
            let detail = client.series_detail(&series).await;
            let episodes = catalog::sort_episodes(catalog::extract_episodes(&detail));
            println!("{}", catalog::series_title(&detail));
            if episodes.is_empty() {
                println!("no episodes listed");
            }
            for e in episodes {
                println!("  {:<32} {}", e.episode_id, e.title);
            }
        }
        Command::Watch {
            target,
            episode,
            category,
            server,
            viewer,
        } => {
            let client = UpstreamClient::from_config(&cfg)?;
            let detail = client.series_detail(&target).await;
            let picked = app::pick_target(&target, &detail, episode, &cfg.api.site_url)
                .with_context(|| format!("no episode found for {target:?}"))?;
            let policy = viewer.policy(&cfg);

            let mut app = app::App::new(cfg, client, policy, picked);
            app.run(app::InitialSelection { category, server }).await?;
        }
        Command::History => {
            let store = StorageHandle::in_dir(&cfg.paths.data_dir);
            let entries = store.watch_history(cfg.history.limit)?;
            if entries.is_empty() {
                println!("nothing watched yet");
            }
            for e in entries {
                let when = time::OffsetDateTime::from_unix_timestamp(e.watched_at)
                    .map(|t| t.date().to_string())
                    .unwrap_or_default();
                let ep = e
                    .episode_number
                    .map(|n| format!("ep {n}"))
                    .unwrap_or_else(|| e.episode.clone());
                println!("{when:<10}  {}  {ep}  ({})", e.title, e.episode);
            }
        }
        Command::Cache { cmd } => match cmd {
            CacheCommand::Clear => {
                let cache = ResponseCache::new(
                    cfg.cache.memory_entries,
                    Some(StorageHandle::in_dir(&cfg.paths.data_dir)),
                    cfg.cache.stale_if_error,
                );
                let n = cache.clear().await.context("clear response cache")?;
                println!("Removed {n} cached responses.");
            }
        },
    }

    Ok(())
}

fn print_resolution(session: &PlaybackSession, attempts: Option<usize>) {
    let state = session.state();
    println!("viewer:   {}", session.policy().name());
    println!(
        "selected: {}/{}",
        state.category,
        state.server_id.as_deref().unwrap_or("-")
    );
    if let Some(n) = attempts {
        println!("attempts: {n}");
    }
    println!("mode:     {}", state.mode.as_str());
    match session.directive() {
        playback::PlaybackDirective::Unavailable { open_url } => {
            println!("playback: unavailable");
            if let Some(u) = open_url {
                println!("open:     {u}");
            }
        }
        playback::PlaybackDirective::Embed { url, .. } if state.playback_url.is_empty() => {
            println!("playback: {url} (trailer)");
        }
        _ => println!("playback: {}", state.playback_url),
    }
    if let Some(playback::Notice::Blocking { message, open_url }) = session.notice() {
        println!("error:    {message}");
        if let Some(u) = open_url {
            println!("open:     {u}");
        }
    }
    for (i, c) in session.candidates().iter().enumerate() {
        let marker = if state.source_id.as_deref() == Some(c.id.as_str()) { "*" } else { " " };
        println!("{marker}{:>2}. {:<20} {}", i + 1, c.label, c.url);
    }
}
