use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod defaults;

/// Overrides `api.base_url` when set and non-empty.
pub const API_BASE_ENV: &str = "REELPICK_API_BASE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub viewer: ViewerConfig,
    pub player: PlayerConfig,
    pub paths: PathsConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Upstream catalog API root, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Public site root; `{site_url}/{series}` is the last-resort link out.
    pub site_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub memory_entries: usize,
    pub episode_ttl_secs: u64,
    pub detail_ttl_secs: u64,
    /// Serve the last stored response when a refetch fails.
    pub stale_if_error: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Manual category/server/source control; failures are surfaced.
    pub premium: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// mpv audio device name (see `mpv --audio-device=help`)
    pub audio_device: Option<String>,
    /// Volume level (0-100)
    pub volume: u8,
    /// mpv opens HLS manifests itself.
    pub native_hls: bool,
    /// Let mpv hand embed pages to yt-dlp.
    pub ytdl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 20,
            user_agent: defaults::USER_AGENT.to_string(),
            site_url: String::new(),
        }
    }
}

impl ApiConfig {
    /// Base URL with the environment override applied and trailing slashes
    /// removed; `None` while unconfigured.
    pub fn resolved_base_url(&self) -> Option<String> {
        let env = std::env::var(API_BASE_ENV).ok();
        pick_base_url(env.as_deref(), &self.base_url)
    }
}

fn pick_base_url(env: Option<&str>, configured: &str) -> Option<String> {
    let raw = env
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| configured.trim());
    let base = raw.trim_end_matches('/');
    (!base.is_empty()).then(|| base.to_string())
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_entries: 256,
            episode_ttl_secs: 300,
            detail_ttl_secs: 600,
            stale_if_error: true,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio_device: None,
            volume: 80,
            native_hls: true,
            ytdl: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("reelpick"));
        Self { data_dir }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 200 }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "reelpick", "reelpick")
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj = project_dirs().context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

/// Read the config, writing the defaults first if the file does not exist.
pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        let cfg = defaults::defaults();
        write_config(&path, &cfg).context("write default config")?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

fn write_config(path: &Path, cfg: &Config) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
