use super::Config;

pub const USER_AGENT: &str = concat!("reelpick/", env!("CARGO_PKG_VERSION"));

/// Config written on first run.
pub fn defaults() -> Config {
    Config::default()
}
