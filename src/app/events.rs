use crate::error::ResolveError;
use crate::playback::Resolution;

#[derive(Debug, Clone)]
pub enum Event {
    /// One line typed on stdin.
    Input(String),
    Player(PlayerEvent),
    Network(NetworkEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Started,
    Position { seconds: f64 },
    Duration { seconds: f64 },
    /// Reached the end of the file.
    Ended,
    /// The loaded URL could not be played.
    Failed(String),
    /// Worth a log line, nothing more.
    Warning(String),
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Resolved {
        generation: u64,
        resolution: Resolution,
    },
    ResolveFailed {
        generation: u64,
        error: ResolveError,
    },
}
