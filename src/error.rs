//! Outcomes of source resolution that the viewer has to be told about.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No category owns a server, or the manual choice points nowhere.
    #[error("no server available for this episode")]
    NothingToTry,

    /// Every (category, server) pair answered, none with a usable source.
    #[error("no valid source from the available servers ({attempts} tried)")]
    NoCandidates { attempts: usize },

    /// Every pair was tried and at least one request failed.
    #[error("{last} ({attempts} servers tried)")]
    Upstream { last: String, attempts: usize },
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
