//! From server buckets to something the player can open, and back again when
//! it can't.

pub mod fallback;
pub mod policy;
pub mod resolver;
pub mod selector;
pub mod session;

pub use fallback::{FallbackOutcome, FallbackStatus};
pub use policy::{SharedPolicy, for_entitlement};
pub use resolver::{PlaybackDirective, PlaybackMode, RuntimeCaps};
pub use selector::{Resolution, Selection, resolve_initial};
pub use session::{Notice, PlaybackSession, PlaybackState, ResolveTicket};
