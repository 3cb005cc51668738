//! Shared types for the ytlive resolver proxy.
//!
//! This crate defines the vocabulary used between the resolver adapter, the
//! two cache tiers and the HTTP layer.
//!
//! # Key Normalization
//!
//! Channel references are folded into a single [`ChannelKey`] form before
//! they touch a cache:
//!
//! ```rust
//! use ytlive_types::ChannelKey;
//!
//! let key = ChannelKey::normalize("TVBSNEWS01");
//! assert_eq!(key.as_str(), "@TVBSNEWS01");
//! assert_eq!(key.live_url("https://www.youtube.com"), "https://www.youtube.com/@TVBSNEWS01/live");
//! ```
//!
//! # Errors
//!
//! - [`ResolveError`]: `NotLive`, `ResolverUnavailable`, `ResolutionFailed`
//! - [`StageError`]: a resolve error tagged with the failing [`Stage`]
//! - [`RelayError`]: failures while proxying stream bytes

pub mod error;
pub mod types;

pub use error::{ErrorKind, RelayError, ResolveError, Stage, StageError};
pub use types::{
    watch_url, ChannelKey, FormatPolicy, Resolution, StreamCandidate, StreamInfo, VideoId,
    DEFAULT_PLATFORM_BASE_URL, HANDLE_SIGIL,
};
