//! External resolver collaborator.
//!
//! This module provides:
//! - [`Resolver`]: the seam between the caches and whatever talks to the platform
//! - [`YtDlpResolver`]: production implementation driving the `yt-dlp` executable

pub mod ytdlp;

#[cfg(test)]
pub mod scripted;

use async_trait::async_trait;

use ytlive_types::{FormatPolicy, ResolveError, StreamCandidate, VideoId};

pub use ytdlp::{YtDlpConfig, YtDlpResolver};

/// Slow, fallible lookups against the video platform.
///
/// Implementations report "nothing live" as [`ResolveError::NotLive`], a
/// reachable platform without a usable stream as
/// [`ResolveError::ResolutionFailed`], and everything transport related as
/// [`ResolveError::ResolverUnavailable`]. Callers bound each call with their
/// own timeout.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Find the id of the video currently live at `channel_url`.
    async fn resolve_live_video_id(&self, channel_url: &str) -> Result<VideoId, ResolveError>;

    /// Pick a direct stream URL for `video_id` according to `policy`.
    async fn resolve_stream_candidate(
        &self,
        video_id: &str,
        policy: &FormatPolicy,
    ) -> Result<StreamCandidate, ResolveError>;
}
