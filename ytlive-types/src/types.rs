//! Core value types shared between the resolver, the caches and the web layer.

use std::fmt;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// Sigil that prefixes every canonical channel handle.
pub const HANDLE_SIGIL: char = '@';

/// Default base URL of the video platform.
pub const DEFAULT_PLATFORM_BASE_URL: &str = "https://www.youtube.com";

/// Hosts whose `/@handle` URLs fold into the bare handle form.
const PLATFORM_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com"];

/// Identifier of a video on the platform.
pub type VideoId = String;

/// Normalized channel identifier.
///
/// Every spelling of the same channel maps to one key, so the key is the only
/// key space used by the channel cache:
///
/// ```
/// use ytlive_types::ChannelKey;
///
/// let bare = ChannelKey::normalize("ABCNews");
/// assert_eq!(bare.as_str(), "@ABCNews");
/// assert_eq!(ChannelKey::normalize("@ABCNews"), bare);
/// assert_eq!(ChannelKey::normalize("https://www.youtube.com/@ABCNews/live"), bare);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Normalize a user-supplied channel reference.
    pub fn normalize(reference: &str) -> Self {
        let reference = reference.trim();

        if is_full_url(reference) {
            return match handle_from_platform_url(reference) {
                Some(handle) => Self(handle),
                None => Self(reference.to_string()),
            };
        }

        if reference.starts_with(HANDLE_SIGIL) {
            Self(reference.to_string())
        } else {
            Self(format!("{}{}", HANDLE_SIGIL, reference))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key is a handle (as opposed to an opaque channel URL).
    pub fn is_handle(&self) -> bool {
        self.0.starts_with(HANDLE_SIGIL)
    }

    /// URL that the resolver inspects to find the channel's current broadcast.
    ///
    /// Handles become `{base}/@name/live`; channel URLs are used unchanged.
    pub fn live_url(&self, platform_base_url: &str) -> String {
        if self.is_handle() {
            format!("{}/{}/live", platform_base_url.trim_end_matches('/'), self.0)
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_full_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Extract `@name` from `https://www.youtube.com/@name[/live][/]`.
fn handle_from_platform_url(s: &str) -> Option<String> {
    let parsed = url::Url::parse(s).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !PLATFORM_HOSTS.contains(&host.as_str()) {
        return None;
    }

    let mut segments = parsed.path_segments()?.filter(|seg| !seg.is_empty());
    // Segments come back percent-encoded; handles may be non-ASCII.
    let handle = percent_decode_str(segments.next()?).decode_utf8().ok()?;
    if !handle.starts_with(HANDLE_SIGIL) || handle.len() == 1 {
        return None;
    }
    match segments.next() {
        None | Some("live") => {}
        Some(_) => return None,
    }
    if segments.next().is_some() {
        return None;
    }

    Some(handle.into_owned())
}

/// Watch page URL for a video id.
pub fn watch_url(platform_base_url: &str, video_id: &str) -> String {
    format!(
        "{}/watch?v={}",
        platform_base_url.trim_end_matches('/'),
        video_id
    )
}

/// Frame size reported by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Render `{width}x{height}`, or `unknown` when either side is missing.
    pub fn describe(width: Option<u32>, height: Option<u32>) -> String {
        match (width, height) {
            (Some(width), Some(height)) => Resolution { width, height }.to_string(),
            _ => "unknown".to_string(),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Format selection policy handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPolicy {
    /// Preferred maximum vertical resolution.
    pub max_height: u32,
    /// Preferred container extension for the first rung of the ladder.
    pub preferred_ext: String,
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            max_height: 1080,
            preferred_ext: "mp4".to_string(),
        }
    }
}

impl FormatPolicy {
    /// yt-dlp format selector implementing the fallback ladder:
    /// combined audio+video in the preferred container at or below the
    /// height, then anything at or below the height, then anything.
    pub fn selector(&self) -> String {
        format!(
            "best[height<={h}][ext={ext}]/best[height<={h}]/best",
            h = self.max_height,
            ext = self.preferred_ext
        )
    }
}

/// A candidate stream as returned by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCandidate {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Resolved, playable stream for a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub video_id: VideoId,
    pub url: String,
    /// `{width}x{height}` or `unknown`.
    pub resolution: String,
}
