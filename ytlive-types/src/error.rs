//! Error kinds for stream resolution and relaying.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Failure of a single resolution step.
///
/// None of these are ever cached; the next call asks the resolver again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The channel has no live broadcast right now.
    #[error("Channel is not live: {0}")]
    NotLive(String),

    /// The resolver could not be reached (timeout, spawn failure, network).
    #[error("Resolver unavailable: {0}")]
    ResolverUnavailable(String),

    /// The resolver answered but produced no usable stream.
    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::NotLive(_) => ErrorKind::NotLive,
            ResolveError::ResolverUnavailable(_) => ErrorKind::ResolverUnavailable,
            ResolveError::ResolutionFailed(_) => ErrorKind::ResolutionFailed,
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolveError::ResolverUnavailable(_))
    }
}

/// Discriminant of [`ResolveError`], for reporting and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NotLive,
    ResolverUnavailable,
    ResolutionFailed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotLive => "NotLive",
            ErrorKind::ResolverUnavailable => "ResolverUnavailable",
            ErrorKind::ResolutionFailed => "ResolutionFailed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tier of the resolution pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Channel handle to live video id.
    Channel,
    /// Video id to stream URL.
    Stream,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Channel => f.write_str("channel"),
            Stage::Stream => f.write_str("stream"),
        }
    }
}

/// A [`ResolveError`] tagged with the stage that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: ResolveError,
}

impl StageError {
    pub fn channel(source: ResolveError) -> Self {
        Self {
            stage: Stage::Channel,
            source,
        }
    }

    pub fn stream(source: ResolveError) -> Self {
        Self {
            stage: Stage::Stream,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Failure while relaying bytes from an already resolved stream URL.
///
/// The cached URL is left in place: it may have silently expired upstream,
/// and stays served until its TTL forces a re-resolution.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Could not connect to the upstream stream URL.
    #[error("Failed to connect to upstream: {0}")]
    Connect(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    /// Upstream did not answer or stalled for too long.
    #[error("Upstream timed out after {0} seconds")]
    Timeout(u64),

    /// The byte stream broke after it started.
    #[error("Upstream body error: {0}")]
    Body(String),
}
