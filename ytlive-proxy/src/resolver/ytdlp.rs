//! `yt-dlp` subprocess resolver.
//!
//! Each call spawns `yt-dlp --dump-single-json` and reads the metadata it
//! prints. The child is killed when the future is dropped, so a caller-side
//! timeout also terminates the process.

use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::process::Command;

use ytlive_types::{
    watch_url, FormatPolicy, ResolveError, StreamCandidate, VideoId, DEFAULT_PLATFORM_BASE_URL,
};

use super::Resolver;

pub const DEFAULT_YTDLP_BINARY: &str = "yt-dlp";

/// Environment variable overriding the executable path.
pub const YTDLP_PATH_ENV: &str = "YTDLP_PATH";

/// stderr fragments that indicate a transport problem rather than content.
const TRANSPORT_MARKERS: &[&str] = &[
    "unable to download",
    "http error 5",
    "http error 429",
    "timed out",
    "connection refused",
    "connection reset",
    "name or service not known",
    "temporary failure in name resolution",
    "getaddrinfo failed",
    "network is unreachable",
    "ssl:",
];

/// `live_status` values that mean the page is a video but not a live one.
const NOT_LIVE_STATUSES: &[&str] = &["is_upcoming", "was_live", "not_live", "post_live"];

/// How much stderr to keep in error messages.
const STDERR_EXCERPT_LEN: usize = 300;

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Executable name or path.
    pub binary: String,
    /// Base URL used to build watch page URLs.
    pub platform_base_url: String,
    /// Extra arguments appended to every invocation.
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: std::env::var(YTDLP_PATH_ENV)
                .unwrap_or_else(|_| DEFAULT_YTDLP_BINARY.to_string()),
            platform_base_url: DEFAULT_PLATFORM_BASE_URL.to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    config: YtDlpConfig,
}

/// Result of probing a channel's live URL.
#[derive(Debug, Default, Deserialize)]
struct LiveProbe {
    id: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
    live_status: Option<String>,
}

/// Result of extracting a single format for a video.
#[derive(Debug, Default, Deserialize)]
struct StreamProbe {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// How a non-zero `yt-dlp` exit should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    Transport,
    Content,
}

/// A `yt-dlp` run that did not produce usable output.
#[derive(Debug)]
enum RunFailure {
    Spawn(std::io::Error),
    Exit { code: Option<i32>, stderr: String },
}

impl YtDlpResolver {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn live_args(&self, channel_url: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--flat-playlist",
            "--skip-download",
            "--no-warnings",
            "--no-progress",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(self.config.extra_args.iter().cloned());
        args.push(channel_url.to_string());
        args
    }

    fn stream_args(&self, video_id: &str, policy: &FormatPolicy) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--skip-download",
            "--no-warnings",
            "--no-progress",
            "--no-playlist",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push("-f".to_string());
        args.push(policy.selector());
        args.extend(self.config.extra_args.iter().cloned());
        args.push(watch_url(&self.config.platform_base_url, video_id));
        args
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>, RunFailure> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("[yt-dlp] {} {}", self.config.binary, args.join(" "));
        let output = cmd.output().await.map_err(RunFailure::Spawn)?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(RunFailure::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve_live_video_id(&self, channel_url: &str) -> Result<VideoId, ResolveError> {
        let started = std::time::Instant::now();
        let stdout = match self.run(&self.live_args(channel_url)).await {
            Ok(stdout) => stdout,
            Err(failure) => {
                return Err(failure_to_error(failure, channel_url, |msg| {
                    ResolveError::NotLive(msg)
                }))
            }
        };

        let probe: LiveProbe = serde_json::from_slice(&stdout).map_err(|e| {
            ResolveError::ResolutionFailed(format!("unreadable yt-dlp output for {}: {}", channel_url, e))
        })?;
        let video_id = live_video_id(probe, channel_url)?;

        info!(
            "[yt-dlp] Live video for {}: {} ({:.2}s)",
            channel_url,
            video_id,
            started.elapsed().as_secs_f64()
        );
        Ok(video_id)
    }

    async fn resolve_stream_candidate(
        &self,
        video_id: &str,
        policy: &FormatPolicy,
    ) -> Result<StreamCandidate, ResolveError> {
        let started = std::time::Instant::now();
        let stdout = match self.run(&self.stream_args(video_id, policy)).await {
            Ok(stdout) => stdout,
            Err(failure) => {
                return Err(failure_to_error(failure, video_id, |msg| {
                    ResolveError::ResolutionFailed(msg)
                }))
            }
        };

        let probe: StreamProbe = serde_json::from_slice(&stdout).map_err(|e| {
            ResolveError::ResolutionFailed(format!("unreadable yt-dlp output for {}: {}", video_id, e))
        })?;
        let candidate = stream_candidate(probe, video_id)?;

        info!(
            "[yt-dlp] Stream for {}: {:?}x{:?} ({:.2}s)",
            video_id,
            candidate.width,
            candidate.height,
            started.elapsed().as_secs_f64()
        );
        Ok(candidate)
    }
}

fn live_video_id(probe: LiveProbe, channel_url: &str) -> Result<VideoId, ResolveError> {
    // A channel without a broadcast resolves to its tab playlist instead of a video.
    if probe.kind.as_deref() == Some("playlist") {
        return Err(ResolveError::NotLive(format!(
            "{} resolved to a channel page, no live video",
            channel_url
        )));
    }
    if let Some(status) = probe.live_status.as_deref() {
        if NOT_LIVE_STATUSES.contains(&status) {
            return Err(ResolveError::NotLive(format!(
                "{} is not live (live_status={})",
                channel_url, status
            )));
        }
    }
    match probe.id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(ResolveError::NotLive(format!(
            "{} has no current live video",
            channel_url
        ))),
    }
}

fn stream_candidate(probe: StreamProbe, video_id: &str) -> Result<StreamCandidate, ResolveError> {
    match probe.url {
        Some(url) if !url.trim().is_empty() => Ok(StreamCandidate {
            url,
            width: probe.width,
            height: probe.height,
        }),
        _ => Err(ResolveError::ResolutionFailed(format!(
            "no stream URL for {}",
            video_id
        ))),
    }
}

fn classify_stderr(stderr: &str) -> FailureClass {
    let lower = stderr.to_ascii_lowercase();
    if TRANSPORT_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureClass::Transport
    } else {
        FailureClass::Content
    }
}

fn failure_to_error(
    failure: RunFailure,
    target: &str,
    content_error: impl FnOnce(String) -> ResolveError,
) -> ResolveError {
    match failure {
        RunFailure::Spawn(e) => {
            warn!("[yt-dlp] Failed to start resolver for {}: {}", target, e);
            ResolveError::ResolverUnavailable(format!("failed to run yt-dlp: {}", e))
        }
        RunFailure::Exit { code, stderr } => {
            let excerpt = stderr_excerpt(&stderr);
            let message = format!("{} (exit code {:?}): {}", target, code, excerpt);
            match classify_stderr(&stderr) {
                FailureClass::Transport => ResolveError::ResolverUnavailable(message),
                FailureClass::Content => content_error(message),
            }
        }
    }
}

/// Last error line of yt-dlp's stderr, shortened.
fn stderr_excerpt(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("")
        .trim();
    line.chars().take(STDERR_EXCERPT_LEN).collect()
}
