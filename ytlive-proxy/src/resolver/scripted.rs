//! In-memory resolver with canned answers and call counters, for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use ytlive_types::{FormatPolicy, ResolveError, StreamCandidate, VideoId};

use super::Resolver;

#[derive(Default)]
pub struct ScriptedResolver {
    live: Mutex<HashMap<String, Result<VideoId, ResolveError>>>,
    streams: Mutex<HashMap<String, Result<StreamCandidate, ResolveError>>>,
    live_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    /// Simulated latency of every call.
    delay: Option<Duration>,
    /// Append the call number to stream URLs so racing calls differ.
    number_urls: bool,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_numbered_urls(mut self) -> Self {
        self.number_urls = true;
        self
    }

    pub fn set_live(&self, channel_url: &str, result: Result<&str, ResolveError>) {
        self.live
            .lock()
            .unwrap()
            .insert(channel_url.to_string(), result.map(str::to_string));
    }

    pub fn set_stream(&self, video_id: &str, url: &str, width: u32, height: u32) {
        self.streams.lock().unwrap().insert(
            video_id.to_string(),
            Ok(StreamCandidate {
                url: url.to_string(),
                width: Some(width),
                height: Some(height),
            }),
        );
    }

    pub fn set_stream_error(&self, video_id: &str, error: ResolveError) {
        self.streams
            .lock()
            .unwrap()
            .insert(video_id.to_string(), Err(error));
    }

    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.live_calls() + self.stream_calls()
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve_live_video_id(&self, channel_url: &str) -> Result<VideoId, ResolveError> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.live
            .lock()
            .unwrap()
            .get(channel_url)
            .cloned()
            .unwrap_or_else(|| Err(ResolveError::NotLive(channel_url.to_string())))
    }

    async fn resolve_stream_candidate(
        &self,
        video_id: &str,
        _policy: &FormatPolicy,
    ) -> Result<StreamCandidate, ResolveError> {
        let call = self.stream_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self
            .streams
            .lock()
            .unwrap()
            .get(video_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(ResolveError::ResolutionFailed(format!(
                    "no candidate for {}",
                    video_id
                )))
            });
        match result {
            Ok(mut candidate) if self.number_urls => {
                candidate.url = format!("{}#{}", candidate.url, call);
                Ok(candidate)
            }
            other => other,
        }
    }
}
