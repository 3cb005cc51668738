//! Resolution orchestrator.
//!
//! Composes the channel tier and the stream tier. It keeps no state of its
//! own and never retries; retry policy belongs to HTTP clients and to the
//! background refresher.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

use ytlive_types::{
    ChannelKey, FormatPolicy, ResolveError, StageError, StreamInfo, DEFAULT_PLATFORM_BASE_URL,
};

use crate::cache::{CacheEntry, ChannelCache, StreamCache, StreamRecord};
use crate::metrics::Metrics;
use crate::resolver::Resolver;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// TTL of channel → video id entries.
    pub channel_ttl: Duration,
    /// TTL of video id → stream URL entries.
    pub stream_ttl: Duration,
    /// Upper bound on every resolver call.
    pub resolver_timeout: Duration,
    /// Base URL used to derive channel live URLs.
    pub platform_base_url: String,
    /// Format selection handed to the resolver.
    pub format_policy: FormatPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_ttl: Duration::from_secs(300),   // 5 minutes
            stream_ttl: Duration::from_secs(1800),   // 30 minutes
            resolver_timeout: Duration::from_secs(60),
            platform_base_url: DEFAULT_PLATFORM_BASE_URL.to_string(),
            format_policy: FormatPolicy::default(),
        }
    }
}

/// Diagnostics view of one channel tier entry.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEntryStatus {
    pub channel: String,
    pub video_id: String,
    pub resolved_at: i64,
    pub cache_age_seconds: u64,
    /// Negative once the entry is stale.
    pub expires_in_seconds: i64,
    pub fresh: bool,
}

/// Diagnostics view of one stream tier entry.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEntryStatus {
    pub video_id: String,
    pub channel: Option<String>,
    pub resolution: String,
    pub resolved_at: i64,
    pub cache_age_seconds: u64,
    pub expires_in_seconds: i64,
    pub fresh: bool,
}

/// All entries of one tier, stale ones included.
#[derive(Debug, Clone, Serialize)]
pub struct TierStatus<T> {
    pub total: usize,
    pub fresh: usize,
    pub ttl_seconds: u64,
    pub items: Vec<T>,
}

/// Read-only snapshot of both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub channel_cache: TierStatus<ChannelEntryStatus>,
    pub video_cache: TierStatus<StreamEntryStatus>,
}

/// Entry point for everything that needs a stream URL.
pub struct Orchestrator {
    channels: ChannelCache,
    streams: StreamCache,
}

impl Orchestrator {
    pub fn new(resolver: Arc<dyn Resolver>, config: OrchestratorConfig, metrics: Arc<Metrics>) -> Self {
        let channels = ChannelCache::new(
            Arc::clone(&resolver),
            config.channel_ttl,
            config.platform_base_url.clone(),
            config.resolver_timeout,
            Arc::clone(&metrics),
        );
        let streams = StreamCache::new(
            resolver,
            config.stream_ttl,
            config.format_policy,
            config.resolver_timeout,
            metrics,
        );
        Self { channels, streams }
    }

    #[cfg(test)]
    pub fn stream_cache(&self) -> &StreamCache {
        &self.streams
    }

    /// Resolve a channel reference (bare name, `@handle` or URL) to its live stream.
    pub async fn resolve_by_channel(&self, reference: &str) -> Result<StreamInfo, StageError> {
        self.resolve_channel_with_horizon(reference, Duration::ZERO).await
    }

    /// Resolve a video id to its stream.
    pub async fn resolve_by_video_id(&self, video_id: &str) -> Result<StreamInfo, StageError> {
        self.streams
            .resolve(video_id, Duration::ZERO)
            .await
            .map_err(StageError::stream)
    }

    /// Like [`resolve_by_channel`](Self::resolve_by_channel), but re-resolves
    /// any tier whose entry would expire within `horizon`.
    ///
    /// The refresher passes its own interval so every warm entry is renewed
    /// before the next pass could find it stale.
    pub async fn refresh_channel(
        &self,
        reference: &str,
        horizon: Duration,
    ) -> Result<StreamInfo, StageError> {
        self.resolve_channel_with_horizon(reference, horizon).await
    }

    async fn resolve_channel_with_horizon(
        &self,
        reference: &str,
        horizon: Duration,
    ) -> Result<StreamInfo, StageError> {
        if reference.trim().is_empty() {
            return Err(StageError::channel(ResolveError::ResolutionFailed(
                "empty channel reference".to_string(),
            )));
        }

        let key = ChannelKey::normalize(reference);
        let video_id = self
            .channels
            .resolve_key(&key, horizon)
            .await
            .map_err(StageError::channel)?;
        debug!("[Orchestrator] {} is live as {}", key, video_id);

        let info = self
            .streams
            .resolve(&video_id, horizon)
            .await
            .map_err(StageError::stream)?;

        self.streams.annotate_source(&video_id, &key).await;
        Ok(info)
    }

    /// Empty both tiers.
    ///
    /// Both table locks are held together, so no reader sees one tier
    /// cleared and the other not. Resolutions in flight across the clear
    /// are discarded instead of stored.
    pub async fn clear_all_caches(&self) {
        let mut channels = self.channels.store().lock().await;
        let mut streams = self.streams.store().lock().await;
        let (channel_count, stream_count) = (channels.len(), streams.len());
        channels.clear();
        streams.clear();
        info!(
            "[Orchestrator] Cleared all caches ({} channel entries, {} stream entries)",
            channel_count, stream_count
        );
    }

    /// Snapshot of both tiers with age and remaining TTL per entry.
    pub async fn cache_status_snapshot(&self) -> CacheStatus {
        let channel_ttl = self.channels.store().ttl();
        let stream_ttl = self.streams.store().ttl();

        let channel_items: Vec<ChannelEntryStatus> = self
            .channels
            .store()
            .entries()
            .await
            .into_iter()
            .map(|(channel, entry)| {
                let (cache_age_seconds, expires_in_seconds, fresh) = timing(&entry, channel_ttl);
                ChannelEntryStatus {
                    channel,
                    video_id: entry.value.clone(),
                    resolved_at: entry.resolved_at_unix,
                    cache_age_seconds,
                    expires_in_seconds,
                    fresh,
                }
            })
            .collect();

        let stream_items: Vec<StreamEntryStatus> = self
            .streams
            .store()
            .entries()
            .await
            .into_iter()
            .map(|(video_id, entry)| {
                let (cache_age_seconds, expires_in_seconds, fresh) = timing(&entry, stream_ttl);
                let StreamRecord {
                    resolution,
                    source_channel,
                    ..
                } = entry.value;
                StreamEntryStatus {
                    video_id,
                    channel: source_channel.map(|c| c.to_string()),
                    resolution,
                    resolved_at: entry.resolved_at_unix,
                    cache_age_seconds,
                    expires_in_seconds,
                    fresh,
                }
            })
            .collect();

        CacheStatus {
            channel_cache: TierStatus {
                total: channel_items.len(),
                fresh: channel_items.iter().filter(|i| i.fresh).count(),
                ttl_seconds: channel_ttl.as_secs(),
                items: channel_items,
            },
            video_cache: TierStatus {
                total: stream_items.len(),
                fresh: stream_items.iter().filter(|i| i.fresh).count(),
                ttl_seconds: stream_ttl.as_secs(),
                items: stream_items,
            },
        }
    }
}

/// (age, remaining TTL, fresh) of an entry, in whole seconds.
fn timing<V>(entry: &CacheEntry<V>, ttl: Duration) -> (u64, i64, bool) {
    let age = entry.age();
    let expires_in = ttl.as_secs() as i64 - age.as_secs() as i64;
    (age.as_secs(), expires_in, entry.is_fresh(ttl, Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::scripted::ScriptedResolver;
    use ytlive_types::{ErrorKind, Stage};

    const ABC_LIVE: &str = "https://www.youtube.com/@ABCNews/live";

    fn orchestrator(resolver: Arc<ScriptedResolver>) -> Orchestrator {
        let config = OrchestratorConfig {
            channel_ttl: Duration::from_secs(1800),
            stream_ttl: Duration::from_secs(1800),
            ..OrchestratorConfig::default()
        };
        Orchestrator::new(resolver, config, Metrics::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_abcnews_scenario() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_live(ABC_LIVE, Ok("v1"));
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let orch = orchestrator(resolver.clone());

        let first = orch.resolve_by_channel("ABCNews").await.unwrap();
        assert_eq!(first.url, "https://cdn/x.m3u8");
        assert_eq!(first.video_id, "v1");
        assert_eq!((resolver.live_calls(), resolver.stream_calls()), (1, 1));

        tokio::time::advance(Duration::from_secs(10)).await;
        let second = orch.resolve_by_channel("ABCNews").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(resolver.total_calls(), 2);

        tokio::time::advance(Duration::from_secs(1791)).await;
        orch.resolve_by_channel("ABCNews").await.unwrap();
        assert_eq!((resolver.live_calls(), resolver.stream_calls()), (2, 2));
    }

    #[tokio::test]
    async fn test_source_channel_annotation() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_live(ABC_LIVE, Ok("v1"));
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let orch = orchestrator(resolver.clone());

        orch.resolve_by_channel("https://www.youtube.com/@ABCNews").await.unwrap();
        let status = orch.cache_status_snapshot().await;
        assert_eq!(status.video_cache.items[0].channel.as_deref(), Some("@ABCNews"));
        assert_eq!(status.channel_cache.items[0].channel, "@ABCNews");
        assert_eq!(status.channel_cache.items[0].video_id, "v1");
    }

    #[tokio::test]
    async fn test_bad_video_id() {
        let resolver = Arc::new(ScriptedResolver::new());
        let orch = orchestrator(resolver.clone());

        let err = orch.resolve_by_video_id("badid").await.unwrap_err();
        assert_eq!(err.stage, Stage::Stream);
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
        assert!(orch
            .cache_status_snapshot()
            .await
            .video_cache
            .items
            .iter()
            .all(|i| i.video_id != "badid"));
    }

    #[tokio::test]
    async fn test_errors_are_tagged_with_stage() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_live(ABC_LIVE, Ok("v1"));
        resolver.set_stream_error("v1", ResolveError::ResolverUnavailable("cdn".into()));
        let orch = orchestrator(resolver.clone());

        let err = orch.resolve_by_channel("SkyNews").await.unwrap_err();
        assert_eq!((err.stage, err.kind()), (Stage::Channel, ErrorKind::NotLive));

        let err = orch.resolve_by_channel("ABCNews").await.unwrap_err();
        assert_eq!(
            (err.stage, err.kind()),
            (Stage::Stream, ErrorKind::ResolverUnavailable)
        );
        // The channel tier result is kept even though the stream tier failed.
        assert_eq!(orch.cache_status_snapshot().await.channel_cache.total, 1);
    }

    #[tokio::test]
    async fn test_clear_then_lookup_re_resolves() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_live(ABC_LIVE, Ok("v1"));
        resolver.set_stream("v1", "https://cdn/old.m3u8", 1920, 1080);
        let orch = orchestrator(resolver.clone());

        orch.resolve_by_channel("ABCNews").await.unwrap();
        orch.clear_all_caches().await;

        let status = orch.cache_status_snapshot().await;
        assert_eq!((status.channel_cache.total, status.video_cache.total), (0, 0));

        resolver.set_live(ABC_LIVE, Ok("v2"));
        resolver.set_stream("v2", "https://cdn/new.m3u8", 1920, 1080);
        let info = orch.resolve_by_channel("ABCNews").await.unwrap();
        assert_eq!(info.url, "https://cdn/new.m3u8");
        assert_eq!(resolver.live_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_in_flight_during_clear_is_discarded() {
        let resolver = Arc::new(ScriptedResolver::new().with_delay(Duration::from_secs(5)));
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let orch = Arc::new(orchestrator(resolver.clone()));

        let pending = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.resolve_by_video_id("v1").await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        orch.clear_all_caches().await;

        assert!(pending.await.unwrap().is_ok());
        assert_eq!(orch.cache_status_snapshot().await.video_cache.total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_end_consistent() {
        let resolver = Arc::new(
            ScriptedResolver::new()
                .with_delay(Duration::from_millis(100))
                .with_numbered_urls(),
        );
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let orch = Arc::new(orchestrator(resolver.clone()));

        let a = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.resolve_by_video_id("v1").await.unwrap() }
        });
        let b = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.resolve_by_video_id("v1").await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        // Both callers missed and both reached the resolver.
        assert_eq!(resolver.stream_calls(), 2);

        let entries = orch.stream_cache().store().entries().await;
        assert_eq!(entries.len(), 1);
        let stored = &entries[0].1.value;
        assert!(stored.url == a.url || stored.url == b.url);
        assert_eq!(stored.resolution, "1920x1080");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_horizon_renews_before_expiry() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_live(ABC_LIVE, Ok("v1"));
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let orch = orchestrator(resolver.clone());

        orch.resolve_by_channel("ABCNews").await.unwrap();
        tokio::time::advance(Duration::from_secs(1000)).await;

        // 1000s old, 800s left: fresh for requests, not for a 900s horizon.
        orch.refresh_channel("ABCNews", Duration::from_secs(700)).await.unwrap();
        assert_eq!(resolver.total_calls(), 2);
        orch.refresh_channel("ABCNews", Duration::from_secs(900)).await.unwrap();
        assert_eq!(resolver.total_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_stale_entries() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_live(ABC_LIVE, Ok("v1"));
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let orch = orchestrator(resolver.clone());

        orch.resolve_by_channel("ABCNews").await.unwrap();
        tokio::time::advance(Duration::from_secs(1900)).await;

        let status = orch.cache_status_snapshot().await;
        assert_eq!(status.channel_cache.total, 1);
        assert_eq!(status.channel_cache.fresh, 0);
        let item = &status.video_cache.items[0];
        assert!(!item.fresh);
        assert_eq!(item.cache_age_seconds, 1900);
        assert_eq!(item.expires_in_seconds, -100);
    }

    #[tokio::test]
    async fn test_empty_reference() {
        let resolver = Arc::new(ScriptedResolver::new());
        let orch = orchestrator(resolver.clone());
        let err = orch.resolve_by_channel("   ").await.unwrap_err();
        assert_eq!(err.stage, Stage::Channel);
        assert_eq!(resolver.total_calls(), 0);
    }
}
