//! Stream tier: video id to resolved stream URL.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use ytlive_types::{ChannelKey, FormatPolicy, Resolution, ResolveError, StreamInfo};

use crate::cache::bounded;
use crate::cache::store::{Lookup, TtlStore};
use crate::metrics::{Metrics, TierMetrics};
use crate::resolver::Resolver;

/// Cached value of the stream tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub url: String,
    /// `{width}x{height}` or `unknown`.
    pub resolution: String,
    /// Channel that last led to this video. Reporting only.
    pub source_channel: Option<ChannelKey>,
}

/// Caches direct stream URLs per video.
pub struct StreamCache {
    store: TtlStore<StreamRecord>,
    resolver: Arc<dyn Resolver>,
    policy: FormatPolicy,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl StreamCache {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        ttl: Duration,
        policy: FormatPolicy,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store: TtlStore::new(ttl),
            resolver,
            policy,
            timeout,
            metrics,
        }
    }

    pub fn store(&self) -> &TtlStore<StreamRecord> {
        &self.store
    }

    fn tier_metrics(&self) -> &TierMetrics {
        &self.metrics.stream
    }

    /// Resolve `video_id` to a playable stream.
    ///
    /// An entry only counts as fresh if it stays fresh for `horizon` more.
    pub async fn resolve(
        &self,
        video_id: &str,
        horizon: Duration,
    ) -> Result<StreamInfo, ResolveError> {
        let video_id = video_id.trim();
        if video_id.is_empty() {
            return Err(ResolveError::ResolutionFailed("empty video id".to_string()));
        }

        let generation = match self.store.lookup(video_id, horizon).await {
            Lookup::Hit { value, age } => {
                self.tier_metrics().record_hit();
                info!("[StreamCache] Hit: {} (age {}s)", video_id, age.as_secs());
                return Ok(StreamInfo {
                    video_id: video_id.to_string(),
                    url: value.url,
                    resolution: value.resolution,
                });
            }
            Lookup::Miss { generation, stale } => {
                self.tier_metrics().record_miss();
                if stale {
                    info!("[StreamCache] Entry expired, re-resolving: {}", video_id);
                }
                generation
            }
        };

        info!(
            "[StreamCache] Resolving stream for {} (format {})",
            video_id,
            self.policy.selector()
        );
        self.tier_metrics().record_resolver_call();

        let result = bounded(
            self.timeout,
            "stream extraction",
            self.resolver.resolve_stream_candidate(video_id, &self.policy),
        )
        .await
        .and_then(|candidate| {
            if candidate.url.trim().is_empty() {
                Err(ResolveError::ResolutionFailed(format!(
                    "empty stream URL for {}",
                    video_id
                )))
            } else {
                Ok(candidate)
            }
        });

        let candidate = match result {
            Ok(candidate) => candidate,
            Err(e) => {
                self.tier_metrics().record_resolver_failure();
                warn!("[StreamCache] Failed to resolve {}: {}", video_id, e);
                return Err(e);
            }
        };

        let record = StreamRecord {
            url: candidate.url,
            resolution: Resolution::describe(candidate.width, candidate.height),
            source_channel: None,
        };
        let info = StreamInfo {
            video_id: video_id.to_string(),
            url: record.url.clone(),
            resolution: record.resolution.clone(),
        };

        if self.store.store(video_id.to_string(), record, generation).await {
            info!("[StreamCache] Stored {} ({})", video_id, info.resolution);
        } else {
            debug!("[StreamCache] Cache cleared while resolving {}, result not stored", video_id);
        }
        Ok(info)
    }

    /// Record which channel led to `video_id`. No-op if the entry is gone.
    pub async fn annotate_source(&self, video_id: &str, channel: &ChannelKey) {
        let updated = self
            .store
            .update(video_id, |record| {
                record.source_channel = Some(channel.clone());
            })
            .await;
        if !updated {
            debug!("[StreamCache] No entry for {} to annotate with {}", video_id, channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::scripted::ScriptedResolver;

    fn cache(resolver: Arc<ScriptedResolver>, ttl_secs: u64) -> StreamCache {
        StreamCache::new(
            resolver,
            Duration::from_secs(ttl_secs),
            FormatPolicy::default(),
            Duration::from_secs(30),
            Metrics::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_then_expiry() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let cache = cache(resolver.clone(), 1800);

        let info = cache.resolve("v1", Duration::ZERO).await.unwrap();
        assert_eq!(info.url, "https://cdn/x.m3u8");
        assert_eq!(info.resolution, "1920x1080");

        tokio::time::advance(Duration::from_secs(1799)).await;
        cache.resolve("v1", Duration::ZERO).await.unwrap();
        assert_eq!(resolver.stream_calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.resolve("v1", Duration::ZERO).await.unwrap();
        assert_eq!(resolver.stream_calls(), 2);
    }

    #[tokio::test]
    async fn test_bad_id_fails_and_is_not_cached() {
        let resolver = Arc::new(ScriptedResolver::new());
        let cache = cache(resolver.clone(), 1800);

        for _ in 0..2 {
            let err = cache.resolve("badid", Duration::ZERO).await.unwrap_err();
            assert!(matches!(err, ResolveError::ResolutionFailed(_)));
        }
        assert_eq!(resolver.stream_calls(), 2);
        assert!(cache.store().entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_url_is_resolution_failure() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_stream("v1", "", 1280, 720);
        let cache = cache(resolver.clone(), 1800);

        let err = cache.resolve("v1", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ResolveError::ResolutionFailed(_)));
        assert_eq!(cache.store().len().await, 0);
    }

    #[tokio::test]
    async fn test_empty_id_never_reaches_resolver() {
        let resolver = Arc::new(ScriptedResolver::new());
        let cache = cache(resolver.clone(), 1800);

        assert!(cache.resolve("  ", Duration::ZERO).await.is_err());
        assert_eq!(resolver.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_annotate_source() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_stream("v1", "https://cdn/x.m3u8", 1920, 1080);
        let cache = cache(resolver.clone(), 1800);
        let channel = ChannelKey::normalize("ABCNews");

        cache.annotate_source("v1", &channel).await;
        assert_eq!(cache.store().len().await, 0);

        cache.resolve("v1", Duration::ZERO).await.unwrap();
        cache.annotate_source("v1", &channel).await;

        let entries = cache.store().entries().await;
        assert_eq!(entries[0].1.value.source_channel, Some(channel));
    }
}
