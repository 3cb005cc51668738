//! Channel tier: normalized channel key to current live video id.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use ytlive_types::{ChannelKey, ResolveError, VideoId};

use crate::cache::store::{Lookup, TtlStore};
use crate::cache::bounded;
use crate::metrics::{Metrics, TierMetrics};
use crate::resolver::Resolver;

/// Caches which video each channel is broadcasting.
///
/// Failed lookups are never cached.
pub struct ChannelCache {
    store: TtlStore<VideoId>,
    resolver: Arc<dyn Resolver>,
    platform_base_url: String,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ChannelCache {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        ttl: Duration,
        platform_base_url: impl Into<String>,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store: TtlStore::new(ttl),
            resolver,
            platform_base_url: platform_base_url.into(),
            timeout,
            metrics,
        }
    }

    pub fn store(&self) -> &TtlStore<VideoId> {
        &self.store
    }

    fn tier_metrics(&self) -> &TierMetrics {
        &self.metrics.channel
    }

    /// Resolve any spelling of a channel reference.
    #[cfg(test)]
    pub async fn resolve(&self, reference: &str) -> Result<(ChannelKey, VideoId), ResolveError> {
        let key = ChannelKey::normalize(reference);
        let video_id = self.resolve_key(&key, Duration::ZERO).await?;
        Ok((key, video_id))
    }

    /// Resolve an already normalized key.
    ///
    /// An entry only counts as fresh if it stays fresh for `horizon` more.
    pub async fn resolve_key(
        &self,
        key: &ChannelKey,
        horizon: Duration,
    ) -> Result<VideoId, ResolveError> {
        let generation = match self.store.lookup(key.as_str(), horizon).await {
            Lookup::Hit { value, age } => {
                self.tier_metrics().record_hit();
                info!(
                    "[ChannelCache] Hit: {} -> {} (age {}s)",
                    key,
                    value,
                    age.as_secs()
                );
                return Ok(value);
            }
            Lookup::Miss { generation, stale } => {
                self.tier_metrics().record_miss();
                if stale {
                    debug!("[ChannelCache] Stale entry for {}, re-resolving", key);
                }
                generation
            }
        };

        let live_url = key.live_url(&self.platform_base_url);
        info!("[ChannelCache] Resolving live video for {} ({})", key, live_url);
        self.tier_metrics().record_resolver_call();

        let result = bounded(
            self.timeout,
            "live video lookup",
            self.resolver.resolve_live_video_id(&live_url),
        )
        .await;

        let video_id = match result {
            Ok(video_id) => video_id,
            Err(e) => {
                self.tier_metrics().record_resolver_failure();
                warn!("[ChannelCache] Failed to resolve {}: {}", key, e);
                return Err(e);
            }
        };

        if self
            .store
            .store(key.as_str().to_string(), video_id.clone(), generation)
            .await
        {
            info!("[ChannelCache] Stored {} -> {}", key, video_id);
        } else {
            debug!("[ChannelCache] Cache cleared while resolving {}, result not stored", key);
        }
        Ok(video_id)
    }
}
