//! Resolution, refresh and relay counters.
//!
//! This module provides process-wide counters for:
//! - cache hits and misses per tier
//! - resolver calls and failures per tier
//! - background refresh passes and per-channel outcomes
//! - relay sessions and bytes transferred

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::info;
use serde::Serialize;

/// Counters for one cache tier.
#[derive(Debug, Default)]
pub struct TierMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    resolver_calls: AtomicU64,
    resolver_failures: AtomicU64,
}

/// Point-in-time copy of [`TierMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub resolver_calls: u64,
    pub resolver_failures: u64,
}

impl TierMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolver_call(&self) {
        self.resolver_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolver_failure(&self) {
        self.resolver_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierMetricsSnapshot {
        TierMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resolver_calls: self.resolver_calls.load(Ordering::Relaxed),
            resolver_failures: self.resolver_failures.load(Ordering::Relaxed),
        }
    }
}

/// Counters for the background refresher.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    passes: AtomicU64,
    channel_successes: AtomicU64,
    channel_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshMetricsSnapshot {
    pub passes: u64,
    pub channel_successes: u64,
    pub channel_failures: u64,
}

impl RefreshMetrics {
    pub fn record_pass(&self, succeeded: u64, failed: u64) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.channel_successes.fetch_add(succeeded, Ordering::Relaxed);
        self.channel_failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        RefreshMetricsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            channel_successes: self.channel_successes.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
        }
    }
}

/// Counters for byte relaying.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    sessions_started: AtomicU64,
    active_sessions: AtomicU64,
    sessions_failed: AtomicU64,
    bytes_relayed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayMetricsSnapshot {
    pub sessions_started: u64,
    pub active_sessions: u64,
    pub sessions_failed: u64,
    pub bytes_relayed: u64,
}

impl RelayMetrics {
    pub fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_ended(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_relayed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

/// System-level metrics aggregator.
#[derive(Debug)]
pub struct Metrics {
    pub channel: TierMetrics,
    pub stream: TierMetrics,
    pub refresh: RefreshMetrics,
    pub relay: RelayMetrics,
    started_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub channel_cache: TierMetricsSnapshot,
    pub stream_cache: TierMetricsSnapshot,
    pub refresh: RefreshMetricsSnapshot,
    pub relay: RelayMetricsSnapshot,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            channel_cache: self.channel.snapshot(),
            stream_cache: self.stream.snapshot(),
            refresh: self.refresh.snapshot(),
            relay: self.relay.snapshot(),
        }
    }

    /// Print a one-line summary.
    pub fn print_report(&self) {
        let s = self.snapshot();
        info!(
            "[Metrics] uptime={}s channel(hit={}, miss={}, calls={}, failed={}) \
             stream(hit={}, miss={}, calls={}, failed={}) refresh(passes={}, ok={}, failed={}) \
             relay(sessions={}, active={}, failed={}, bytes={})",
            s.uptime_seconds,
            s.channel_cache.hits,
            s.channel_cache.misses,
            s.channel_cache.resolver_calls,
            s.channel_cache.resolver_failures,
            s.stream_cache.hits,
            s.stream_cache.misses,
            s.stream_cache.resolver_calls,
            s.stream_cache.resolver_failures,
            s.refresh.passes,
            s.refresh.channel_successes,
            s.refresh.channel_failures,
            s.relay.sessions_started,
            s.relay.active_sessions,
            s.relay.sessions_failed,
            s.relay.bytes_relayed
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            channel: TierMetrics::default(),
            stream: TierMetrics::default(),
            refresh: RefreshMetrics::default(),
            relay: RelayMetrics::default(),
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_metrics() {
        let metrics = Metrics::new();
        metrics.channel.record_hit();
        metrics.channel.record_miss();
        metrics.channel.record_resolver_call();
        metrics.channel.record_resolver_failure();
        metrics.stream.record_hit();

        let s = metrics.snapshot();
        assert_eq!(s.channel_cache.hits, 1);
        assert_eq!(s.channel_cache.resolver_failures, 1);
        assert_eq!(s.stream_cache.hits, 1);
        assert_eq!(s.stream_cache.misses, 0);
    }

    #[test]
    fn test_refresh_and_relay_metrics() {
        let metrics = Metrics::new();
        metrics.refresh.record_pass(3, 1);
        metrics.refresh.record_pass(4, 0);
        metrics.relay.session_started();
        metrics.relay.session_started();
        metrics.relay.session_ended();
        metrics.relay.add_bytes(8192);

        let s = metrics.snapshot();
        assert_eq!(s.refresh.passes, 2);
        assert_eq!(s.refresh.channel_successes, 7);
        assert_eq!(s.refresh.channel_failures, 1);
        assert_eq!(s.relay.sessions_started, 2);
        assert_eq!(s.relay.active_sessions, 1);
        assert_eq!(s.relay.bytes_relayed, 8192);
    }
}
