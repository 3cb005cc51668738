//! Background cache refresher.
//!
//! Keeps the configured channels warm so that player requests are served
//! from cache instead of waiting on the resolver.
//!
//! # How It Works
//!
//! 1. After a start-up grace delay the first pass runs
//! 2. Later passes start a fixed interval after the previous one started
//! 3. A pass visits every configured channel once, pausing between channels
//! 4. Each channel is re-resolved if its entries would expire before the next pass
//!
//! Failures are logged and counted; they never abort a pass.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use ytlive_types::ErrorKind;

use crate::metrics::Metrics;
use crate::orchestrator::Orchestrator;

/// Refresh scheduler configuration.
#[derive(Debug, Clone)]
pub struct RefreshSchedulerConfig {
    /// Whether the periodic refresher runs at all.
    pub enabled: bool,
    /// Channel references kept warm.
    pub channels: Vec<String>,
    /// Interval between pass starts (seconds).
    pub interval_secs: u64,
    /// Delay before the first pass (seconds).
    pub initial_delay_secs: u64,
    /// Pause between two channels of one pass (milliseconds).
    pub pacing_ms: u64,
}

impl Default for RefreshSchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: Vec::new(),
            interval_secs: 240,      // 4 minutes, below the channel TTL
            initial_delay_secs: 10,  // Let the server come up first
            pacing_ms: 2000,
        }
    }
}

impl RefreshSchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Refresher state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Waiting for the next pass.
    Idle,
    /// At least one pass is running.
    Refreshing,
    /// Cancelled.
    Stopped,
}

/// One channel that failed during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelFailure {
    pub channel: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub started_at: i64,
    /// Triggered by `POST /cache/refresh` rather than the timer.
    pub manual: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<ChannelFailure>,
    pub duration_ms: u64,
}

/// Decrements the active pass count when a pass ends or is dropped.
struct PassGuard<'a>(&'a AtomicUsize);

impl<'a> PassGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Periodic channel refresher.
pub struct RefreshScheduler {
    orchestrator: Arc<Orchestrator>,
    config: RefreshSchedulerConfig,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    active_passes: AtomicUsize,
    manual_pass: AtomicBool,
    last_report: Mutex<Option<RefreshReport>>,
}

impl RefreshScheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        config: RefreshSchedulerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            orchestrator,
            config,
            metrics,
            cancel: CancellationToken::new(),
            active_passes: AtomicUsize::new(0),
            manual_pass: AtomicBool::new(false),
            last_report: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RefreshSchedulerConfig {
        &self.config
    }

    /// Whether the periodic loop has anything to do.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.channels.is_empty()
    }

    pub fn state(&self) -> SchedulerState {
        if self.active_passes.load(Ordering::SeqCst) > 0 {
            SchedulerState::Refreshing
        } else if self.cancel.is_cancelled() {
            SchedulerState::Stopped
        } else {
            SchedulerState::Idle
        }
    }

    pub async fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.lock().await.clone()
    }

    /// Stop the periodic loop and abandon any running pass.
    pub fn shutdown(&self) {
        info!("[RefreshScheduler] Shutdown requested");
        self.cancel.cancel();
    }

    /// Start the scheduler background task.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run a pass now, independent of the periodic cadence.
    ///
    /// Returns `None` while an earlier manual pass is still running.
    pub fn trigger_pass(self: &Arc<Self>) -> Option<JoinHandle<RefreshReport>> {
        if self
            .manual_pass
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[RefreshScheduler] Manual pass already running");
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let report = this.run_pass(true).await;
            this.manual_pass.store(false, Ordering::SeqCst);
            report
        }))
    }

    async fn run(&self) {
        if !self.is_enabled() {
            info!("[RefreshScheduler] Disabled, no periodic refresh");
            return;
        }

        let interval = self.config.interval();
        info!(
            "[RefreshScheduler] Starting: {} channel(s), first pass in {}s, then every {}s",
            self.config.channels.len(),
            self.config.initial_delay_secs,
            interval.as_secs()
        );

        let first = Instant::now() + Duration::from_secs(self.config.initial_delay_secs);
        let mut ticker = interval_at(first, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("[RefreshScheduler] Stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }
            self.run_pass(false).await;
        }
    }

    /// Refresh every configured channel once.
    async fn run_pass(&self, manual: bool) -> RefreshReport {
        let _guard = PassGuard::enter(&self.active_passes);
        let started = Instant::now();
        let started_at = chrono::Utc::now().timestamp();
        let horizon = self.config.interval();
        let pacing = Duration::from_millis(self.config.pacing_ms);

        info!(
            "[RefreshScheduler] {} pass over {} channel(s)",
            if manual { "Manual" } else { "Scheduled" },
            self.config.channels.len()
        );

        let mut attempted = 0;
        let mut failed = Vec::new();

        for (i, channel) in self.config.channels.iter().enumerate() {
            if i > 0 && !pacing.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(pacing) => {}
                }
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("[RefreshScheduler] Cancelled while refreshing {}", channel);
                    break;
                }
                result = self.orchestrator.refresh_channel(channel, horizon) => result,
            };
            attempted += 1;

            match result {
                Ok(info) => {
                    info!(
                        "[RefreshScheduler] Refreshed {} -> {} ({})",
                        channel, info.video_id, info.resolution
                    );
                }
                Err(e) => {
                    if e.source.is_transient() {
                        warn!("[RefreshScheduler] Failed to refresh {} (transient): {}", channel, e);
                    } else {
                        warn!("[RefreshScheduler] Failed to refresh {}: {}", channel, e);
                    }
                    failed.push(ChannelFailure {
                        channel: channel.clone(),
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let report = RefreshReport {
            started_at,
            manual,
            attempted,
            succeeded: attempted - failed.len(),
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.metrics
            .refresh
            .record_pass(report.succeeded as u64, report.failed.len() as u64);
        info!(
            "[RefreshScheduler] Pass complete: {}/{} succeeded in {}ms",
            report.succeeded, report.attempted, report.duration_ms
        );

        *self.last_report.lock().await = Some(report.clone());
        report
    }
}
