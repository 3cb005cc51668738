//! Scheduled task management for ytlive-proxy.
//!
//! This module provides:
//! - [`RefreshScheduler`]: periodic refresh of the configured channels

pub mod refresh_scheduler;

pub use refresh_scheduler::{RefreshScheduler, RefreshSchedulerConfig};
