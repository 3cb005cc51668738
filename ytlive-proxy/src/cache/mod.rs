//! Two-tier resolution cache.
//!
//! This module provides:
//! - [`ChannelCache`]: channel key to live video id
//! - [`StreamCache`]: video id to stream URL and metadata
//! - [`store::TtlStore`]: the lock-guarded TTL table both tiers are built on
//!
//! The tiers are keyed and expire independently. Neither holds its lock while
//! the resolver runs, so concurrent misses on one key may all call the
//! resolver; the last successful write wins.

pub mod channel;
pub mod store;
pub mod stream;

use std::future::Future;
use std::time::Duration;

use ytlive_types::ResolveError;

pub use channel::ChannelCache;
pub use store::CacheEntry;
pub use stream::{StreamCache, StreamRecord};

/// Run a resolver call, turning an elapsed `timeout` into a transport error.
pub(crate) async fn bounded<T, F>(timeout: Duration, what: &str, call: F) -> Result<T, ResolveError>
where
    F: Future<Output = Result<T, ResolveError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ResolveError::ResolverUnavailable(format!(
            "{} timed out after {}s",
            what,
            timeout.as_secs()
        ))),
    }
}
