//! Byte relay from a resolved stream URL to an HTTP client.
//!
//! The relay never inspects or transforms the bytes. Failures are reported
//! as [`RelayError`] and never touch the caches; a dead URL keeps being
//! served until its entry expires.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, info, warn};

use ytlive_types::RelayError;

use crate::metrics::Metrics;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream TCP/TLS connect bound (seconds).
    pub connect_timeout_secs: u64,
    /// Bound on receiving the response head (seconds).
    pub response_timeout_secs: u64,
    /// Maximum gap between two body chunks (seconds).
    pub idle_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            response_timeout_secs: 10,
            idle_timeout_secs: 30,
        }
    }
}

/// An open upstream response.
pub struct RelayStream {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, io::Error>>,
}

/// Body state; counts the session as ended when dropped.
struct Session {
    chunks: BoxStream<'static, reqwest::Result<Bytes>>,
    idle_timeout: Duration,
    metrics: Arc<Metrics>,
    relayed: u64,
    done: bool,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.metrics.relay.session_ended();
        debug!("[Relay] Session closed after {} bytes", self.relayed);
    }
}

fn body_error(error: RelayError) -> io::Error {
    let kind = match error {
        RelayError::Timeout(_) => io::ErrorKind::TimedOut,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, error)
}

/// HTTP client for upstream stream fetches.
pub struct Relay {
    client: reqwest::Client,
    config: RelayConfig,
    metrics: Arc<Metrics>,
}

impl Relay {
    pub fn new(config: RelayConfig, metrics: Arc<Metrics>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            config,
            metrics,
        })
    }

    /// Open `url` and hand back its body as a stream.
    ///
    /// Each chunk must arrive within the idle timeout; otherwise the stream
    /// yields a `TimedOut` error and ends.
    pub async fn open(&self, url: &str) -> Result<RelayStream, RelayError> {
        let response_timeout = Duration::from_secs(self.config.response_timeout_secs);

        let response = match tokio::time::timeout(response_timeout, self.client.get(url).send()).await {
            Err(_) => Err(RelayError::Timeout(self.config.response_timeout_secs)),
            Ok(Err(e)) if e.is_timeout() => Err(RelayError::Timeout(self.config.connect_timeout_secs)),
            Ok(Err(e)) => Err(RelayError::Connect(e.to_string())),
            Ok(Ok(response)) if !response.status().is_success() => {
                Err(RelayError::UpstreamStatus(response.status().as_u16()))
            }
            Ok(Ok(response)) => Ok(response),
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.metrics.relay.session_failed();
                warn!("[Relay] Failed to open upstream: {}", e);
                return Err(e);
            }
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response.content_length();
        info!(
            "[Relay] Upstream opened: {} ({})",
            content_type.as_deref().unwrap_or("no content type"),
            content_length.map_or_else(|| "unknown length".to_string(), |n| format!("{} bytes", n))
        );

        self.metrics.relay.session_started();
        let session = Session {
            chunks: response.bytes_stream().boxed(),
            idle_timeout: Duration::from_secs(self.config.idle_timeout_secs),
            metrics: Arc::clone(&self.metrics),
            relayed: 0,
            done: false,
        };

        let body = stream::unfold(session, |mut session| async move {
            if session.done {
                return None;
            }
            match tokio::time::timeout(session.idle_timeout, session.chunks.next()).await {
                Ok(Some(Ok(chunk))) => {
                    session.relayed += chunk.len() as u64;
                    session.metrics.relay.add_bytes(chunk.len() as u64);
                    Some((Ok(chunk), session))
                }
                Ok(Some(Err(e))) => {
                    warn!("[Relay] Upstream body error: {}", e);
                    session.metrics.relay.session_failed();
                    session.done = true;
                    Some((Err(body_error(RelayError::Body(e.to_string()))), session))
                }
                Ok(None) => None,
                Err(_) => {
                    let secs = session.idle_timeout.as_secs();
                    warn!("[Relay] No data from upstream for {}s, closing", secs);
                    session.metrics.relay.session_failed();
                    session.done = true;
                    Some((Err(body_error(RelayError::Timeout(secs))), session))
                }
            }
        })
        .boxed();

        Ok(RelayStream {
            content_type,
            content_length,
            body,
        })
    }
}
