//! HTTP endpoints: stream access and cache administration.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        header::{ACCEPT_RANGES, CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use ytlive_types::{ErrorKind, RelayError, StageError, StreamInfo};

use crate::web::state::WebState;

/// Content type used when upstream does not name one.
const DEFAULT_STREAM_CONTENT_TYPE: &str = "video/mp4";

// ============================================================================
// Errors
// ============================================================================

/// Failure of a request, rendered as `{success: false, kind, stage, error}`.
#[derive(Debug)]
pub enum ApiError {
    Resolve(StageError),
    Relay(RelayError),
    MissingParameter(&'static str),
}

impl From<StageError> for ApiError {
    fn from(e: StageError) -> Self {
        ApiError::Resolve(e)
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        ApiError::Relay(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Resolve(e) => match e.kind() {
                ErrorKind::NotLive => StatusCode::NOT_FOUND,
                ErrorKind::ResolverUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::ResolutionFailed => StatusCode::BAD_GATEWAY,
            },
            ApiError::Relay(RelayError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Relay(_) => StatusCode::BAD_GATEWAY,
            ApiError::MissingParameter(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Resolve(e) => json!({
                "success": false,
                "kind": e.kind(),
                "stage": e.stage,
                "error": e.to_string(),
            }),
            ApiError::Relay(e) => json!({
                "success": false,
                "kind": "StreamTransport",
                "stage": "relay",
                "error": e.to_string(),
            }),
            ApiError::MissingParameter(what) => json!({
                "success": false,
                "kind": "MissingParameter",
                "stage": null,
                "error": format!("missing parameter: {}", what),
            }),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Stream access
// ============================================================================

fn redirect_to(info: &StreamInfo) -> Response {
    (StatusCode::FOUND, [(LOCATION, info.url.clone())]).into_response()
}

async fn proxy(web_state: &WebState, info: &StreamInfo) -> Result<Response, ApiError> {
    let stream = web_state.relay.open(&info.url).await?;
    let content_type = stream
        .content_type
        .unwrap_or_else(|| DEFAULT_STREAM_CONTENT_TYPE.to_string());
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, content_type), (ACCEPT_RANGES, "bytes".to_string())],
        Body::from_stream(stream.body),
    )
        .into_response())
}

/// `GET /url/*channel`: redirect to the channel's current stream URL.
pub async fn redirect_channel(
    State(web_state): State<Arc<WebState>>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let info = web_state.orchestrator.resolve_by_channel(&channel).await?;
    info!("Redirecting {} -> {} ({})", channel, info.video_id, info.resolution);
    Ok(redirect_to(&info))
}

/// `GET /*channel`: relay the channel's current stream.
pub async fn proxy_channel(
    State(web_state): State<Arc<WebState>>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let info = web_state.orchestrator.resolve_by_channel(&channel).await?;
    info!("Proxying {} -> {} ({})", channel, info.video_id, info.resolution);
    proxy(&web_state, &info).await
}

#[derive(Debug, Deserialize)]
pub struct VideoQuery {
    pub id: Option<String>,
    pub channel: Option<String>,
    pub redirect: Option<String>,
}

impl VideoQuery {
    /// Redirect unless `redirect` is given and is not `true`.
    fn redirect(&self) -> bool {
        self.redirect
            .as_deref()
            .map_or(true, |v| v.eq_ignore_ascii_case("true"))
    }
}

/// `GET /video?id=&channel=&redirect=`.
///
/// `channel` wins over `id` when both are present.
pub async fn video(
    State(web_state): State<Arc<WebState>>,
    Query(query): Query<VideoQuery>,
) -> Result<Response, ApiError> {
    let channel = query.channel.as_deref().filter(|c| !c.trim().is_empty());
    let id = query.id.as_deref().filter(|id| !id.trim().is_empty());

    let info = match (channel, id) {
        (Some(channel), _) => web_state.orchestrator.resolve_by_channel(channel).await?,
        (None, Some(id)) => web_state.orchestrator.resolve_by_video_id(id).await?,
        (None, None) => return Err(ApiError::MissingParameter("id or channel")),
    };

    if query.redirect() {
        info!("Redirect mode: {}", info.video_id);
        Ok(redirect_to(&info))
    } else {
        info!("Proxy mode: {}", info.video_id);
        proxy(&web_state, &info).await
    }
}

// ============================================================================
// Administration
// ============================================================================

/// `GET /health`.
pub async fn health(State(web_state): State<Arc<WebState>>) -> impl IntoResponse {
    let status = web_state.orchestrator.cache_status_snapshot().await;
    let refresh = &web_state.config.refresh;
    Json(json!({
        "status": "ok",
        "cached_videos": status.video_cache.total,
        "cached_channels": status.channel_cache.total,
        "configured_channels": web_state.configured_channels().len(),
        "auto_refresh_enabled": web_state.scheduler.is_enabled(),
        "refresh_interval_hours": refresh.interval_secs as f64 / 3600.0,
        "uptime_seconds": web_state.metrics.uptime_seconds(),
    }))
}

/// `GET /config`.
pub async fn get_config(State(web_state): State<Arc<WebState>>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "config": &*web_state.config,
    }))
}

/// `GET /cache/status`: every entry, fresh or stale, plus refresher state.
pub async fn cache_status(State(web_state): State<Arc<WebState>>) -> impl IntoResponse {
    let status = web_state.orchestrator.cache_status_snapshot().await;
    let scheduler = &web_state.scheduler;
    let last_report = scheduler.last_report().await;
    Json(json!({
        "success": true,
        "channel_cache": status.channel_cache,
        "video_cache": status.video_cache,
        "refresher": {
            "enabled": scheduler.is_enabled(),
            "state": scheduler.state(),
            "interval_secs": scheduler.config().interval_secs,
            "configured_channels": web_state.configured_channels(),
            "last_report": last_report,
        },
        "metrics": web_state.metrics.snapshot(),
    }))
}

/// `POST /cache/clear`.
pub async fn clear_cache(State(web_state): State<Arc<WebState>>) -> impl IntoResponse {
    web_state.orchestrator.clear_all_caches().await;
    Json(json!({
        "success": true,
        "message": "All caches cleared",
    }))
}

/// `POST /cache/refresh`: start a pass in the background and return at once.
pub async fn refresh_cache(State(web_state): State<Arc<WebState>>) -> impl IntoResponse {
    if web_state.configured_channels().is_empty() {
        warn!("Manual refresh requested but no channels are configured");
    }
    let started = web_state.scheduler.trigger_pass().is_some();
    if !started {
        info!("Manual refresh requested while one is already running");
    }
    Json(json!({
        "success": true,
        "started": started,
        "message": if started { "Refresh started" } else { "Refresh already running" },
        "channels": web_state.configured_channels().len(),
    }))
}

/// `GET /favicon.ico`: browsers ask for it; it is not a channel.
pub async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}
