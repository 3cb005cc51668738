//! HTTP front end: stream redirects, byte relaying and cache administration.

pub mod api;
pub mod dashboard;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::WebState;

/// Build the application router.
///
/// Fixed paths take precedence over the `/*channel` catch-all, so a channel
/// literally named `health` can only be reached through `/video?channel=`.
pub fn build_router(web_state: Arc<WebState>) -> Router {
    Router::new()
        .route("/", get(dashboard::index))
        .route("/favicon.ico", get(api::favicon))
        .route("/health", get(api::health))
        .route("/config", get(api::get_config))
        // Cache administration
        .route("/cache/status", get(api::cache_status))
        .route("/cache/clear", post(api::clear_cache))
        .route("/cache/refresh", post(api::refresh_cache))
        // Stream access
        .route("/video", get(api::video))
        .route("/url/*channel", get(api::redirect_channel))
        .route("/*channel", get(api::proxy_channel))
        .with_state(web_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve HTTP until `shutdown` is cancelled.
pub async fn start_web_server(
    listen_addr: SocketAddr,
    web_state: Arc<WebState>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(web_state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("HTTP server listening on http://{}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use serde_json::Value;
    use tower::ServiceExt;

    use ytlive_types::ResolveError;

    use crate::config::AppConfig;
    use crate::metrics::Metrics;
    use crate::orchestrator::Orchestrator;
    use crate::relay::{Relay, RelayConfig};
    use crate::resolver::scripted::ScriptedResolver;
    use crate::scheduler::RefreshScheduler;

    const ABC_LIVE: &str = "https://www.youtube.com/@ABCNews/live";
    const STREAM_URL: &str = "https://cdn.example/abc.m3u8";

    fn app(resolver: Arc<ScriptedResolver>) -> Router {
        let mut config = AppConfig::default();
        config.refresh.channels = vec!["@ABCNews".to_string(), "@SkyNews".to_string()];
        config.refresh.pacing_ms = 0;
        let config = Arc::new(config);

        let metrics = Metrics::new();
        let orchestrator = Arc::new(Orchestrator::new(
            resolver,
            config.orchestrator_config(),
            Arc::clone(&metrics),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&orchestrator),
            config.refresh_config(),
            Arc::clone(&metrics),
        ));
        let relay = Arc::new(Relay::new(RelayConfig::default(), Arc::clone(&metrics)).unwrap());
        build_router(Arc::new(WebState::new(
            orchestrator,
            scheduler,
            relay,
            config,
            metrics,
        )))
    }

    fn live_resolver() -> Arc<ScriptedResolver> {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.set_live(ABC_LIVE, Ok("v1"));
        resolver.set_stream("v1", STREAM_URL, 1920, 1080);
        resolver
    }

    async fn send(app: &Router, method: &str, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_redirect_by_channel_path() {
        let resolver = live_resolver();
        let app = app(resolver.clone());

        for uri in ["/url/ABCNews", "/url/@ABCNews"] {
            let response = send(&app, "GET", uri).await;
            assert_eq!(response.status(), StatusCode::FOUND);
            assert_eq!(location(&response), STREAM_URL);
        }
        assert_eq!(resolver.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_video_query_modes() {
        let resolver = live_resolver();
        let app = app(resolver.clone());

        let response = send(&app, "GET", "/video?channel=@ABCNews").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), STREAM_URL);

        let response = send(&app, "GET", "/video?id=v1&redirect=TRUE").await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let response = send(&app, "GET", "/video").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "MissingParameter");
    }

    #[tokio::test]
    async fn test_error_kinds_map_to_status() {
        let resolver = live_resolver();
        resolver.set_live(
            "https://www.youtube.com/@mirrornow/live",
            Ok("v2"),
        );
        resolver.set_stream_error("v2", ResolveError::ResolverUnavailable("timeout".into()));
        let app = app(resolver.clone());

        let response = send(&app, "GET", "/url/SkyNews").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "NotLive");
        assert_eq!(body["stage"], "channel");

        let response = send(&app, "GET", "/url/mirrornow").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["stage"], "stream");

        let response = send(&app, "GET", "/video?id=badid").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(response).await["kind"], "ResolutionFailed");
    }

    #[tokio::test]
    async fn test_proxy_relays_upstream_bytes() {
        let upstream = Router::new().route("/live.ts", get(|| async { "TSDATA" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, upstream).await.unwrap() });

        let resolver = live_resolver();
        resolver.set_stream("v1", &format!("http://{}/live.ts", addr), 1280, 720);
        let app = app(resolver.clone());

        for uri in ["/ABCNews", "/video?channel=ABCNews&redirect=false"] {
            let response = send(&app, "GET", uri).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
            assert!(response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain"));
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&bytes[..], b"TSDATA");
        }
    }

    #[tokio::test]
    async fn test_dead_stream_url_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let resolver = live_resolver();
        resolver.set_stream("v1", &format!("http://{}/gone.ts", addr), 1280, 720);
        let app = app(resolver.clone());

        let response = send(&app, "GET", "/ABCNews").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(response).await["stage"], "relay");

        // The stream entry survives the relay failure.
        let status = json_body(send(&app, "GET", "/cache/status").await).await;
        assert_eq!(status["video_cache"]["total"], 1);
    }

    #[tokio::test]
    async fn test_cache_administration() {
        let resolver = live_resolver();
        let app = app(resolver.clone());
        send(&app, "GET", "/url/ABCNews").await;

        let health = json_body(send(&app, "GET", "/health").await).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["cached_videos"], 1);
        assert_eq!(health["cached_channels"], 1);
        assert_eq!(health["configured_channels"], 2);

        let status = json_body(send(&app, "GET", "/cache/status").await).await;
        let item = &status["video_cache"]["items"][0];
        assert_eq!(item["video_id"], "v1");
        assert_eq!(item["channel"], "@ABCNews");
        assert_eq!(item["resolution"], "1920x1080");
        assert_eq!(item["fresh"], true);
        assert_eq!(status["refresher"]["state"], "idle");

        let response = send(&app, "POST", "/cache/clear").await;
        assert_eq!(response.status(), StatusCode::OK);
        let status = json_body(send(&app, "GET", "/cache/status").await).await;
        assert_eq!(status["channel_cache"]["total"], 0);
        assert_eq!(status["video_cache"]["total"], 0);

        let response = send(&app, "GET", "/cache/clear").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_manual_refresh_runs_in_background() {
        let resolver = live_resolver();
        let app = app(resolver.clone());

        let response = send(&app, "POST", "/cache/refresh").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["channels"], 2);
        assert_eq!(body["started"], true);

        let mut report = Value::Null;
        for _ in 0..50 {
            report = json_body(send(&app, "GET", "/cache/status").await).await["refresher"]
                ["last_report"]
                .clone();
            if !report.is_null() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(report["attempted"], 2);
        assert_eq!(report["succeeded"], 1);
        assert_eq!(report["manual"], true);
    }

    #[tokio::test]
    async fn test_static_pages() {
        let resolver = live_resolver();
        let app = app(resolver.clone());

        let response = send(&app, "GET", "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains("@SkyNews"));

        let config = json_body(send(&app, "GET", "/config").await).await;
        assert_eq!(config["config"]["cache"]["stream_ttl_secs"], 1800);

        let response = send(&app, "GET", "/favicon.ico").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(resolver.total_calls(), 0);
    }
}
