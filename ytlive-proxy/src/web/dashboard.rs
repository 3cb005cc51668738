//! Index page with usage notes and current state.

use std::fmt::Write;
use std::sync::Arc;

use axum::{extract::State, response::Html};

use crate::web::state::WebState;

/// Serve the index page.
pub async fn index(State(web_state): State<Arc<WebState>>) -> Html<String> {
    let status = web_state.orchestrator.cache_status_snapshot().await;
    let config = &web_state.config;
    let port = config.server.listen.port();

    let mut channels = String::new();
    for channel in web_state.configured_channels() {
        let channel = escape_html(channel);
        let _ = write!(
            channels,
            r#"<li><a href="/{0}" target="_blank">{0}</a> - <code>http://localhost:{1}/{0}</code></li>"#,
            channel, port
        );
    }
    if channels.is_empty() {
        channels.push_str("<li>none</li>");
    }

    let refresh = if web_state.scheduler.is_enabled() {
        format!("every {}s", config.refresh.interval_secs)
    } else {
        "disabled".to_string()
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>ytlive-proxy</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 2em; color: #222; }}
        code {{ background: #f2f2f2; padding: 1px 4px; border-radius: 3px; }}
        h2 {{ margin-top: 1.5em; }}
        .note {{ color: #666; font-size: 12px; }}
    </style>
</head>
<body>
    <h1>ytlive-proxy</h1>

    <h2>Usage</h2>
    <h3>By channel name</h3>
    <ul>
        <li><code>http://your-server:{port}/CHANNEL</code> relays the stream</li>
        <li><code>http://your-server:{port}/url/CHANNEL</code> redirects to the stream URL</li>
    </ul>
    <h3>By query</h3>
    <ul>
        <li>Channel, redirect: <code>/video?channel=@ABCNews</code></li>
        <li>Channel, relay: <code>/video?channel=@ABCNews&amp;redirect=false</code></li>
        <li>Video id: <code>/video?id=VIDEO_ID</code></li>
    </ul>
    <p>Redirect mode suits players that follow 302s; relay mode suits tools that need a stable URL.</p>

    <h2>Configured channels ({channel_count})</h2>
    <ul>
        {channels}
    </ul>

    <h2>Administration</h2>
    <ul>
        <li><a href="/cache/status">Cache status</a> - <code>GET /cache/status</code></li>
        <li>Clear caches - <code>POST /cache/clear</code></li>
        <li>Refresh now - <code>POST /cache/refresh</code></li>
        <li><a href="/config">Configuration</a> - <code>GET /config</code></li>
        <li><a href="/health">Health</a> - <code>GET /health</code></li>
    </ul>

    <h2>Current state</h2>
    <ul>
        <li>Channel cache: {channel_total} entries, TTL {channel_ttl}s</li>
        <li>Stream cache: {stream_total} entries, TTL {stream_ttl}s</li>
        <li>Background refresh: {refresh}</li>
        <li>Maximum height: {max_height}p</li>
    </ul>

    <p class="note">Log directory: {log_dir}<br>Listening on {listen}</p>
</body>
</html>
"#,
        port = port,
        channel_count = web_state.configured_channels().len(),
        channels = channels,
        channel_total = status.channel_cache.total,
        channel_ttl = status.channel_cache.ttl_seconds,
        stream_total = status.video_cache.total,
        stream_ttl = status.video_cache.ttl_seconds,
        refresh = refresh,
        max_height = config.resolver.max_height,
        log_dir = escape_html(&config.logging.log_dir.display().to_string()),
        listen = config.server.listen,
    ))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
