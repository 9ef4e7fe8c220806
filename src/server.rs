use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::{self, Body},
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method, Request, Response, StatusCode,
        header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION, ORIGIN, TRANSFER_ENCODING},
    },
    routing::any,
};
use portico::{
    ApiRelay, GatewayError, PROXY_PREFIX, RewriteContext, RouteTable, StatsSnapshot, WebProxy,
    apply_api_cors, apply_proxy_cors, inject_no_think, log_relay_error, log_relayed,
    wants_no_think,
};

const BODY_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    relay: ApiRelay,
    proxy: WebProxy,
    fallback_origin: String,
}

pub async fn serve(
    addr: SocketAddr,
    relay: ApiRelay,
    proxy: WebProxy,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;
    println!("portico gateway listening on http://{bound_addr}");

    let router = app(relay, proxy, format!("http://{bound_addr}"));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        eprintln!("failed to install ctrl-c handler; running until killed");
        std::future::pending::<()>().await;
    }
}

fn app(relay: ApiRelay, proxy: WebProxy, fallback_origin: String) -> Router {
    let state = Arc::new(AppState {
        relay,
        proxy,
        fallback_origin,
    });

    Router::new()
        .route("/", any(dashboard))
        .route("/index.html", any(dashboard))
        .route("/robots.txt", any(robots))
        .route("/stats", any(stats_json))
        .route("/proxy", any(proxy_target_missing))
        .route("/proxy/", any(proxy_target_missing))
        .route("/proxy/*target", any(proxy_handler))
        .fallback(api_relay_handler)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Simple surfaces
// ---------------------------------------------------------------------------

async fn robots() -> Response<Body> {
    plain_text(StatusCode::OK, "User-agent: *\nDisallow: /")
}

async fn stats_json(State(state): State<Arc<AppState>>) -> Response<Body> {
    let snapshot = state.relay.stats().snapshot();
    let json = serde_json::to_string_pretty(&snapshot)
        .unwrap_or_else(|_| r#"{"total":0,"endpoints":{},"requests":[]}"#.to_owned());

    let mut response = Response::new(Body::from(json));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response.headers_mut().insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn dashboard(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response<Body> {
    let origin = request_origin(&headers, &state.fallback_origin);
    let html = render_dashboard(
        &state.relay.stats().snapshot(),
        &origin,
        state.relay.routes(),
    );

    let mut response = Response::new(Body::from(html));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

// ---------------------------------------------------------------------------
// API relay
// ---------------------------------------------------------------------------

async fn api_relay_handler(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Response<Body> {
    let (parts, req_body) = req.into_parts();
    let path = parts.uri.path().to_owned();
    let query = parts.uri.query().map(str::to_owned);

    let Some((entry, remainder)) = state
        .relay
        .routes()
        .resolve(&path)
        .map(|(entry, remainder)| (entry.clone(), remainder.to_owned()))
    else {
        return plain_text(StatusCode::NOT_FOUND, "Not Found");
    };

    // Counted before any upstream contact: a call counts even if the
    // upstream later fails.
    state.relay.stats().record(&entry.prefix);

    if parts.method == Method::OPTIONS {
        let mut headers = HeaderMap::new();
        apply_api_cors(&mut headers);
        return assemble(StatusCode::NO_CONTENT, headers, Body::empty());
    }

    // Two-path body handling: the gnothink transform is the only place a
    // request body is buffered and inspected; every other call streams.
    let body = if wants_no_think(&entry.prefix, &parts.method, &parts.headers) {
        let bytes = match body::to_bytes(req_body, BODY_LIMIT).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return plain_text(
                    StatusCode::BAD_REQUEST,
                    &format!("failed to read request body: {err}"),
                );
            }
        };
        if bytes.is_empty() {
            None
        } else {
            match inject_no_think(&bytes) {
                Ok(rewritten) => Some(reqwest::Body::from(rewritten)),
                Err(err) => {
                    log_relay_error("api", &parts.method, &path, query.as_deref(), &err);
                    return plain_text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("API relay failed: {err}"),
                    );
                }
            }
        }
    } else if parts.method == Method::GET || parts.method == Method::HEAD {
        None
    } else {
        Some(reqwest::Body::wrap_stream(req_body.into_data_stream()))
    };

    match state
        .relay
        .forward(
            &entry,
            &remainder,
            query.as_deref(),
            parts.method.clone(),
            &parts.headers,
            body,
        )
        .await
    {
        Ok(upstream) => {
            log_relayed(
                "api",
                &parts.method,
                &path,
                query.as_deref(),
                upstream.status(),
            );
            relay_api_response(upstream)
        }
        Err(err) => {
            log_relay_error("api", &parts.method, &path, query.as_deref(), &err);
            plain_text(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("API relay failed: {err}"),
            )
        }
    }
}

fn relay_api_response(upstream: reqwest::Response) -> Response<Body> {
    let status = upstream.status();
    let mut headers = passthrough_headers(upstream.headers());
    apply_api_cors(&mut headers);
    assemble(status, headers, Body::from_stream(upstream.bytes_stream()))
}

// ---------------------------------------------------------------------------
// Generic web proxy
// ---------------------------------------------------------------------------

async fn proxy_target_missing() -> Response<Body> {
    plain_text(
        StatusCode::BAD_REQUEST,
        &GatewayError::MissingProxyTarget.to_string(),
    )
}

async fn proxy_handler(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response<Body> {
    let (parts, req_body) = req.into_parts();
    let path = parts.uri.path().to_owned();
    let query = parts.uri.query().map(str::to_owned);
    let origin_header = parts.headers.get(ORIGIN).cloned();

    // The target is everything after the raw "/proxy/" marker plus the
    // original query string, taken verbatim.
    let raw_target = match path.find(PROXY_PREFIX) {
        Some(index) => &path[index + PROXY_PREFIX.len()..],
        None => "",
    };
    let raw_target = match query.as_deref() {
        Some(query) if !query.is_empty() => format!("{raw_target}?{query}"),
        _ => raw_target.to_owned(),
    };

    let target = match WebProxy::parse_target(&raw_target) {
        Ok(target) => target,
        Err(err) => return plain_text(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let gateway_origin = request_origin(&parts.headers, &state.fallback_origin);
    let context = RewriteContext::new(gateway_origin, target);

    if parts.method == Method::OPTIONS {
        let mut headers = HeaderMap::new();
        apply_proxy_cors(&mut headers, origin_header.as_ref());
        return assemble(StatusCode::NO_CONTENT, headers, Body::empty());
    }

    let body = if parts.method == Method::GET || parts.method == Method::HEAD {
        None
    } else {
        Some(reqwest::Body::wrap_stream(req_body.into_data_stream()))
    };

    match state
        .proxy
        .fetch(&context, parts.method.clone(), &parts.headers, body)
        .await
    {
        Ok(upstream) => {
            log_relayed(
                "proxy",
                &parts.method,
                &path,
                query.as_deref(),
                upstream.status(),
            );
            relay_proxy_response(upstream, &context, origin_header.as_ref()).await
        }
        Err(err) => {
            log_relay_error("proxy", &parts.method, &path, query.as_deref(), &err);
            plain_text(
                StatusCode::BAD_GATEWAY,
                &format!("Proxy request failed: {err}"),
            )
        }
    }
}

async fn relay_proxy_response(
    upstream: reqwest::Response,
    context: &RewriteContext,
    origin: Option<&HeaderValue>,
) -> Response<Body> {
    let status = upstream.status();
    let mut headers = passthrough_headers(upstream.headers());
    apply_proxy_cors(&mut headers, origin);

    // Redirects are relayed with an empty body and a Location that keeps
    // the follow-up request inside the gateway.
    if status.is_redirection() {
        if let Some(location) = headers.get(LOCATION).and_then(|value| value.to_str().ok()) {
            let rewritten = context.rewrite_location(location);
            if let Ok(value) = HeaderValue::from_str(&rewritten) {
                headers.insert(LOCATION, value);
            }
        }
        return assemble(status, headers, Body::empty());
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    if content_type.contains("text/html") {
        return match upstream.text().await {
            Ok(text) => assemble(status, headers, Body::from(context.rewrite_html(&text))),
            Err(err) => plain_text(
                StatusCode::BAD_GATEWAY,
                &format!("Proxy request failed: {err}"),
            ),
        };
    }

    if content_type.contains("text/css") {
        return match upstream.text().await {
            Ok(text) => assemble(status, headers, Body::from(context.rewrite_css(&text))),
            Err(err) => plain_text(
                StatusCode::BAD_GATEWAY,
                &format!("Proxy request failed: {err}"),
            ),
        };
    }

    assemble(status, headers, Body::from_stream(upstream.bytes_stream()))
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Upstream headers minus the hop-by-hop set; lengths are recomputed by the
/// server since bodies may be rewritten or re-framed.
fn passthrough_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.iter() {
        if name == TRANSFER_ENCODING || name == CONNECTION || name == CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn assemble(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn plain_text(status: StatusCode, text: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(text.to_owned()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// The gateway's externally visible origin, taken from forwarding headers
/// when deployed behind a TLS-terminating edge.
fn request_origin(headers: &HeaderMap, fallback: &str) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("http");

    match headers.get(HOST).and_then(|value| value.to_str().ok()) {
        Some(host) => format!("{proto}://{host}"),
        None => fallback.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

fn render_dashboard(snapshot: &StatsSnapshot, origin: &str, routes: &RouteTable) -> String {
    let stats_json = serde_json::to_string(snapshot)
        .unwrap_or_else(|_| r#"{"total":0,"endpoints":{},"requests":[]}"#.to_owned());

    let endpoint_items = routes
        .entries()
        .iter()
        .map(|entry| {
            format!(
                r#"<div class="endpoint-item"><div class="endpoint-path">{prefix}</div><div class="endpoint-url">{origin}{prefix}</div></div>"#,
                prefix = entry.prefix,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    DASHBOARD_TEMPLATE
        .replace("__STATS_JSON__", &stats_json)
        .replace("__ENDPOINT_ITEMS__", &endpoint_items)
        .replace("__ORIGIN__", origin)
}

const DASHBOARD_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Portico API Gateway</title>
    <script src="https://cdnjs.cloudflare.com/ajax/libs/Chart.js/3.9.1/chart.min.js"></script>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); min-height: 100vh; padding: 20px; }
        .container { max-width: 1200px; margin: 0 auto; }
        .header { text-align: center; color: white; margin-bottom: 32px; }
        .header h1 { font-size: 2.2rem; margin-bottom: 8px; }
        .header p { opacity: 0.9; }
        .panel { background: rgba(255, 255, 255, 0.95); border-radius: 16px; padding: 24px; box-shadow: 0 8px 32px rgba(0, 0, 0, 0.1); margin-bottom: 28px; }
        .panel h2 { color: #333; margin-bottom: 16px; font-size: 1.3rem; }
        .time-tabs { display: inline-flex; gap: 6px; background: #f1f5f9; padding: 4px; border-radius: 10px; margin-bottom: 16px; }
        .time-tab { padding: 7px 14px; border: none; background: transparent; border-radius: 8px; cursor: pointer; color: #64748b; font-weight: 500; }
        .time-tab.active { background: #6366f1; color: white; }
        .chart-container { position: relative; height: 340px; }
        .stats-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(240px, 1fr)); gap: 16px; margin-bottom: 28px; }
        .stat-card { background: rgba(255, 255, 255, 0.95); border-radius: 14px; padding: 20px; box-shadow: 0 8px 32px rgba(0, 0, 0, 0.1); }
        .stat-card h3 { font-size: 1.05rem; color: #333; margin-bottom: 10px; }
        .stat-row { display: flex; justify-content: space-between; padding: 7px 0; border-bottom: 1px solid #eee; }
        .stat-row:last-child { border-bottom: none; }
        .stat-label { color: #666; font-size: 0.9rem; }
        .stat-value { font-weight: 600; color: #333; }
        .endpoint-list { display: grid; grid-template-columns: repeat(auto-fit, minmax(240px, 1fr)); gap: 10px; margin: 14px 0; }
        .endpoint-item { background: #f8f9fa; padding: 12px 14px; border-radius: 8px; border-left: 4px solid #6366f1; }
        .endpoint-path { font-weight: bold; color: #6366f1; font-family: monospace; }
        .endpoint-url { font-size: 0.8rem; color: #666; word-break: break-all; font-family: monospace; }
        .code-block { background: #1a1a1a; color: #f8f8f2; padding: 14px; border-radius: 8px; font-family: monospace; font-size: 0.85rem; overflow-x: auto; margin: 10px 0; white-space: pre-wrap; }
        .note { color: #666; margin: 10px 0; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header"><h1>Portico API Gateway</h1><p>Live relay statistics and usage guide</p></div>

        <div class="panel">
            <h2>Call volume</h2>
            <div class="time-tabs">
                <button class="time-tab active" data-period="today">24h</button>
                <button class="time-tab" data-period="week">7d</button>
                <button class="time-tab" data-period="month">30d</button>
                <button class="time-tab" data-period="total">Total</button>
            </div>
            <div class="chart-container"><canvas id="apiChart"></canvas></div>
        </div>

        <div class="stats-grid" id="statCards"></div>

        <div class="panel">
            <h2>Mapped endpoints</h2>
            <div class="endpoint-list">
__ENDPOINT_ITEMS__
            </div>
            <p class="note">Replace the provider's API origin with the matching gateway prefix:</p>
            <div class="code-block"># before
https://api.openai.com/v1/chat/completions

# after
__ORIGIN__/openai/v1/chat/completions</div>
            <p class="note">Browse any site through the generic proxy:</p>
            <div class="code-block">__ORIGIN__/proxy/https://example.com</div>
            <p class="note">Machine-readable counters: <code>__ORIGIN__/stats</code></p>
        </div>
    </div>

    <script>
        var stats = __STATS_JSON__;
        var chart = null;
        var HOUR = 60 * 60 * 1000;
        var DAY = 24 * HOUR;

        function pad(n) { return (n < 10 ? '0' : '') + n; }

        function seriesFor(period) {
            var now = Date.now();
            var labels = [], data = [];
            if (period === 'today') {
                for (var i = 23; i >= 0; i--) {
                    var t = new Date(now - i * HOUR);
                    labels.push(pad(t.getHours()) + ':00');
                    data.push(0);
                }
                stats.requests.forEach(function (req) {
                    var age = now - req.timestamp;
                    if (age >= 0 && age < 24 * HOUR) {
                        data[23 - Math.floor(age / HOUR)]++;
                    }
                });
            } else if (period === 'week' || period === 'month') {
                var days = period === 'week' ? 7 : 30;
                for (var d = days - 1; d >= 0; d--) {
                    var day = new Date(now - d * DAY);
                    labels.push(pad(day.getMonth() + 1) + '-' + pad(day.getDate()));
                    data.push(0);
                }
                stats.requests.forEach(function (req) {
                    var age = now - req.timestamp;
                    if (age >= 0 && age < days * DAY) {
                        data[days - 1 - Math.floor(age / DAY)]++;
                    }
                });
            } else {
                Object.keys(stats.endpoints).forEach(function (prefix) {
                    if (stats.endpoints[prefix].total > 0) {
                        labels.push(prefix.replace('/', ''));
                        data.push(stats.endpoints[prefix].total);
                    }
                });
            }
            return { labels: labels, data: data };
        }

        function drawChart(period) {
            var ctx = document.getElementById('apiChart').getContext('2d');
            if (chart) chart.destroy();
            var series = seriesFor(period);
            chart = new Chart(ctx, {
                type: 'bar',
                data: {
                    labels: series.labels,
                    datasets: [
                        { type: 'bar', label: 'Calls', data: series.data, backgroundColor: '#6366f1B3', borderColor: '#6366f1', borderWidth: 1.5, order: 2 },
                        { type: 'line', label: 'Trend', data: series.data, borderColor: '#ef4444', borderWidth: 2, pointRadius: 3, fill: false, tension: 0.2, order: 1 }
                    ]
                },
                options: {
                    responsive: true, maintainAspectRatio: false,
                    scales: { y: { beginAtZero: true, ticks: { precision: 0 } } }
                }
            });
        }

        function renderCards() {
            var featured = ['/openai', '/gemini', '/claude', '/xai'];
            var container = document.getElementById('statCards');
            var html = '';
            featured.forEach(function (prefix) {
                var c = stats.endpoints[prefix] || { today: 0, week: 0, month: 0, total: 0 };
                html += '<div class="stat-card"><h3>' + prefix + '</h3>'
                    + '<div class="stat-row"><span class="stat-label">24h</span><span class="stat-value">' + c.today + '</span></div>'
                    + '<div class="stat-row"><span class="stat-label">7d</span><span class="stat-value">' + c.week + '</span></div>'
                    + '<div class="stat-row"><span class="stat-label">30d</span><span class="stat-value">' + c.month + '</span></div>'
                    + '<div class="stat-row"><span class="stat-label">Total</span><span class="stat-value">' + c.total + '</span></div></div>';
            });
            var active = Object.keys(stats.endpoints).filter(function (k) { return stats.endpoints[k].total > 0; }).length;
            html += '<div class="stat-card"><h3>Overall</h3>'
                + '<div class="stat-row"><span class="stat-label">Total requests</span><span class="stat-value">' + stats.total + '</span></div>'
                + '<div class="stat-row"><span class="stat-label">Active endpoints</span><span class="stat-value">' + active + '</span></div></div>';
            container.innerHTML = html;
        }

        document.addEventListener('DOMContentLoaded', function () {
            renderCards();
            drawChart('today');
            document.querySelectorAll('.time-tab').forEach(function (tab) {
                tab.addEventListener('click', function () {
                    document.querySelectorAll('.time-tab').forEach(function (t) { t.classList.remove('active'); });
                    this.classList.add('active');
                    drawChart(this.dataset.period);
                });
            });
        });

        setInterval(function () { location.reload(); }, 60000);
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use portico::{RouteTable, StatsRegistry};
    use serde_json::Value;
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        let routes = Arc::new(RouteTable::builtin());
        let stats = StatsRegistry::new(routes.prefixes().map(str::to_owned));
        let relay = ApiRelay::new(routes, stats);
        let proxy = WebProxy::new().unwrap();
        app(relay, proxy, "http://gateway.test".to_owned())
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn stats_endpoint_starts_empty() {
        let response = test_app()
            .oneshot(request(Method::GET, "/stats"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );

        let value: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["total"], 0);
        assert!(value["endpoints"]["/openai"].is_object());
        assert_eq!(value["requests"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn robots_disallows_everything() {
        let response = test_app()
            .oneshot(request(Method::GET, "/robots.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "User-agent: *\nDisallow: /");
    }

    #[tokio::test]
    async fn unknown_path_answers_not_found() {
        let response = test_app()
            .oneshot(request(Method::GET, "/no-such-prefix/v1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not Found");
    }

    #[tokio::test]
    async fn dashboard_renders_endpoint_list() {
        let response = test_app().oneshot(request(Method::GET, "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );

        let html = body_text(response).await;
        assert!(html.contains("/openai"));
        assert!(html.contains("http://gateway.test/proxy/https://example.com"));
    }

    #[tokio::test]
    async fn api_preflight_short_circuits_without_upstream() {
        // The mapped origins are unreachable from tests; a 204 here proves
        // the upstream is never contacted.
        let response = test_app()
            .oneshot(request(Method::OPTIONS, "/openai/v1/chat/completions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get("x-frame-options").unwrap(),
            "DENY"
        );
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn api_preflight_is_recorded_in_stats() {
        let app = test_app();
        let _ = app
            .clone()
            .oneshot(request(Method::OPTIONS, "/openai/v1/models"))
            .await
            .unwrap();

        let response = app.oneshot(request(Method::GET, "/stats")).await.unwrap();
        let value: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["endpoints"]["/openai"]["total"], 1);
    }

    #[tokio::test]
    async fn proxy_preflight_echoes_origin() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/proxy/https://example.com")
            .header("origin", "https://app.example")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://app.example"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn proxy_rejects_invalid_targets() {
        let response = test_app()
            .oneshot(request(Method::GET, "/proxy/not-a-url"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("http://"));

        let response = test_app()
            .oneshot(request(Method::GET, "/proxy/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = test_app()
            .oneshot(request(Method::GET, "/proxy"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // One-connection upstream answering a canned redirect, for driving the
    // 3xx branch end to end.
    async fn spawn_redirect_upstream() -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(
                    b"HTTP/1.1 301 Moved Permanently\r\nLocation: /login\r\nContent-Length: 0\r\n\r\n",
                )
                .await;
        });
        addr
    }

    #[tokio::test]
    async fn proxy_relays_redirects_with_rewritten_location() {
        let addr = spawn_redirect_upstream().await;
        let response = test_app()
            .oneshot(request(Method::GET, &format!("/proxy/http://{addr}/start")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        // Location keeps the upstream's non-default port and routes the
        // follow-up back through the gateway.
        assert_eq!(
            response.headers().get(LOCATION).unwrap().to_str().unwrap(),
            format!("http://gateway.test/proxy/http://{addr}/login")
        );
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_upstream_answers_bad_gateway() {
        // Port 9 (discard) refuses connections on loopback.
        let response = test_app()
            .oneshot(request(Method::GET, "/proxy/http://127.0.0.1:9/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("Proxy request failed"));
    }

    #[test]
    fn request_origin_prefers_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("gw.example"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(
            request_origin(&headers, "http://fallback"),
            "https://gw.example"
        );

        let mut plain = HeaderMap::new();
        plain.insert(HOST, HeaderValue::from_static("localhost:8000"));
        assert_eq!(
            request_origin(&plain, "http://fallback"),
            "http://localhost:8000"
        );

        assert_eq!(
            request_origin(&HeaderMap::new(), "http://fallback"),
            "http://fallback"
        );
    }
}
