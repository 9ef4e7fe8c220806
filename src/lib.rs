use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use bytes::Bytes;
use chrono::Utc;
use regex::{Captures, Regex};
use reqwest::{
    Client, Method, StatusCode, Url,
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
        ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
        HeaderMap, HeaderValue, REFERER, REFERRER_POLICY, USER_AGENT, X_CONTENT_TYPE_OPTIONS,
        X_FRAME_OPTIONS,
    },
    redirect,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Path marker that switches the gateway into generic web-proxy mode.
pub const PROXY_PREFIX: &str = "/proxy/";

/// Prefix-to-origin table, fixed at build time. Lookup is first match in
/// declared order, so no prefix here may shadow a later one.
pub const API_ROUTES: &[(&str, &str)] = &[
    ("/discord", "https://discord.com/api"),
    ("/telegram", "https://api.telegram.org"),
    ("/openai", "https://api.openai.com"),
    ("/claude", "https://api.anthropic.com"),
    ("/gemini", "https://generativelanguage.googleapis.com"),
    ("/gnothink", "https://generativelanguage.googleapis.com"),
    ("/meta", "https://www.meta.ai/api"),
    ("/groq", "https://api.groq.com/openai"),
    ("/xai", "https://api.x.ai"),
    ("/cohere", "https://api.cohere.ai"),
    ("/huggingface", "https://api-inference.huggingface.co"),
    ("/together", "https://api.together.xyz"),
    ("/novita", "https://api.novita.ai"),
    ("/portkey", "https://api.portkey.ai"),
    ("/fireworks", "https://api.fireworks.ai"),
    ("/openrouter", "https://openrouter.ai/api"),
];

const CLAUDE_PREFIX: &str = "/claude";
const GEMINI_NO_THINK_PREFIX: &str = "/gnothink";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const GATEWAY_USER_AGENT: &str = concat!("portico/", env!("CARGO_PKG_VERSION"));

const API_ALLOWED_HEADERS: &[&str] = &[
    "content-type",
    "authorization",
    "accept",
    "anthropic-version",
];

const PROXY_ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "content-type",
    "authorization",
    "user-agent",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "pragma",
    "x-requested-with",
];

const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, HEAD, PATCH";
const API_CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, anthropic-version, content-type, authorization, accept, anthropic-version";
const PROXY_CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With, accept, content-type, authorization, user-agent, accept-encoding, accept-language, cache-control, pragma, x-requested-with";

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;
const WEEK_MILLIS: i64 = 7 * DAY_MILLIS;
const MONTH_MILLIS: i64 = 30 * DAY_MILLIS;

/// One mapped endpoint: a path prefix and the upstream origin it relays to.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub prefix: String,
    pub upstream_origin: String,
}

/// Ordered prefix routing table. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new<I, P, O>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, O)>,
        P: Into<String>,
        O: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(prefix, upstream_origin)| RouteEntry {
                prefix: prefix.into(),
                upstream_origin: upstream_origin.into(),
            })
            .collect();
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(API_ROUTES.iter().copied())
    }

    /// First entry whose prefix starts the raw path, plus the remainder after
    /// the prefix (possibly empty). The path is taken as-is: no slash, case,
    /// or percent-encoding normalization.
    pub fn resolve<'a>(&'a self, path: &'a str) -> Option<(&'a RouteEntry, &'a str)> {
        self.entries.iter().find_map(|entry| {
            path.strip_prefix(entry.prefix.as_str())
                .map(|remainder| (entry, remainder))
        })
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.prefix.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid proxy URL. Must start with http:// or https:// after /proxy/")]
    MissingProxyTarget,
    #[error("invalid proxy target '{target}': {source}")]
    InvalidProxyTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("request body is not valid JSON: {0}")]
    BodyTransform(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Header policy
// ---------------------------------------------------------------------------

/// Inbound filter for api-relay mode: the fixed allow-list plus any `x-*`
/// header. Everything else is dropped silently.
pub fn filter_api_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for (name, value) in headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if API_ALLOWED_HEADERS.contains(&lower.as_str()) || lower.starts_with("x-") {
            forwarded.insert(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Inbound filter for generic-proxy mode: the browser-oriented allow-list
/// plus any `sec-*` or `x-*` header.
pub fn filter_proxy_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for (name, value) in headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if PROXY_ALLOWED_HEADERS.contains(&lower.as_str())
            || lower.starts_with("sec-")
            || lower.starts_with("x-")
        {
            forwarded.insert(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Per-target header fixups applied after filtering, before forwarding.
pub fn apply_api_adjustments(prefix: &str, headers: &mut HeaderMap) {
    if prefix == CLAUDE_PREFIX && !headers.contains_key("anthropic-version") {
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(DEFAULT_ANTHROPIC_VERSION),
        );
    }
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(GATEWAY_USER_AGENT));
    }
}

/// Whether this call hits the one code path that buffers and mutates the
/// request body instead of streaming it through.
pub fn wants_no_think(prefix: &str, method: &Method, headers: &HeaderMap) -> bool {
    prefix == GEMINI_NO_THINK_PREFIX
        && method == Method::POST
        && headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"))
}

/// Merges `generationConfig.thinkingConfig.thinkingBudget = 0` into a JSON
/// request body, preserving any other `generationConfig` keys. A body that is
/// not a JSON object is a hard error for the request.
pub fn inject_no_think(body: &[u8]) -> Result<Bytes, GatewayError> {
    use serde::de::Error as _;

    let mut root: Value = serde_json::from_slice(body)?;
    let Some(object) = root.as_object_mut() else {
        return Err(GatewayError::BodyTransform(serde_json::Error::custom(
            "request body is not a JSON object",
        )));
    };

    let config = object
        .entry("generationConfig")
        .or_insert_with(|| Value::Object(Map::new()));
    if !config.is_object() {
        *config = Value::Object(Map::new());
    }
    if let Some(config) = config.as_object_mut() {
        config.insert(
            "thinkingConfig".to_owned(),
            serde_json::json!({ "thinkingBudget": 0 }),
        );
    }

    Ok(Bytes::from(serde_json::to_vec(&root)?))
}

/// Outbound CORS + security set for api-relay responses.
pub fn apply_api_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(API_CORS_ALLOW_HEADERS),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
}

/// Outbound CORS + security set for generic-proxy responses. Echoes the
/// caller's Origin with credentials when present; upstream frame options are
/// removed so browsed pages keep working inside the proxy.
pub fn apply_proxy_cors(headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
    match origin {
        Some(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        None => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(PROXY_CORS_ALLOW_HEADERS),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.remove(X_FRAME_OPTIONS);
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("no-referrer-when-downgrade"),
    );
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Derived call counters for one endpoint. `total` is monotonic; the window
/// counters are recomputed views over the retained record log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointCounters {
    pub total: u64,
    pub today: u64,
    pub week: u64,
    pub month: u64,
}

/// One routed api-relay call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub endpoint: String,
    pub timestamp: i64,
}

/// Externally visible statistics structure, serialized for `/stats` and
/// consumed by the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub endpoints: BTreeMap<String, EndpointCounters>,
    pub requests: Vec<RequestRecord>,
}

#[derive(Debug, Default)]
struct StatsInner {
    total: u64,
    endpoints: BTreeMap<String, EndpointCounters>,
    requests: Vec<RequestRecord>,
}

impl StatsInner {
    fn recompute(&mut self, now: i64) {
        let day_cutoff = now - DAY_MILLIS;
        let week_cutoff = now - WEEK_MILLIS;
        let month_cutoff = now - MONTH_MILLIS;

        for counters in self.endpoints.values_mut() {
            counters.today = 0;
            counters.week = 0;
            counters.month = 0;
        }

        let StatsInner {
            endpoints, requests, ..
        } = self;
        for record in requests.iter() {
            let Some(counters) = endpoints.get_mut(&record.endpoint) else {
                continue;
            };
            if record.timestamp > day_cutoff {
                counters.today += 1;
            }
            if record.timestamp > week_cutoff {
                counters.week += 1;
            }
            if record.timestamp > month_cutoff {
                counters.month += 1;
            }
        }
    }
}

/// In-memory request counter with a 30-day retention window. Process-local
/// only: counters reset to zero on restart by design. Cloning the registry
/// shares the underlying state; a single mutex guards `record`/`snapshot`
/// against concurrent handlers.
#[derive(Debug, Clone, Default)]
pub struct StatsRegistry {
    inner: Arc<Mutex<StatsInner>>,
}

impl StatsRegistry {
    /// Seeds a zeroed counter row for every configured prefix so the snapshot
    /// lists all endpoints before any traffic arrives.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints = prefixes
            .into_iter()
            .map(|prefix| (prefix.into(), EndpointCounters::default()))
            .collect();
        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                total: 0,
                endpoints,
                requests: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        // Counter state stays usable even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, prefix: &str) {
        self.record_at(prefix, Utc::now().timestamp_millis());
    }

    /// Appends a record at an explicit timestamp, prunes records older than
    /// 30 days relative to it, and recomputes the window counters.
    pub fn record_at(&self, prefix: &str, timestamp: i64) {
        let mut inner = self.lock();
        inner.total += 1;
        inner.endpoints.entry(prefix.to_owned()).or_default().total += 1;
        inner.requests.push(RequestRecord {
            endpoint: prefix.to_owned(),
            timestamp,
        });

        let retention_cutoff = timestamp - MONTH_MILLIS;
        inner
            .requests
            .retain(|record| record.timestamp > retention_cutoff);
        inner.recompute(timestamp);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Utc::now().timestamp_millis())
    }

    /// Forces a recompute against `now` so readers never see stale window
    /// counters, then returns a copy of the state.
    pub fn snapshot_at(&self, now: i64) -> StatsSnapshot {
        let mut inner = self.lock();
        inner.recompute(now);
        StatsSnapshot {
            total: inner.total,
            endpoints: inner.endpoints.clone(),
            requests: inner.requests.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// API relay
// ---------------------------------------------------------------------------

/// Forwards mapped-prefix calls to their upstream origin. Stateless per call;
/// the stats registry is injected so the relay stays independently testable.
#[derive(Debug, Clone)]
pub struct ApiRelay {
    client: Client,
    routes: Arc<RouteTable>,
    stats: StatsRegistry,
}

impl ApiRelay {
    pub fn new(routes: Arc<RouteTable>, stats: StatsRegistry) -> Self {
        Self {
            client: Client::new(),
            routes,
            stats,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    /// Sends the upstream request. Header filtering and per-target fixups
    /// happen here; route resolution, stats recording, and the OPTIONS
    /// short-circuit are the caller's responsibility since those decide the
    /// response before any forwarding occurs.
    pub async fn forward(
        &self,
        entry: &RouteEntry,
        remainder: &str,
        query: Option<&str>,
        method: Method,
        headers: &HeaderMap,
        body: Option<reqwest::Body>,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = compose_upstream_url(&entry.upstream_origin, remainder, query);

        let mut forwarded = filter_api_headers(headers);
        apply_api_adjustments(&entry.prefix, &mut forwarded);

        let mut builder = self.client.request(method, url).headers(forwarded);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        Ok(builder.send().await?)
    }
}

pub fn compose_upstream_url(origin: &str, remainder: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{origin}{remainder}?{query}"),
        _ => format!("{origin}{remainder}"),
    }
}

// ---------------------------------------------------------------------------
// Generic web proxy
// ---------------------------------------------------------------------------

/// Fetches arbitrary URLs on behalf of the caller. Redirects are never
/// followed so Location headers can be rewritten back through the gateway.
#[derive(Debug, Clone)]
pub struct WebProxy {
    client: Client,
}

impl WebProxy {
    pub fn new() -> Result<Self, GatewayError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Validates the raw path tail after `/proxy/` as an absolute http(s)
    /// URL. Anything else is a 400 for the caller.
    pub fn parse_target(raw: &str) -> Result<Url, GatewayError> {
        if !raw.starts_with("http") {
            return Err(GatewayError::MissingProxyTarget);
        }
        Url::parse(raw).map_err(|source| GatewayError::InvalidProxyTarget {
            target: raw.to_owned(),
            source,
        })
    }

    pub async fn fetch(
        &self,
        context: &RewriteContext,
        method: Method,
        headers: &HeaderMap,
        body: Option<reqwest::Body>,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut forwarded = filter_proxy_headers(headers);

        // Best effort: make the Referer look like it came from the target
        // site rather than from the gateway.
        if let Some(referer) = headers.get(REFERER).and_then(|value| value.to_str().ok()) {
            let rewritten = referer.replace(&context.proxy_origin, &context.target_origin);
            if let Ok(value) = HeaderValue::from_str(&rewritten) {
                forwarded.insert(REFERER, value);
            }
        }

        let mut builder = self
            .client
            .request(method, context.target_url.clone())
            .headers(forwarded);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        Ok(builder.send().await?)
    }
}

/// Everything the rewriter needs for one proxied request/response cycle.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub proxy_origin: String,
    pub target_origin: String,
    pub target_url: Url,
}

impl RewriteContext {
    pub fn new(proxy_origin: impl Into<String>, target_url: Url) -> Self {
        let target_origin = origin_of(&target_url);
        Self {
            proxy_origin: proxy_origin.into(),
            target_origin,
            target_url,
        }
    }

    fn proxy_base(&self) -> String {
        format!("{}{}", self.proxy_origin, PROXY_PREFIX)
    }

    /// Wraps a redirect Location so the follow-up request traverses the
    /// gateway again. A root-relative Location is completed against the
    /// target origin first.
    pub fn rewrite_location(&self, location: &str) -> String {
        let absolute = if location.starts_with('/') {
            format!("{}{}", self.target_origin, location)
        } else {
            location.to_owned()
        };
        format!("{}{}", self.proxy_base(), absolute)
    }

    /// Textual HTML rewrite: the fixed sequence of pattern substitutions is
    /// the compatibility contract, not a DOM-correct transformation.
    pub fn rewrite_html(&self, body: &str) -> String {
        let proxy_base = self.proxy_base();

        // (a) root-relative href/src/action (single leading slash only;
        // protocol-relative "//" references pass through untouched).
        let text = root_attr_re().replace_all(body, |caps: &Captures<'_>| {
            if &caps[2] == "//" {
                return caps[0].to_owned();
            }
            format!("{}=\"{}{}/", &caps[1], proxy_base, self.target_origin)
        });

        // (b) absolute href/src/action, skipping URLs step (a) already
        // routed through the gateway.
        let text = abs_attr_re().replace_all(&text, |caps: &Captures<'_>| {
            if caps[2].starts_with(&proxy_base) {
                return caps[0].to_owned();
            }
            format!("{}=\"{}{}", &caps[1], proxy_base, &caps[2])
        });

        // (c) srcset lists, keeping each entry's descriptor.
        let text = srcset_re().replace_all(&text, |caps: &Captures<'_>| {
            let rewritten = caps[1]
                .split(',')
                .map(|entry| {
                    let mut parts = entry.trim().split_whitespace();
                    let mut url = parts.next().unwrap_or_default().to_owned();
                    if url.starts_with('/') {
                        url = format!("{}{}", self.target_origin, url);
                    }
                    match parts.next() {
                        Some(descriptor) => format!("{}{} {}", proxy_base, url, descriptor),
                        None => format!("{}{}", proxy_base, url),
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("srcset=\"{rewritten}\"")
        });

        // (d) rewritten subresources can no longer satisfy integrity hashes.
        let text = integrity_re().replace_all(&text, "");

        // (e) base href, analogous to (a).
        let text = base_href_re().replace_all(&text, |caps: &Captures<'_>| {
            let value = &caps[1];
            if value.starts_with(&proxy_base) {
                return caps[0].to_owned();
            }
            let absolute = if value.starts_with('/') {
                format!("{}{}", self.target_origin, value)
            } else {
                value.to_string()
            };
            format!("<base href=\"{}{}\">", proxy_base, absolute)
        });

        text.into_owned()
    }

    /// Rewrites CSS `url(...)` references. `data:` URIs and fragment-only
    /// references are left alone; root-relative references resolve against
    /// the target origin and other relative ones against the target URL.
    pub fn rewrite_css(&self, body: &str) -> String {
        let proxy_base = self.proxy_base();
        css_url_re()
            .replace_all(body, |caps: &Captures<'_>| {
                let reference: String = caps[1]
                    .trim()
                    .chars()
                    .filter(|c| *c != '"' && *c != '\'')
                    .collect();
                if reference.starts_with("data:") || reference.starts_with('#') {
                    return caps[0].to_owned();
                }
                let absolute = if reference.starts_with('/') {
                    format!("{}{}", self.target_origin, reference)
                } else if !reference.starts_with("http") {
                    match self.target_url.join(&reference) {
                        Ok(joined) => joined.to_string(),
                        // An unjoinable reference stays as the site wrote it.
                        Err(_) => return caps[0].to_owned(),
                    }
                } else {
                    reference
                };
                format!("url({}{})", proxy_base, absolute)
            })
            .into_owned()
    }
}

fn root_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)(href|src|action)=["'](//?)"#).expect("valid pattern"))
}

fn abs_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(href|src|action)=["'](https?://[^"']+)"#).expect("valid pattern")
    })
}

fn srcset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)srcset=["']([^"']+)["']"#).expect("valid pattern"))
}

fn integrity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\s+integrity=["'][^"']+["']"#).expect("valid pattern"))
}

fn base_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<base\s+href=["']([^"']+)["'][^>]*>"#).expect("valid pattern")
    })
}

fn css_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)url\(([^)]+)\)").expect("valid pattern"))
}

/// Scheme + host (+ explicit non-default port) of a URL, no trailing slash.
pub fn origin_of(url: &Url) -> String {
    let mut origin = match url.host_str() {
        Some(host) => format!("{}://{}", url.scheme(), host),
        None => url.as_str().to_owned(),
    };

    // Scheme-default ports are normalized away at parse time, so any port
    // still present is non-default and belongs in the origin.
    if let Some(port) = url.port() {
        origin.push(':');
        origin.push_str(&port.to_string());
    }

    origin
}

fn compose_path(path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_owned(),
    }
}

pub fn log_relayed(
    mode: &str,
    method: &Method,
    path: &str,
    query: Option<&str>,
    status: StatusCode,
) {
    let full_path = compose_path(path, query);
    println!("[{mode}] {method} {full_path} -> {status}");
}

pub fn log_relay_error(
    mode: &str,
    method: &Method,
    path: &str,
    query: Option<&str>,
    err: &GatewayError,
) {
    let full_path = compose_path(path, query);
    eprintln!("[{mode}] {method} {full_path} !! {err}");
}
