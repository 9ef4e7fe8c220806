//! Stand-in origin server for exercising the gateway by hand.
//!
//! Run it next to the gateway, then point a route or the generic proxy at it:
//!
//! ```text
//! MOCK_UPSTREAM_ADDR=127.0.0.1:58090 cargo run --bin mock-upstream
//! curl http://127.0.0.1:8000/proxy/http://127.0.0.1:58090/page.html
//! ```

use std::{collections::HashMap, net::SocketAddr};

use axum::{
    Json, Router,
    extract::{OriginalUri, Query},
    http::{HeaderMap, Method, StatusCode, header},
    response::{Html, IntoResponse, Redirect},
    routing::{any, get},
};
use serde::Serialize;

#[derive(Serialize)]
struct Echo {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
}

async fn echo(
    method: Method,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // Accept optional `status` query; default to 200
    let status = query
        .get("status")
        .and_then(|v| v.parse::<u16>().ok())
        .and_then(|v| StatusCode::from_u16(v).ok())
        .unwrap_or(StatusCode::OK);

    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_owned()))
        })
        .collect();

    (
        status,
        Json(Echo {
            method: method.to_string(),
            path: uri.path().to_owned(),
            query,
            headers,
        }),
    )
}

// A page with every reference shape the proxy rewrites.
async fn page() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <base href="/ignored/">
    <link rel="stylesheet" href="/style.css">
    <script src="https://cdn.example/lib.js" integrity="sha384-deadbeef" crossorigin="anonymous"></script>
</head>
<body>
    <a href="/about">about</a>
    <a href="//other.example/protocol-relative">elsewhere</a>
    <a href="https://example.com/absolute">absolute</a>
    <img src="/logo.png" srcset="/logo.png 1x, https://cdn.example/logo@2x.png 2x">
    <form action="/submit" method="post"><button>go</button></form>
</body>
</html>"#,
    )
}

async fn stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        r#"body { background: url(/bg.png); }
.icon { background: url('img/dot.gif'); }
.inline { background: url(data:image/gif;base64,R0lGOD); }
"#,
    )
}

async fn redirect() -> Redirect {
    Redirect::to("/login")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route("/page.html", get(page))
        .route("/style.css", get(stylesheet))
        .route("/redirect", get(redirect))
        .route("/", any(echo))
        .fallback(echo);

    let bind_addr =
        std::env::var("MOCK_UPSTREAM_ADDR").unwrap_or_else(|_| "127.0.0.1:58090".to_string());
    let addr: SocketAddr = bind_addr.parse()?;
    println!("Mock upstream on http://{addr}");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
