use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::get;
use tokio::net::TcpListener;

pub const SEARCH_RESULTS: &str = include_str!("../fixtures/search_results.html");
pub const PARTIAL_RESULTS: &str = include_str!("../fixtures/search_results_partial.html");

/// Requests answered with 503 before `/flaky` starts succeeding.
pub const FLAKY_FAILURES: usize = 2;

/// A local HTTP server with canned pages for each fetch outcome.
pub struct TestServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Requests seen by `/flaky` so far.
    pub fn flaky_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Bind to an ephemeral port on 127.0.0.1 and serve in the background.
pub async fn spawn_server() -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route("/search", get(search))
        .route("/search-partial", get(search_partial))
        .route("/flaky", get(flaky))
        .route("/blocked", get(blocked))
        .route("/captcha", get(captcha))
        .route("/missing", get(missing))
        .route("/slow", get(slow))
        .route("/echo", get(echo))
        .route("/moved", get(moved))
        .route("/shell", get(shell))
        .route("/api/items", get(items))
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    TestServer {
        base_url: format!("http://{addr}"),
        hits,
    }
}

/// A URL on a port nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

async fn search() -> Html<&'static str> {
    Html(SEARCH_RESULTS)
}

async fn search_partial() -> Html<&'static str> {
    Html(PARTIAL_RESULTS)
}

async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    let seen = hits.fetch_add(1, Ordering::SeqCst);
    if seen < FLAKY_FAILURES {
        (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response()
    } else {
        Html("<html><body><p>recovered</p></body></html>").into_response()
    }
}

async fn blocked() -> impl IntoResponse {
    (StatusCode::TOO_MANY_REQUESTS, "slow down")
}

async fn captcha() -> Html<&'static str> {
    Html("<html><body><h1>Please complete the CAPTCHA to continue</h1></body></html>")
}

async fn missing() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "no such page")
}

async fn slow() -> Html<&'static str> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Html("<html><body>finally</body></html>")
}

/// Echoes the user-agent and the `Accept-Language` header.
async fn echo(headers: HeaderMap) -> String {
    let get = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    format!(
        "{}|{}",
        get(header::USER_AGENT),
        get(header::ACCEPT_LANGUAGE)
    )
}

async fn moved() -> Redirect {
    Redirect::temporary("/search")
}

/// A client-rendered page: nothing useful until JavaScript runs.
async fn shell() -> Html<&'static str> {
    Html(r#"<html><body><div id="app"></div><script src="/app.js"></script></body></html>"#)
}

async fn items() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"data": {"items": [
            {"name": "Widget", "price": 9.5, "stock": {"count": 3}},
            {"name": "Gadget", "price": 12, "stock": null}
        ]}}"#,
    )
}
