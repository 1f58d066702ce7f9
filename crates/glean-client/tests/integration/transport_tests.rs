use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use glean_client::ReqwestTransport;
use glean_core::backoff::BackoffConfig;
use glean_core::error::{FetchFailureKind, TransportError};
use glean_core::fetcher::RetryingFetcher;
use glean_core::identity::IdentityProvider;
use glean_core::models::{FetchRequest, Identity};
use glean_core::traits::{Fetcher, Transport};

use crate::integration::common::{FLAKY_FAILURES, closed_port_url, spawn_server};

fn local_transport() -> ReqwestTransport {
    ReqwestTransport::new().unwrap().allow_private_urls()
}

fn fetcher() -> RetryingFetcher<ReqwestTransport> {
    RetryingFetcher::new(local_transport(), IdentityProvider::default())
        .with_backoff(BackoffConfig::none())
}

fn request(url: String, max_retries: u32) -> FetchRequest {
    FetchRequest::get(url, Duration::from_secs(5), max_retries)
}

#[tokio::test]
async fn fetches_a_static_page() {
    let server = spawn_server().await;

    let page = fetcher()
        .fetch(request(server.url("/search"), 3))
        .await
        .into_result()
        .unwrap();

    assert_eq!(page.status_code, 200);
    assert_eq!(page.attempts, 1);
    assert!(page.body.contains("Web scraping - Wikipedia"));
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = spawn_server().await;

    let page = fetcher()
        .fetch(request(server.url("/flaky"), 3))
        .await
        .into_result()
        .unwrap();

    assert_eq!(page.attempts as usize, FLAKY_FAILURES + 1);
    assert_eq!(server.flaky_hits(), FLAKY_FAILURES + 1);
    assert!(page.body.contains("recovered"));
}

#[tokio::test]
async fn retries_stop_at_the_limit() {
    let server = spawn_server().await;

    let failure = fetcher()
        .fetch(request(server.url("/flaky"), 1))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FetchFailureKind::HttpError { status_code: 503 });
    assert_eq!(failure.attempts, 2);
}

#[tokio::test]
async fn rate_limit_is_classified_as_blocked() {
    let server = spawn_server().await;

    let failure = fetcher()
        .fetch(request(server.url("/blocked"), 2))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(
        failure.kind,
        FetchFailureKind::Blocked {
            status_code: Some(429)
        }
    );
    assert_eq!(failure.attempts, 3);
}

#[tokio::test]
async fn captcha_page_is_classified_as_blocked() {
    let server = spawn_server().await;

    let failure = fetcher()
        .fetch(request(server.url("/captcha"), 0))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FetchFailureKind::Blocked { status_code: None });
}

#[tokio::test]
async fn not_found_fails_fast() {
    let server = spawn_server().await;

    let failure = fetcher()
        .fetch(request(server.url("/missing"), 3))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FetchFailureKind::HttpError { status_code: 404 });
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = spawn_server().await;
    let req = FetchRequest::get(server.url("/slow"), Duration::from_millis(200), 1);

    let start = Instant::now();
    let failure = fetcher().fetch(req).await.into_result().unwrap_err();

    assert_eq!(failure.kind, FetchFailureKind::Timeout);
    assert_eq!(failure.attempts, 2);
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn refused_connections_are_connection_errors() {
    let url = closed_port_url().await;

    let failure = fetcher()
        .fetch(request(url, 1))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FetchFailureKind::ConnectionError);
    assert_eq!(failure.attempts, 2);
}

#[tokio::test]
async fn redirects_report_the_final_url() {
    let server = spawn_server().await;

    let page = fetcher()
        .fetch(request(server.url("/moved"), 0))
        .await
        .into_result()
        .unwrap();

    assert_eq!(page.final_url, server.url("/search"));
}

#[tokio::test]
async fn identity_headers_are_sent() {
    let server = spawn_server().await;
    let identity = Identity::new(
        "glean-test/1.0",
        BTreeMap::from([("Accept-Language".to_string(), "de-CH".to_string())]),
    );

    let response = local_transport()
        .send(&request(server.url("/echo"), 0), &identity)
        .await
        .unwrap();

    assert_eq!(response.body, "glean-test/1.0|de-CH");
}

#[tokio::test]
async fn rotation_presents_each_pool_agent() {
    let server = spawn_server().await;
    let fetcher = RetryingFetcher::new(
        local_transport(),
        IdentityProvider::from_user_agents(["agent-a", "agent-b"]),
    );

    let mut agents = Vec::new();
    for _ in 0..4 {
        let page = fetcher
            .fetch(request(server.url("/echo"), 0))
            .await
            .into_result()
            .unwrap();
        agents.push(page.body.split('|').next().unwrap_or_default().to_string());
    }

    assert_eq!(agents, vec!["agent-a", "agent-b", "agent-a", "agent-b"]);
}

#[tokio::test]
async fn ssrf_guard_rejects_loopback_by_default() {
    let server = spawn_server().await;
    let fetcher = RetryingFetcher::new(ReqwestTransport::new().unwrap(), IdentityProvider::default())
        .with_backoff(BackoffConfig::none());

    let failure = fetcher
        .fetch(request(server.url("/search"), 3))
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FetchFailureKind::InvalidUrl);
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn non_http_schemes_are_invalid() {
    let identity = IdentityProvider::default().next();
    let err = local_transport()
        .send(&request("ftp://example.com/file".to_string(), 0), &identity)
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::InvalidUrl(_)));
}
