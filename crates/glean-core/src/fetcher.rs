//! Retrying fetcher with identity rotation and backoff.
//!
//! Wraps any [`Transport`] and turns its single attempts into one classified
//! [`FetchResult`]. Each attempt gets a fresh identity and its own timeout;
//! retryable failures are retried after an exponential backoff until
//! `max_retries + 1` attempts have been spent.

use crate::backoff::BackoffConfig;
use crate::error::{FetchFailure, FetchFailureKind, TransportError};
use crate::identity::IdentityProvider;
use crate::models::{FetchRequest, FetchResult, FetchedPage, RawResponse};
use crate::traits::{Fetcher, Transport};

/// Lower-cased fragments that mark an anti-bot interstitial.
const BLOCK_MARKERS: &[&str] = &[
    "captcha",
    "access denied",
    "attention required! | cloudflare",
    "checking your browser before accessing",
];

/// Classify a transport response. `None` means the page is usable.
pub fn classify_response(response: &RawResponse) -> Option<FetchFailureKind> {
    match response.status_code {
        200..=299 => {
            if looks_blocked(&response.body) {
                Some(FetchFailureKind::Blocked { status_code: None })
            } else {
                None
            }
        }
        403 | 429 => Some(FetchFailureKind::Blocked {
            status_code: Some(response.status_code),
        }),
        status_code => Some(FetchFailureKind::HttpError { status_code }),
    }
}

/// True if the body contains a CAPTCHA or access-denied marker.
pub fn looks_blocked(body: &str) -> bool {
    let lower = body.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// A [`Fetcher`] that retries a [`Transport`] with rotating identities.
#[derive(Clone)]
pub struct RetryingFetcher<T> {
    transport: T,
    identities: IdentityProvider,
    backoff: BackoffConfig,
}

impl<T: Transport> RetryingFetcher<T> {
    pub fn new(transport: T, identities: IdentityProvider) -> Self {
        Self {
            transport,
            identities,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl<T: Transport> Fetcher for RetryingFetcher<T> {
    async fn fetch(&self, request: FetchRequest) -> FetchResult {
        let max_attempts = request.max_retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let identity = self.identities.next();
            tracing::info!(
                url = %request.url,
                attempt,
                max_attempts,
                "Fetching"
            );

            // The timeout drops the in-flight request, not just the wait.
            let outcome =
                match tokio::time::timeout(request.timeout, self.transport.send(&request, &identity))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(request.timeout)),
                };

            let (kind, message) = match outcome {
                Ok(response) => match classify_response(&response) {
                    None => {
                        tracing::debug!(
                            url = %response.final_url,
                            status = response.status_code,
                            bytes = response.body.len(),
                            attempts = attempt,
                            "Fetched"
                        );
                        return FetchResult::Success(FetchedPage {
                            status_code: response.status_code,
                            body: response.body,
                            final_url: response.final_url,
                            attempts: attempt,
                        });
                    }
                    Some(kind @ FetchFailureKind::Blocked { status_code: None }) => (
                        kind,
                        format!("anti-bot page served by {}", response.final_url),
                    ),
                    Some(kind) => (
                        kind,
                        format!("HTTP {} for {}", response.status_code, response.final_url),
                    ),
                },
                Err(e) => (FetchFailureKind::from(&e), e.to_string()),
            };

            if !kind.is_retryable() || attempt >= max_attempts {
                tracing::warn!(
                    url = %request.url,
                    attempts = attempt,
                    %kind,
                    "Fetch failed: {message}"
                );
                return FetchResult::Failure(FetchFailure {
                    kind,
                    message,
                    attempts: attempt,
                });
            }

            let delay = self.backoff.delay_for_retry(attempt);
            tracing::warn!(
                url = %request.url,
                attempt,
                %kind,
                delay_ms = %delay.as_millis(),
                "Attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
