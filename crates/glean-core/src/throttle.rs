//! Per-domain rate limiting.
//!
//! [`ThrottledTransport`] wraps any [`Transport`] and keeps at least
//! `rate_limit_delay` between two requests to the same scheme + host + port.
//! Since the retrying fetcher sends every attempt through its transport,
//! retries of one fetch and requests from concurrent fetches are spaced alike.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use glean_core::throttle::{ThrottleConfig, ThrottledTransport};
//! # use glean_core::traits::Transport;
//! # use glean_core::models::{FetchRequest, Identity, RawResponse};
//! # use glean_core::error::TransportError;
//! # #[derive(Clone)] struct MyTransport;
//! # impl Transport for MyTransport {
//! #     async fn send(&self, _: &FetchRequest, _: &Identity) -> Result<RawResponse, TransportError> { todo!() }
//! # }
//! let config = ThrottleConfig::new(Duration::from_secs(1))
//!     .with_jitter(Duration::from_millis(250));
//! let transport = ThrottledTransport::new(MyTransport, config);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::error::TransportError;
use crate::models::{FetchRequest, Identity, RawResponse};
use crate::traits::Transport;

/// Spacing between requests to one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub delay: Duration,
    /// Random extra wait, uniform in `[0, jitter)`.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            self.delay
        } else {
            self.delay + Duration::from_millis(jitter_ms(self.jitter.as_millis() as u64))
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// A [`Transport`] that spaces requests per domain.
#[derive(Clone)]
pub struct ThrottledTransport<T> {
    inner: T,
    config: ThrottleConfig,
    /// Earliest instant the next request to each domain may start.
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<T: Transport> ThrottledTransport<T> {
    pub fn new(inner: T, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `scheme://host:port`, or `None` for URLs without a host.
    fn domain_key(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let port = parsed
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{host}{port}", parsed.scheme()))
    }

    /// Reserve the next slot for `domain` and sleep until it arrives.
    ///
    /// Concurrent callers queue up one delay apart.
    async fn wait_turn(&self, domain: &str) {
        let now = Instant::now();
        let start = {
            let mut slots = self.next_slot.lock().await;
            let start = slots.get(domain).copied().map_or(now, |slot| slot.max(now));
            slots.insert(domain.to_string(), start + self.config.next_delay());
            start
        };

        if start > now {
            let wait = start - now;
            tracing::debug!(%domain, wait_ms = %wait.as_millis(), "Throttling request");
            tokio::time::sleep(wait).await;
        }
    }
}

impl<T: Transport> Transport for ThrottledTransport<T> {
    async fn send(
        &self,
        request: &FetchRequest,
        identity: &Identity,
    ) -> Result<RawResponse, TransportError> {
        if let Some(domain) = Self::domain_key(&request.url) {
            self.wait_turn(&domain).await;
        }
        self.inner.send(request, identity).await
    }
}

/// xorshift64 seeded from the clock; jitter does not need a real RNG.
fn jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
        | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
