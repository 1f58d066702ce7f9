//! Rotating request identities.
//!
//! An [`IdentityProvider`] owns a fixed pool of [`Identity`] values and hands
//! them out round-robin. Clones share the rotation cursor, so one provider
//! can be injected into several fetchers running on different tasks.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::Identity;

/// Used when no other identity is available.
pub const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_USER_AGENTS: &[&str] = &[
    FALLBACK_USER_AGENT,
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/119.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 OPR/106.0.0.0",
];

/// Headers a desktop browser sends with a top-level navigation.
pub fn browser_headers() -> BTreeMap<String, String> {
    [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Cache-Control", "max-age=0"),
        ("DNT", "1"),
        ("Referer", "https://www.google.com/"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Round-robin pool of request identities.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    pool: Arc<[Identity]>,
    cursor: Arc<AtomicUsize>,
}

impl IdentityProvider {
    /// Build a provider from explicit identities.
    ///
    /// Identities with a blank user-agent are dropped; if nothing remains the
    /// provider falls back to a single default identity.
    pub fn new(pool: Vec<Identity>) -> Self {
        let mut pool: Vec<Identity> = pool
            .into_iter()
            .filter(|id| !id.user_agent().trim().is_empty())
            .collect();

        if pool.is_empty() {
            tracing::warn!("Identity pool is empty, using the fallback identity");
            pool.push(Self::fallback_identity());
        }

        Self {
            pool: pool.into(),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build a provider from user-agent strings, each paired with the
    /// standard browser header set.
    pub fn from_user_agents<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers = browser_headers();
        Self::new(
            agents
                .into_iter()
                .map(|ua| Identity::new(ua, headers.clone()))
                .collect(),
        )
    }

    /// Load user-agents from a file, one per line.
    ///
    /// Blank lines and lines starting with `#` are skipped. An unreadable
    /// file never fails the caller: the fallback identity is used instead.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_user_agents(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string),
            ),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "Failed to read user-agent file ({e}), using the fallback identity"
                );
                Self::new(Vec::new())
            }
        }
    }

    /// The single identity used when the pool cannot be populated.
    pub fn fallback_identity() -> Identity {
        Identity::new(FALLBACK_USER_AGENT, browser_headers())
    }

    /// Next identity in rotation. Never has an empty user-agent.
    pub fn next(&self) -> Identity {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[index].clone()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

impl Default for IdentityProvider {
    /// Five common desktop browsers.
    fn default() -> Self {
        Self::from_user_agents(DEFAULT_USER_AGENTS.iter().copied())
    }
}
