use std::path::Path;

use crate::scrape::RunState;

/// Events emitted by [`crate::scrape::ScrapeService`] while a run progresses.
#[derive(Debug, Clone)]
pub enum ScrapeEvent<'a> {
    StateChanged {
        url: &'a str,
        from: &'a RunState,
        to: &'a RunState,
    },
    Fetched {
        url: &'a str,
        status_code: u16,
        attempts: u32,
        bytes: usize,
    },
    ContentInsufficient {
        url: &'a str,
        reason: &'a str,
    },
    /// Rendering was unavailable and the static page is used instead.
    StaticFallback {
        url: &'a str,
        reason: &'a str,
    },
    /// The content about to be extracted was saved for inspection.
    PageDumped {
        path: &'a Path,
        bytes: usize,
    },
    PageDumpFailed {
        path: &'a Path,
        error: &'a str,
    },
    Extracted {
        url: &'a str,
        records: usize,
    },
    Exported {
        path: &'a Path,
        rows: usize,
    },
}

/// Receives scrape events (decoupled logging).
pub trait ScrapeReporter: Send + Sync {
    fn report(&self, event: ScrapeEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ScrapeReporter for TracingReporter {
    fn report(&self, event: ScrapeEvent<'_>) {
        match event {
            ScrapeEvent::StateChanged { url, from, to } => match to {
                RunState::Failed { stage, error } => {
                    tracing::error!(%url, %stage, "Scrape failed: {error}");
                }
                _ => {
                    tracing::debug!(%url, from = %from, to = %to, "State changed");
                }
            },
            ScrapeEvent::Fetched {
                url,
                status_code,
                attempts,
                bytes,
            } => {
                tracing::info!(%url, status_code, attempts, bytes, "Fetched static content");
            }
            ScrapeEvent::ContentInsufficient { url, reason } => {
                tracing::info!(%url, %reason, "Static content insufficient, rendering");
            }
            ScrapeEvent::StaticFallback { url, reason } => {
                tracing::warn!(%url, %reason, "Rendering unavailable, using static content");
            }
            ScrapeEvent::PageDumped { path, bytes } => {
                tracing::info!(path = %path.display(), bytes, "Saved page content");
            }
            ScrapeEvent::PageDumpFailed { path, error } => {
                tracing::warn!(path = %path.display(), %error, "Failed to save page content");
            }
            ScrapeEvent::Extracted { url, records } => {
                tracing::info!(%url, records, "Extracted records");
            }
            ScrapeEvent::Exported { path, rows } => {
                tracing::info!(path = %path.display(), rows, "Export committed");
            }
        }
    }
}
