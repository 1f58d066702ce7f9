//! The scrape pipeline: fetch → (render)? → extract → export.
//!
//! # Run states
//!
//! ```text
//! Idle → Fetching ─────────────────────→ Extracting → Exporting → Done
//!            └──→ RenderingDynamic ──┘        └──────────────────→ Done (no destination)
//!
//! Any non-terminal state ──→ Failed { stage, error }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{DynamicMode, ScraperConfig};
use crate::error::{RenderFailure, ScrapeError, Stage};
use crate::models::{
    ContentFormat, ExportBatch, ExportOutcome, FetchRequest, Records, Selectors,
};
use crate::report::{ScrapeEvent, ScrapeReporter, TracingReporter};
use crate::traits::{Exporter, Extractor, Fetcher, Renderer};

/// State of one scrape run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    RenderingDynamic,
    Extracting,
    Exporting,
    Done,
    Failed { stage: Stage, error: ScrapeError },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Done | Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (Idle, Fetching)
            | (Fetching, RenderingDynamic | Extracting)
            | (RenderingDynamic, Extracting)
            | (Extracting, Exporting | Done)
            | (Exporting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Fetching => write!(f, "fetching"),
            RunState::RenderingDynamic => write!(f, "rendering"),
            RunState::Extracting => write!(f, "extracting"),
            RunState::Exporting => write!(f, "exporting"),
            RunState::Done => write!(f, "done"),
            RunState::Failed { stage, .. } => write!(f, "failed while {stage}"),
        }
    }
}

/// Input of one run.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub url: String,
    pub selectors: Selectors,
    /// Where to write the CSV. `None` skips export and returns raw records.
    pub destination: Option<PathBuf>,
    /// Save the content handed to the extractor here, for selector debugging.
    pub dump_page: Option<PathBuf>,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>, selectors: Selectors) -> Self {
        Self {
            url: url.into(),
            selectors,
            destination: None,
            dump_page: None,
        }
    }

    pub fn export_to(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn dump_page_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_page = Some(path.into());
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    /// URL after redirects.
    pub final_url: String,
    pub records: Records,
    pub export: Option<ExportOutcome>,
    /// True if the records came from rendered markup.
    pub rendered: bool,
    pub fetch_attempts: u32,
    /// States visited, starting with `Idle` and ending with `Done`.
    pub states: Vec<RunState>,
}

/// Tracks and reports state transitions of one run.
struct Run<'a> {
    url: &'a str,
    states: Vec<RunState>,
    reporter: &'a dyn ScrapeReporter,
}

impl<'a> Run<'a> {
    fn new(url: &'a str, reporter: &'a dyn ScrapeReporter) -> Self {
        Self {
            url,
            states: vec![RunState::Idle],
            reporter,
        }
    }

    fn current(&self) -> &RunState {
        // `states` starts non-empty and only grows.
        &self.states[self.states.len() - 1]
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.current().can_advance_to(&next),
            "illegal transition {} -> {next}",
            self.current()
        );
        self.reporter.report(ScrapeEvent::StateChanged {
            url: self.url,
            from: self.current(),
            to: &next,
        });
        self.states.push(next);
    }

    fn fail(&mut self, error: ScrapeError) -> ScrapeError {
        self.advance(RunState::Failed {
            stage: error.stage(),
            error: error.clone(),
        });
        error
    }
}

/// Orchestrates the full pipeline for one URL + selectors.
///
/// Generic over all collaborators via traits, so every stage can be
/// replaced by a mock in tests. Stages are never retried across: the
/// fetcher absorbs transient faults, any other failure ends the run.
pub struct ScrapeService<F, R, E, X>
where
    F: Fetcher,
    R: Renderer,
    E: Extractor,
    X: Exporter,
{
    fetcher: F,
    renderer: R,
    extractor: E,
    exporter: X,
    config: ScraperConfig,
    reporter: Arc<dyn ScrapeReporter>,
}

impl<F, R, E, X> ScrapeService<F, R, E, X>
where
    F: Fetcher,
    R: Renderer,
    E: Extractor,
    X: Exporter,
{
    pub fn new(fetcher: F, renderer: R, extractor: E, exporter: X, config: ScraperConfig) -> Self {
        Self {
            fetcher,
            renderer,
            extractor,
            exporter,
            config,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ScrapeReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Run the pipeline.
    ///
    /// 1. Fetch the static page (with retries)
    /// 2. Render it in a headless browser if required
    /// 3. Extract records with the selectors
    /// 4. Export them to the destination, if one was given
    pub async fn run(&self, request: &ScrapeRequest) -> Result<ScrapeOutcome, ScrapeError> {
        let mut run = Run::new(&request.url, self.reporter.as_ref());

        // 1. Fetch
        run.advance(RunState::Fetching);
        let fetch = FetchRequest::get(&request.url, self.config.timeout, self.config.max_retries);
        let page = match self.fetcher.fetch(fetch).await.into_result() {
            Ok(page) => page,
            Err(failure) => return Err(run.fail(failure.into())),
        };
        self.reporter.report(ScrapeEvent::Fetched {
            url: &page.final_url,
            status_code: page.status_code,
            attempts: page.attempts,
            bytes: page.body.len(),
        });

        // 2. Render
        let (content, rendered) = match self.render_reason(&page.body, &request.selectors) {
            None => (page.body, false),
            Some(reason) => {
                self.reporter.report(ScrapeEvent::ContentInsufficient {
                    url: &page.final_url,
                    reason: &reason,
                });
                run.advance(RunState::RenderingDynamic);
                match self.render(&page.final_url).await {
                    Ok(html) => (html, true),
                    Err(RenderFailure::CapabilityUnavailable(why)) if self.config.static_fallback => {
                        self.reporter.report(ScrapeEvent::StaticFallback {
                            url: &page.final_url,
                            reason: &why,
                        });
                        (page.body, false)
                    }
                    Err(failure) => return Err(run.fail(failure.into())),
                }
            }
        };

        // A failed dump is reported but never fails the run.
        if let Some(path) = &request.dump_page {
            match tokio::fs::write(path, &content).await {
                Ok(()) => self.reporter.report(ScrapeEvent::PageDumped {
                    path,
                    bytes: content.len(),
                }),
                Err(e) => self.reporter.report(ScrapeEvent::PageDumpFailed {
                    path,
                    error: &e.to_string(),
                }),
            }
        }

        // 3. Extract
        run.advance(RunState::Extracting);
        let records = match self.extractor.extract(&content, &request.selectors) {
            Ok(records) => records,
            Err(failure) => return Err(run.fail(failure.into())),
        };
        self.reporter.report(ScrapeEvent::Extracted {
            url: &page.final_url,
            records: records.len(),
        });

        // 4. Export
        let export = match &request.destination {
            Some(destination) => {
                run.advance(RunState::Exporting);
                let columns = request.selectors.field_names();
                let batch = ExportBatch::new(records.as_slice()).with_columns(&columns);
                match self.exporter.export(batch, destination) {
                    Ok(outcome) => {
                        self.reporter.report(ScrapeEvent::Exported {
                            path: &outcome.path,
                            rows: outcome.rows_written,
                        });
                        Some(outcome)
                    }
                    Err(failure) => return Err(run.fail(failure.into())),
                }
            }
            None => None,
        };

        run.advance(RunState::Done);

        Ok(ScrapeOutcome {
            final_url: page.final_url,
            records,
            export,
            rendered,
            fetch_attempts: page.attempts,
            states: run.states,
        })
    }

    /// Why the static body should be rendered, or `None` to use it as is.
    ///
    /// In `Auto` mode a body is insufficient when the selectors match no
    /// items, or when it is HTML shorter than `min_static_bytes`. A probe
    /// error counts as sufficient; extraction will report it.
    fn render_reason(&self, body: &str, selectors: &Selectors) -> Option<String> {
        match self.config.dynamic_mode {
            DynamicMode::Never => None,
            DynamicMode::Always => Some("dynamic rendering requested".to_string()),
            DynamicMode::Auto => {
                let len = body.trim().len();
                if selectors.format.resolve(body) == ContentFormat::Html
                    && len < self.config.min_static_bytes
                {
                    return Some(format!("static body has only {len} bytes"));
                }
                match self.extractor.probe(body, selectors) {
                    Ok(0) => Some("no items matched in static content".to_string()),
                    _ => None,
                }
            }
        }
    }

    async fn render(&self, url: &str) -> Result<String, RenderFailure> {
        let timeout = self.config.render_timeout;
        match tokio::time::timeout(timeout, self.renderer.render(url)).await {
            Ok(result) => result,
            Err(_) => Err(RenderFailure::Timeout(timeout)),
        }
    }
}
