//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{
    ExportFailure, ExtractFailure, FetchFailure, RenderFailure, TransportError,
};
use crate::export::union_columns;
use crate::models::{
    ExportBatch, ExportOutcome, FetchRequest, FetchResult, FetchedPage, Identity, RawResponse,
    Records, Selectors,
};
use crate::report::{ScrapeEvent, ScrapeReporter};
use crate::traits::{Exporter, Extractor, Fetcher, Renderer, Transport};

/// A 200 response with the given body.
pub fn ok_response(body: &str) -> RawResponse {
    RawResponse {
        status_code: 200,
        body: body.to_string(),
        final_url: "https://example.com".to_string(),
    }
}

/// An empty response with the given status.
pub fn status_response(status_code: u16) -> RawResponse {
    RawResponse {
        status_code,
        body: String::new(),
        final_url: "https://example.com".to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

type TransportResult = Result<RawResponse, TransportError>;

/// Mock transport with a queue of scripted responses.
#[derive(Clone)]
pub struct MockTransport {
    /// Each call pops the first element.
    responses: Arc<Mutex<VecDeque<TransportResult>>>,
    /// Returned once the queue is empty.
    fallback: Option<TransportResult>,
    delay: Duration,
    user_agents: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn with_responses(responses: Vec<TransportResult>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            fallback: None,
            delay: Duration::ZERO,
            user_agents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the same response on every call.
    pub fn always(response: TransportResult) -> Self {
        Self {
            fallback: Some(response),
            ..Self::with_responses(Vec::new())
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.user_agents.lock().unwrap().len()
    }

    /// User-agent presented on each call, in order.
    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn send(
        &self,
        _request: &FetchRequest,
        identity: &Identity,
    ) -> Result<RawResponse, TransportError> {
        self.user_agents
            .lock()
            .unwrap()
            .push(identity.user_agent().to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => fallback.clone(),
            (None, None) => Err(TransportError::Connect("no scripted response left".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns one configured outcome for every request.
#[derive(Clone)]
pub struct MockFetcher {
    outcome: Result<String, FetchFailure>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self {
            outcome: Ok(body.to_string()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failure(failure: FetchFailure) -> Self {
        Self {
            outcome: Err(failure),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> FetchResult {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        match &self.outcome {
            Ok(body) => FetchResult::Success(FetchedPage {
                status_code: 200,
                body: body.clone(),
                final_url: url,
                attempts: 1,
            }),
            Err(failure) => FetchResult::Failure(failure.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Mock renderer with a fixed outcome.
#[derive(Clone)]
pub struct MockRenderer {
    outcome: Result<String, RenderFailure>,
    delay: Duration,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockRenderer {
    pub fn with_html(html: &str) -> Self {
        Self {
            outcome: Ok(html.to_string()),
            delay: Duration::ZERO,
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Behaves like a build without a browser.
    pub fn unavailable() -> Self {
        Self {
            outcome: Err(RenderFailure::CapabilityUnavailable("no browser".into())),
            ..Self::with_html("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rendered_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Renderer for MockRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderFailure> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.outcome.clone();
        if result.is_ok() {
            self.urls.lock().unwrap().push(url.to_string());
        }
        result
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor returning fixed records.
#[derive(Clone)]
pub struct MockExtractor {
    outcome: Result<Records, ExtractFailure>,
    /// Item count reported by `probe`; defaults to the record count.
    probe: Option<usize>,
    contents: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn new(records: Records) -> Self {
        Self {
            outcome: Ok(records),
            probe: None,
            contents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(failure: ExtractFailure) -> Self {
        Self {
            outcome: Err(failure),
            probe: None,
            contents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_probe(mut self, items: usize) -> Self {
        self.probe = Some(items);
        self
    }

    pub fn extract_calls(&self) -> usize {
        self.contents.lock().unwrap().len()
    }

    /// Content passed to each `extract` call.
    pub fn extracted_contents(&self) -> Vec<String> {
        self.contents.lock().unwrap().clone()
    }
}

impl Extractor for MockExtractor {
    fn extract(&self, content: &str, _selectors: &Selectors) -> Result<Records, ExtractFailure> {
        self.contents.lock().unwrap().push(content.to_string());
        self.outcome.clone()
    }

    fn probe(&self, _content: &str, _selectors: &Selectors) -> Result<usize, ExtractFailure> {
        match (&self.outcome, self.probe) {
            (_, Some(items)) => Ok(items),
            (Ok(records), None) => Ok(records.len()),
            (Err(failure), None) => Err(failure.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockExporter
// ---------------------------------------------------------------------------

/// Mock exporter that records batches instead of writing files.
#[derive(Clone)]
pub struct MockExporter {
    error: Option<ExportFailure>,
    columns: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockExporter {
    pub fn new() -> Self {
        Self {
            error: None,
            columns: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(failure: ExportFailure) -> Self {
        Self {
            error: Some(failure),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.columns.lock().unwrap().len()
    }

    /// Seed columns passed with each batch.
    pub fn exported_columns(&self) -> Vec<Vec<String>> {
        self.columns.lock().unwrap().clone()
    }
}

impl Exporter for MockExporter {
    fn export(
        &self,
        batch: ExportBatch<'_>,
        destination: &Path,
    ) -> Result<ExportOutcome, ExportFailure> {
        self.columns.lock().unwrap().push(batch.columns.to_vec());
        if let Some(failure) = &self.error {
            return Err(failure.clone());
        }
        Ok(ExportOutcome {
            rows_written: batch.records.len(),
            columns: union_columns(batch.columns, batch.records),
            path: destination.to_path_buf(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records every state it is told about.
#[derive(Default)]
pub struct MockReporter {
    states: Mutex<Vec<String>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display form of each entered state.
    pub fn states(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }
}

impl ScrapeReporter for MockReporter {
    fn report(&self, event: ScrapeEvent<'_>) {
        if let ScrapeEvent::StateChanged { to, .. } = event {
            self.states.lock().unwrap().push(to.to_string());
        }
    }
}
