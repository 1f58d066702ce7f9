use std::future::Future;
use std::path::Path;

use crate::error::{ExportFailure, ExtractFailure, RenderFailure, TransportError};
use crate::models::{
    ExportBatch, ExportOutcome, FetchRequest, FetchResult, Identity, RawResponse, Records,
    Selectors,
};

/// Performs a single HTTP attempt with the given identity.
///
/// Implementations must not retry; classification and retries belong to
/// [`crate::fetcher::RetryingFetcher`].
pub trait Transport: Send + Sync + Clone {
    fn send(
        &self,
        request: &FetchRequest,
        identity: &Identity,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// Fetches a page and reports exactly one classified outcome.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, request: FetchRequest) -> impl Future<Output = FetchResult> + Send;
}

/// Renders a page in a headless browser and returns the final markup.
pub trait Renderer: Send + Sync + Clone {
    fn render(&self, url: &str) -> impl Future<Output = Result<String, RenderFailure>> + Send;
}

/// Turns markup or JSON into records using declarative selectors.
pub trait Extractor: Send + Sync + Clone {
    /// One record per top-level item, in document order.
    fn extract(&self, content: &str, selectors: &Selectors) -> Result<Records, ExtractFailure>;

    /// Number of top-level items `extract` would produce.
    fn probe(&self, content: &str, selectors: &Selectors) -> Result<usize, ExtractFailure>;
}

/// Writes a batch of records to a destination.
pub trait Exporter: Send + Sync + Clone {
    fn export(
        &self,
        batch: ExportBatch<'_>,
        destination: &Path,
    ) -> Result<ExportOutcome, ExportFailure>;
}

/// A renderer for builds without a headless browser.
#[derive(Debug, Clone, Default)]
pub struct NoRenderer;

impl Renderer for NoRenderer {
    async fn render(&self, _url: &str) -> Result<String, RenderFailure> {
        Err(RenderFailure::CapabilityUnavailable(
            "no headless browser configured".into(),
        ))
    }
}
