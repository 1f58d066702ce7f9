pub mod backoff;
pub mod config;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod identity;
pub mod models;
pub mod report;
pub mod scrape;
pub mod target;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use backoff::BackoffConfig;
pub use config::{DynamicMode, ScraperConfig};
pub use error::{
    AppError, ExportFailure, ExtractFailure, FetchFailure, FetchFailureKind, RenderFailure,
    ScrapeError, Stage, TransportError,
};
pub use export::CsvExporter;
pub use fetcher::RetryingFetcher;
pub use identity::IdentityProvider;
pub use models::{
    ContentFormat, ExportBatch, ExportOutcome, FetchRequest, FetchResult, FetchedPage, FieldRule,
    Identity, RawResponse, Record, Records, Selectors,
};
pub use report::{ScrapeEvent, ScrapeReporter, TracingReporter};
pub use scrape::{RunState, ScrapeOutcome, ScrapeRequest, ScrapeService};
pub use target::{DEFAULT_SEARCH_URL, default_export_path, resolve_target};
pub use throttle::{ThrottleConfig, ThrottledTransport};
pub use traits::{Exporter, Extractor, Fetcher, NoRenderer, Renderer, Transport};
