use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Setup-time errors: configuration, selector files, client construction.
///
/// Pipeline stages never return this type; they report through the
/// stage-specific failures below so the caller always learns which stage
/// gave up and why.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or missing configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Selectors file could not be read or is malformed.
    #[error("Selectors error: {0}")]
    Selectors(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// The attempt did not complete within the per-attempt timeout.
    Timeout,
    /// DNS, TCP, TLS or body-read failure.
    ConnectionError,
    /// Non-success status that is not a block signal.
    HttpError { status_code: u16 },
    /// 403/429 or an anti-bot page (CAPTCHA, access denied).
    Blocked { status_code: Option<u16> },
    /// URL rejected before any request was sent.
    InvalidUrl,
}

impl FetchFailureKind {
    /// Returns true if another attempt may succeed.
    ///
    /// Client errors other than 403/429 fail fast, as do rejected URLs.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchFailureKind::Timeout
            | FetchFailureKind::ConnectionError
            | FetchFailureKind::Blocked { .. } => true,
            FetchFailureKind::HttpError { status_code } => *status_code >= 500,
            FetchFailureKind::InvalidUrl => false,
        }
    }
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailureKind::Timeout => write!(f, "timeout"),
            FetchFailureKind::ConnectionError => write!(f, "connection error"),
            FetchFailureKind::HttpError { status_code } => write!(f, "HTTP {status_code}"),
            FetchFailureKind::Blocked {
                status_code: Some(code),
            } => write!(f, "blocked (HTTP {code})"),
            FetchFailureKind::Blocked { status_code: None } => write!(f, "blocked"),
            FetchFailureKind::InvalidUrl => write!(f, "invalid URL"),
        }
    }
}

/// Terminal failure of one fetch, after all attempts were spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch failed ({kind}) after {attempts} attempt(s): {message}")]
pub struct FetchFailure {
    pub kind: FetchFailureKind,
    pub message: String,
    pub attempts: u32,
}

/// Failure of a single transport attempt, before classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<&TransportError> for FetchFailureKind {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => FetchFailureKind::Timeout,
            TransportError::Connect(_) => FetchFailureKind::ConnectionError,
            TransportError::InvalidUrl(_) => FetchFailureKind::InvalidUrl,
        }
    }
}

// ---------------------------------------------------------------------------
// Render / Extract / Export
// ---------------------------------------------------------------------------

/// Failure of the headless-rendering capability. Never retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderFailure {
    /// No browser could be launched or none is configured.
    #[error("rendering capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("rendering timed out after {0:?}")]
    Timeout(Duration),

    /// Navigation or DOM read failed inside the browser.
    #[error("page error: {0}")]
    PageError(String),
}

/// Extraction failure. An empty result is not a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractFailure {
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("malformed JSON content: {0}")]
    MalformedJson(String),
}

/// Export failure. Nothing is left at the destination when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportFailure {
    /// Destination unwritable, rename failed, disk full.
    #[error("I/O error: {0}")]
    Io(String),

    /// A value could not be encoded as CSV.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<std::io::Error> for ExportFailure {
    fn from(err: std::io::Error) -> Self {
        ExportFailure::Io(err.to_string())
    }
}

impl From<csv::Error> for ExportFailure {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => ExportFailure::Io(err.to_string()),
            _ => ExportFailure::Encoding(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Pipeline stage, used to label terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    RenderingDynamic,
    Extracting,
    Exporting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetching => write!(f, "fetching"),
            Stage::RenderingDynamic => write!(f, "rendering"),
            Stage::Extracting => write!(f, "extracting"),
            Stage::Exporting => write!(f, "exporting"),
        }
    }
}

/// Terminal failure of one scrape run, identifying stage and kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error(transparent)]
    Render(#[from] RenderFailure),

    #[error(transparent)]
    Extract(#[from] ExtractFailure),

    #[error(transparent)]
    Export(#[from] ExportFailure),
}

impl ScrapeError {
    pub fn stage(&self) -> Stage {
        match self {
            ScrapeError::Fetch(_) => Stage::Fetching,
            ScrapeError::Render(_) => Stage::RenderingDynamic,
            ScrapeError::Extract(_) => Stage::Extracting,
            ScrapeError::Export(_) => Stage::Exporting,
        }
    }
}
