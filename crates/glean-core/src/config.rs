use std::str::FromStr;
use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::error::AppError;

/// When the pipeline should hand a page to the headless renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DynamicMode {
    /// Static content only.
    #[default]
    Never,
    /// Render when the static response looks insufficient.
    Auto,
    /// Always render.
    Always,
}

impl FromStr for DynamicMode {
    type Err = AppError;

    /// Accepts `never|auto|always`, and booleans (`true` means `auto`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "false" | "off" | "0" => Ok(DynamicMode::Never),
            "auto" | "true" | "on" | "1" => Ok(DynamicMode::Auto),
            "always" => Ok(DynamicMode::Always),
            other => Err(AppError::Config(format!(
                "Invalid dynamic mode '{other}': expected never, auto or always"
            ))),
        }
    }
}

/// Runtime settings for one scraper.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Per-attempt fetch timeout.
    pub timeout: Duration,
    pub dynamic_mode: DynamicMode,
    /// Minimum spacing between requests to one domain.
    pub rate_limit_delay: Duration,
    pub backoff: BackoffConfig,
    pub render_timeout: Duration,
    /// Static bodies shorter than this count as insufficient in `Auto` mode.
    pub min_static_bytes: usize,
    /// Extract the static page when no renderer is available.
    pub static_fallback: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(10),
            dynamic_mode: DynamicMode::Never,
            rate_limit_delay: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
            render_timeout: Duration::from_secs(30),
            min_static_bytes: 1000,
            static_fallback: false,
        }
    }
}

impl ScraperConfig {
    /// Read overrides from environment variables.
    ///
    /// - `GLEAN_MAX_RETRIES` (default 3)
    /// - `GLEAN_TIMEOUT_SECS` (default 10, must be at least 1)
    /// - `GLEAN_DYNAMIC_MODE` (`never|auto|always`, default never)
    /// - `GLEAN_RATE_LIMIT_MS` (default 1000)
    /// - `GLEAN_RENDER_TIMEOUT_SECS` (default 30, must be at least 1)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("GLEAN_MAX_RETRIES") {
            config.max_retries = parse_number(&raw, "GLEAN_MAX_RETRIES")?;
        }
        if let Some(raw) = lookup("GLEAN_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_positive(&raw, "GLEAN_TIMEOUT_SECS")?);
        }
        if let Some(raw) = lookup("GLEAN_DYNAMIC_MODE") {
            config.dynamic_mode = raw.parse()?;
        }
        if let Some(raw) = lookup("GLEAN_RATE_LIMIT_MS") {
            config.rate_limit_delay =
                Duration::from_millis(parse_number(&raw, "GLEAN_RATE_LIMIT_MS")?);
        }
        if let Some(raw) = lookup("GLEAN_RENDER_TIMEOUT_SECS") {
            config.render_timeout =
                Duration::from_secs(parse_positive(&raw, "GLEAN_RENDER_TIMEOUT_SECS")?);
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(raw: &str, key: &str) -> Result<T, AppError> {
    raw.trim().parse().map_err(|_| {
        AppError::Config(format!(
            "Invalid {key} '{raw}': must be a non-negative integer"
        ))
    })
}

fn parse_positive(raw: &str, key: &str) -> Result<u64, AppError> {
    let value: u64 = parse_number(raw, key)?;
    if value == 0 {
        return Err(AppError::Config(format!("{key} must be at least 1")));
    }
    Ok(value)
}
