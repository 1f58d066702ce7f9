use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use url::Url;

use crate::error::AppError;

/// Search endpoint used when the target is a free-text query.
pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/?q={query}";

/// Turn a user-supplied target into a URL.
///
/// - `http://` / `https://` URLs are used as given.
/// - A bare host such as `example.com/page` gets an `https://` prefix.
/// - Anything else is treated as a search query and substituted,
///   form-urlencoded, into `search_template` at `{query}`.
pub fn resolve_target(input: &str, search_template: &str) -> Result<String, AppError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::Config("Target must not be empty".into()));
    }

    if let Ok(url) = Url::parse(input) {
        match url.scheme() {
            "http" | "https" => return Ok(url.to_string()),
            scheme if names_a_scheme(input, scheme) => {
                return Err(AppError::Config(format!(
                    "URL scheme '{scheme}' is not supported (only http/https)"
                )));
            }
            // `example.com:8080/x` parses with "example.com" as the scheme and
            // `site:example.com rust` with "site"; neither is a URL.
            _ => {}
        }
    }

    if looks_like_host(input) {
        let url = Url::parse(&format!("https://{input}"))
            .map_err(|e| AppError::Config(format!("Invalid target '{input}': {e}")))?;
        return Ok(url.to_string());
    }

    if !search_template.contains("{query}") {
        return Err(AppError::Config(format!(
            "Search URL template '{search_template}' has no {{query}} placeholder"
        )));
    }
    let encoded: String = url::form_urlencoded::byte_serialize(input.as_bytes()).collect();
    Ok(search_template.replace("{query}", &encoded))
}

/// Schemes rejected outright even without a `//` authority.
const NON_WEB_SCHEMES: &[&str] = &["file", "ftp", "mailto", "data", "javascript", "ws", "wss"];

/// Whether a parsed prefix is a real scheme rather than a search operator.
fn names_a_scheme(input: &str, scheme: &str) -> bool {
    !input.contains(char::is_whitespace)
        && (input.contains("://") || NON_WEB_SCHEMES.contains(&scheme))
}

fn looks_like_host(input: &str) -> bool {
    let host = input.split('/').next().unwrap_or_default();
    let (name, port) = match host.split_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };
    !input.contains(char::is_whitespace)
        && port.is_none_or(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        && name.contains('.')
        && !name.starts_with('.')
        && !name.ends_with('.')
}

/// Default export path: `<dir>/scrape_results_<host>_<YYYYmmdd_HHMMSS>.csv`.
///
/// Dots in the host become underscores.
pub fn default_export_path<Tz>(dir: &Path, url: &str, at: DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.replace('.', "_")))
        .unwrap_or_else(|| "unknown".to_string());
    dir.join(format!(
        "scrape_results_{host}_{}.csv",
        at.format("%Y%m%d_%H%M%S")
    ))
}
