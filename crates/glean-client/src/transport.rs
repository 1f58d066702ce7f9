use std::net::IpAddr;

use glean_core::error::{AppError, TransportError};
use glean_core::models::{FetchRequest, Identity, Method, RawResponse};
use glean_core::traits::Transport;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use url::Url;

/// HTTP transport using reqwest.
///
/// Sends exactly one request per call with the identity's user-agent and
/// headers; retries and classification happen in the fetcher. Redirects are
/// followed and the final URL is reported.
///
/// By default, SSRF protection is **enabled** — requests to private/reserved
/// IP ranges are rejected as [`TransportError::InvalidUrl`]. Use
/// [`allow_private_urls`](Self::allow_private_urls) to disable this (e.g.,
/// for CLI usage where the user controls the machine).
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    ssrf_protection: bool,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;

        Ok(Self {
            client,
            ssrf_protection: true,
        })
    }

    /// Disable SSRF protection, allowing requests to private/reserved IPs.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }
}

impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &FetchRequest,
        identity: &Identity,
    ) -> Result<RawResponse, TransportError> {
        let url = check_scheme(&request.url)?;
        if self.ssrf_protection {
            validate_host(&url).await?;
        }

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
        };
        let mut builder = self
            .client
            .request(method, url)
            .timeout(request.timeout)
            .header(USER_AGENT, identity.user_agent());
        for (name, value) in identity.headers() {
            builder = builder.header(name, value);
        }

        let map_error = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else if e.is_builder() {
                TransportError::InvalidUrl(e.to_string())
            } else {
                TransportError::Connect(e.to_string())
            }
        };

        let response = builder.send().await.map_err(map_error)?;
        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(map_error)?;

        Ok(RawResponse {
            status_code,
            body,
            final_url,
        })
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Parse the URL and allow only `http` and `https`.
fn check_scheme(url: &str) -> Result<Url, TransportError> {
    let parsed =
        Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(TransportError::InvalidUrl(format!(
            "URL scheme '{scheme}' is not allowed (only http/https)"
        ))),
    }
}

/// Resolve the host and reject it if any address is private/reserved.
async fn validate_host(url: &Url) -> Result<(), TransportError> {
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl("URL has no host".to_string()))?;

    // IPv6 literals come bracketed from `host_str`.
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(TransportError::InvalidUrl(format!(
                "SSRF blocked: {host} is a private/reserved IP"
            )));
        }
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::Connect(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Connect(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }

    if let Some(addr) = addrs.iter().find(|a| is_private_ip(a.ip())) {
        return Err(TransportError::InvalidUrl(format!(
            "SSRF blocked: {host} resolves to private/reserved IP {}",
            addr.ip()
        )));
    }

    Ok(())
}

/// Check if an IP address is in a private/reserved/link-local range.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local() // 169.254.0.0/16, cloud metadata
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64 // 100.64.0.0/10
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xFFC0) == 0xFE80 // fe80::/10
                || (v6.segments()[0] & 0xFE00) == 0xFC00 // fc00::/7
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}
