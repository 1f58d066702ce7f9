use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use glean_core::error::RenderFailure;
use glean_core::traits::Renderer;
use tokio::sync::OnceCell;

/// Headless-browser renderer using Chromium via the Chrome DevTools Protocol.
///
/// Chromium is launched on the first [`Renderer::render`] call and shared by
/// all clones; each call opens a tab, waits for `<body>`, reads the rendered
/// DOM and closes the tab. If the launch fails, this and every later call
/// return [`RenderFailure::CapabilityUnavailable`].
///
/// # Example
///
/// ```rust,no_run
/// use glean_client::BrowserRenderer;
/// use glean_core::traits::Renderer;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let renderer = BrowserRenderer::new();
/// let html = renderer.render("https://example.com").await?;
/// println!("{}", &html[..200]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BrowserRenderer {
    browser: Arc<OnceCell<Result<Arc<Browser>, String>>>,
    timeout: Duration,
}

impl Default for BrowserRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserRenderer {
    /// Renderer with a **30 s** per-page timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            browser: Arc::new(OnceCell::new()),
            timeout,
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, RenderFailure> {
        let launched = self
            .browser
            .get_or_init(|| async {
                Self::launch().await.map(Arc::new).inspect_err(|e| {
                    tracing::warn!("Headless browser unavailable: {e}");
                })
            })
            .await;
        launched
            .clone()
            .map_err(RenderFailure::CapabilityUnavailable)
    }

    async fn launch() -> Result<Browser, String> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| format!("Browser config error: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| format!("Failed to launch browser: {e}"))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        tracing::info!("Headless browser launched");
        Ok(browser)
    }
}

/// Locate a Chrome/Chromium binary, honouring `CHROME_BIN`.
///
/// The snap wrapper at `/snap/bin/chromium` rejects headless flags, so the
/// real binary inside the snap is preferred. `None` lets chromiumoxide
/// search on its own.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

impl Renderer for BrowserRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderFailure> {
        let browser = self.browser().await?;
        let timeout = self.timeout;

        let page = tokio::time::timeout(timeout, browser.new_page("about:blank"))
            .await
            .map_err(|_| RenderFailure::Timeout(timeout))?
            .map_err(|e| RenderFailure::PageError(format!("Failed to open a tab: {e}")))?;

        let rendered = tokio::time::timeout(timeout, async {
            page.goto(url)
                .await
                .map_err(|e| RenderFailure::PageError(format!("Failed to navigate to {url}: {e}")))?;

            page.find_element("body")
                .await
                .map_err(|e| RenderFailure::PageError(format!("Page did not render body: {e}")))?;

            page.content()
                .await
                .map_err(|e| RenderFailure::PageError(format!("Failed to read page content: {e}")))
        })
        .await;

        // The tab is closed whatever happened inside the timed block.
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close browser tab");
        }

        match rendered {
            Ok(inner) => {
                if let Ok(html) = &inner {
                    tracing::info!(%url, bytes = html.len(), "Rendered page");
                }
                inner
            }
            Err(_) => Err(RenderFailure::Timeout(timeout)),
        }
    }
}
