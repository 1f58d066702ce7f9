/// Smoke-test for `BrowserRenderer`.
///
/// Launches a headless Chromium, renders <https://example.com>, and extracts
/// the `<h1>` with a selector.
///
/// Run with:
///   cargo run -p glean-client --example browser_smoke --features browser
use glean_client::{BrowserRenderer, SelectorExtractor};
use glean_core::models::Selectors;
use glean_core::traits::{Extractor, Renderer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let url = "https://example.com";
    println!("Rendering {url} …");
    let html = BrowserRenderer::new().render(url).await?;

    let selectors = Selectors::new().field("heading", "h1");
    let records = SelectorExtractor.extract(&html, &selectors)?;

    let heading = records.iter().next().and_then(|r| r.get("heading"));
    anyhow::ensure!(
        heading == Some("Example Domain"),
        "Unexpected heading: {heading:?}"
    );

    println!("OK — got {} bytes of rendered HTML", html.len());
    Ok(())
}
