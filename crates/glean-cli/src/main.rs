use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glean_client::{ReqwestTransport, SelectorExtractor};
use glean_core::config::{DynamicMode, ScraperConfig};
use glean_core::export::CsvExporter;
use glean_core::fetcher::RetryingFetcher;
use glean_core::identity::IdentityProvider;
use glean_core::models::{ExportBatch, Records, Selectors};
use glean_core::scrape::{ScrapeRequest, ScrapeService};
use glean_core::target::{DEFAULT_SEARCH_URL, default_export_path, resolve_target};
use glean_core::throttle::{ThrottleConfig, ThrottledTransport};
use glean_core::traits::{Exporter, Extractor};

/// Values longer than this are cut in the record preview.
const PREVIEW_CHARS: usize = 100;

#[derive(Parser)]
#[command(name = "glean", version, about = "Selector-driven web scraper with CSV export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL or search query and export the extracted records
    Scrape(ScrapeArgs),

    /// Extract records from a saved HTML or JSON file
    Extract {
        /// Saved page to read
        #[arg(short, long)]
        input: PathBuf,

        /// JSON file with the item and field selectors
        #[arg(short, long)]
        selectors: PathBuf,

        /// CSV destination (prints JSON to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Prefix the CSV with a UTF-8 byte-order mark
        #[arg(long, default_value_t = false)]
        bom: bool,
    },
}

#[derive(Args)]
struct ScrapeArgs {
    /// URL, bare host, or free-text search query
    target: String,

    /// JSON file with the item and field selectors
    #[arg(short, long)]
    selectors: PathBuf,

    /// CSV destination
    #[arg(short, long, conflicts_with_all = ["out_dir", "no_export"])]
    output: Option<PathBuf>,

    /// Directory for the timestamped default export file
    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    /// Print records as JSON instead of writing a CSV
    #[arg(long, default_value_t = false)]
    no_export: bool,

    /// When to render with a headless browser: never, auto or always
    #[arg(long)]
    dynamic_mode: Option<DynamicMode>,

    /// Use the static page if no browser is available
    #[arg(long, default_value_t = false)]
    static_fallback: bool,

    /// Retries after the first attempt
    #[arg(long)]
    max_retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Minimum delay between requests to one domain, in milliseconds
    #[arg(long)]
    rate_limit_ms: Option<u64>,

    /// File with one user-agent per line
    #[arg(long)]
    user_agents: Option<PathBuf>,

    /// Search URL template with a {query} placeholder
    #[arg(long, env = "GLEAN_SEARCH_URL", default_value = DEFAULT_SEARCH_URL)]
    search_url: String,

    /// Prefix the CSV with a UTF-8 byte-order mark
    #[arg(long, default_value_t = false)]
    bom: bool,

    /// Save the fetched (or rendered) page here before extracting
    #[arg(long)]
    dump_page: Option<PathBuf>,

    /// Abort the whole run after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Allow requests to private and loopback addresses
    #[arg(long, default_value_t = false)]
    allow_private: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("glean=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape(args) => cmd_scrape(args).await?,
        Commands::Extract {
            input,
            selectors,
            output,
            bom,
        } => cmd_extract(&input, &selectors, output.as_deref(), bom)?,
    }

    Ok(())
}

/// Environment configuration with command-line overrides applied.
fn build_config(args: &ScrapeArgs) -> Result<ScraperConfig> {
    let mut config = ScraperConfig::from_env().context("Invalid GLEAN_* environment")?;

    if let Some(retries) = args.max_retries {
        config.max_retries = retries;
    }
    if let Some(secs) = args.timeout_secs {
        if secs == 0 {
            bail!("--timeout-secs must be at least 1");
        }
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(mode) = args.dynamic_mode {
        config.dynamic_mode = mode;
    }
    if let Some(ms) = args.rate_limit_ms {
        config.rate_limit_delay = Duration::from_millis(ms);
    }
    config.static_fallback |= args.static_fallback;

    Ok(config)
}

#[cfg(feature = "browser")]
fn renderer(config: &ScraperConfig) -> glean_client::BrowserRenderer {
    glean_client::BrowserRenderer::with_timeout(config.render_timeout)
}

#[cfg(not(feature = "browser"))]
fn renderer(config: &ScraperConfig) -> glean_core::traits::NoRenderer {
    if config.dynamic_mode != DynamicMode::Never {
        tracing::warn!("Built without the `browser` feature; dynamic rendering is unavailable");
    }
    glean_core::traits::NoRenderer
}

async fn cmd_scrape(args: ScrapeArgs) -> Result<()> {
    let config = build_config(&args)?;
    let url = resolve_target(&args.target, &args.search_url)?;
    let selectors = Selectors::from_file(&args.selectors)?;

    let identities = match &args.user_agents {
        Some(path) => IdentityProvider::from_file(path),
        None => IdentityProvider::default(),
    };

    let mut transport = ReqwestTransport::new().context("Failed to create HTTP client")?;
    if args.allow_private {
        transport = transport.allow_private_urls();
    }
    let transport =
        ThrottledTransport::new(transport, ThrottleConfig::new(config.rate_limit_delay));
    let fetcher = RetryingFetcher::new(transport, identities).with_backoff(config.backoff.clone());

    let destination = if args.no_export {
        None
    } else {
        Some(args.output.clone().unwrap_or_else(|| {
            default_export_path(&args.out_dir, &url, chrono::Local::now())
        }))
    };

    let mut request = ScrapeRequest::new(url.clone(), selectors);
    request.destination = destination;
    request.dump_page = args.dump_page.clone();

    let service = ScrapeService::new(
        fetcher,
        renderer(&config),
        SelectorExtractor,
        CsvExporter::new().with_bom(args.bom),
        config,
    );

    tracing::info!(%url, "Starting scrape");

    let run = service.run(&request);
    let outcome = match args.deadline_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
            .await
            .map_err(|_| anyhow::anyhow!("Scrape of {url} exceeded the {secs}s deadline"))?,
        None => run.await,
    }
    .with_context(|| format!("Scrape of {url} failed"))?;

    match &outcome.export {
        Some(export) => {
            print_preview(&outcome.records);
            println!(
                "Exported {} records to {}",
                export.rows_written,
                export.path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&outcome.records)?),
    }

    Ok(())
}

fn cmd_extract(
    input: &Path,
    selectors_path: &Path,
    output: Option<&Path>,
    bom: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    let selectors = Selectors::from_file(selectors_path)?;

    let records = SelectorExtractor
        .extract(&content, &selectors)
        .with_context(|| format!("Extraction from {} failed", input.display()))?;

    tracing::info!(records = records.len(), "Extraction complete");

    match output {
        Some(path) => {
            let columns = selectors.field_names();
            let outcome = CsvExporter::new()
                .with_bom(bom)
                .export(ExportBatch::new(records.as_slice()).with_columns(&columns), path)
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            print_preview(&records);
            println!(
                "Exported {} records to {}",
                outcome.rows_written,
                outcome.path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&records)?),
    }

    Ok(())
}

fn print_preview(records: &Records) {
    let Some(first) = records.iter().next() else {
        println!("No records extracted");
        return;
    };
    println!("First of {} records:", records.len());
    for (name, value) in first.iter() {
        println!("  {name}: {}", truncate(value.unwrap_or(""), PREVIEW_CHARS));
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}
