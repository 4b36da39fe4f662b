//! `feed-fetch` — run one window-bounded fetch session per feed and print the
//! in-window records as JSON lines.
//!
//! Records go to stdout, one summary line per feed to stderr. Logs follow
//! `RUST_LOG` (default `ingest=info,warn`); `LOG_FORMAT=json` switches to JSON.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use incremental_feed_fetcher::config::{load_config_default, load_config_from};
use incremental_feed_fetcher::telemetry::Metrics;
use incremental_feed_fetcher::{FetchOrchestrator, ReqwestTransport, SessionSummary};

#[derive(Parser, Debug)]
#[command(name = "feed-fetch")]
#[command(about = "Fetch recent records from cursor-paginated feeds")]
struct Cli {
    /// Feed identifier; repeat for several feeds (one thread each).
    #[arg(long = "feed", required = true)]
    feeds: Vec<String>,

    /// Config file (TOML or JSON). Falls back to $FEED_FETCH_CONFIG_PATH,
    /// then config/fetch.toml, then built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    window_hours: Option<f64>,

    #[arg(long)]
    page_size: Option<u32>,

    #[arg(long)]
    hard_page_cap: Option<u32>,

    /// Stop after this many records per feed.
    #[arg(long)]
    limit: Option<usize>,

    /// Print Prometheus metrics to stderr when done.
    #[arg(long)]
    metrics: bool,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ingest=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs share stderr with the summary lines; stdout is records only.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn run_feed(
    orchestrator: &FetchOrchestrator,
    feed: &str,
    limit: Option<usize>,
) -> Result<SessionSummary> {
    let cfg = orchestrator.config();
    let mut session = orchestrator
        .fetch_all(feed, cfg.window_hours, cfg.page_size_hint, cfg.hard_page_cap)
        .with_context(|| format!("starting session for feed {feed}"))?;

    let stdout = std::io::stdout();
    let take = limit.unwrap_or(usize::MAX);
    for record in session.by_ref().take(take) {
        let line = serde_json::to_string(&record)?;
        let mut out = stdout.lock();
        writeln!(out, "{line}")?;
    }
    Ok(session.summary())
}

fn main() -> Result<()> {
    // Load .env if present; silently ignore when missing.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let metrics = if cli.metrics {
        Some(Metrics::install().map_err(|e| anyhow!("installing metrics recorder: {e}"))?)
    } else {
        None
    };

    let mut cfg = match &cli.config {
        Some(path) => {
            let mut cfg = load_config_from(path)?;
            cfg.apply_env_overrides();
            cfg
        }
        None => load_config_default()?,
    };
    if let Some(v) = cli.window_hours {
        cfg.window_hours = v;
    }
    if let Some(v) = cli.page_size {
        cfg.page_size_hint = v;
    }
    if let Some(v) = cli.hard_page_cap {
        cfg.hard_page_cap = v;
    }
    if cfg.endpoint.base_url.trim().is_empty() {
        return Err(anyhow!("endpoint.base_url is not configured"));
    }

    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let orchestrator = Arc::new(
        FetchOrchestrator::with_system_clock(cfg, transport).context("validating fetch config")?,
    );

    let handles: Vec<_> = cli
        .feeds
        .iter()
        .cloned()
        .map(|feed| {
            let orchestrator = Arc::clone(&orchestrator);
            let limit = cli.limit;
            thread::spawn(move || {
                let res = run_feed(&orchestrator, &feed, limit);
                (feed, res)
            })
        })
        .collect();

    let mut failed = 0usize;
    for h in handles {
        let (feed, res) = h
            .join()
            .map_err(|_| anyhow!("feed worker thread panicked"))?;
        match res {
            Ok(summary) => eprintln!("{}", serde_json::to_string(&summary)?),
            Err(e) => {
                failed += 1;
                tracing::error!(target: "ingest", feed = %feed, error = ?e, "feed failed");
            }
        }
    }

    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }

    if failed > 0 {
        return Err(anyhow!("{failed} feed(s) failed"));
    }
    Ok(())
}
