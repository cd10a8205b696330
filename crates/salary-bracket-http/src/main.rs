//! salary-bracket: infer salary brackets for job listings by sweeping the
//! board's salary filter.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use salary_bracket::{
    Boundaries, BracketStore, PaginatedFetcher, Report, Session, SweepConfig, SweepController,
};
use salary_bracket_http::config::{
    resolve_credentials, resolve_db_path, resolve_host, HttpConfig, DEFAULT_TIMEOUT_MS,
};
use salary_bracket_http::ListingSource;

#[derive(Parser)]
#[command(
    name = "salary-bracket",
    about = "Infer salary brackets for job listings from the board's salary filter",
    version
)]
struct Cli {
    /// Path to the bracket database.
    /// Also reads from SALARY_BRACKET_DB env var.
    #[arg(long, global = true)]
    db: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a threshold sweep and print the finalized report.
    Sweep {
        #[arg(long, default_value_t = salary_bracket::config::DEFAULT_FROM)]
        from: i64,

        #[arg(long, default_value_t = salary_bracket::config::DEFAULT_TO)]
        to: i64,

        #[arg(long, default_value_t = salary_bracket::config::DEFAULT_STEP)]
        step: i64,

        /// Listings per page, used to advance the offset.
        #[arg(long, default_value_t = salary_bracket::DEFAULT_PAGE_SIZE)]
        page_size: u32,

        #[arg(long, default_value_t = salary_bracket::config::DEFAULT_BOUNDARY_LOW)]
        boundary_low: i64,

        #[arg(long, default_value_t = salary_bracket::config::DEFAULT_BOUNDARY_HIGH)]
        boundary_high: i64,

        /// Continue an interrupted sweep over the same range.
        #[arg(long)]
        resume: bool,

        /// Job board base URL.
        /// Also reads from SALARY_BRACKET_HOST env var.
        #[arg(long)]
        host: Option<String>,

        /// Session cookie header value.
        /// Also reads from SESSION_COOKIE env var.
        #[arg(long)]
        cookie: Option<String>,

        /// Only include remote listings.
        #[arg(long)]
        remote: bool,

        /// Per-request timeout in milliseconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Abort the whole sweep after this many seconds.
        #[arg(long)]
        max_duration_secs: Option<u64>,
    },

    /// Print the last finalized report.
    Report {
        /// Only print the first N entries.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "salary_bracket=debug,salary_bracket_http=debug"
    } else {
        "salary_bracket=info,salary_bracket_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_path = resolve_db_path(cli.db.as_deref());

    match cli.command {
        Commands::Sweep {
            from,
            to,
            step,
            page_size,
            boundary_low,
            boundary_high,
            resume,
            host,
            cookie,
            remote,
            timeout_ms,
            max_duration_secs,
        } => {
            let sweep_config = SweepConfig {
                from,
                to,
                step,
                boundaries: Boundaries {
                    low: boundary_low,
                    high: boundary_high,
                },
                page_size,
            };
            let range = sweep_config.range()?;
            let credentials = resolve_credentials(cookie.as_deref())?;

            let http_config = HttpConfig {
                host: resolve_host(host.as_deref()),
                remote_jobs: remote,
                timeout_ms,
                ..HttpConfig::default()
            };
            tracing::info!(host = %http_config.host, db = %db_path.display(), "opening sweep");

            let source = ListingSource::new(http_config)?;
            let session = Session::new(source.clone(), credentials);
            let fetcher = PaginatedFetcher::new(source, session).with_page_size(page_size)?;
            let controller =
                SweepController::new(fetcher).with_boundaries(sweep_config.boundaries);

            let mut store = BracketStore::open(&db_path)
                .with_context(|| format!("opening store at {}", db_path.display()))?;

            let sweep = async {
                if resume {
                    controller.run_resumable(&mut store, range).await
                } else {
                    controller.run(&mut store, range).await
                }
            };

            let reports = match max_duration_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), sweep)
                    .await
                    .map_err(|_| {
                        anyhow::anyhow!("sweep exceeded {secs}s; rerun with --resume to continue")
                    })??,
                None => sweep.await?,
            };

            print_reports(&reports, None)?;
        }

        Commands::Report { limit } => {
            let store = BracketStore::open(&db_path)
                .with_context(|| format!("opening store at {}", db_path.display()))?;
            let reports = store.load_report()?;
            if reports.is_empty() {
                eprintln!("No finalized report in {}", db_path.display());
            }
            print_reports(&reports, limit)?;
        }
    }

    Ok(())
}

fn print_reports(reports: &[Report], limit: Option<usize>) -> anyhow::Result<()> {
    let shown = &reports[..limit.unwrap_or(reports.len()).min(reports.len())];
    println!("{}", serde_json::to_string_pretty(shown)?);
    Ok(())
}
