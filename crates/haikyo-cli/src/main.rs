use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use haikyo_export::{is_exportable, render, ExportFormat};
use haikyo_scraper::{JobRequest, JobStatus, ScrapeContext, ScrapeTarget};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "haikyo-cli")]
#[command(about = "Scrape haikyo.info locations and export them as KML or JSON")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scrape job and write the export file
    #[command(group(ArgGroup::new("target").required(true).args(["url", "term"])))]
    Scrape {
        /// Listing or detail page URL; repeat for several detail pages
        #[arg(long)]
        url: Vec<String>,

        /// Prefecture, municipality or keyword to search for
        #[arg(long)]
        term: Option<String>,

        /// Maximum number of locations (defaults to HAIKYO_DEFAULT_MAX_LOCATIONS)
        #[arg(long)]
        max_locations: Option<usize>,

        /// Zero-based indices into the discovered list, e.g. `0,2,5`
        #[arg(long, value_delimiter = ',')]
        select: Vec<usize>,

        /// Output format: kml or json
        #[arg(long, default_value = "kml")]
        format: String,

        /// Output file (defaults to haikyo_locations_<job-id>.<format>)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the targets a scrape would choose from, with their `--select` indices
    #[command(group(ArgGroup::new("target").required(true).args(["url", "term"])))]
    Discover {
        /// Listing page URL
        #[arg(long)]
        url: Option<String>,

        /// Prefecture, municipality or keyword to search for
        #[arg(long)]
        term: Option<String>,

        /// Maximum number of locations (defaults to HAIKYO_DEFAULT_MAX_LOCATIONS)
        #[arg(long)]
        max_locations: Option<usize>,
    },
    /// Extract a single location page and print it as JSON
    Extract {
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = haikyo_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let context = ScrapeContext::from_config(&config)?.without_export_dir();

    match cli.command {
        Commands::Scrape {
            url,
            term,
            max_locations,
            select,
            format,
            out,
        } => {
            let format: ExportFormat = format.parse()?;
            let request = JobRequest {
                target: build_target(url, term),
                max_locations,
                selected_ids: select,
            };
            run_scrape(&context, request, format, out).await
        }
        Commands::Discover {
            url,
            term,
            max_locations,
        } => {
            let target = build_target(url.into_iter().collect(), term);
            let targets = context.discover(&target, max_locations).await?;
            for t in &targets {
                println!("{:>4}  {:<10} {}", t.index, t.id, t.url);
            }
            Ok(())
        }
        Commands::Extract { url } => {
            let location = context.extractor().extract(&url).await;
            println!("{}", serde_json::to_string_pretty(&location)?);
            Ok(())
        }
    }
}

fn build_target(mut urls: Vec<String>, term: Option<String>) -> ScrapeTarget {
    match (urls.len(), term) {
        (0, Some(term)) => ScrapeTarget::Search { term },
        (1, _) => ScrapeTarget::Listing {
            url: urls.remove(0),
        },
        _ => ScrapeTarget::Urls(urls),
    }
}

async fn run_scrape(
    context: &ScrapeContext,
    request: JobRequest,
    format: ExportFormat,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let handle = context
        .job(uuid::Uuid::new_v4().simple().to_string(), request)
        .spawn();
    let job_id = handle.id().to_owned();
    let monitor = handle.monitor();

    let mut last_message = String::new();
    loop {
        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    eprintln!("cancelling after the current location...");
                    monitor.cancel();
                }
            }
        }

        let snapshot = monitor.snapshot();
        if snapshot.message != last_message {
            eprintln!("[{:>5.1}%] {}", snapshot.percent, snapshot.message);
            last_message = snapshot.message;
        }
        if snapshot.status.is_terminal() {
            break;
        }
    }

    let snapshot = handle.join().await.context("job task panicked")?;
    if snapshot.status == JobStatus::Failed {
        anyhow::bail!("job failed: {}", snapshot.message);
    }

    let locations = monitor.board().take_results().unwrap_or_default();
    let options = &context.settings().export_options;
    let body = render(format, &locations, options)?;
    let path = out.unwrap_or_else(|| default_output(&job_id, format));
    write_output(&path, &body).await?;

    let exported = locations.iter().filter(|l| is_exportable(l, options)).count();
    println!(
        "{} locations scraped, {exported} exported to {}",
        locations.len(),
        path.display()
    );
    Ok(())
}

fn default_output(job_id: &str, format: ExportFormat) -> PathBuf {
    PathBuf::from(format!("haikyo_locations_{job_id}.{}", format.extension()))
}

async fn write_output(path: &Path, body: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("writing {}", path.display()))
}
