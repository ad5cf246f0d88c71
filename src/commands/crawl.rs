use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::Parser;
use diesel::SqliteConnection;
use tracing::{error, info};

use crate::cazy::archive::{Archiving, FileTransport, PageLibrary};
use crate::cazy::config::CrawlConfig;
use crate::cazy::failures::FailureLog;
use crate::cazy::fetcher::{HttpTransport, Transport};
use crate::cazy::runlog;
use crate::cazy::scheduler::{CrawlReport, Crawler};
use crate::cazy::store::establish_connection;
use crate::commands::{init_logging, load_config, CrawlArgs, SelectionArgs};

#[derive(Parser, Debug, Clone)]
#[command(about = "Crawl CAZy and merge protein records into the local database")]
pub struct Args {
    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    crawl: CrawlArgs,

    // Read pages from a library saved by `download` instead of CAZy
    #[arg(long, conflicts_with = "save_pages")]
    pages_dir: Option<PathBuf>,

    // Also save every fetched page to this directory
    #[arg(long)]
    save_pages: Option<PathBuf>,
}

pub fn command(args: Args) {
    let started = Local::now();
    let config = load_config(&args.selection, Some(&args.crawl));

    let channel_dir = config.as_ref().ok().and_then(|config| config.log_dir.clone());
    let guards = match init_logging(args.selection.verbose, channel_dir.as_deref(), &started) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Cannot set up logging: {}", e);
            std::process::exit(1);
        }
    };

    let result = match config {
        Ok(config) => run(&args, config, started),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("Crawl failed: {}", e);
        drop(guards);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: CrawlConfig, started: DateTime<Local>) -> Result<(), Box<dyn std::error::Error>> {
    let mut connection = establish_connection(&config.database_url)?;
    runlog::record_run(&mut connection, &config, &started)?;

    let report = match (&args.pages_dir, &args.save_pages) {
        (Some(dir), _) => {
            info!("Crawling the page library at {}", dir.display());
            let library = PageLibrary::new(dir, config.home_url.as_str());
            harvest(config, FileTransport::new(library), &mut connection)?
        }
        (None, Some(dir)) => {
            let library = PageLibrary::new(dir, config.home_url.as_str());
            let transport = Archiving::new(HttpTransport::new(config.timeout)?, library);
            harvest(config, transport, &mut connection)?
        }
        (None, None) => {
            let transport = HttpTransport::new(config.timeout)?;
            harvest(config, transport, &mut connection)?
        }
    };

    summarize(&report, &started);
    Ok(())
}

/// Runs one crawl over `transport` into `connection`.
pub(crate) fn harvest<T: Transport>(
    config: CrawlConfig,
    transport: T,
    connection: &mut SqliteConnection,
) -> Result<CrawlReport, Box<dyn std::error::Error>> {
    let log_dir = config.log_dir.clone();
    let mut failures = FailureLog::in_memory();
    let mut crawler = Crawler::new(config, transport)?;
    let report = crawler.run(connection, &mut failures)?;

    if let Some(dir) = log_dir {
        info!("Failure logs written under {}", dir.display());
    }
    Ok(report)
}

pub(crate) fn summarize(report: &CrawlReport, started: &DateTime<Local>) {
    let finished = Local::now();
    info!(
        "Finished at {} (started {}, runtime {}s)",
        finished.format("%Y-%m-%d %H:%M:%S"),
        started.format("%Y-%m-%d %H:%M:%S"),
        (finished - *started).num_seconds()
    );
    info!(
        "{} classes, {} families, {} pages, {} rows: {} added, {} extended, {} filtered out",
        report.classes, report.families, report.pages, report.rows, report.added, report.extended, report.filtered
    );
    info!(
        "{} malformed rows, {} store errors, {} families marked deleted",
        report.row_errors, report.store_errors, report.deleted_families
    );
    if !report.abandoned_classes.is_empty() {
        info!("Abandoned classes: {}", report.abandoned_classes.join(", "));
    }
    if !report.abandoned_families.is_empty() {
        info!("Abandoned families: {}", report.abandoned_families.join(", "));
    }
    if report.cancelled {
        info!("Crawl was cancelled before the queue drained");
    }
}
