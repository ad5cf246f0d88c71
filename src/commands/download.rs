use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::Parser;
use tracing::{error, info};

use crate::cazy::archive::{Archiving, PageLibrary};
use crate::cazy::config::CrawlConfig;
use crate::cazy::fetcher::HttpTransport;
use crate::cazy::store::establish_connection;
use crate::commands::crawl::{harvest, summarize};
use crate::commands::{init_logging, load_config, CrawlArgs, SelectionArgs};

/// Pages are parsed into a throwaway in-memory store; only the saved files
/// are kept.
const SCRATCH_DATABASE: &str = ":memory:";

#[derive(Parser, Debug, Clone)]
#[command(about = "Save the CAZy pages in scope to a local library for a later `crawl --pages-dir`")]
pub struct Args {
    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    crawl: CrawlArgs,

    #[arg(short, long)]
    output: PathBuf,
}

pub fn command(args: Args) {
    let started = Local::now();
    let mut selection = args.selection.clone();
    selection.database_url = Some(SCRATCH_DATABASE.to_string());
    let config = load_config(&selection, Some(&args.crawl));

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
        error!("Download failed: {}", e);
        drop(guards);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: CrawlConfig, started: DateTime<Local>) -> Result<(), Box<dyn std::error::Error>> {
    let mut scratch = establish_connection(&config.database_url)?;
    let library = PageLibrary::new(&args.output, config.home_url.as_str());
    info!("Saving pages to {}", library.dir().display());

    let transport = Archiving::new(HttpTransport::new(config.timeout)?, library);
    let report = harvest(config, transport, &mut scratch)?;

    summarize(&report, &started);
    Ok(())
}
