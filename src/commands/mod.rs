pub mod crawl;
pub mod download;
pub mod query;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::Args;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, Layer, Registry};

use crate::cazy::config::{load_settings, ConfigError, CrawlConfig, Overrides};
use crate::cazy::failures::{channel_layers, ChannelLogError};

/// Selection flags shared by every subcommand. Each list flag takes
/// comma-separated values and replaces the value from the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    // Config file, `assets/config` when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub database_url: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub classes: Option<Vec<String>>,
    #[arg(long, value_delimiter = ',')]
    pub families: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    pub genera: Option<Vec<String>>,
    #[arg(long, value_delimiter = ',')]
    pub species: Option<Vec<String>>,
    #[arg(long, value_delimiter = ',')]
    pub strains: Option<Vec<String>>,
    #[arg(long, value_delimiter = ',')]
    pub kingdoms: Option<Vec<String>>,
    #[arg(long = "ec", value_delimiter = ',')]
    pub ec_numbers: Option<Vec<String>>,

    // Include subfamilies
    #[arg(long)]
    pub subfamilies: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl SelectionArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            database_url: self.database_url.clone(),
            classes: self.classes.clone(),
            families: self.families.clone(),
            genera: self.genera.clone(),
            species: self.species.clone(),
            strains: self.strains.clone(),
            kingdoms: self.kingdoms.clone(),
            ec_numbers: self.ec_numbers.clone(),
            subfamilies: self.subfamilies.then_some(true),
            ..Default::default()
        }
    }
}

/// Crawl flags shared by `crawl` and `download`.
#[derive(Args, Debug, Clone, Default)]
pub struct CrawlArgs {
    #[arg(long, value_delimiter = ',')]
    pub excluded_classes: Option<Vec<String>>,

    // Retries per page and per class/family pass
    #[arg(short, long)]
    pub retries: Option<u32>,

    // Request timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    // Throttle requests regardless of the request size
    #[arg(long)]
    pub complete_download: bool,

    // Directory for the failure log files
    #[arg(short, long)]
    pub log_dir: Option<PathBuf>,
}

impl CrawlArgs {
    pub fn apply(&self, overrides: &mut Overrides) {
        overrides.retries = self.retries;
        overrides.timeout_secs = self.timeout;
        overrides.complete_download = self.complete_download.then_some(true);
        overrides.log_dir = self.log_dir.as_ref().map(|dir| dir.to_string_lossy().into_owned());
        overrides.excluded_classes = self.excluded_classes.clone();
    }
}

/// Settings file, environment and flags, validated.
pub fn load_config(selection: &SelectionArgs, crawl: Option<&CrawlArgs>) -> Result<CrawlConfig, ConfigError> {
    let mut overrides = selection.overrides();
    if let Some(crawl) = crawl {
        crawl.apply(&mut overrides);
    }
    let settings = load_settings(selection.config.as_deref(), &overrides)?;
    CrawlConfig::from_settings(settings)
}

/// Compact console output, plus one file per failure channel when
/// `channel_dir` is given. Keep the guards alive until the run ends.
pub fn init_logging(
    verbose: bool,
    channel_dir: Option<&Path>,
    started: &DateTime<Local>,
) -> Result<Vec<WorkerGuard>, ChannelLogError> {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> =
        vec![fmt::layer().compact().with_filter(level).boxed()];
    let mut guards = Vec::new();

    if let Some(dir) = channel_dir {
        let (channels, channel_guards) = channel_layers::<Registry>(dir, started)?;
        layers.extend(channels);
        guards = channel_guards;
    }

    tracing_subscriber::registry().with(layers).init();
    Ok(guards)
}
