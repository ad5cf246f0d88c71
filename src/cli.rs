use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Subcommand, Debug)]
pub enum Commands {
    Crawl(commands::crawl::Args),
    Download(commands::download::Args),
    Query(commands::query::Args),
}

#[derive(Parser)]
#[command(
    name = "cazy-harvest",
    color = clap::ColorChoice::Always,
    author = "CAZy harvest",
    version = "0.1.0",
    about = "Crawl the CAZy database into a local SQLite store and query it",
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}
