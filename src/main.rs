use clap::Parser;

use cazy_harvest::cli::{Cli, Commands};
use cazy_harvest::commands;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => {
            commands::crawl::command(args);
        }
        Commands::Download(args) => {
            commands::download::command(args);
        }
        Commands::Query(args) => {
            commands::query::command(args);
        }
    }
}
