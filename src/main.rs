mod artifacts;
mod cli;
mod commands;
mod config;
mod db;
mod error;
mod model;
mod ocr;
mod pipeline;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Import(args) => commands::import::run(args),
        Commands::Ocr(args) => commands::ocr::run(args),
        Commands::Parse(args) => commands::parse::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Confirm(args) => commands::confirm::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
