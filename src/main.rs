//! CLI entry point for the bookshelf tool.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

mod app_config;
mod cli;
mod commands;

use app_config::{Settings, load_default_file_config};
use cli::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Log level priority: `RUST_LOG` env var > quiet flag > verbose flag > default (info).
fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let loaded = load_default_file_config()?;
    if let Some(path) = loaded.path.as_deref().filter(|_| loaded.config.is_some()) {
        debug!(path = %path.display(), "loaded config file");
    }

    let settings = Settings::resolve(
        args.db.as_deref(),
        args.checkpoint_dir.as_deref(),
        loaded.config.as_ref(),
    );
    debug!(?settings, "resolved settings");

    match &args.command {
        Command::Init => commands::run_init_command(&settings).await,
        Command::Seed(job) => commands::run_seed_command(&settings, job, args.quiet).await,
        Command::Search(search) => commands::run_search_command(&settings, search).await,
        Command::Show { id } => commands::run_show_command(&settings, *id).await,
    }
}
