//! TubeTorrent - turn video watch pages into torrents
//!
//! Submits a watch page to a remote seeding backend, follows the job until
//! the torrent is ready, and saves the `.torrent` file.
//!
//! # Usage
//!
//! ```bash
//! tubetorrent config set --api-url https://torrents.example.com --api-key KEY
//! tubetorrent grab "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
//! tubetorrent track 3f2a9c --stream --json
//! ```

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tubetorrent::Config;

use crate::cli::{Cli, Command, ExitCode, Output};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    run_cli(cli).await.into()
}

/// Log to stderr so JSON on stdout stays parseable
fn init_logging(cli: &Cli) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match cli.command {
        Command::Submit(cmd) => commands::submit_cmd(cmd, &config, &output).await,

        Command::Track(cmd) => commands::track_cmd(cmd, &config, &output).await,

        Command::Grab(cmd) => commands::grab_cmd(cmd, &config, &output).await,

        Command::Cookies(cmd) => commands::cookies_cmd(cmd, &config, &output).await,

        Command::Config(cmd) => commands::config_cmd(cmd, config, cli.config.as_deref(), &output),
    }
}
