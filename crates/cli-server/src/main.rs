//! CLI entry point for post-snap
//!
//! Loads the configuration, installs logging and starts the server.

use clap::Parser;
use post_snap::{telemetry, Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// post-snap - render social media posts to images and videos over HTTP
#[derive(Parser, Debug)]
#[command(name = "post-snap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional TOML configuration file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the file and PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Skip startup checks (renderer, ffmpeg, session file). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if let Err(e) = telemetry::init(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "post-snap starting");

    let daemon_result = if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        Daemon::new(config)
    };

    let daemon = match daemon_result {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "failed to initialize");
            return ExitCode::FAILURE;
        }
    };

    match daemon.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}
