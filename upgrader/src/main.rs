//! PAN-OS Upgrade - Entry Point
//!
//! Upgrades Palo Alto Networks firewalls, singly or as a fleet through
//! Panorama, with backups, readiness gates and pre/post snapshots.

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::info;

use pan_os_upgrade::cli::commands::execute;
use pan_os_upgrade::cli::{Cli, EXIT_CONFIG_ERROR};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli, await_shutdown_signal()).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e.to_string().as_str().red());
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Ctrl+C received, shutting down...");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}
