// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use simple_logger::SimpleLogger;
use sq_launcher::config::{config_path, load_config};
use sq_launcher::factory::CommandFactory;
use sq_launcher::handoff;
use sq_launcher::{FileCommandChannel, JavaRuntime, ProcessLauncher, Scheduler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};

#[derive(Parser, Debug)]
#[command(version, about = "Runs and supervises the search engine, web server and compute engine")]
struct Args {
    /// Launcher configuration file (falls back to $SQ_LAUNCHER_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(&config_path(args.config))?;
    SimpleLogger::new().with_level(config.log_level()?).init()?;
    info!(
        "sq-launcherd starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("creating {}", config.temp_dir.display()))?;
    match handoff::remove_stale_files(&config.temp_dir) {
        Ok(0) => {}
        Ok(n) => info!("removed {n} stale process properties files"),
        Err(e) => warn!("failed to clean {}: {e}", config.temp_dir.display()),
    }
    let channel = FileCommandChannel::open(&config.temp_dir)?;
    channel.clean();

    let runtime = config
        .java_path
        .clone()
        .map(JavaRuntime::new)
        .unwrap_or_else(JavaRuntime::detect);
    info!("using java at {}", runtime.java_path.display());
    let launcher = ProcessLauncher::new(config.temp_dir.clone(), runtime, Arc::new(channel));
    let mut scheduler = Scheduler::new(CommandFactory::new(config)?, launcher);
    let cancel = scheduler.cancellation_token();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let supervision = scheduler.run();
    tokio::pin!(supervision);

    let outcome = tokio::select! {
        outcome = &mut supervision => outcome,
        _ = sigterm.recv() => {
            info!("received SIGTERM");
            cancel.cancel();
            supervision.await
        }
        _ = sigint.recv() => {
            info!("received SIGINT");
            cancel.cancel();
            supervision.await
        }
    };

    info!("sq-launcherd shutting down ({outcome})");
    Ok(ExitCode::from(outcome.exit_code()))
}
