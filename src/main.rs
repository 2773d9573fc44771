// SPDX-License-Identifier: Apache-2.0

//! Process entry point: the `server` subcommand loads a pipeline graph,
//! runs it, and shuts it down gracefully on interrupt or terminate.

use clap::{Parser, Subcommand};
use loggraph_config::PipelineSpec;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Linked for its factory registrations; stages resolve by `type` at runtime.
use loggraph_nodes as _;

#[derive(Parser)]
#[command(name = "loggraph", version, about = "Graph-structured log processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the logging server
    Server {
        /// The address to serve Prometheus metrics on
        #[arg(long, default_value = "127.0.0.1:4280")]
        metrics_address: SocketAddr,

        /// Path to the pipeline graph configuration
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start the async runtime");
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Server {
            metrics_address,
            config,
        } => runtime.block_on(run_server(metrics_address, &config)),
    };
    std::process::exit(code);
}

async fn run_server(metrics_address: SocketAddr, config_path: &std::path::Path) -> i32 {
    info!(version = env!("CARGO_PKG_VERSION"), "started loggraph");

    let spec = match PipelineSpec::from_file(config_path) {
        Ok(spec) => spec,
        Err(err) => {
            error!(error = %err, "failed to load pipeline configuration");
            return 1;
        }
    };
    let pipeline = match loggraph_engine::from_spec(&spec) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(error = %err, "failed to build pipeline");
            return 1;
        }
    };

    let metrics_shutdown = tokio_util::sync::CancellationToken::new();
    let metrics_task = tokio::spawn(loggraph_telemetry::server::serve(
        metrics_address,
        metrics_shutdown.clone(),
    ));

    let handle = pipeline.start();
    let kill = handle.kill_handle();
    let _ = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received; draining pipeline");
        kill.kill();
    });

    let code = match handle.wait().await {
        Ok(()) => {
            info!("clean shutdown");
            0
        }
        Err(err) => {
            error!(error = %err, "pipeline terminated abnormally");
            1
        }
    };

    metrics_shutdown.cancel();
    if let Ok(Err(err)) = metrics_task.await {
        error!(error = %err, "metrics endpoint failed");
    }
    code
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            // Fall back to interrupt only.
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
