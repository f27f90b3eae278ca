use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use keyserver::config::ServerConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SSH authorized_keys distribution server.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the YAML server config (spec.md §6). Missing file at the
    /// default path is not an error -- the server runs on `ServerConfig`
    /// defaults so a minimal deployment needs no config at all.
    #[arg(long, default_value = "/etc/sshkeyd/keyserver.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = if args.config.exists() {
        match keyserver::config::load_config(&args.config) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("FATAL: failed to load config {}: {err}", args.config.display());
                std::process::exit(1);
            }
        }
    } else {
        ServerConfig::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let shutdown = CancellationToken::new();
    let shutdown_for_signals = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_for_signals.cancel();
    });

    let validate: Arc<dyn Fn(&str) -> bool + Send + Sync> = Arc::new(keys_core::default_validate);

    if let Err(err) = keyserver::run(config, validate, shutdown).await {
        eprintln!("FATAL: {err}");
        std::process::exit(1);
    }
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger shutdown.
/// Mirrors the teacher's `shutdown_signal` in `services/server/src/main.rs`.
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        () = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
