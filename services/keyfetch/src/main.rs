use clap::Parser;
use keyfetch::config::Args;
use keyfetch::supervisor::{self, Dial, Mode};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = std::fs::create_dir_all(&args.keydir) {
        eprintln!(
            "FATAL: failed to create keydir {}: {err}",
            args.keydir.display()
        );
        std::process::exit(1);
    }

    let fqdn = args.fqdn.clone().or_else(local_fqdn);

    let dial = Dial {
        server: args.resolved_server().to_owned(),
        port: args.resolved_port(),
        use_tls: !args.disable_ssl,
        hostname: fqdn,
    };

    info!(
        server = %dial.server,
        port = dial.port,
        tls = dial.use_tls,
        keydir = %args.keydir.display(),
        "keyfetch starting"
    );

    let shutdown = CancellationToken::new();
    let shutdown_for_signals = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_for_signals.cancel();
    });

    supervisor::run(dial, args.keydir, Mode::Stream, shutdown).await;
    info!("keyfetch shut down");
}

/// Best-effort local hostname lookup for the declared FQDN when `--fqdn`
/// is not given. `gethostname(2)` returns the node name, not a
/// fully-qualified reverse-DNS name as Python's `socket.getfqdn()` would,
/// but no DNS resolution is worth doing at startup just for a default.
fn local_fqdn() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger shutdown.
/// Mirrors the teacher's `shutdown_signal` pattern in
/// `services/server/src/main.rs`.
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
