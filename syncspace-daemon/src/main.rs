//! SyncSpace Daemon (`syncspaced`)
//!
//! Headless backend serving the command dispatcher over gRPC. Binds
//! `host:port` (0 picks an ephemeral port and announces it via
//! `ANY_SYNC_PORT_FILE`), handles SIGINT/SIGTERM with a graceful stop, and
//! shuts the backend down on exit.

mod config;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use syncspace_rpc::RpcServer;
use syncspace_runtime::{register_all, Backend, CommandError, Dispatcher};

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "syncspaced", version, about = "SyncSpace Backend Daemon")]
struct Args {
    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (0 for ephemeral)
    #[arg(long)]
    port: Option<u16>,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    init_tracing(&config, args.verbose);
    tracing::info!("syncspaced v{} starting...", env!("CARGO_PKG_VERSION"));

    let backend = Backend::new();
    let mut dispatcher = Dispatcher::new();
    register_all(&mut dispatcher, backend.clone());
    let dispatcher = Arc::new(dispatcher);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    spawn_health_ticker(backend.clone(), config.health_check_interval, shutdown.clone());

    let server = RpcServer::new(backend.clone(), dispatcher)
        .with_bind(config.host.clone(), config.port)
        .with_port_file(config.port_file.clone())
        .with_fallback_data_dir(config.db_path.clone());

    let result = server.run(shutdown.clone()).await;
    shutdown.cancel();

    // Close the dispatcher's backing state regardless of how serving ended.
    match backend.shutdown() {
        Ok(()) | Err(CommandError::NotInitialized) => {}
        Err(e) => tracing::warn!(error = %e, "backend shutdown error"),
    }

    result?;
    tracing::info!("daemon stopped");
    Ok(())
}

fn init_tracing(config: &Config, verbosity: u8) {
    let mut filter = EnvFilter::from_default_env();

    // RUST_LOG wins; otherwise -v flags, otherwise the configured level.
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => config.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        };
        if let Ok(directive) = level.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if config.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("failed to listen for Ctrl+C");
        }
        tracing::info!("shutdown signal received...");
        shutdown.cancel();
    });
}

fn spawn_health_ticker(backend: Arc<Backend>, interval_secs: u64, shutdown: CancellationToken) {
    if interval_secs == 0 {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    tracing::debug!(initialized = backend.is_initialized(), "health tick");
                }
            }
        }
    });
}
