use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zenkey_config::{ConfigLoad, ConfigLoader};
use zenkey_core::InMemoryAccountStore;
use zenkey_server::{
    create_app,
    infra::startup::{ServerRuntime, build_runtime, container_runner, seed_bootstrap_account},
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "zenkey-server")]
#[command(about = "USB scan station: device presence, container scans and realtime status")]
struct Cli {
    /// Path to a zenkey.toml file
    #[arg(short, long, env = "ZENKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Dotenv file to load instead of `./.env`
    #[arg(long, env = "ZENKEY_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config.clone() {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = cli.env_file.clone() {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,usb::presence=info,scan::session=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    info!(
        device.mount_path = %config.device.mount_path.display(),
        device.poll_interval = ?config.device.poll_interval,
        scanner.runtime = %config.scanner.container_runtime,
        scanner.image = %config.scanner.image,
        scanner.timeout = ?config.scanner.timeout,
        "scan station configuration in effect"
    );

    let addr = config.server.bind_addr();
    let runner = Arc::new(container_runner(&config));
    let accounts = Arc::new(InMemoryAccountStore::new());
    let shutdown = CancellationToken::new();

    let ServerRuntime { state, service } =
        build_runtime(config, runner, accounts, shutdown.clone());
    if let Err(err) = seed_bootstrap_account(&state).await {
        warn!(error = %err, "failed to create bootstrap operator account");
    }

    let router = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting ZenKey scan station on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("server error")?;

    shutdown.cancel();
    if let Err(err) = service.await {
        warn!(error = %err, "scan service task ended abnormally");
    }
    info!("scan station stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels `token` so the service actor and
/// open sockets wind down with the listener.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
    token.cancel();
}
