use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connectu::cli::{open_database, run_command, Cli};
use connectu::config::Config;
use connectu::engine::{spawn_sweeper_task, PendingSweeper};
use connectu::notifications::dispatcher_from_config;
use connectu::roster::RosterValidator;
use connectu::store::{SqliteStore, Stores};
use connectu::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.command.is_some() {
        return run_command(&cli).await;
    }

    tracing::info!("Starting ConnectU v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db = open_database(&config).await?;
    let stores = Stores::from_backend(Arc::new(SqliteStore::new(db.clone())));

    if let Some(path) = &config.roster.import_path {
        RosterValidator::new(stores.roster.clone())
            .import_file(path)
            .await
            .context("Failed to import roster from roster.import_path")?;
    }

    if cli.skip_checks {
        tracing::warn!("Skipping startup self-checks");
    } else {
        let report =
            connectu::startup::run_startup_checks(&config, &db, stores.roster.as_ref()).await;
        if !report.all_critical_passed {
            anyhow::bail!("Startup aborted: {}", report.summary);
        }
    }

    let metrics_handle = connectu::api::metrics::init_metrics()?;

    // Create app state
    let dispatcher = dispatcher_from_config(&config.email);
    let state = Arc::new(
        AppState::new(config.clone(), stores.clone(), dispatcher).with_metrics(metrics_handle),
    );

    // Background tasks
    let sweeper = PendingSweeper::new(stores.pending.clone()).with_relay(state.relay.clone());
    spawn_sweeper_task(sweeper, config.registration.sweep_interval_secs);
    if config.rate_limit.enabled {
        connectu::api::rate_limit::spawn_cleanup_task(
            state.rate_limiter.clone(),
            config.rate_limit.cleanup_interval,
        );
    }

    let app = connectu::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
