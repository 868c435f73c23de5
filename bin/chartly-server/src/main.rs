// SPDX-License-Identifier: AGPL-3.0-only
// Minimal bootstrap; all runtime logic & handlers reside in library modules.
use anyhow::{Context, Result};
use chartly::{ChartlyEngine, EngineConfig};
use chartly_server::{build_router, sweeper::spawn_session_sweeper, AppState, ServerOptions};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "chartly-server", about = "Dataset profiling and chart recommendation API")]
struct Cli {
    /// TOML configuration file; `config/chartly.toml` is used when present.
    #[arg(long, env = "CHARTLY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "CHARTLY_ADDR", default_value = "127.0.0.1:8000")]
    addr: SocketAddr,

    #[arg(long)]
    debug: bool,

    /// `*` or a comma-separated list of allowed origins.
    #[arg(long, env = "CHARTLY_CORS_ORIGIN", default_value = "*")]
    cors_origin: String,

    #[arg(long, env = "CHARTLY_UPLOAD_LIMIT_MB", default_value_t = 20)]
    upload_limit_mb: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let default_filter = if cli.debug {
        "debug,tower_http=debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.clone().or_else(|| {
        let default = EngineConfig::default_config_path();
        default.exists().then_some(default)
    });
    let config = EngineConfig::load(config_path.as_deref()).with_context(|| {
        format!(
            "failed to load configuration{}",
            config_path
                .as_ref()
                .map(|p| format!(" from {}", p.display()))
                .unwrap_or_default()
        )
    })?;
    info!(
        config = config_path
            .as_ref()
            .map_or("defaults".to_string(), |p| p.display().to_string()),
        ttl_secs = config.sessions.ttl_secs,
        max_sessions = config.sessions.max_sessions,
        "Configuration loaded"
    );
    let sweep_every = Duration::from_secs(config.sessions.sweep_interval_secs);

    let state = AppState::new(ChartlyEngine::from_config(config)?);
    let _sweeper = spawn_session_sweeper(Arc::clone(&state.engine), sweep_every);

    let options = ServerOptions {
        cors_origin: cli.cors_origin.clone(),
        upload_limit_bytes: cli.upload_limit_mb * 1024 * 1024,
    };
    let app = build_router(state, &options);

    info!("Starting chartly server on {}", cli.addr);
    info!("Upload limit: {} MB", cli.upload_limit_mb);
    let listener = tokio::net::TcpListener::bind(cli.addr)
        .await
        .with_context(|| format!("failed to bind {}", cli.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
