use anyhow::{Context, Result};
use clap::Parser;
use std::{fmt, path::Path};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    config::{AppSettings, ConnectFailurePolicy, DEFAULT_CONFIG_PATH},
    repository::MongoRepository,
    routes::{RouteGroups, build_router},
    shutdown::shutdown_signal,
    state::AppState,
    tracing::{init_sentry, init_tracing},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub enum Commands {
    /// Start the web server
    Server {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Show version information
    Version,
}

/// Startup progress: `Init -> ConnectingDb -> Listening`, or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ConnectingDb,
    Listening,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::ConnectingDb => "connecting-db",
            Phase::Listening => "listening",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Connect to the database, then bind and serve until a shutdown signal.
///
/// The listener is never bound if the database is unreachable. What happens
/// next is decided by `database.on_connect_failure`.
pub async fn start(config: AppSettings, groups: RouteGroups) -> Result<()> {
    info!(phase = %Phase::Init, environment = ?config.environment, "Starting server");

    info!(phase = %Phase::ConnectingDb, "Connecting to database");
    let repository = match MongoRepository::connect(&config.database).await {
        Ok(repository) => repository,
        Err(err) => {
            error!(phase = %Phase::Failed, "Database connection failed: {err:#}");
            return match config.database.on_connect_failure {
                ConnectFailurePolicy::Exit => Err(err.context("database connection failed")),
                ConnectFailurePolicy::Idle => {
                    warn!("Listener not bound; idling until shutdown signal");
                    shutdown_signal().await;
                    Ok(())
                }
            };
        }
    };

    let address = config.server.full_url();
    let state = AppState::with_jwt(config, repository)?;
    let router = build_router(state, groups);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(phase = %Phase::Listening, "Server is running on http://{address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web server has gracefully shutdown");
    Ok(())
}

/// Run the CLI with the given route groups.
pub async fn run_with(groups: RouteGroups) -> Result<()> {
    let cli = Commands::parse();
    match cli {
        Commands::Server { config } => {
            let config = AppSettings::load(Path::new(&config))?;

            init_tracing(&config.logger, config.environment)?;
            let _sentry_guard = config
                .sentry
                .as_ref()
                .map(|sentry| init_sentry(sentry, config.environment))
                .transpose()?;
            start(config, groups).await?;
            Ok(())
        }
        Commands::Version => {
            println!(
                "{} ({})",
                env!("CARGO_PKG_VERSION"),
                option_env!("BUILD_SHA")
                    .or(option_env!("GITHUB_SHA"))
                    .unwrap_or("dev")
            );
            Ok(())
        }
    }
}

pub async fn run() -> Result<()> {
    run_with(RouteGroups::default()).await
}
