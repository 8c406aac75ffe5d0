mod config;
mod db;
mod discovery;
mod error;
mod host;
mod inference;
mod scanner;
mod web;
mod wol;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::Settings;
use db::{HostStore, SqliteHostStore};
use discovery::DiscoveryService;
use web::AppState;
use wol::WolService;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();
    init_tracing(settings.log_json);

    let discovery_config = settings
        .discovery_config()
        .context("invalid discovery configuration")?;

    let db_path = settings.database_path();
    let store: Arc<dyn HostStore> = Arc::new(
        SqliteHostStore::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?,
    );
    info!(path = %db_path.display(), "Host store ready");

    let service = Arc::new(DiscoveryService::new(
        scanner::default_providers(&settings),
        Arc::clone(&store),
        discovery_config,
    ));
    let wol = Arc::new(WolService::new(
        store,
        settings.wol_broadcast_address,
        settings.wol_port,
    ));

    if settings.no_autostart {
        info!("Discovery autostart disabled");
    } else {
        service.start().await?;
    }

    let server = web::start(
        settings.bind.clone(),
        settings.port,
        AppState {
            discovery: Arc::clone(&service),
            wol,
        },
    );

    tokio::select! {
        result = server => match result {
            Ok(Ok(())) => warn!("Web server exited"),
            Ok(Err(e)) => error!(error = %e, "Web server failed"),
            Err(e) => error!(error = %e, "Web server task panicked"),
        },
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Shutdown requested");
        }
    }

    service.stop().await;
    Ok(())
}
