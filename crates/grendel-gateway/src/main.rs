//! Grendel server.
//!
//! Serves the provisioning API, BMC orchestration and iPXE boot scripts
//! from a single process backed by a local RocksDB store.
//!
//! # Configuration
//!
//! Every setting comes from the environment; see [`Settings::from_env`].
//! Without `AUTH_SECRET` a random signing secret is generated, so tokens do
//! not survive a restart.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grendel_auth::HmacValidator;
use grendel_bmc::RedfishConnector;
use grendel_control::ControlPlaneService;
use grendel_gateway::{create_router, GatewayState, Settings};
use grendel_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grendel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting grendel");

    let settings = Settings::from_env()?;
    tracing::info!(
        listen_addr = %settings.gateway.listen_addr,
        data_dir = %settings.gateway.data_dir.display(),
        boot_base_url = ?settings.gateway.boot_base_url,
        request_timeout_seconds = settings.gateway.request_timeout_seconds,
        bmc_username = %settings.bmc.username,
        bmc_insecure_tls = settings.bmc.insecure_tls,
        max_concurrency = settings.engine.max_concurrency,
        batch_timeout_ms = settings.engine.batch_timeout_ms,
        retries = settings.engine.retries,
        template_dir = ?settings.engine.template_dir,
        "Configuration loaded"
    );
    if settings.ephemeral_secret {
        tracing::warn!("AUTH_SECRET not set - using a random secret, tokens end with this process");
    }

    tracing::info!(path = %settings.gateway.data_dir.display(), "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&settings.gateway.data_dir)?);

    let sessions = Arc::new(HmacValidator::new(&settings.auth));
    let connector = Arc::new(RedfishConnector::new(settings.bmc.clone()));
    let mut control = ControlPlaneService::new(
        store,
        connector,
        Arc::clone(&sessions),
        &settings.auth,
        settings.engine.clone(),
    );
    if let Some(url) = &settings.gateway.boot_base_url {
        control = control.with_boot_base_url(url.clone());
    }
    tracing::info!("Control plane initialized");

    let listen_addr = settings.gateway.listen_addr.clone();
    let state = GatewayState::new(Arc::new(control), sessions, settings.gateway);
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
