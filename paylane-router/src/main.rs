//! paylane router server.
//!
//! # Usage
//!
//! ```bash
//! ADMIN_PKEY=0x... cargo run -p paylane-router --release
//!
//! # Configure logging level
//! RUST_LOG=info ADMIN_PKEY=0x... cargo run -p paylane-router
//! ```
//!
//! Configuration comes entirely from the environment; see
//! [`paylane_router::config::RouterConfig`].

use std::net::SocketAddr;
use std::sync::Arc;

use alloy_network::EthereumWallet;
use axum::http::Method;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use paylane_evm::{
    AttestationClient, ChainClient, ChainClients, PermitSubmitter, TransferEngine,
};
use paylane_router::config::RouterConfig;
use paylane_router::handlers;
use paylane_router::seed;
use paylane_router::service::RouterService;
use paylane_store::PaymentStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Router failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = RouterConfig::from_env()?;
    tracing::info!(
        port = config.port,
        admin = %config.admin_address,
        attestation = %config.attestation_api_url,
        "Loaded configuration"
    );

    let registry = Arc::new(config.registry.clone());
    let wallet = EthereumWallet::from(config.admin_signer.clone());

    // One client per supported chain; admin writes serialize per chain.
    let mut clients = Vec::new();
    for chain_id in registry.supported_chains() {
        let rpc_url = registry.rpc_url(chain_id)?;
        match ChainClient::connect(chain_id, &rpc_url, wallet.clone(), config.receipt_timeout) {
            Ok(client) => clients.push(Arc::new(client)),
            Err(e) => {
                tracing::warn!(chain_id, "Skipping chain: {e}");
            }
        }
    }
    if clients.is_empty() {
        return Err("no chain clients could be constructed".into());
    }
    let clients = ChainClients::new(clients);

    let store = match &config.store_path {
        Some(path) => PaymentStore::open(path)?,
        None => PaymentStore::in_memory(),
    };
    if let Ok(seed_path) = std::env::var("SEED_PATH") {
        seed::apply_seed_file(&store, seed_path.as_ref()).await?;
    }

    let attestation = AttestationClient::new(config.attestation_api_url.clone())
        .with_max_wait(config.attestation_max_wait);
    let engine = TransferEngine::new(
        clients.clone(),
        Arc::clone(&registry),
        store.clone(),
        attestation,
        config.transfer_type,
    );
    let submitter = PermitSubmitter::new(clients.clone(), Arc::clone(&registry));
    let service = Arc::new(RouterService::new(
        store,
        registry,
        clients,
        engine,
        submitter,
        config.admin_address,
        config.publisher_timeout,
        config.rate_limit_per_minute,
    ));

    let app = handlers::router(service)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Router listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Router shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
