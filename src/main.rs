//! x402 facilitator HTTP entrypoint.
//!
//! Launches an Axum server exposing the x402 facilitator interface: payment
//! verification and settlement on EVM and Solana networks.
//!
//! Endpoints:
//! - `GET /verify` / `POST /verify` — verification schema / verify a payment
//! - `GET /settle` / `POST /settle` — settlement schema / settle a payment on-chain
//! - `GET /supported` — supported payment kinds (version/scheme/network)
//! - `GET /discovery/resources` — known payment-gated resources
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `RPC_URL_*`, `SIGNER_TYPE`, `EVM_PRIVATE_KEY`, `SVM_PRIVATE_KEY` configure chains
//! - `DISCOVERY_RESOURCES` seeds the discovery index
//! - `OTEL_*` variables enable OpenTelemetry export

use axum::http::Method;
use axum::routing::{get, post};
use axum::{Extension, Router};
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use paylane::discovery::DiscoveryIndex;
use paylane::facilitator_local::FacilitatorLocal;
use paylane::handlers;
use paylane::provider_cache::ProviderCache;
use paylane::sig_down::SigDown;
use paylane::telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _telemetry = Telemetry::new();

    let provider_cache = ProviderCache::from_env().await?;
    let facilitator = FacilitatorLocal::new(provider_cache);
    let discovery_index = Arc::new(DiscoveryIndex::from_env()?);

    let app = Router::new()
        .route("/verify", get(handlers::get_verify_info))
        .route("/verify", post(handlers::post_verify))
        .route("/settle", get(handlers::get_settle_info))
        .route("/settle", post(handlers::post_settle))
        .route("/supported", get(handlers::get_supported))
        .route(
            "/discovery/resources",
            get(handlers::get_discovery_resources),
        )
        .layer(Extension(facilitator))
        .layer(Extension(discovery_index))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{host}:{port}");
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };
    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
