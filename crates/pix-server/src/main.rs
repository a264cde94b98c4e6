//! pix-server
//!
//! Axum-based server that creates Pix charges, reports their status and
//! receives gateway webhooks.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pix_payments::{
    ChargeStore, MemoryChargeStore, MercadoPagoClient, MercadoPagoConfig, MockGateway,
    PaymentGateway,
};

use crate::config::{GatewayKind, ServerConfig};
use crate::handlers::{
    charge_status, create_charge, create_charge_legacy, get_charge, health_check, mp_webhook,
};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        // Charges
        .route("/api/pix", post(create_charge))
        .route("/mp-pix", post(create_charge_legacy))
        .route("/api/pix/{id}", get(get_charge))
        .route("/api/pix/{id}/status", get(charge_status))
        // Gateway notifications
        .route("/webhook/mp", post(mp_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize payment gateway
    let gateway: Arc<dyn PaymentGateway> = match config.gateway {
        GatewayKind::MercadoPago => {
            let mut mp_config = MercadoPagoConfig::from_env()?;
            mp_config.timeout = config.gateway_timeout;
            Arc::new(MercadoPagoClient::from_config(mp_config)?)
        }
        GatewayKind::Mock if config.gateway_explicit => {
            tracing::warn!("PIX_GATEWAY=mock - using mock gateway, no real charges are issued");
            Arc::new(MockGateway::new())
        }
        GatewayKind::Mock => {
            tracing::warn!("Mercado Pago not configured - using mock gateway");
            tracing::warn!("  Set MP_ACCESS_TOKEN in .env to issue real charges");
            Arc::new(MockGateway::new())
        }
    };

    if gateway.health_check().await {
        tracing::info!(gateway = gateway.name(), "Payment gateway reachable");
    } else {
        tracing::warn!(gateway = gateway.name(), "Payment gateway not reachable at startup");
    }

    if config.webhook_secret.is_none() {
        tracing::warn!("MP_WEBHOOK_SECRET not set - webhook signatures are not verified");
    }

    let store: Arc<dyn ChargeStore> = Arc::new(MemoryChargeStore::new());
    let state = AppState::new(
        gateway,
        store,
        config.gateway_timeout,
        config.webhook_secret.clone(),
        config.charge_description.clone(),
    );

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("pix-server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health               - Health check (alias: /)");
    tracing::info!("  POST /api/pix              - Create Pix charge");
    tracing::info!("  POST /mp-pix               - Create Pix charge, legacy response shape");
    tracing::info!("  GET  /api/pix/{{id}}         - Charge record");
    tracing::info!("  GET  /api/pix/{{id}}/status  - Poll charge status");
    tracing::info!("  POST /webhook/mp           - Mercado Pago notifications");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("pix-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
