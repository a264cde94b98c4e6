//! Server Configuration
//!
//! Read from the environment (a `.env` file is loaded first by `main`).

use std::time::Duration;

use pix_payments::gateway::DEFAULT_GATEWAY_TIMEOUT;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown PIX_GATEWAY '{0}' (expected 'mercadopago' or 'mock')")]
    UnknownGateway(String),

    #[error("PIX_GATEWAY=mercadopago requires MP_ACCESS_TOKEN")]
    MissingToken,

    #[error("invalid GATEWAY_TIMEOUT_MS '{0}'")]
    InvalidTimeout(String),
}

/// Which payment gateway backs the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayKind {
    MercadoPago,
    Mock,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub gateway: GatewayKind,
    /// Set when `PIX_GATEWAY` named the gateway rather than it being inferred
    pub gateway_explicit: bool,
    /// Enables `x-signature` verification on the webhook route
    pub webhook_secret: Option<String>,
    pub gateway_timeout: Duration,
    /// Overrides the description sent with every charge
    pub charge_description: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let has_token = var("MP_ACCESS_TOKEN").is_some_and(|t| !t.trim().is_empty());

        let requested = var("PIX_GATEWAY").map(|g| g.to_lowercase());
        let gateway = match requested.as_deref() {
            Some("mercadopago" | "mp") if has_token => GatewayKind::MercadoPago,
            Some("mercadopago" | "mp") => return Err(ConfigError::MissingToken),
            Some("mock") => GatewayKind::Mock,
            Some(other) => return Err(ConfigError::UnknownGateway(other.to_string())),
            None if has_token => GatewayKind::MercadoPago,
            None => GatewayKind::Mock,
        };

        let gateway_timeout = match var("GATEWAY_TIMEOUT_MS") {
            Some(ms) => ms
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidTimeout(ms))?,
            None => DEFAULT_GATEWAY_TIMEOUT,
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            gateway,
            gateway_explicit: requested.is_some(),
            webhook_secret: var("MP_WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            gateway_timeout,
            charge_description: var("PIX_DESCRIPTION").filter(|d| !d.trim().is_empty()),
        })
    }
}
