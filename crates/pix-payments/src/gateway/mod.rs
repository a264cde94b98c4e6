//! Payment Gateway Integration
//!
//! Abstraction over the external service that issues Pix charges and
//! reports their status.

mod mercadopago;
mod mock;

pub use mercadopago::{MercadoPagoClient, MercadoPagoConfig};
pub use mock::MockGateway;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::charge::ChargeId;
use crate::error::{PaymentError, Result};

/// Default bound on a single gateway call
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);

/// What we ask the gateway to charge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayChargeRequest {
    pub amount: Decimal,
    pub description: String,
    pub payer_name: String,
    pub payer_email: String,
}

/// Normalized gateway response to a charge creation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayCharge {
    pub id: ChargeId,
    /// Raw upstream status string
    pub status: String,
    pub qr_code_base64: String,
    pub copy_paste_code: String,
    pub ticket_url: Option<String>,
}

/// Payment gateway client trait (Strategy pattern)
///
/// Implement this for each provider. Retry and backoff, if any, belong to
/// the implementation; callers treat every call as a single attempt.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a Pix charge
    async fn create(&self, request: &GatewayChargeRequest) -> Result<GatewayCharge>;

    /// Fetch the raw upstream status of a charge
    async fn fetch_status(&self, id: &ChargeId) -> Result<String>;

    /// Check if the gateway is reachable
    async fn health_check(&self) -> bool;

    /// Gateway name
    fn name(&self) -> &str;
}

/// Bound a gateway call by `limit`, turning an elapsed deadline into `GatewayTimeout`.
pub async fn call_with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| PaymentError::GatewayTimeout(limit))?
}
