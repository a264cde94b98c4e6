//! Mercado Pago Gateway
//!
//! Creates Pix payments through the Mercado Pago REST API and reads back
//! their status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;

use super::{GatewayCharge, GatewayChargeRequest, PaymentGateway, DEFAULT_GATEWAY_TIMEOUT};
use crate::charge::ChargeId;
use crate::error::{PaymentError, Result};

/// Mercado Pago client configuration
#[derive(Clone, Debug)]
pub struct MercadoPagoConfig {
    /// API base URL
    pub base_url: String,

    /// Access token (`APP_USR-...` or `TEST-...`)
    pub access_token: String,

    /// Public URL Mercado Pago should post notifications to
    pub notification_url: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl MercadoPagoConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.mercadopago.com".into(),
            access_token: access_token.into(),
            notification_url: None,
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("MP_ACCESS_TOKEN")
            .map_err(|_| PaymentError::Config("MP_ACCESS_TOKEN not set".into()))?;

        let mut config = Self::new(access_token);
        if let Ok(base_url) = std::env::var("MP_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.notification_url = std::env::var("MP_NOTIFICATION_URL").ok();
        if let Some(ms) = std::env::var("GATEWAY_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
        {
            config.timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

/// Mercado Pago payment resource, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct PaymentResource {
    id: serde_json::Value,
    status: Option<String>,
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    qr_code: Option<String>,
    qr_code_base64: Option<String>,
    ticket_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    error: Option<String>,
}

/// Mercado Pago client
pub struct MercadoPagoClient {
    client: reqwest::Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoClient {
    /// Create from configuration
    pub fn from_config(config: MercadoPagoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(MercadoPagoConfig::from_env()?)
    }

    fn payments_url(&self) -> String {
        format!("{}/v1/payments", self.config.base_url)
    }

    fn map_send_error(&self, err: reqwest::Error) -> PaymentError {
        if err.is_timeout() {
            PaymentError::GatewayTimeout(self.config.timeout)
        } else {
            PaymentError::Gateway(err.to_string())
        }
    }

    /// Turn a non-2xx response into a `Gateway` error carrying the upstream message
    async fn upstream_error(response: Response) -> PaymentError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ApiError>(&body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or_else(|| body.chars().take(200).collect());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                PaymentError::Gateway(format!("authentication rejected ({status}): {message}"))
            }
            _ => PaymentError::Gateway(format!("HTTP {}: {message}", status.as_u16())),
        }
    }

    async fn read_payment(&self, response: Response) -> Result<PaymentResource> {
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        response
            .json::<PaymentResource>()
            .await
            .map_err(|e| PaymentError::Gateway(format!("unreadable payment body: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create(&self, request: &GatewayChargeRequest) -> Result<GatewayCharge> {
        let amount = request.amount.to_f64().ok_or_else(|| {
            PaymentError::Validation(format!("amount {} is out of range", request.amount))
        })?;

        let mut body = json!({
            "transaction_amount": amount,
            "description": request.description,
            "payment_method_id": "pix",
            "payer": {
                "email": request.payer_email,
                "first_name": request.payer_name,
            },
        });
        if let Some(url) = &self.config.notification_url {
            body["notification_url"] = json!(url);
        }

        let response = self
            .client
            .post(self.payments_url())
            .bearer_auth(&self.config.access_token)
            .header("X-Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let payment = self.read_payment(response).await?;

        let id = ChargeId::from_json(&payment.id)
            .ok_or_else(|| PaymentError::Gateway("payment response without id".into()))?;

        let data = payment
            .point_of_interaction
            .and_then(|poi| poi.transaction_data)
            .ok_or_else(|| PaymentError::Gateway(format!("payment {id} has no Pix data")))?;

        let (Some(copy_paste_code), Some(qr_code_base64)) = (data.qr_code, data.qr_code_base64)
        else {
            return Err(PaymentError::Gateway(format!(
                "payment {id} is missing its QR code"
            )));
        };

        tracing::debug!(charge_id = %id, "Mercado Pago payment created");

        Ok(GatewayCharge {
            id,
            status: payment.status.unwrap_or_else(|| "pending".into()),
            qr_code_base64,
            copy_paste_code,
            ticket_url: data.ticket_url,
        })
    }

    async fn fetch_status(&self, id: &ChargeId) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/{}", self.payments_url(), id))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let payment = self.read_payment(response).await?;

        payment
            .status
            .ok_or_else(|| PaymentError::Gateway(format!("payment {id} has no status")))
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/search?limit=1", self.payments_url()))
            .bearer_auth(&self.config.access_token)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!("Mercado Pago health check failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "MercadoPago"
    }
}
