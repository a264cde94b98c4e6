//! Payment Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors surfaced by charge creation and status reconciliation
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Bad caller input; never reaches the gateway
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream call failed (network, non-2xx, unreadable body)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Upstream call did not complete in time
    #[error("Gateway timed out after {}ms", .0.as_millis())]
    GatewayTimeout(Duration),

    /// Unknown charge id
    #[error("Charge not found: {0}")]
    NotFound(String),

    /// A charge with this id is already tracked
    #[error("Charge already exists: {0}")]
    DuplicateCharge(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// True for both flavours of upstream failure
    pub const fn is_gateway(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::GatewayTimeout(_))
    }

    /// Check if the caller may retry on its own schedule
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Gateway(_) | Self::GatewayTimeout(_) | Self::Storage(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Gateway(msg) => format!("Payment gateway request failed: {msg}"),
            Self::GatewayTimeout(_) => "Payment gateway did not answer in time.".into(),
            Self::NotFound(_) => "Charge not found.".into(),
            Self::DuplicateCharge(_) => "Charge already registered.".into(),
            Self::WebhookSignature(_) => "Invalid webhook signature.".into(),
            Self::Config(_) => "Service configuration error.".into(),
            Self::Storage(_) => "An error occurred processing your request.".into(),
        }
    }
}
