//! Charge Initiator
//!
//! Validates a charge request, hands it to the gateway and records the
//! resulting charge as PENDING.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::charge::{Charge, ChargeRequest, ChargeResult, ChargeStatus, DEFAULT_DESCRIPTION};
use crate::error::Result;
use crate::gateway::{
    call_with_timeout, GatewayChargeRequest, PaymentGateway, DEFAULT_GATEWAY_TIMEOUT,
};
use crate::store::ChargeStore;

/// Creates Pix charges
pub struct ChargeInitiator {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn ChargeStore>,
    timeout: Duration,
    description: String,
}

impl ChargeInitiator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn ChargeStore>) -> Self {
        Self {
            gateway,
            store,
            timeout: DEFAULT_GATEWAY_TIMEOUT,
            description: DEFAULT_DESCRIPTION.into(),
        }
    }

    /// Bound on the gateway call
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Description sent with every charge
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Create a charge.
    ///
    /// Invalid requests fail before the gateway is contacted. Gateway failures
    /// are not retried: creation is not idempotent on the gateway side.
    pub async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResult> {
        let valid = request.validate()?;

        let gateway_request = GatewayChargeRequest {
            amount: valid.amount,
            description: self.description.clone(),
            payer_name: valid.payer_name,
            payer_email: valid.payer_email,
        };

        let created = call_with_timeout(self.timeout, self.gateway.create(&gateway_request))
            .await
            .inspect_err(|e| {
                tracing::error!(
                    gateway = self.gateway.name(),
                    amount = %gateway_request.amount,
                    error = %e,
                    "Charge creation failed"
                );
            })?;

        let upstream = ChargeStatus::from_upstream(&created.status);
        if upstream != ChargeStatus::Pending {
            tracing::debug!(
                charge_id = %created.id,
                upstream = %created.status,
                "Gateway reported a non-pending status at creation; tracking as PENDING"
            );
        }

        let now = Utc::now();
        let charge = Charge {
            id: created.id,
            status: ChargeStatus::Pending,
            amount: gateway_request.amount,
            description: gateway_request.description,
            qr_code_base64: created.qr_code_base64,
            copy_paste_code: created.copy_paste_code,
            ticket_url: created.ticket_url,
            created_at: now,
            last_updated_at: now,
        };

        let result = charge.to_result();
        self.store.insert(charge)?;

        tracing::info!(
            charge_id = %result.id,
            amount = %gateway_request.amount,
            gateway = self.gateway.name(),
            "Created Pix charge"
        );

        Ok(result)
    }
}
