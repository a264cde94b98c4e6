//! Status Reconciler
//!
//! Keeps the authoritative local status of every charge. Two signals feed it:
//! client polls (which ask the gateway) and gateway webhooks (which arrive on
//! their own schedule). Both go through the same transition rule, so the
//! order in which they land does not matter.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::charge::{Charge, ChargeId, ChargeStatus, StatusReport, TransitionOutcome};
use crate::error::{PaymentError, Result};
use crate::gateway::{call_with_timeout, PaymentGateway, DEFAULT_GATEWAY_TIMEOUT};
use crate::store::ChargeStore;
use crate::webhook::WebhookPayload;

/// Acknowledgement for a processed webhook
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookAck {
    /// Status applied (or discarded by the transition rule) for a tracked charge
    Processed {
        charge_id: ChargeId,
        status: ChargeStatus,
        outcome: TransitionOutcome,
    },

    /// The charge is not tracked here; nothing to update
    UnknownCharge { charge_id: ChargeId },

    /// Notification about something we do not track
    Ignored { kind: String },
}

/// Reconciles charge status from polls and webhooks
pub struct StatusReconciler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn ChargeStore>,
    timeout: Duration,
}

impl StatusReconciler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn ChargeStore>) -> Self {
        Self {
            gateway,
            store,
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Bound on each gateway status lookup
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read-only lookup
    pub fn charge(&self, id: &ChargeId) -> Result<Charge> {
        self.store
            .get(id)?
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))
    }

    /// Ask the gateway for the current status and fold it into the store.
    ///
    /// Gateway failures are returned as errors; the cached status is not
    /// served in their place.
    pub async fn poll_status(&self, id: &ChargeId) -> Result<StatusReport> {
        // Fail fast on ids we never issued, before spending a gateway call
        self.charge(id)?;

        let upstream = self.fetch_upstream(id).await?;
        let mapped = ChargeStatus::from_upstream(&upstream);

        let charge = self.apply(id, mapped, "poll")?;
        Ok(StatusReport::from(charge.status))
    }

    /// Handle an inbound notification.
    ///
    /// Malformed payloads are a `Validation` error and change nothing; the
    /// HTTP layer still acknowledges them so the sender does not retry.
    pub async fn receive_webhook(&self, payload: WebhookPayload) -> Result<WebhookAck> {
        let (charge_id, status) = match payload {
            WebhookPayload::Malformed { reason } => {
                tracing::warn!(reason = %reason, "Discarding malformed webhook");
                return Err(PaymentError::Validation(format!("malformed webhook: {reason}")));
            }

            WebhookPayload::Unsupported { kind } => {
                tracing::debug!(kind = %kind, "Ignoring webhook for unsupported topic");
                return Ok(WebhookAck::Ignored { kind });
            }

            WebhookPayload::StatusUpdate { charge_id, status } => {
                if self.store.get(&charge_id)?.is_none() {
                    return Ok(Self::unknown_charge(charge_id));
                }
                (charge_id, status)
            }

            WebhookPayload::Notification { charge_id } => {
                if self.store.get(&charge_id)?.is_none() {
                    return Ok(Self::unknown_charge(charge_id));
                }
                let upstream = self.fetch_upstream(&charge_id).await?;
                (charge_id, ChargeStatus::from_upstream(&upstream))
            }
        };

        let now = Utc::now();
        match self.store.transition(&charge_id, status, now)? {
            Some((charge, outcome)) => {
                Self::log_outcome(&charge, status, outcome, "webhook");
                Ok(WebhookAck::Processed {
                    charge_id,
                    status: charge.status,
                    outcome,
                })
            }
            None => Ok(Self::unknown_charge(charge_id)),
        }
    }

    async fn fetch_upstream(&self, id: &ChargeId) -> Result<String> {
        call_with_timeout(self.timeout, self.gateway.fetch_status(id))
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    charge_id = %id,
                    gateway = self.gateway.name(),
                    error = %e,
                    "Status lookup failed"
                );
            })
    }

    fn apply(&self, id: &ChargeId, incoming: ChargeStatus, source: &str) -> Result<Charge> {
        let (charge, outcome) = self
            .store
            .transition(id, incoming, Utc::now())?
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))?;

        Self::log_outcome(&charge, incoming, outcome, source);
        Ok(charge)
    }

    fn unknown_charge(charge_id: ChargeId) -> WebhookAck {
        tracing::info!(charge_id = %charge_id, "Webhook for untracked charge discarded");
        WebhookAck::UnknownCharge { charge_id }
    }

    fn log_outcome(charge: &Charge, incoming: ChargeStatus, outcome: TransitionOutcome, source: &str) {
        match outcome {
            TransitionOutcome::Applied { from, to } => {
                tracing::info!(
                    charge_id = %charge.id,
                    from = %from,
                    to = %to,
                    source,
                    "Charge status changed"
                );
            }
            TransitionOutcome::Refreshed => {
                tracing::debug!(charge_id = %charge.id, status = %charge.status, source, "Status unchanged");
            }
            TransitionOutcome::ConflictIgnored { current, incoming } => {
                tracing::warn!(
                    charge_id = %charge.id,
                    current = %current,
                    incoming = %incoming,
                    source,
                    "Late status ignored; terminal state is final"
                );
            }
            TransitionOutcome::UnknownIgnored => {
                tracing::warn!(
                    charge_id = %charge.id,
                    incoming = %incoming,
                    source,
                    "Unrecognised upstream status ignored"
                );
            }
        }
    }
}
