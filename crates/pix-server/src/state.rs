//! Application State

use std::sync::Arc;
use std::time::Duration;

use pix_payments::{ChargeInitiator, ChargeStore, PaymentGateway, StatusReconciler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Creates charges
    pub initiator: Arc<ChargeInitiator>,

    /// Polls and webhooks
    pub reconciler: Arc<StatusReconciler>,

    /// Payment gateway (Mercado Pago or mock)
    pub gateway: Arc<dyn PaymentGateway>,

    /// Charge store shared by initiator and reconciler
    pub store: Arc<dyn ChargeStore>,

    /// Webhook signing secret (None disables verification)
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn ChargeStore>,
        gateway_timeout: Duration,
        webhook_secret: Option<String>,
        charge_description: Option<String>,
    ) -> Self {
        let mut initiator =
            ChargeInitiator::new(gateway.clone(), store.clone()).with_timeout(gateway_timeout);
        if let Some(description) = charge_description {
            initiator = initiator.with_description(description);
        }
        let reconciler =
            StatusReconciler::new(gateway.clone(), store.clone()).with_timeout(gateway_timeout);

        Self {
            initiator: Arc::new(initiator),
            reconciler: Arc::new(reconciler),
            gateway,
            store,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}
