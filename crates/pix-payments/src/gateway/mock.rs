//! Mock Payment Gateway
//!
//! For testing and demo purposes. Issues sequential charge ids and answers
//! status lookups from a script the caller controls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use super::{GatewayCharge, GatewayChargeRequest, PaymentGateway};
use crate::charge::ChargeId;
use crate::error::{PaymentError, Result};

/// Mock gateway with scripted statuses
pub struct MockGateway {
    next_id: AtomicU64,
    statuses: RwLock<HashMap<ChargeId, String>>,
    failure: RwLock<Option<String>>,
    latency: Duration,
    create_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            statuses: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
            latency: Duration::ZERO,
            create_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every call (for timeout testing)
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    /// Script the upstream status returned for `id`
    pub fn set_status(&self, id: &ChargeId, status: impl Into<String>) {
        if let Ok(mut statuses) = self.statuses.write() {
            statuses.insert(id.clone(), status.into());
        }
    }

    /// Make every call fail with `message` until cleared
    pub fn fail_with(&self, message: impl Into<String>) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = Some(message.into());
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = None;
        }
    }

    /// Number of `create` calls received
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_status` calls received
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failure = self
            .failure
            .read()
            .map_err(|_| PaymentError::Gateway("mock state poisoned".into()))?
            .clone();

        match failure {
            Some(message) => Err(PaymentError::Gateway(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create(&self, request: &GatewayChargeRequest) -> Result<GatewayCharge> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let id = ChargeId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        self.set_status(&id, "pending");

        Ok(GatewayCharge {
            copy_paste_code: format!(
                "00020126580014br.gov.bcb.pix0136{id}5204000053039865405{}5802BR",
                request.amount
            ),
            qr_code_base64: "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==".into(),
            ticket_url: None,
            status: "pending".into(),
            id,
        })
    }

    async fn fetch_status(&self, id: &ChargeId) -> Result<String> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        self.statuses
            .read()
            .map_err(|_| PaymentError::Gateway("mock state poisoned".into()))?
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::Gateway(format!("HTTP 404: Payment not found ({id})")))
    }

    async fn health_check(&self) -> bool {
        true // Mock always healthy
    }

    fn name(&self) -> &str {
        "MockGateway"
    }
}
