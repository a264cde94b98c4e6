//! # pix-payments
//!
//! Pix charge creation and status reconciliation.
//!
//! ## Charge Lifecycle
//!
//! ```text
//! ┌──────────┐  create   ┌─────────────────┐  insert   ┌──────────────┐
//! │  Client  │──────────▶│ ChargeInitiator │──────────▶│              │
//! └──────────┘           └─────────────────┘           │ ChargeStore  │
//!      │ poll                                           │  id → Charge │
//!      ▼                                                │              │
//! ┌──────────────────┐        transition (atomic)      │              │
//! │ StatusReconciler │────────────────────────────────▶│              │
//! └──────────────────┘                                 └──────────────┘
//!      ▲ webhook
//! ┌──────────┐
//! │ Gateway  │
//! └──────────┘
//! ```
//!
//! A charge starts PENDING. Polls and webhooks may land in any order and any
//! number of times; the first terminal status (APPROVED or REJECTED) wins and
//! is never overwritten.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pix_payments::{ChargeInitiator, ChargeRequest, MemoryChargeStore, MercadoPagoClient, StatusReconciler};
//!
//! let gateway = Arc::new(MercadoPagoClient::from_env()?);
//! let store = Arc::new(MemoryChargeStore::new());
//!
//! let initiator = ChargeInitiator::new(gateway.clone(), store.clone());
//! let reconciler = StatusReconciler::new(gateway, store);
//!
//! let charge = initiator.create_charge(ChargeRequest::new(dec!(10.50))).await?;
//! // Render charge.qr_code_data_uri, then poll:
//! let report = reconciler.poll_status(&charge.id).await?;
//! ```

mod charge;
mod error;
pub mod gateway;
mod initiator;
mod reconciler;
mod store;
pub mod webhook;

pub use charge::{
    Charge, ChargeId, ChargeRequest, ChargeResult, ChargeStatus, StatusReport,
    TransitionOutcome, ValidatedCharge,
};
pub use error::{PaymentError, Result};
pub use gateway::{MercadoPagoClient, MercadoPagoConfig, MockGateway, PaymentGateway};
pub use initiator::ChargeInitiator;
pub use reconciler::{StatusReconciler, WebhookAck};
pub use store::{ChargeStore, MemoryChargeStore};
pub use webhook::WebhookPayload;
