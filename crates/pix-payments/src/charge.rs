//! Charge Model
//!
//! The tracked Pix charge, its status vocabulary and the transition rule
//! shared by polling and webhook delivery.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Payer email sent to the gateway when the caller leaves it blank
pub const DEFAULT_PAYER_EMAIL: &str = "cliente@example.com";

/// Payer first name sent to the gateway when the caller leaves it blank
pub const DEFAULT_PAYER_NAME: &str = "Cliente";

/// Charge description shown on the payer's bank app
pub const DEFAULT_DESCRIPTION: &str = "Cobrança via Pix";

/// Gateway-assigned charge identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeId(String);

impl ChargeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Gateways send ids as JSON numbers or strings
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChargeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChargeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Local charge status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Pending,
    Approved,
    Rejected,
    /// Upstream reported something we do not recognise; never stored
    Unknown,
}

impl ChargeStatus {
    /// Map the gateway's status vocabulary onto the local enum
    pub fn from_upstream(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Self::Approved,
            "rejected" | "cancelled" | "refunded" | "charged_back" => Self::Rejected,
            "pending" | "in_process" => Self::Pending,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to create a Pix charge
///
/// Accepts the Portuguese field names posted by the legacy `/mp-pix` form
/// (`valor`, `nome`, `email`) as well as the English ones.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    #[serde(default, alias = "valor")]
    pub amount: Option<Decimal>,

    #[serde(default, alias = "nome", alias = "payer_name")]
    pub payer_name: Option<String>,

    #[serde(default, alias = "email", alias = "payer_email")]
    pub payer_email: Option<String>,
}

/// A charge request that passed validation, with defaults filled in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedCharge {
    pub amount: Decimal,
    pub payer_name: String,
    pub payer_email: String,
}

impl ChargeRequest {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Default::default()
        }
    }

    /// Check the amount and fill in payer defaults
    pub fn validate(&self) -> Result<ValidatedCharge> {
        let amount = self
            .amount
            .ok_or_else(|| PaymentError::Validation("amount is required".into()))?;

        if amount <= Decimal::ZERO {
            return Err(PaymentError::Validation(format!(
                "amount must be greater than zero, got {amount}"
            )));
        }

        if amount.normalize().scale() > 2 {
            return Err(PaymentError::Validation(format!(
                "amount must have at most two decimal places, got {amount}"
            )));
        }

        Ok(ValidatedCharge {
            amount,
            payer_name: non_blank(self.payer_name.as_deref())
                .unwrap_or(DEFAULT_PAYER_NAME)
                .to_string(),
            payer_email: non_blank(self.payer_email.as_deref())
                .unwrap_or(DEFAULT_PAYER_EMAIL)
                .to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Result of applying an incoming status to a charge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// PENDING moved to a terminal state
    Applied { from: ChargeStatus, to: ChargeStatus },

    /// Same status seen again; only the timestamp moved
    Refreshed,

    /// Terminal state already reached; the late signal was discarded
    ConflictIgnored {
        current: ChargeStatus,
        incoming: ChargeStatus,
    },

    /// Unrecognised upstream status; nothing changed
    UnknownIgnored,
}

impl TransitionOutcome {
    pub const fn changed_status(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// A tracked Pix charge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Charge {
    /// Gateway-assigned id
    pub id: ChargeId,

    pub status: ChargeStatus,

    pub amount: Decimal,

    pub description: String,

    /// PNG of the QR code, base64 encoded
    pub qr_code_base64: String,

    /// Pix "copia e cola" token
    pub copy_paste_code: String,

    /// Gateway-hosted payment page, when provided
    pub ticket_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub last_updated_at: DateTime<Utc>,
}

impl Charge {
    /// Apply the transition rule: terminal states are sticky, first terminal wins.
    pub fn apply(&mut self, incoming: ChargeStatus, now: DateTime<Utc>) -> TransitionOutcome {
        if incoming == ChargeStatus::Unknown {
            return TransitionOutcome::UnknownIgnored;
        }

        if incoming == self.status {
            self.last_updated_at = now;
            return TransitionOutcome::Refreshed;
        }

        if self.status.is_terminal() {
            return TransitionOutcome::ConflictIgnored {
                current: self.status,
                incoming,
            };
        }

        // Only PENDING -> PENDING is left for a non-terminal incoming status,
        // and that was handled as a refresh above.
        let from = self.status;
        self.status = incoming;
        self.last_updated_at = now;
        TransitionOutcome::Applied { from, to: incoming }
    }

    /// Render-ready view handed back to the caller that created the charge
    pub fn to_result(&self) -> ChargeResult {
        ChargeResult {
            id: self.id.clone(),
            status: self.status,
            qr_code_data_uri: format!("data:image/png;base64,{}", self.qr_code_base64),
            qr_code_base64: self.qr_code_base64.clone(),
            copy_paste_code: self.copy_paste_code.clone(),
            ticket_url: self.ticket_url.clone(),
        }
    }
}

/// Result of creating a charge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChargeResult {
    pub id: ChargeId,
    pub status: ChargeStatus,
    pub qr_code_base64: String,
    pub qr_code_data_uri: String,
    pub copy_paste_code: String,
    pub ticket_url: Option<String>,
}

/// Current status of a charge as reported to pollers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub paid: bool,
    pub status: ChargeStatus,
}

impl From<ChargeStatus> for StatusReport {
    fn from(status: ChargeStatus) -> Self {
        Self {
            paid: status.is_paid(),
            status,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_charge(id: &str) -> Charge {
    let now = Utc::now();
    Charge {
        id: ChargeId::new(id),
        status: ChargeStatus::Pending,
        amount: Decimal::new(1050, 2),
        description: DEFAULT_DESCRIPTION.into(),
        qr_code_base64: "iVBORw0KGgo=".into(),
        copy_paste_code: "00020126580014br.gov.bcb.pix".into(),
        ticket_url: None,
        created_at: now,
        last_updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_upstream_mapping() {
        assert_eq!(ChargeStatus::from_upstream("approved"), ChargeStatus::Approved);
        for raw in ["rejected", "cancelled", "refunded", "charged_back"] {
            assert_eq!(ChargeStatus::from_upstream(raw), ChargeStatus::Rejected);
        }
        assert_eq!(ChargeStatus::from_upstream("pending"), ChargeStatus::Pending);
        assert_eq!(ChargeStatus::from_upstream(" In_Process "), ChargeStatus::Pending);
        assert_eq!(ChargeStatus::from_upstream("authorized"), ChargeStatus::Unknown);
        assert_eq!(ChargeStatus::from_upstream(""), ChargeStatus::Unknown);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&ChargeStatus::Approved).unwrap();
        assert_eq!(json, "\"APPROVED\"");
    }

    #[test]
    fn test_validation_rejects_missing_and_non_positive_amounts() {
        assert!(matches!(
            ChargeRequest::default().validate(),
            Err(PaymentError::Validation(_))
        ));
        assert!(ChargeRequest::new(dec!(0)).validate().is_err());
        assert!(ChargeRequest::new(dec!(-5.00)).validate().is_err());
        assert!(ChargeRequest::new(dec!(1.005)).validate().is_err());
    }

    #[test]
    fn test_validation_fills_defaults() {
        let request = ChargeRequest {
            amount: Some(dec!(10.50)),
            payer_name: Some("   ".into()),
            payer_email: None,
        };
        let valid = request.validate().unwrap();
        assert_eq!(valid.amount, dec!(10.50));
        assert_eq!(valid.payer_name, DEFAULT_PAYER_NAME);
        assert_eq!(valid.payer_email, DEFAULT_PAYER_EMAIL);
    }

    #[test]
    fn test_request_accepts_form_field_names() {
        let request: ChargeRequest =
            serde_json::from_str(r#"{"valor": 50.0, "nome": "Ana", "email": "ana@example.com"}"#)
                .unwrap();
        assert_eq!(request.amount, Some(dec!(50)));
        assert_eq!(request.payer_name.as_deref(), Some("Ana"));
        assert_eq!(request.payer_email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_pending_reaches_terminal() {
        let mut charge = sample_charge("1");
        let outcome = charge.apply(ChargeStatus::Approved, Utc::now());
        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                from: ChargeStatus::Pending,
                to: ChargeStatus::Approved
            }
        );
        assert_eq!(charge.status, ChargeStatus::Approved);
    }

    #[test]
    fn test_same_status_only_refreshes_timestamp() {
        let mut charge = sample_charge("1");
        charge.apply(ChargeStatus::Approved, Utc::now());
        let before = charge.clone();
        let later = before.last_updated_at + Duration::seconds(30);

        assert_eq!(charge.apply(ChargeStatus::Approved, later), TransitionOutcome::Refreshed);
        assert_eq!(charge.status, before.status);
        assert_eq!(charge.copy_paste_code, before.copy_paste_code);
        assert_eq!(charge.created_at, before.created_at);
        assert_eq!(charge.last_updated_at, later);
    }

    #[test]
    fn test_terminal_is_sticky() {
        let mut charge = sample_charge("1");
        charge.apply(ChargeStatus::Approved, Utc::now());

        for late in [ChargeStatus::Rejected, ChargeStatus::Pending] {
            let outcome = charge.apply(late, Utc::now());
            assert_eq!(
                outcome,
                TransitionOutcome::ConflictIgnored {
                    current: ChargeStatus::Approved,
                    incoming: late
                }
            );
            assert_eq!(charge.status, ChargeStatus::Approved);
        }
    }

    #[test]
    fn test_unknown_never_overwrites() {
        let mut charge = sample_charge("1");
        let stamp = charge.last_updated_at;
        assert_eq!(
            charge.apply(ChargeStatus::Unknown, Utc::now()),
            TransitionOutcome::UnknownIgnored
        );
        assert_eq!(charge.status, ChargeStatus::Pending);
        assert_eq!(charge.last_updated_at, stamp);
    }

    #[test]
    fn test_result_carries_data_uri() {
        let result = sample_charge("42").to_result();
        assert_eq!(result.qr_code_data_uri, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(result.id.as_str(), "42");
        assert_eq!(result.status, ChargeStatus::Pending);
    }
}
