//! Webhook Boundary
//!
//! Turns an untrusted notification body into a typed payload. Nothing past
//! this module looks at raw JSON.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::charge::{ChargeId, ChargeStatus};
use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Parsed webhook payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookPayload {
    /// Notification carrying both the charge id and its upstream status
    StatusUpdate {
        charge_id: ChargeId,
        status: ChargeStatus,
    },

    /// Notification that only names the charge; status must be looked up
    Notification { charge_id: ChargeId },

    /// Notification about something other than a payment
    Unsupported { kind: String },

    /// No usable charge id
    Malformed { reason: String },
}

impl WebhookPayload {
    /// Parse a notification from its body and query string.
    ///
    /// Accepted shapes:
    /// - `{"id": "123", "status": "approved"}`
    /// - `{"type": "payment", "data": {"id": "123"}}` (Mercado Pago webhook)
    /// - empty body with `?topic=payment&id=123` or `?type=payment&data.id=123`
    pub fn parse(body: &[u8], query: &HashMap<String, String>) -> Self {
        let json = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_slice::<Value>(body) {
                Ok(value @ Value::Object(_)) => value,
                Ok(_) => {
                    return Self::Malformed {
                        reason: "body is not a JSON object".into(),
                    };
                }
                Err(e) => {
                    return Self::Malformed {
                        reason: format!("invalid JSON: {e}"),
                    };
                }
            }
        };

        let kind = json
            .get("type")
            .or_else(|| json.get("topic"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| query.get("type").or_else(|| query.get("topic")).cloned());

        if let Some(kind) = kind.filter(|k| k != "payment") {
            return Self::Unsupported { kind };
        }

        let charge_id = json
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(ChargeId::from_json)
            .or_else(|| json.get("id").and_then(ChargeId::from_json))
            .or_else(|| {
                query
                    .get("data.id")
                    .or_else(|| query.get("id"))
                    .and_then(|id| ChargeId::from_json(&Value::String(id.clone())))
            });

        let Some(charge_id) = charge_id else {
            return Self::Malformed {
                reason: "missing charge id".into(),
            };
        };

        match json.get("status").and_then(Value::as_str) {
            Some(raw) => Self::StatusUpdate {
                charge_id,
                status: ChargeStatus::from_upstream(raw),
            },
            None => Self::Notification { charge_id },
        }
    }

    pub const fn charge_id(&self) -> Option<&ChargeId> {
        match self {
            Self::StatusUpdate { charge_id, .. } | Self::Notification { charge_id } => {
                Some(charge_id)
            }
            _ => None,
        }
    }
}

/// Verify a Mercado Pago `x-signature` header.
///
/// The header looks like `ts=1704908010,v1=<hex hmac>`; the signed manifest is
/// `id:{data_id};request-id:{request_id};ts:{ts};`, with parts omitted when the
/// corresponding value is absent.
pub fn verify_signature(
    secret: &str,
    signature_header: &str,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> Result<()> {
    let mut ts = None;
    let mut v1 = None;
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }

    let ts = ts.ok_or_else(|| PaymentError::WebhookSignature("missing ts".into()))?;
    let v1 = v1.ok_or_else(|| PaymentError::WebhookSignature("missing v1".into()))?;
    let expected = hex::decode(v1)
        .map_err(|_| PaymentError::WebhookSignature("v1 is not hex".into()))?;

    let mut manifest = String::new();
    if let Some(id) = data_id {
        // Alphanumeric ids are signed lowercased
        manifest.push_str(&format!("id:{};", id.to_ascii_lowercase()));
    }
    if let Some(request_id) = request_id {
        manifest.push_str(&format!("request-id:{request_id};"));
    }
    manifest.push_str(&format!("ts:{ts};"));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("webhook secret: {e}")))?;
    mac.update(manifest.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::WebhookSignature("digest mismatch".into()))
}
