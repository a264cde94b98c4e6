//! HTTP Handlers

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use pix_payments::{
    webhook::verify_signature, Charge, ChargeId, ChargeRequest, ChargeResult, ChargeStatus,
    PaymentError, StatusReport, WebhookPayload,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gateway: String,
    pub gateway_reachable: bool,
    pub tracked_charges: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Response body of the legacy `/mp-pix` route, kept for the existing form client
#[derive(Debug, Serialize)]
pub struct LegacyChargeResponse {
    pub message: &'static str,
    pub pix: LegacyPix,
    pub payment: LegacyPayment,
}

#[derive(Debug, Serialize)]
pub struct LegacyPix {
    pub qr_code: String,
    pub qr_code_base64: String,
    pub ticket_url: Option<String>,
    pub copia_e_cola: String,
}

#[derive(Debug, Serialize)]
pub struct LegacyPayment {
    pub id: ChargeId,
    pub status: ChargeStatus,
}

impl From<ChargeResult> for LegacyChargeResponse {
    fn from(result: ChargeResult) -> Self {
        Self {
            message: "Pagamento criado com sucesso!",
            pix: LegacyPix {
                qr_code: result.copy_paste_code.clone(),
                qr_code_base64: result.qr_code_base64,
                ticket_url: result.ticket_url,
                copia_e_cola: result.copy_paste_code,
            },
            payment: LegacyPayment {
                id: result.id,
                status: result.status,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookReceipt {
    pub received: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// Map library errors onto HTTP statuses
fn payment_error(err: &PaymentError) -> ApiError {
    let (status, code) = match err {
        PaymentError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        PaymentError::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
        PaymentError::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT"),
        PaymentError::DuplicateCharge(_) => (StatusCode::CONFLICT, "DUPLICATE_CHARGE"),
        PaymentError::WebhookSignature(_) => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
        PaymentError::Config(_) | PaymentError::Storage(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };

    if status.is_server_error() {
        tracing::error!(error = %err, code, "Request failed");
    }

    api_error(status, code, err.user_message())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway_reachable = state.gateway.health_check().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        gateway: state.gateway.name().to_string(),
        gateway_reachable,
        tracked_charges: state.store.len().unwrap_or_default(),
    })
}

/// Create a Pix charge
pub async fn create_charge(
    State(state): State<AppState>,
    payload: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<Json<ChargeResult>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!("Rejected charge body: {}", rejection);
        api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", rejection.body_text())
    })?;

    let result = state
        .initiator
        .create_charge(request)
        .await
        .map_err(|e| payment_error(&e))?;

    Ok(Json(result))
}

/// Create a Pix charge, answering in the `/mp-pix` response shape
pub async fn create_charge_legacy(
    state: State<AppState>,
    payload: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<Json<LegacyChargeResponse>, ApiError> {
    let Json(result) = create_charge(state, payload).await?;
    Ok(Json(LegacyChargeResponse::from(result)))
}

/// Poll the status of a charge
pub async fn charge_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    let report = state
        .reconciler
        .poll_status(&ChargeId::new(id))
        .await
        .map_err(|e| payment_error(&e))?;

    Ok(Json(report))
}

/// Fetch the stored charge record
pub async fn get_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Charge>, ApiError> {
    state
        .reconciler
        .charge(&ChargeId::new(id))
        .map(Json)
        .map_err(|e| payment_error(&e))
}

/// Mercado Pago webhook handler
///
/// Always answers 200 once the request is read, so the gateway does not keep
/// redelivering notifications we cannot use. The one exception is a bad
/// signature when a secret is configured.
pub async fn mp_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookReceipt>), ApiError> {
    let payload = WebhookPayload::parse(&body, &query);

    if let Some(secret) = state.webhook_secret.as_deref() {
        let signature = header(&headers, "x-signature").ok_or_else(|| {
            tracing::warn!("Webhook without signature rejected");
            api_error(StatusCode::UNAUTHORIZED, "MISSING_SIGNATURE", "Missing x-signature")
        })?;

        let data_id = query
            .get("data.id")
            .map(String::as_str)
            .or_else(|| payload.charge_id().map(ChargeId::as_str));

        verify_signature(secret, signature, header(&headers, "x-request-id"), data_id).map_err(|e| {
            tracing::warn!("Webhook signature failed: {}", e);
            payment_error(&e)
        })?;
    }

    match state.reconciler.receive_webhook(payload).await {
        Ok(ack) => tracing::debug!(ack = ?ack, "Webhook processed"),
        Err(e) => tracing::warn!(error = %e, "Webhook acknowledged without effect"),
    }

    Ok((StatusCode::OK, Json(WebhookReceipt { received: true })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::Request,
        Router,
    };
    use hmac::{Hmac, Mac};
    use pix_payments::{ChargeStore, MemoryChargeStore, MockGateway};
    use sha2::Sha256;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn app_with(gateway: Arc<MockGateway>, secret: Option<&str>) -> (Router, Arc<MemoryChargeStore>) {
        let store = Arc::new(MemoryChargeStore::new());
        let state = AppState::new(
            gateway,
            store.clone(),
            Duration::from_secs(1),
            secret.map(str::to_string),
            None,
        );
        (crate::router(state), store)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_charge_webhook_poll_flow() {
        let gateway = Arc::new(MockGateway::new());
        let (app, store) = app_with(gateway.clone(), None);

        let (status, created) = send(&app, post_json("/api/pix", &json!({"amount": "10.50"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["status"], "PENDING");
        assert!(created["qr_code_data_uri"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        let id = created["id"].as_str().unwrap().to_string();

        let (status, ack) =
            send(&app, post_json("/webhook/mp", &json!({"id": id, "status": "approved"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["received"], true);
        assert_eq!(
            store.get(&ChargeId::new(id.clone())).unwrap().unwrap().status,
            ChargeStatus::Approved
        );

        let (status, report) = send(&app, get(&format!("/api/pix/{id}/status"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report, json!({"paid": true, "status": "APPROVED"}));
    }

    #[tokio::test]
    async fn test_legacy_route_accepts_form_fields() {
        let (app, _) = app_with(Arc::new(MockGateway::new()), None);

        let (status, created) = send(
            &app,
            post_json("/mp-pix", &json!({"valor": 50.0, "nome": "Ana", "email": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["message"], "Pagamento criado com sucesso!");
        assert_eq!(created["payment"]["status"], "PENDING");
        assert!(!created["pix"]["qr_code_base64"].as_str().unwrap().is_empty());

        let copia_e_cola = created["pix"]["copia_e_cola"].as_str().unwrap();
        assert!(!copia_e_cola.is_empty());
        assert_eq!(created["pix"]["qr_code"], copia_e_cola);

        let id = created["payment"]["id"].as_str().unwrap();
        let (status, report) = send(&app, get(&format!("/api/pix/{id}/status"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["paid"], false);
    }

    #[tokio::test]
    async fn test_create_validation_errors_are_400() {
        let gateway = Arc::new(MockGateway::new());
        let (app, _) = app_with(gateway.clone(), None);

        let (status, body) = send(&app, post_json("/api/pix", &json!({"amount": "0"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let bad_json = Request::post("/api/pix")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&app, bad_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_502() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_with("invalid access token");
        let (app, _) = app_with(gateway, None);

        let (status, body) = send(&app, post_json("/api/pix", &json!({"amount": "5"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "GATEWAY_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_charge_is_404() {
        let (app, _) = app_with(Arc::new(MockGateway::new()), None);

        let (status, body) = send(&app, get("/api/pix/nonexistent/status")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(&app, get("/api/pix/nonexistent")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_always_acknowledges() {
        let (app, store) = app_with(Arc::new(MockGateway::new()), None);

        for body in [
            Body::from("garbage"),
            Body::from(json!({"status": "approved"}).to_string()),
            Body::from(json!({"id": "ghost", "status": "approved"}).to_string()),
            Body::from(json!({"type": "merchant_order", "data": {"id": "1"}}).to_string()),
        ] {
            let request = Request::post("/webhook/mp").body(body).unwrap();
            let (status, _) = send(&app, request).await;
            assert_eq!(status, StatusCode::OK);
        }

        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_webhook_signature_enforced_when_configured() {
        let (app, _) = app_with(Arc::new(MockGateway::new()), Some("s3cret"));

        let unsigned = post_json("/webhook/mp", &json!({"id": "1", "status": "approved"}));
        let (status, body) = send(&app, unsigned).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "MISSING_SIGNATURE");

        let forged = Request::post("/webhook/mp?data.id=1&type=payment")
            .header("x-signature", "ts=1704908010,v1=deadbeef")
            .header("x-request-id", "req-1")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, forged).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_SIGNATURE");
    }

    fn sign(secret: &str, manifest: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn test_signed_notification_updates_charge() {
        let gateway = Arc::new(MockGateway::new());
        let (app, store) = app_with(gateway.clone(), Some("s3cret"));

        let (_, created) = send(&app, post_json("/api/pix", &json!({"amount": "25"}))).await;
        let id = created["id"].as_str().unwrap().to_string();
        gateway.set_status(&ChargeId::new(id.clone()), "approved");

        let ts = "1704908010";
        let digest = sign("s3cret", &format!("id:{id};request-id:req-1;ts:{ts};"));
        let signed = Request::post(format!("/webhook/mp?data.id={id}&type=payment"))
            .header("content-type", "application/json")
            .header("x-signature", format!("ts={ts},v1={digest}"))
            .header("x-request-id", "req-1")
            .body(Body::from(
                json!({"type": "payment", "action": "payment.updated", "data": {"id": id}})
                    .to_string(),
            ))
            .unwrap();

        let (status, ack) = send(&app, signed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["received"], true);
        assert_eq!(
            store.get(&ChargeId::new(id)).unwrap().unwrap().status,
            ChargeStatus::Approved
        );
        assert_eq!(gateway.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_root_is_liveness() {
        let (app, _) = app_with(Arc::new(MockGateway::new()), None);

        let (status, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_reports_gateway() {
        let (app, _) = app_with(Arc::new(MockGateway::new()), None);

        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gateway"], "MockGateway");
        assert_eq!(body["tracked_charges"], 0);
    }
}
