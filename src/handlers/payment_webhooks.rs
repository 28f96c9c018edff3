use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use bytes::Bytes;
use serde_json::json;

use crate::errors::ServiceError;
use crate::services::webhook::WebhookOutcome;
use crate::AppState;

/// Header carrying the gateway's `t=<ts>,v1=<hmac>` signature.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// POST /api/v1/payments/webhook
///
/// The raw body is required: signature verification runs over the exact
/// bytes the gateway signed, before any JSON parsing.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order for session", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing webhook signature".into()))?;

    let outcome = state.services.webhook.process(&body, signature).await?;

    Ok(Json(json!({
        "received": true,
        "skipped": outcome == WebhookOutcome::AlreadyProcessed,
    })))
}
