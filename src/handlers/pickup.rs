use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::StaffIdentity;
use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::validate_input;
use crate::services::redemption::RedemptionError;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RedeemRequest {
    /// The clear secret, from a scanned QR code or manual entry.
    #[validate(length(min = 16, max = 128))]
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RedeemedOrderResponse {
    pub id: Uuid,
    pub customer_email: String,
    pub grand_total_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RedeemResponse {
    pub success: bool,
    pub message: String,
    pub order: RedeemedOrderResponse,
}

/// POST /api/v1/admin/pickup/redeem
///
/// Distinct statuses per failure so the counter UI can message each case:
/// 404 unknown, 410 expired, 409 already used (with who/when), 400 wrong
/// order state (with the current status).
#[utoipa::path(
    post,
    path = "/api/v1/admin/pickup/redeem",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Pickup validated", body = RedeemResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 410, description = "Expired token", body = ErrorResponse),
        (status = 409, description = "Token already used", body = ErrorResponse),
        (status = 400, description = "Order not redeemable", body = ErrorResponse)
    ),
    security(("staff_token" = [])),
    tag = "Pickup"
)]
pub async fn redeem(
    State(state): State<AppState>,
    staff: StaffIdentity,
    Json(payload): Json<RedeemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    match state
        .services
        .redemption
        .redeem(&payload.token, &staff.email)
        .await
    {
        Ok(order) => Ok((
            StatusCode::OK,
            axum::Json(RedeemResponse {
                success: true,
                message: "Pickup validated successfully".to_string(),
                order: RedeemedOrderResponse {
                    id: order.order_id,
                    customer_email: order.customer_email,
                    grand_total_cents: order.grand_total_cents,
                    created_at: order.created_at,
                },
            }),
        )
            .into_response()),
        Err(err) => Ok(redemption_error_response(err)),
    }
}

fn redemption_error_response(err: RedemptionError) -> Response {
    let (status, details) = match &err {
        RedemptionError::NotFound => (StatusCode::NOT_FOUND, None),
        RedemptionError::Expired { expires_at } => (
            StatusCode::GONE,
            Some(json!({ "expires_at": expires_at })),
        ),
        RedemptionError::AlreadyUsed { used_at, used_by } => (
            StatusCode::CONFLICT,
            Some(json!({ "used_at": used_at, "used_by": used_by })),
        ),
        RedemptionError::InvalidState { status, .. } => (
            StatusCode::BAD_REQUEST,
            Some(json!({ "current_status": status })),
        ),
        RedemptionError::Db(_) => {
            return ServiceError::InternalError(err.to_string()).into_response();
        }
    };

    let body = ErrorResponse::new(status, err.to_string(), details);
    (status, axum::Json(body)).into_response()
}
