use axum::{
    extract::{Json, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::order::FulfillmentMode;
use crate::errors::ServiceError;
use crate::handlers::{success_response, validate_input};
use crate::services::checkout::CheckoutInput;
use crate::services::orders::ConsentRecord;
use crate::services::pricing::CartLine;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 50, message = "Cart must contain between 1 and 50 lines"))]
    pub items: Vec<CartLine>,
    pub fulfillment_mode: FulfillmentMode,
    pub pickup_location_id: Option<String>,
    #[validate(length(max = 30))]
    pub customer_phone: Option<String>,
    /// Consent to the privacy policy; checkout is refused without it.
    pub consent: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub session_id: String,
    /// Hosted payment page the client must redirect to.
    pub redirect_url: String,
}

/// POST /api/v1/checkout
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment session created", body = CheckoutResponse),
        (status = 400, description = "Invalid cart or missing consent", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn initiate_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let consent = ConsentRecord {
        ip_address: client_ip(&headers),
        user_agent: header_value(&headers, http::header::USER_AGENT.as_str()),
    };

    let outcome = state
        .services
        .checkout
        .initiate_checkout(CheckoutInput {
            items: payload.items,
            fulfillment_mode: payload.fulfillment_mode,
            pickup_location_id: payload.pickup_location_id,
            customer_phone: payload.customer_phone,
            consent_given: payload.consent,
            consent,
        })
        .await?;

    Ok(success_response(CheckoutResponse {
        order_id: outcome.order_id,
        session_id: outcome.session_id,
        redirect_url: outcome.redirect_url,
    }))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// First address in X-Forwarded-For, when present.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn client_ip_absent_without_header() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
