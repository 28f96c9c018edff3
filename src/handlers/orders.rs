use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::StaffIdentity;
use crate::entities::order::{FulfillmentMode, Model as OrderModel, OrderStatus};
use crate::entities::order_item::Model as OrderItemModel;
use crate::errors::ServiceError;
use crate::handlers::{success_response, validate_input};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub name: String,
    pub qty: i32,
    pub unit_price_cents: i64,
}

/// Customer-facing order view: no contact details beyond what the customer
/// already knows.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicOrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub fulfillment_mode: FulfillmentMode,
    pub items_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub items: Vec<OrderLineResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminOrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub fulfillment_mode: FulfillmentMode,
    pub pickup_location_id: Option<String>,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub payment_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub items_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub items: Vec<OrderLineResponse>,
}

fn line_responses(items: Vec<OrderItemModel>) -> Vec<OrderLineResponse> {
    items
        .into_iter()
        .map(|item| OrderLineResponse {
            product_id: item.product_id,
            name: item.name_snapshot,
            qty: item.qty,
            unit_price_cents: item.unit_price_cents,
        })
        .collect()
}

/// GET /api/v1/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order summary", body = PublicOrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_public(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state
        .services
        .orders
        .get_order_with_items(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

    Ok(success_response(PublicOrderResponse {
        id: order.id,
        status: order.status,
        fulfillment_mode: order.fulfillment_mode,
        items_total_cents: order.items_total_cents,
        shipping_total_cents: order.shipping_total_cents,
        grand_total_cents: order.grand_total_cents,
        created_at: order.created_at,
        tracking_number: order.tracking_number,
        tracking_url: order.tracking_url,
        items: line_responses(items),
    }))
}

fn admin_response(order: OrderModel, items: Vec<OrderItemModel>) -> AdminOrderResponse {
    AdminOrderResponse {
        id: order.id,
        status: order.status,
        fulfillment_mode: order.fulfillment_mode,
        pickup_location_id: order.pickup_location_id,
        customer_email: order.customer_email,
        customer_phone: order.customer_phone,
        payment_session_id: order.payment_session_id,
        payment_intent_id: order.payment_intent_id,
        items_total_cents: order.items_total_cents,
        shipping_total_cents: order.shipping_total_cents,
        grand_total_cents: order.grand_total_cents,
        created_at: order.created_at,
        paid_at: order.paid_at,
        fulfilled_at: order.fulfilled_at,
        canceled_at: order.canceled_at,
        tracking_number: order.tracking_number,
        tracking_url: order.tracking_url,
        items: line_responses(items),
    }
}

/// GET /api/v1/admin/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail", body = AdminOrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("staff_token" = [])),
    tag = "Orders"
)]
pub async fn get_order_admin(
    State(state): State<AppState>,
    _staff: StaffIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state
        .services
        .orders
        .get_order_with_items(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

    Ok(success_response(admin_response(order, items)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MarkShippedRequest {
    #[validate(length(min = 1, max = 64))]
    pub tracking_number: String,
    #[validate(url)]
    pub tracking_url: Option<String>,
}

/// POST /api/v1/admin/orders/{id}/mark-shipped
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/mark-shipped",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = MarkShippedRequest,
    responses(
        (status = 200, description = "Order marked as shipped", body = AdminOrderResponse),
        (status = 400, description = "Wrong mode or status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("staff_token" = [])),
    tag = "Orders"
)]
pub async fn mark_shipped(
    State(state): State<AppState>,
    _staff: StaffIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<MarkShippedRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let order = state
        .services
        .orders
        .mark_shipped(id, &payload.tracking_number, payload.tracking_url)
        .await?;

    let items = state
        .services
        .orders
        .get_order_with_items(id)
        .await?
        .map(|(_, items)| items)
        .unwrap_or_default();

    Ok(success_response(admin_response(order, items)))
}

/// POST /api/v1/admin/orders/{id}/resend-email
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/resend-email",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Email re-queued"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Pickup secret purged", body = crate::errors::ErrorResponse)
    ),
    security(("staff_token" = [])),
    tag = "Orders"
)]
pub async fn resend_email(
    State(state): State<AppState>,
    _staff: StaffIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let email_type = state.services.orders.resend_confirmation(id).await?;

    Ok(success_response(json!({
        "success": true,
        "message": "Email added to queue",
        "email_type": email_type,
    })))
}
