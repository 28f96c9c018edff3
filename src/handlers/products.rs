use axum::{extract::Json, response::IntoResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::catalog::{self, Product};
use crate::entities::order::FulfillmentMode;
use crate::errors::ServiceError;
use crate::handlers::success_response;
use crate::services::pricing::{self, CartLine};

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub unit_price_cents: i64,
    pub shipping_cents_per_unit: i64,
    pub image: String,
    pub active: bool,
    pub stock_quantity: Option<i64>,
    pub tags: Vec<String>,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.to_string(),
            description: product.description.to_string(),
            unit_price_cents: product.unit_price_cents,
            shipping_cents_per_unit: product.shipping_cents_per_unit,
            image: product.image.to_string(),
            active: product.active,
            stock_quantity: product.stock_quantity,
            tags: product.tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// GET /api/v1/products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses(
        (status = 200, description = "Active catalogue", body = [ProductResponse])
    ),
    tag = "Catalogue"
)]
pub async fn list_products() -> impl IntoResponse {
    let products: Vec<ProductResponse> = catalog::active_products()
        .into_iter()
        .map(ProductResponse::from)
        .collect();
    success_response(products)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartTotalsRequest {
    pub items: Vec<CartLine>,
    pub fulfillment_mode: FulfillmentMode,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartTotalsLine {
    pub product_id: String,
    pub name: String,
    pub qty: i32,
    pub unit_price_cents: i64,
    pub item_total_cents: i64,
    pub shipping_total_cents: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartTotalsResponse {
    pub items_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
    pub lines: Vec<CartTotalsLine>,
}

/// POST /api/v1/cart/totals
///
/// Advisory pricing for the cart page. Checkout recomputes everything
/// server-side regardless of what this returned earlier.
#[utoipa::path(
    post,
    path = "/api/v1/cart/totals",
    request_body = CartTotalsRequest,
    responses(
        (status = 200, description = "Computed totals", body = CartTotalsResponse),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Catalogue"
)]
pub async fn cart_totals(
    Json(payload): Json<CartTotalsRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let totals = pricing::compute_cart_totals(&payload.items, payload.fulfillment_mode)?;

    let lines = totals
        .lines
        .iter()
        .map(|line| CartTotalsLine {
            product_id: line.product.id.to_string(),
            name: line.product.name.to_string(),
            qty: line.qty,
            unit_price_cents: line.product.unit_price_cents,
            item_total_cents: line.item_total_cents,
            shipping_total_cents: line.shipping_total_cents,
        })
        .collect();

    Ok(success_response(CartTotalsResponse {
        items_total_cents: totals.items_total_cents,
        shipping_total_cents: totals.shipping_total_cents,
        grand_total_cents: totals.grand_total_cents,
        lines,
    }))
}
