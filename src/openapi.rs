use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::{entities, errors, handlers, services};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Comptoir Municipal API",
        description = "Municipal boutique storefront backend",
        version = "0.1.0"
    ),
    paths(
        handlers::products::list_products,
        handlers::products::cart_totals,
        handlers::checkout::initiate_checkout,
        handlers::payment_webhooks::payment_webhook,
        handlers::orders::get_order_public,
        handlers::orders::get_order_admin,
        handlers::orders::mark_shipped,
        handlers::orders::resend_email,
        handlers::pickup::redeem,
        handlers::auth::login,
    ),
    components(schemas(
        handlers::products::ProductResponse,
        entities::order::OrderStatus,
        entities::order::FulfillmentMode,
        entities::email_queue::EmailType,
        entities::email_queue::EmailStatus,
        errors::ErrorResponse,
        services::pricing::CartLine,
        handlers::products::CartTotalsRequest,
        handlers::products::CartTotalsResponse,
        handlers::products::CartTotalsLine,
        handlers::checkout::CheckoutRequest,
        handlers::checkout::CheckoutResponse,
        handlers::orders::PublicOrderResponse,
        handlers::orders::AdminOrderResponse,
        handlers::orders::OrderLineResponse,
        handlers::orders::MarkShippedRequest,
        handlers::pickup::RedeemRequest,
        handlers::pickup::RedeemResponse,
        handlers::pickup::RedeemedOrderResponse,
        handlers::auth::LoginRequest,
        handlers::auth::LoginResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Catalogue", description = "Products and cart pricing"),
        (name = "Checkout", description = "Checkout initiation"),
        (name = "Payments", description = "Payment gateway webhooks"),
        (name = "Orders", description = "Order lookup and fulfillment"),
        (name = "Pickup", description = "Pickup token redemption"),
        (name = "Auth", description = "Staff authentication"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "staff_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// GET /api/v1/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
