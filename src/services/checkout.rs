//! Checkout initiation: price the cart, persist a pending order, open a
//! hosted payment session and hand the redirect URL back to the caller.
//!
//! Payment is NOT confirmed here — only the webhook processor ever moves an
//! order to paid. The success page a customer lands on is cosmetic.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::order::FulfillmentMode;
use crate::errors::ServiceError;
use crate::services::orders::{ConsentRecord, CreatePendingOrder, OrderService};
use crate::services::payments::{CreateSessionRequest, PaymentGateway, SessionLineItem};
use crate::services::pricing::{self, CartLine};

/// Pickup counter used when the client does not name one.
const DEFAULT_PICKUP_LOCATION: &str = "town-hall-shop";

#[derive(Debug)]
pub struct CheckoutInput {
    pub items: Vec<CartLine>,
    pub fulfillment_mode: FulfillmentMode,
    pub pickup_location_id: Option<String>,
    pub customer_phone: Option<String>,
    pub consent_given: bool,
    pub consent: ConsentRecord,
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<OrderService>,
    gateway: Arc<dyn PaymentGateway>,
    app_url: String,
}

impl CheckoutService {
    pub fn new(orders: Arc<OrderService>, gateway: Arc<dyn PaymentGateway>, app_url: String) -> Self {
        Self {
            orders,
            gateway,
            app_url,
        }
    }

    /// Runs the full checkout initiation sequence. Totals are recomputed
    /// server-side whatever the client displayed; the pending order and its
    /// snapshots are committed before the gateway is contacted, so a gateway
    /// failure leaves a pending order that simply never receives a session.
    #[instrument(skip(self, input), fields(mode = ?input.fulfillment_mode, lines = input.items.len()))]
    pub async fn initiate_checkout(
        &self,
        input: CheckoutInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        if !input.consent_given {
            return Err(ServiceError::ValidationError(
                "consent to the privacy policy is required".into(),
            ));
        }

        let totals = pricing::compute_cart_totals(&input.items, input.fulfillment_mode)?;

        let pickup_location_id = match input.fulfillment_mode {
            FulfillmentMode::Pickup => Some(
                input
                    .pickup_location_id
                    .unwrap_or_else(|| DEFAULT_PICKUP_LOCATION.to_string()),
            ),
            FulfillmentMode::Delivery => None,
        };

        let order = self
            .orders
            .create_pending_order(CreatePendingOrder {
                fulfillment_mode: input.fulfillment_mode,
                pickup_location_id,
                customer_phone: input.customer_phone,
                totals: totals.clone(),
                consent: input.consent,
            })
            .await?;

        let mut line_items: Vec<SessionLineItem> = totals
            .lines
            .iter()
            .map(|line| SessionLineItem {
                name: line.product.name.to_string(),
                description: Some(line.product.description.to_string()),
                unit_amount_cents: line.product.unit_price_cents,
                quantity: i64::from(line.qty),
                image: Some(line.product.image.to_string()),
            })
            .collect();

        // Shipping appears as its own line on the payment page.
        if input.fulfillment_mode == FulfillmentMode::Delivery && totals.shipping_total_cents > 0 {
            line_items.push(SessionLineItem {
                name: "Shipping".to_string(),
                description: Some("Postal delivery".to_string()),
                unit_amount_cents: totals.shipping_total_cents,
                quantity: 1,
                image: None,
            });
        }

        let base = self.app_url.trim_end_matches('/');
        let session = self
            .gateway
            .create_session(CreateSessionRequest {
                order_id: order.id,
                line_items,
                success_url: format!("{base}/order/success?session={{CHECKOUT_SESSION_ID}}"),
                cancel_url: format!("{base}/cart"),
                collect_phone: input.fulfillment_mode == FulfillmentMode::Pickup,
                collect_shipping_address: input.fulfillment_mode == FulfillmentMode::Delivery,
            })
            .await?;

        self.orders
            .attach_payment_session(order.id, &session.session_id)
            .await?;

        info!(order_id = %order.id, session_id = %session.session_id, "Checkout session created");

        Ok(CheckoutOutcome {
            order_id: order.id,
            session_id: session.session_id,
            redirect_url: session.redirect_url,
        })
    }
}
