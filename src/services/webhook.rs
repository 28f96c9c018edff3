//! Inbound payment-event processing.
//!
//! This is the source of truth for payment confirmation: only a verified
//! `checkout.session.completed` event moves an order to paid. Every event is
//! verified, deduplicated against the `payment_events` ledger, applied, and
//! recorded — all inside one transaction, so gateway redelivery is always a
//! no-op and a crash mid-way retries cleanly.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::email_queue::EmailType;
use crate::entities::order::{FulfillmentMode, Model as OrderModel, OrderStatus};
use crate::entities::payment_event::{self, Entity as PaymentEventEntity};
use crate::entities::pickup_secret;
use crate::entities::pickup_token::{self, Entity as PickupTokenEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::email_queue::EmailQueueService;
use crate::services::orders::OrderService;
use crate::services::payments;
use crate::services::tokens::TokenService;

/// Result of processing one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event applied for the first time.
    Processed,
    /// Event id already in the ledger; nothing done.
    AlreadyProcessed,
    /// Event type we do not handle; recorded and ignored.
    Ignored,
}

/// Signed event envelope as the gateway posts it.
#[derive(Debug, Deserialize)]
struct GatewayEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: GatewayEventData,
}

#[derive(Debug, Deserialize)]
struct GatewayEventData {
    object: SessionObject,
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

impl SessionObject {
    fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }

    fn phone(&self) -> Option<&str> {
        self.customer_details.as_ref().and_then(|d| d.phone.as_deref())
    }
}

#[derive(Clone)]
pub struct WebhookProcessor {
    db: Arc<DatabaseConnection>,
    tokens: TokenService,
    email_queue: Arc<EmailQueueService>,
    event_sender: EventSender,
    webhook_secret: String,
    tolerance_secs: i64,
    secret_ttl_days: i64,
}

impl WebhookProcessor {
    pub fn new(
        db: Arc<DatabaseConnection>,
        tokens: TokenService,
        email_queue: Arc<EmailQueueService>,
        event_sender: EventSender,
        webhook_secret: String,
        tolerance_secs: i64,
        secret_ttl_days: i64,
    ) -> Self {
        Self {
            db,
            tokens,
            email_queue,
            event_sender,
            webhook_secret,
            tolerance_secs,
            secret_ttl_days,
        }
    }

    /// Verifies, deduplicates and applies one webhook delivery.
    #[instrument(skip(self, payload, signature_header))]
    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookOutcome, ServiceError> {
        if !payments::verify_event_signature(
            payload,
            signature_header,
            &self.webhook_secret,
            self.tolerance_secs,
        ) {
            warn!("Webhook signature verification failed");
            return Err(ServiceError::Unauthorized("invalid webhook signature".into()));
        }

        let event: GatewayEvent = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::ValidationError(format!("invalid event payload: {e}")))?;

        info!(event_id = %event.id, event_type = %event.event_type, "Payment event received");

        let txn = self.db.begin().await?;

        // Idempotence: gateways retry delivery, and the ledger makes every
        // redelivery a no-op.
        let already = PaymentEventEntity::find()
            .filter(payment_event::Column::EventId.eq(&event.id))
            .one(&txn)
            .await?;
        if already.is_some() {
            info!(event_id = %event.id, "Event already processed, skipping");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => {
                self.handle_session_completed(&txn, &event.data.object).await?;
                WebhookOutcome::Processed
            }
            "checkout.session.expired" => {
                self.handle_session_expired(&txn, &event.data.object).await?;
                WebhookOutcome::Processed
            }
            other => {
                info!(event_type = %other, "Unhandled payment event type");
                WebhookOutcome::Ignored
            }
        };

        // Recorded for every branch, inside the same transaction as the
        // mutations it guards.
        let record = payment_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_id: Set(event.id.clone()),
            event_type: Set(event.event_type.clone()),
            processed_at: Set(Utc::now()),
        };
        record.insert(&txn).await?;

        txn.commit().await?;

        Ok(outcome)
    }

    /// Confirmed payment: transition to paid, queue the confirmation email,
    /// and for pickup orders issue the single-use token.
    async fn handle_session_completed(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        session: &SessionObject,
    ) -> Result<(), ServiceError> {
        let order = OrderService::find_by_payment_session_on(txn, &session.id)
            .await?
            .ok_or_else(|| {
                error!(session_id = %session.id, "No order for completed session");
                ServiceError::NotFound(format!("no order for payment session {}", session.id))
            })?;

        let customer_email = session.email().ok_or_else(|| {
            error!(order_id = %order.id, "Completed session carries no customer email");
            ServiceError::ValidationError("completed session has no customer email".into())
        })?;
        let customer_phone = session.phone().or(order.customer_phone.as_deref());

        let now = Utc::now();
        let transitioned = OrderService::mark_paid_on(
            txn,
            order.id,
            customer_email,
            customer_phone,
            session.payment_intent.as_deref(),
            now,
        )
        .await?;

        if !transitioned {
            // Already paid through a racing delivery, or canceled; status
            // pre-checks forbid any mutation here.
            info!(order_id = %order.id, status = order.status.as_str(), "Order not pending; completion is a no-op");
            return Ok(());
        }

        info!(order_id = %order.id, "Order marked as paid");

        let email_type = match order.fulfillment_mode {
            FulfillmentMode::Delivery => EmailType::DeliveryConfirmation,
            FulfillmentMode::Pickup => EmailType::PickupConfirmation,
        };
        self.email_queue
            .enqueue_on(txn, order.id, email_type, customer_email)
            .await?;

        if order.fulfillment_mode == FulfillmentMode::Pickup {
            self.issue_pickup_token(txn, &order).await?;
        }

        self.event_sender
            .send(Event::OrderPaid {
                order_id: order.id,
                mode: order.fulfillment_mode,
            })
            .await;

        Ok(())
    }

    /// At most one token per order: skipped when a row already exists, and
    /// the unique constraint on order_id is the backstop against races this
    /// check cannot see.
    async fn issue_pickup_token(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        order: &OrderModel,
    ) -> Result<(), ServiceError> {
        let existing = PickupTokenEntity::find()
            .filter(pickup_token::Column::OrderId.eq(order.id))
            .one(txn)
            .await?;
        if existing.is_some() {
            warn!(order_id = %order.id, "Pickup token already issued; not re-issuing");
            return Ok(());
        }

        let issued = self.tokens.issue();
        let now = Utc::now();
        let expires_at = self.tokens.expiry_from(now);

        let token_row = pickup_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            token_hash: Set(issued.hash),
            expires_at: Set(expires_at),
            used_at: Set(None),
            used_by: Set(None),
            created_at: Set(now),
        };
        token_row.insert(txn).await?;

        // The clear secret goes to the short-TTL store only, for rendering
        // the confirmation email; the durable token row is hash-only.
        let secret_row = pickup_secret::ActiveModel {
            order_id: Set(order.id),
            secret: Set(issued.secret),
            expires_at: Set(now + chrono::Duration::days(self.secret_ttl_days)),
        };
        secret_row.insert(txn).await?;

        info!(order_id = %order.id, expires_at = %expires_at, "Pickup token issued");

        self.event_sender.send(Event::PickupTokenIssued(order.id)).await;

        Ok(())
    }

    /// Session expired without payment: cancel the order if it is still
    /// pending. Never cancels a paid order; unknown sessions are ignored.
    async fn handle_session_expired(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        session: &SessionObject,
    ) -> Result<(), ServiceError> {
        let Some(order) = OrderService::find_by_payment_session_on(txn, &session.id).await? else {
            info!(session_id = %session.id, "No order for expired session");
            return Ok(());
        };

        if order.status != OrderStatus::Pending {
            info!(order_id = %order.id, status = order.status.as_str(), "Order not pending; expiration is a no-op");
            return Ok(());
        }

        let canceled = OrderService::cancel_if_pending_on(txn, order.id, Utc::now()).await?;
        if canceled {
            info!(order_id = %order.id, "Order canceled after session expiration");
            self.event_sender.send(Event::OrderCanceled(order.id)).await;
        }

        Ok(())
    }
}
