use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::email_queue::EmailType;
use crate::entities::gdpr_consent;
use crate::entities::order::{
    self, Entity as OrderEntity, FulfillmentMode, Model as OrderModel, OrderStatus,
};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::entities::pickup_secret::Entity as PickupSecretEntity;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::email_queue::EmailQueueService;
use crate::services::pricing::CartTotals;

/// Privacy policy version recorded with each consent.
const PRIVACY_POLICY_VERSION: &str = "1.0";

/// Carrier tracking page used when the staff member does not supply a URL.
const CARRIER_TRACKING_URL: &str = "https://www.laposte.fr/outils/suivre-vos-envois?code=";

/// Consent context captured from the checkout request.
#[derive(Debug, Clone, Default)]
pub struct ConsentRecord {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Input for creating a pending order from a priced cart.
#[derive(Debug)]
pub struct CreatePendingOrder {
    pub fulfillment_mode: FulfillmentMode,
    pub pickup_location_id: Option<String>,
    pub customer_phone: Option<String>,
    pub totals: CartTotals,
    pub consent: ConsentRecord,
}

/// Persistence layer for orders and their guarded state transitions.
///
/// All mutations are conditional updates with a status predicate in the
/// WHERE clause; a transition that finds the order in another state affects
/// zero rows and reports that instead of overwriting.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    email_queue: Arc<EmailQueueService>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        email_queue: Arc<EmailQueueService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            email_queue,
            event_sender,
        }
    }

    /// Creates a pending order with all of its line-item snapshots and the
    /// consent record in a single transaction: a reader can never observe
    /// the order without its lines.
    #[instrument(skip(self, input), fields(mode = ?input.fulfillment_mode))]
    pub async fn create_pending_order(
        &self,
        input: CreatePendingOrder,
    ) -> Result<OrderModel, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order = order::ActiveModel {
            id: Set(order_id),
            status: Set(OrderStatus::Pending),
            fulfillment_mode: Set(input.fulfillment_mode),
            pickup_location_id: Set(input.pickup_location_id),
            customer_email: Set(String::new()),
            customer_phone: Set(input.customer_phone),
            payment_session_id: Set(None),
            payment_intent_id: Set(None),
            items_total_cents: Set(input.totals.items_total_cents),
            shipping_total_cents: Set(input.totals.shipping_total_cents),
            grand_total_cents: Set(input.totals.grand_total_cents),
            created_at: Set(now),
            paid_at: Set(None),
            fulfilled_at: Set(None),
            canceled_at: Set(None),
            tracking_number: Set(None),
            tracking_url: Set(None),
        };
        let order = order.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order");
            ServiceError::DatabaseError(e)
        })?;

        for line in &input.totals.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product.id.to_string()),
                qty: Set(line.qty),
                unit_price_cents: Set(line.product.unit_price_cents),
                shipping_cents_per_unit: Set(line.product.shipping_cents_per_unit),
                name_snapshot: Set(line.product.name.to_string()),
                image_snapshot: Set(Some(line.product.image.to_string())),
            };
            item.insert(&txn).await.map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order line");
                ServiceError::DatabaseError(e)
            })?;
        }

        let consent = gdpr_consent::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            consented_at: Set(now),
            ip_address: Set(input.consent.ip_address),
            user_agent: Set(input.consent.user_agent),
            privacy_policy_version: Set(PRIVACY_POLICY_VERSION.to_string()),
        };
        consent.insert(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, total = order.grand_total_cents, "Pending order created");

        self.event_sender
            .send(Event::OrderCreated {
                order_id,
                mode: order.fulfillment_mode,
                grand_total_cents: order.grand_total_cents,
            })
            .await;

        Ok(order)
    }

    /// Records the gateway session reference on a freshly created order.
    /// Parameterized conditional update: only while the order is pending and
    /// no session has been attached yet.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentSessionId,
                Expr::value(Some(session_id.to_string())),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::PaymentSessionId.is_null())
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(order_id = %order_id, "Could not attach payment session; order not pending or session already set");
            return Err(ServiceError::Conflict(
                "order is not awaiting a payment session".into(),
            ));
        }

        Ok(())
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<Option<(OrderModel, Vec<OrderItemModel>)>, ServiceError> {
        let Some(order) = self.get_order(order_id).await? else {
            return Ok(None);
        };
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(Some((order, items)))
    }

    pub async fn find_by_payment_session(
        &self,
        session_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Self::find_by_payment_session_on(&*self.db, session_id)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Connection-generic lookup used inside webhook transactions.
    pub async fn find_by_payment_session_on<C: ConnectionTrait>(
        conn: &C,
        session_id: &str,
    ) -> Result<Option<OrderModel>, sea_orm::DbErr> {
        OrderEntity::find()
            .filter(order::Column::PaymentSessionId.eq(session_id))
            .one(conn)
            .await
    }

    /// pending → paid. Stamps `paid_at` and stores the customer contact and
    /// payment-intent reference. Returns false when the order was not
    /// pending (the caller treats that as a no-op, never a downgrade).
    pub async fn mark_paid_on<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        customer_email: &str,
        customer_phone: Option<&str>,
        payment_intent_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, sea_orm::DbErr> {
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(order::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(
                order::Column::CustomerEmail,
                Expr::value(customer_email.to_string()),
            )
            .col_expr(
                order::Column::CustomerPhone,
                Expr::value(customer_phone.map(str::to_string)),
            )
            .col_expr(
                order::Column::PaymentIntentId,
                Expr::value(payment_intent_id.map(str::to_string)),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// pending → canceled, used when a payment session expires. A paid order
    /// is left untouched.
    pub async fn cancel_if_pending_on<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sea_orm::DbErr> {
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Canceled))
            .col_expr(order::Column::CanceledAt, Expr::value(Some(now)))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// paid → fulfilled. Used by pickup redemption (inside its transaction)
    /// and by the shipping action.
    pub async fn fulfill_if_paid_on<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sea_orm::DbErr> {
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Fulfilled))
            .col_expr(order::Column::FulfilledAt, Expr::value(Some(now)))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Marks a paid delivery order as shipped: stamps tracking details,
    /// transitions to fulfilled, and queues the tracking email.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_shipped(
        &self,
        order_id: Uuid,
        tracking_number: &str,
        tracking_url: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let order = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.fulfillment_mode != FulfillmentMode::Delivery {
            return Err(ServiceError::InvalidStatus(
                "order is not a delivery order".into(),
            ));
        }
        if order.status != OrderStatus::Paid {
            return Err(ServiceError::InvalidStatus(format!(
                "order must be paid to be marked shipped (current status: {})",
                order.status.as_str()
            )));
        }

        let now = Utc::now();
        let final_tracking_url = tracking_url
            .unwrap_or_else(|| format!("{}{}", CARRIER_TRACKING_URL, tracking_number));

        let txn = self.db.begin().await?;

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Fulfilled))
            .col_expr(order::Column::FulfilledAt, Expr::value(Some(now)))
            .col_expr(
                order::Column::TrackingNumber,
                Expr::value(Some(tracking_number.to_string())),
            )
            .col_expr(
                order::Column::TrackingUrl,
                Expr::value(Some(final_tracking_url)),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "order state changed concurrently".into(),
            ));
        }

        self.email_queue
            .enqueue_on(
                &txn,
                order_id,
                EmailType::ShippedNotification,
                &order.customer_email,
            )
            .await?;

        txn.commit().await?;

        info!(order_id = %order_id, tracking_number, "Order marked as shipped");

        self.event_sender
            .send(Event::OrderFulfilled {
                order_id,
                mode: FulfillmentMode::Delivery,
            })
            .await;

        let updated = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        Ok(updated)
    }

    /// Queues a fresh copy of the order's confirmation email. A new row is
    /// appended rather than resetting the original, preserving the audit
    /// trail of every send.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn resend_confirmation(&self, order_id: Uuid) -> Result<EmailType, ServiceError> {
        let order = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.customer_email.is_empty() {
            return Err(ServiceError::InvalidStatus(
                "order has no customer email yet".into(),
            ));
        }

        let email_type = match order.fulfillment_mode {
            FulfillmentMode::Pickup => EmailType::PickupConfirmation,
            FulfillmentMode::Delivery if order.tracking_number.is_some() => {
                EmailType::ShippedNotification
            }
            FulfillmentMode::Delivery => EmailType::DeliveryConfirmation,
        };

        if email_type == EmailType::PickupConfirmation {
            // The pickup email embeds the clear secret, which is only held
            // for a limited window after issuance.
            let secret = PickupSecretEntity::find_by_id(order_id)
                .one(&*self.db)
                .await?;
            match secret {
                Some(s) if s.expires_at > Utc::now() => {}
                _ => {
                    return Err(ServiceError::Conflict(
                        "the pickup pass can no longer be re-sent; its secret has been purged"
                            .into(),
                    ));
                }
            }
        }

        self.email_queue
            .enqueue_on(&*self.db, order_id, email_type, &order.customer_email)
            .await?;

        info!(order_id = %order_id, email_type = ?email_type, "Confirmation email re-queued");
        Ok(email_type)
    }
}
