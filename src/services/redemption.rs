//! Pickup redemption: validates a presented secret and fulfills the order.
//!
//! Error variants carry the context staff need to resolve disputes at the
//! counter — who redeemed a token and when, or what state the order is in —
//! without anyone touching the database directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{Entity as OrderEntity, FulfillmentMode, OrderStatus};
use crate::entities::pickup_token::{self, Entity as PickupTokenEntity};
use crate::events::{Event, EventSender};
use crate::services::orders::OrderService;
use crate::services::tokens::TokenService;

#[derive(Debug, Error)]
pub enum RedemptionError {
    /// Unknown token, or a token whose order has vanished (data-integrity
    /// failure — surfaced identically to avoid leaking which it was).
    #[error("pickup token not found")]
    NotFound,

    #[error("pickup token expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    /// The token was already redeemed; `used_at`/`used_by` echo the original
    /// redemption for dispute resolution.
    #[error("pickup token already used at {used_at} by {used_by}")]
    AlreadyUsed {
        used_at: DateTime<Utc>,
        used_by: String,
    },

    /// The order is not in a redeemable state (e.g. canceled while somehow
    /// retaining a token).
    #[error("order {order_id} is not ready for pickup (status: {status})")]
    InvalidState { order_id: Uuid, status: String },

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// What the staff confirmation screen needs, returned in one round-trip.
#[derive(Debug, Clone)]
pub struct RedeemedOrder {
    pub order_id: Uuid,
    pub customer_email: String,
    pub grand_total_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PickupRedemptionService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl PickupRedemptionService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Redeems a presented secret on behalf of `staff`.
    ///
    /// The token-use stamp and the order fulfillment are one transaction,
    /// and the stamp is guarded by `used_at IS NULL`: of two concurrent
    /// redemptions exactly one wins, the other reads back the winner's
    /// `used_at`/`used_by`.
    #[instrument(skip(self, secret), fields(staff = %staff))]
    pub async fn redeem(&self, secret: &str, staff: &str) -> Result<RedeemedOrder, RedemptionError> {
        let token_hash = TokenService::hash(secret);

        let token = PickupTokenEntity::find()
            .filter(pickup_token::Column::TokenHash.eq(&token_hash))
            .one(&*self.db)
            .await?
            .ok_or(RedemptionError::NotFound)?;

        if TokenService::is_expired(token.expires_at) {
            return Err(RedemptionError::Expired {
                expires_at: token.expires_at,
            });
        }

        if let (Some(used_at), Some(used_by)) = (token.used_at, token.used_by.clone()) {
            return Err(RedemptionError::AlreadyUsed { used_at, used_by });
        }

        let order = OrderEntity::find_by_id(token.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                warn!(order_id = %token.order_id, "Pickup token references a missing order");
                RedemptionError::NotFound
            })?;

        if order.status != OrderStatus::Paid {
            return Err(RedemptionError::InvalidState {
                order_id: order.id,
                status: order.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let stamped = PickupTokenEntity::update_many()
            .col_expr(pickup_token::Column::UsedAt, Expr::value(Some(now)))
            .col_expr(
                pickup_token::Column::UsedBy,
                Expr::value(Some(staff.to_string())),
            )
            .filter(pickup_token::Column::Id.eq(token.id))
            .filter(pickup_token::Column::UsedAt.is_null())
            .exec(&txn)
            .await?;

        if stamped.rows_affected == 0 {
            // Lost the race: surface the winning redemption's details.
            drop(txn);
            let current = PickupTokenEntity::find_by_id(token.id)
                .one(&*self.db)
                .await?
                .ok_or(RedemptionError::NotFound)?;
            return match (current.used_at, current.used_by) {
                (Some(used_at), Some(used_by)) => {
                    Err(RedemptionError::AlreadyUsed { used_at, used_by })
                }
                _ => Err(RedemptionError::NotFound),
            };
        }

        let fulfilled = OrderService::fulfill_if_paid_on(&txn, order.id, now).await?;
        if !fulfilled {
            // Order state changed under us; abandon the token stamp too.
            drop(txn);
            return Err(RedemptionError::InvalidState {
                order_id: order.id,
                status: "unknown".to_string(),
            });
        }

        txn.commit().await?;

        info!(order_id = %order.id, staff = %staff, "Pickup validated, order fulfilled");

        self.event_sender
            .send(Event::PickupTokenRedeemed {
                order_id: order.id,
                staff: staff.to_string(),
            })
            .await;
        self.event_sender
            .send(Event::OrderFulfilled {
                order_id: order.id,
                mode: FulfillmentMode::Pickup,
            })
            .await;

        Ok(RedeemedOrder {
            order_id: order.id,
            customer_email: order.customer_email,
            grand_total_cents: order.grand_total_cents,
            created_at: order.created_at,
        })
    }
}
