use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order lifecycle. Transitions are enforced by the services layer with
/// status-guarded conditional updates; see `services::orders`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "fulfilled")]
    Fulfilled,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Fulfilled => "fulfilled",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    #[sea_orm(string_value = "delivery")]
    Delivery,
    #[sea_orm(string_value = "pickup")]
    Pickup,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub status: OrderStatus,
    pub fulfillment_mode: FulfillmentMode,
    pub pickup_location_id: Option<String>,

    /// Empty until the payment gateway confirms the session; the customer
    /// enters their email on the hosted payment page, not in our checkout.
    pub customer_email: String,
    pub customer_phone: Option<String>,

    /// Gateway session reference; set once the hosted session exists.
    #[sea_orm(unique)]
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
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_one = "super::pickup_token::Entity")]
    PickupToken,
    #[sea_orm(has_many = "super::email_queue::Entity")]
    EmailQueue,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::pickup_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PickupToken.def()
    }
}

impl Related<super::email_queue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailQueue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
