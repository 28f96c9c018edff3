//! Transactional email rendering and transport.
//!
//! One render function per email type, selected by an explicit match on the
//! queue entry's enum tag. Rendering loads whatever order data the template
//! needs; a missing prerequisite (no tracking number, purged pickup secret)
//! is a send failure that the queue's retry logic handles.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use thiserror::Error;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::entities::email_queue::{self, EmailType};
use crate::entities::order::{Entity as OrderEntity, Model as OrderModel};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::entities::pickup_secret::Entity as PickupSecretEntity;
use crate::entities::pickup_token::{self, Entity as PickupTokenEntity};

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),
    #[error("template data missing: {0}")]
    MissingData(String),
    #[error("email type not supported: {0:?}")]
    Unsupported(EmailType),
    #[error("transport error: {0}")]
    Transport(String),
}

/// A fully rendered outbound message.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// External email delivery provider.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError>;
}

/// HTTP implementation posting to the transactional-email provider's API.
pub struct HttpEmailTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpEmailTransport {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": email.from,
                "to": email.to,
                "subject": email.subject,
                "html": email.html,
            }))
            .send()
            .await
            .map_err(|e| MailerError::Transport(format!("email provider unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(%status, "Email provider rejected message: {}", text);
            return Err(MailerError::Transport(format!(
                "email provider returned {status}"
            )));
        }

        Ok(())
    }
}

/// Renders queue entries into messages and hands them to the transport.
#[derive(Clone)]
pub struct Mailer {
    db: Arc<DatabaseConnection>,
    transport: Arc<dyn EmailTransport>,
    from: String,
    app_url: String,
}

impl Mailer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        transport: Arc<dyn EmailTransport>,
        from: String,
        app_url: String,
    ) -> Self {
        Self {
            db,
            transport,
            from,
            app_url,
        }
    }

    /// Renders and sends one queue entry.
    #[instrument(skip(self, job), fields(entry_id = %job.id, email_type = ?job.email_type))]
    pub async fn deliver(&self, job: &email_queue::Model) -> Result<(), MailerError> {
        let order = OrderEntity::find_by_id(job.order_id)
            .one(&*self.db)
            .await?
            .ok_or(MailerError::OrderNotFound(job.order_id))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(job.order_id))
            .all(&*self.db)
            .await?;

        let email = match job.email_type {
            EmailType::DeliveryConfirmation => OutboundEmail {
                from: self.from.clone(),
                to: job.recipient_email.clone(),
                subject: "Your order is confirmed".to_string(),
                html: render_delivery_confirmation(&order, &items),
            },
            EmailType::PickupConfirmation => {
                let token = PickupTokenEntity::find()
                    .filter(pickup_token::Column::OrderId.eq(order.id))
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        MailerError::MissingData(format!(
                            "no pickup token for order {}",
                            order.id
                        ))
                    })?;
                let secret = self.load_pickup_secret(order.id).await?;
                OutboundEmail {
                    from: self.from.clone(),
                    to: job.recipient_email.clone(),
                    subject: "Your order is ready for pickup".to_string(),
                    html: render_pickup_confirmation(
                        &order,
                        &items,
                        &self.app_url,
                        &secret,
                        token.expires_at,
                    ),
                }
            }
            EmailType::ShippedNotification => {
                let tracking_number = order.tracking_number.clone().ok_or_else(|| {
                    MailerError::MissingData(format!("no tracking number for order {}", order.id))
                })?;
                let tracking_url = order.tracking_url.clone().unwrap_or_default();
                OutboundEmail {
                    from: self.from.clone(),
                    to: job.recipient_email.clone(),
                    subject: "Your parcel is on its way".to_string(),
                    html: render_shipped_notification(
                        &order,
                        &items,
                        &tracking_number,
                        &tracking_url,
                        &self.app_url,
                    ),
                }
            }
            EmailType::PickupReminder => {
                // Reminders are scheduled but the template does not exist yet.
                return Err(MailerError::Unsupported(EmailType::PickupReminder));
            }
        };

        self.transport.send(&email).await
    }

    async fn load_pickup_secret(&self, order_id: Uuid) -> Result<String, MailerError> {
        let record = PickupSecretEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .filter(|s| s.expires_at > Utc::now())
            .ok_or_else(|| {
                MailerError::MissingData(format!(
                    "clear pickup secret unavailable for order {}",
                    order_id
                ))
            })?;
        Ok(record.secret)
    }
}

/// Formats integer cents as a euro amount, e.g. 1250 -> "12,50 €".
pub fn format_eur(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{}{},{:02} €", sign, cents / 100, cents % 100)
}

fn render_line_rows(items: &[OrderItemModel]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                item.name_snapshot,
                item.qty,
                format_eur(item.unit_price_cents * i64::from(item.qty)),
            )
        })
        .collect()
}

fn render_delivery_confirmation(order: &OrderModel, items: &[OrderItemModel]) -> String {
    format!(
        "<h1>Thank you for your order</h1>\
         <p>Order <strong>{}</strong> is confirmed and will be prepared for delivery.</p>\
         <table>{}</table>\
         <p>Shipping: {}</p>\
         <p>Total paid: <strong>{}</strong></p>",
        order.id,
        render_line_rows(items),
        format_eur(order.shipping_total_cents),
        format_eur(order.grand_total_cents),
    )
}

fn render_pickup_confirmation(
    order: &OrderModel,
    items: &[OrderItemModel],
    app_url: &str,
    secret: &str,
    expires_at: chrono::DateTime<Utc>,
) -> String {
    // The redemption URL carries the clear secret; this is the one place it
    // crosses a boundary after issuance. Staff scan it as a QR code.
    let pickup_url = format!("{}/pickup/{}", app_url.trim_end_matches('/'), secret);
    format!(
        "<h1>Your order is ready for pickup</h1>\
         <p>Order <strong>{}</strong> is paid. Present this code at the counter:</p>\
         <p><a href=\"{}\">{}</a></p>\
         <table>{}</table>\
         <p>Total paid: <strong>{}</strong></p>\
         <p>This pickup pass is valid once and expires on {}.</p>",
        order.id,
        pickup_url,
        pickup_url,
        render_line_rows(items),
        format_eur(order.grand_total_cents),
        expires_at.format("%Y-%m-%d"),
    )
}

fn render_shipped_notification(
    order: &OrderModel,
    items: &[OrderItemModel],
    tracking_number: &str,
    tracking_url: &str,
    app_url: &str,
) -> String {
    let order_url = format!("{}/orders/{}", app_url.trim_end_matches('/'), order.id);
    format!(
        "<h1>Your parcel has been shipped</h1>\
         <p>Order <strong>{}</strong> is on its way.</p>\
         <p>Tracking number: <strong>{}</strong> — <a href=\"{}\">follow your parcel</a></p>\
         <table>{}</table>\
         <p>Total: <strong>{}</strong></p>\
         <p><a href=\"{}\">View your order</a></p>",
        order.id,
        tracking_number,
        tracking_url,
        render_line_rows(items),
        format_eur(order.grand_total_cents),
        order_url,
    )
}
