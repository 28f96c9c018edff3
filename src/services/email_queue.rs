//! Durable, retrying outbox for transactional email.
//!
//! Enqueueing is append-only and can join any caller's transaction; the
//! processor is the only code that mutates status, attempts and scheduling.
//! Delivery failures are isolated per entry so one broken email never stalls
//! the rest of the batch.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::email_queue::{self, EmailStatus, EmailType, Entity as EmailQueueEntity};
use crate::entities::pickup_secret::{self, Entity as PickupSecretEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::mailer::Mailer;

/// An entry is abandoned after this many delivery attempts.
pub const MAX_ATTEMPTS: i32 = 5;

/// Retry delays in minutes, indexed by how many attempts have failed so far.
/// Attempts beyond the schedule reuse the last value.
const BACKOFF_MINUTES: &[i64] = &[5, 15, 60, 240, 1440];

/// Next retry delay after `attempts` failed attempts (attempts >= 1).
pub fn backoff_delay(attempts: i32) -> Duration {
    let idx = usize::try_from(attempts.saturating_sub(1)).unwrap_or(0);
    let minutes = BACKOFF_MINUTES
        .get(idx)
        .copied()
        .unwrap_or(*BACKOFF_MINUTES.last().expect("schedule is non-empty"));
    Duration::minutes(minutes)
}

/// Outcome summary of one queue drain.
#[derive(Debug, Default, Clone)]
pub struct DrainSummary {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct EmailQueueService {
    db: Arc<DatabaseConnection>,
    mailer: Mailer,
    event_sender: EventSender,
    batch_size: u64,
}

impl EmailQueueService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mailer: Mailer,
        event_sender: EventSender,
        batch_size: u64,
    ) -> Self {
        Self {
            db,
            mailer,
            event_sender,
            batch_size,
        }
    }

    /// Appends a queue entry; joins the caller's transaction when given one.
    /// Every call creates a new row, even if a similar entry already exists
    /// for the order.
    pub async fn enqueue_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        email_type: EmailType,
        recipient_email: &str,
    ) -> Result<Uuid, ServiceError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let entry = email_queue::ActiveModel {
            id: Set(id),
            order_id: Set(order_id),
            email_type: Set(email_type),
            recipient_email: Set(recipient_email.to_string()),
            status: Set(EmailStatus::Pending),
            attempts: Set(0),
            last_error: Set(None),
            next_retry_at: Set(now),
            sent_at: Set(None),
            created_at: Set(now),
        };
        entry.insert(conn).await?;

        self.event_sender
            .send(Event::EmailQueued {
                order_id,
                email_type,
            })
            .await;

        Ok(id)
    }

    /// Processes due entries: pending, retry time reached, attempts below
    /// the cap. Each entry is delivered and its outcome recorded
    /// independently of the others.
    #[instrument(skip(self))]
    pub async fn process_due(&self, limit: u64) -> Result<DrainSummary, ServiceError> {
        let now = Utc::now();

        let due = EmailQueueEntity::find()
            .filter(email_queue::Column::Status.eq(EmailStatus::Pending))
            .filter(email_queue::Column::NextRetryAt.lte(now))
            .filter(email_queue::Column::Attempts.lt(MAX_ATTEMPTS))
            .order_by_asc(email_queue::Column::NextRetryAt)
            .limit(limit)
            .all(&*self.db)
            .await?;

        let mut summary = DrainSummary {
            processed: due.len(),
            ..Default::default()
        };

        for entry in due {
            match self.mailer.deliver(&entry).await {
                Ok(()) => {
                    self.mark_sent(entry.id).await?;
                    summary.sent += 1;
                    self.event_sender.send(Event::EmailSent(entry.id)).await;
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    warn!(entry_id = %entry.id, attempts, error = %e, "Email delivery failed");
                    self.mark_failed(entry.id, attempts, &e.to_string()).await?;
                    summary.failed += 1;
                    self.event_sender
                        .send(Event::EmailDeliveryFailed {
                            entry_id: entry.id,
                            attempts,
                        })
                        .await;
                }
            }
        }

        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                sent = summary.sent,
                failed = summary.failed,
                "Email queue drained"
            );
        }

        Ok(summary)
    }

    async fn mark_sent(&self, entry_id: Uuid) -> Result<(), ServiceError> {
        EmailQueueEntity::update_many()
            .col_expr(email_queue::Column::Status, Expr::value(EmailStatus::Sent))
            .col_expr(email_queue::Column::SentAt, Expr::value(Some(Utc::now())))
            .filter(email_queue::Column::Id.eq(entry_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        entry_id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), ServiceError> {
        let status = if attempts >= MAX_ATTEMPTS {
            EmailStatus::Failed
        } else {
            EmailStatus::Pending
        };
        let next_retry = Utc::now() + backoff_delay(attempts);

        EmailQueueEntity::update_many()
            .col_expr(email_queue::Column::Status, Expr::value(status))
            .col_expr(email_queue::Column::Attempts, Expr::value(attempts))
            .col_expr(
                email_queue::Column::LastError,
                Expr::value(Some(error_message.to_string())),
            )
            .col_expr(email_queue::Column::NextRetryAt, Expr::value(next_retry))
            .filter(email_queue::Column::Id.eq(entry_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Deletes clear pickup secrets whose retention window has passed.
    pub async fn purge_expired_secrets(&self) -> Result<u64, ServiceError> {
        let result = PickupSecretEntity::delete_many()
            .filter(pickup_secret::Column::ExpiresAt.lte(Utc::now()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(purged = result.rows_affected, "Expired pickup secrets purged");
        }
        Ok(result.rows_affected)
    }
}

/// Worker loop: drains the queue and purges expired secrets on a fixed
/// interval. Spawned once at startup; errors are logged and the loop keeps
/// going.
pub async fn run_email_worker(service: Arc<EmailQueueService>, interval: StdDuration) {
    let batch = service.batch_size;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Err(e) = service.process_due(batch).await {
            error!("Email queue drain failed: {}", e);
        }
        if let Err(e) = service.purge_expired_secrets().await {
            error!("Pickup secret purge failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_documented_schedule() {
        assert_eq!(backoff_delay(1), Duration::minutes(5));
        assert_eq!(backoff_delay(2), Duration::minutes(15));
        assert_eq!(backoff_delay(3), Duration::minutes(60));
        assert_eq!(backoff_delay(4), Duration::minutes(240));
        assert_eq!(backoff_delay(5), Duration::minutes(1440));
    }

    #[test]
    fn backoff_caps_at_last_delay() {
        assert_eq!(backoff_delay(6), Duration::minutes(1440));
        assert_eq!(backoff_delay(50), Duration::minutes(1440));
    }

    #[test]
    fn backoff_tolerates_degenerate_input() {
        assert_eq!(backoff_delay(0), Duration::minutes(5));
    }
}
