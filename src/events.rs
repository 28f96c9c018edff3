use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::email_queue::EmailType;
use crate::entities::order::FulfillmentMode;

/// Domain events emitted by the services layer. Consumers are observational
/// (logging, future outbound notifications); event delivery is best-effort
/// and never part of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        mode: FulfillmentMode,
        grand_total_cents: i64,
    },
    OrderPaid {
        order_id: Uuid,
        mode: FulfillmentMode,
    },
    OrderCanceled(Uuid),
    OrderFulfilled {
        order_id: Uuid,
        mode: FulfillmentMode,
    },
    PickupTokenIssued(Uuid),
    PickupTokenRedeemed {
        order_id: Uuid,
        staff: String,
    },
    EmailQueued {
        order_id: Uuid,
        email_type: EmailType,
    },
    EmailSent(Uuid),
    EmailDeliveryFailed {
        entry_id: Uuid,
        attempts: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; failure to deliver is reported, not propagated.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send event: {}", e);
        }
    }
}

/// Drains the event channel, logging each event. Spawned once at startup.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPaid { order_id, mode } => {
                info!(order_id = %order_id, mode = ?mode, "order paid");
            }
            Event::OrderFulfilled { order_id, mode } => {
                info!(order_id = %order_id, mode = ?mode, "order fulfilled");
            }
            Event::EmailDeliveryFailed { entry_id, attempts } => {
                warn!(entry_id = %entry_id, attempts, "email delivery failed");
            }
            other => info!(event = ?other, "domain event"),
        }
    }
}
