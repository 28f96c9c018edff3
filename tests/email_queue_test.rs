mod common;

use std::sync::atomic::Ordering;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

use comptoir_api::entities::{email_queue, pickup_secret};
use comptoir_api::services::email_queue::MAX_ATTEMPTS;
use common::{session_completed_event, TestApp};

async fn paid_order(app: &TestApp, mode: &str, event_id: &str) -> Uuid {
    let (status, body) = app
        .checkout(json!([{ "id": "mug-crest", "qty": 2 }]), mode)
        .await;
    assert_eq!(status, StatusCode::OK);
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .deliver_webhook(&session_completed_event(
            event_id,
            &session_id,
            "client@example.com",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    order_id
}

async fn entry_for(app: &TestApp, order_id: Uuid) -> email_queue::Model {
    email_queue::Entity::find()
        .filter(email_queue::Column::OrderId.eq(order_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("queue entry exists")
}

/// Forces an entry to be due now so a drain picks it up.
async fn make_due(app: &TestApp, entry_id: Uuid) {
    email_queue::Entity::update_many()
        .col_expr(
            email_queue::Column::NextRetryAt,
            Expr::value(Utc::now() - Duration::seconds(1)),
        )
        .filter(email_queue::Column::Id.eq(entry_id))
        .exec(&*app.state.db)
        .await
        .unwrap();
}

#[tokio::test]
async fn drain_sends_queued_confirmation() {
    let app = TestApp::new().await;
    let order_id = paid_order(&app, "delivery", "evt_q1").await;

    let summary = app.state.services.email_queue.process_due(10).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 0);

    let entry = entry_for(&app, order_id).await;
    assert_eq!(entry.status, email_queue::EmailStatus::Sent);
    assert!(entry.sent_at.is_some());

    let sent = app.transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "client@example.com");
    assert!(sent[0].subject.contains("confirmed"));
    assert!(sent[0].html.contains("Town Crest Mug"));
    assert!(sent[0].html.contains("33,00 €"));
}

#[tokio::test]
async fn pickup_confirmation_embeds_redemption_link() {
    let app = TestApp::new().await;
    let order_id = paid_order(&app, "pickup", "evt_q2").await;

    let secret = pickup_secret::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
        .secret;

    let summary = app.state.services.email_queue.process_due(10).await.unwrap();
    assert_eq!(summary.sent, 1);

    let sent = app.transport.sent.lock().unwrap();
    let expected_link = format!("https://boutique.comptoir.example/pickup/{secret}");
    assert!(sent[0].html.contains(&expected_link));
}

#[tokio::test]
async fn failure_schedules_backoff_and_keeps_entry_pending() {
    let app = TestApp::new().await;
    let order_id = paid_order(&app, "delivery", "evt_q3").await;

    app.transport.fail.store(true, Ordering::SeqCst);
    let summary = app.state.services.email_queue.process_due(10).await.unwrap();
    assert_eq!(summary.failed, 1);

    let entry = entry_for(&app, order_id).await;
    assert_eq!(entry.status, email_queue::EmailStatus::Pending);
    assert_eq!(entry.attempts, 1);
    assert!(entry.last_error.as_deref().unwrap().contains("smtp relay down"));

    // First retry is scheduled roughly five minutes out.
    let delay = entry.next_retry_at - Utc::now();
    assert!(delay > Duration::minutes(4) && delay <= Duration::minutes(5));

    // Not due yet: an immediate drain must not pick it up.
    let summary = app.state.services.email_queue.process_due(10).await.unwrap();
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
async fn entry_is_abandoned_after_max_attempts() {
    let app = TestApp::new().await;
    let order_id = paid_order(&app, "delivery", "evt_q4").await;

    app.transport.fail.store(true, Ordering::SeqCst);
    for attempt in 1..=MAX_ATTEMPTS {
        let entry = entry_for(&app, order_id).await;
        make_due(&app, entry.id).await;
        let summary = app.state.services.email_queue.process_due(10).await.unwrap();
        assert_eq!(summary.failed, 1, "attempt {attempt} should fail");
    }

    let entry = entry_for(&app, order_id).await;
    assert_eq!(entry.status, email_queue::EmailStatus::Failed);
    assert_eq!(entry.attempts, MAX_ATTEMPTS);

    // Permanently failed entries are never picked up again.
    make_due(&app, entry.id).await;
    let summary = app.state.services.email_queue.process_due(10).await.unwrap();
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
async fn one_broken_entry_does_not_block_the_batch() {
    let app = TestApp::new().await;
    let healthy_order = paid_order(&app, "delivery", "evt_q5").await;

    // Queue a shipped notification for an order with no tracking number:
    // rendering fails while the other entry still goes out.
    app.state
        .services
        .email_queue
        .enqueue_on(
            &*app.state.db,
            healthy_order,
            email_queue::EmailType::ShippedNotification,
            "client@example.com",
        )
        .await
        .unwrap();

    let summary = app.state.services.email_queue.process_due(10).await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 1);

    let entries = email_queue::Entity::find()
        .filter(email_queue::Column::OrderId.eq(healthy_order))
        .all(&*app.state.db)
        .await
        .unwrap();
    let sent = entries
        .iter()
        .filter(|e| e.status == email_queue::EmailStatus::Sent)
        .count();
    let pending = entries
        .iter()
        .filter(|e| e.status == email_queue::EmailStatus::Pending)
        .count();
    assert_eq!(sent, 1);
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn resend_appends_a_new_row_and_preserves_history() {
    let app = TestApp::new().await;
    let order_id = paid_order(&app, "delivery", "evt_q6").await;
    let staff = app.staff_token().await;

    app.state.services.email_queue.process_due(10).await.unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/orders/{order_id}/resend-email"),
            None,
            Some(&staff),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "resend failed: {body}");
    assert_eq!(body["email_type"], "delivery_confirmation");

    let entries = email_queue::Entity::find()
        .filter(email_queue::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    // The original sent row is untouched; the new one is pending.
    assert!(entries
        .iter()
        .any(|e| e.status == email_queue::EmailStatus::Sent));
    assert!(entries
        .iter()
        .any(|e| e.status == email_queue::EmailStatus::Pending && e.attempts == 0));
}

#[tokio::test]
async fn pickup_resend_is_refused_once_secret_is_purged() {
    let app = TestApp::new().await;
    let order_id = paid_order(&app, "pickup", "evt_q7").await;
    let staff = app.staff_token().await;

    // Age the ephemeral secret past its TTL and purge it, as the worker does.
    pickup_secret::Entity::update_many()
        .col_expr(
            pickup_secret::Column::ExpiresAt,
            Expr::value(Utc::now() - Duration::seconds(1)),
        )
        .filter(pickup_secret::Column::OrderId.eq(order_id))
        .exec(&*app.state.db)
        .await
        .unwrap();
    let purged = app
        .state
        .services
        .email_queue
        .purge_expired_secrets()
        .await
        .unwrap();
    assert_eq!(purged, 1);

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/orders/{order_id}/resend-email"),
            None,
            Some(&staff),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "expected conflict: {body}");
}
