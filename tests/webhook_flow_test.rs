mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use comptoir_api::entities::{email_queue, order, payment_event, pickup_secret, pickup_token};
use comptoir_api::services::payments;
use common::{session_completed_event, session_expired_event, TestApp, WEBHOOK_SECRET};

async fn checkout_order(app: &TestApp, mode: &str) -> (Uuid, String) {
    let (status, body) = app
        .checkout(json!([{ "id": "mug-crest", "qty": 2 }]), mode)
        .await;
    assert_eq!(status, StatusCode::OK);
    let order_id = body["order_id"].as_str().unwrap().parse().unwrap();
    let session_id = body["session_id"].as_str().unwrap().to_string();
    (order_id, session_id)
}

#[tokio::test]
async fn completed_session_marks_order_paid_and_queues_email() {
    let app = TestApp::new().await;
    let (order_id, session_id) = checkout_order(&app, "delivery").await;

    let event = session_completed_event("evt_1", &session_id, "client@example.com");
    let (status, body) = app.deliver_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["skipped"], false);

    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, order::OrderStatus::Paid);
    assert!(order.paid_at.is_some());
    assert_eq!(order.customer_email, "client@example.com");
    assert_eq!(order.customer_phone.as_deref(), Some("+33612345678"));
    assert_eq!(order.payment_intent_id.as_deref(), Some("pi_evt_1"));

    let emails = email_queue::Entity::find()
        .filter(email_queue::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(
        emails[0].email_type,
        email_queue::EmailType::DeliveryConfirmation
    );
    assert_eq!(emails[0].status, email_queue::EmailStatus::Pending);

    // Delivery orders never get a pickup token.
    assert!(pickup_token::Entity::find()
        .filter(pickup_token::Column::OrderId.eq(order_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .is_none());

    // The event id landed in the idempotence ledger.
    assert!(payment_event::Entity::find()
        .filter(payment_event::Column::EventId.eq("evt_1"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn redelivered_event_is_a_no_op() {
    let app = TestApp::new().await;
    let (order_id, session_id) = checkout_order(&app, "delivery").await;

    let event = session_completed_event("evt_dup", &session_id, "client@example.com");
    let (status, body) = app.deliver_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["skipped"], false);

    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let first_paid_at = order.paid_at.expect("paid once");

    let (status, body) = app.deliver_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["skipped"], true);

    // paid_at unchanged, and no second confirmation email was queued.
    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.paid_at, Some(first_paid_at));

    let emails = email_queue::Entity::find()
        .filter(email_queue::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(emails.len(), 1);
}

#[tokio::test]
async fn completed_pickup_session_issues_exactly_one_token() {
    let app = TestApp::new().await;
    let (order_id, session_id) = checkout_order(&app, "pickup").await;

    let event = session_completed_event("evt_pickup", &session_id, "client@example.com");
    let (status, _) = app.deliver_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);

    let tokens = pickup_token::Entity::find()
        .filter(pickup_token::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].used_at.is_none());
    assert!(tokens[0].used_by.is_none());

    // Expiry sits 30 days out, give or take test runtime.
    let days_out = tokens[0].expires_at - Utc::now();
    assert!(days_out > Duration::days(29) && days_out <= Duration::days(30));

    // The clear secret is in the ephemeral store and matches the stored hash.
    let secret = pickup_secret::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("clear secret retained for email rendering");
    assert_eq!(
        comptoir_api::services::tokens::TokenService::hash(&secret.secret),
        tokens[0].token_hash
    );

    let emails = email_queue::Entity::find()
        .filter(email_queue::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(
        emails[0].email_type,
        email_queue::EmailType::PickupConfirmation
    );
}

#[tokio::test]
async fn bad_signature_is_rejected_without_mutation() {
    let app = TestApp::new().await;
    let (order_id, session_id) = checkout_order(&app, "delivery").await;

    let payload =
        session_completed_event("evt_forged", &session_id, "client@example.com").to_string();
    let forged_signature = payments::signature_header(
        Utc::now().timestamp(),
        payload.as_bytes(),
        "whsec_wrong_secret",
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-payment-signature", forged_signature)
        .body(Body::from(payload))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, order::OrderStatus::Pending);

    assert!(payment_event::Entity::find()
        .filter(payment_event::Column::EventId.eq("evt_forged"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn completed_session_without_email_fails_so_gateway_retries() {
    let app = TestApp::new().await;
    let (order_id, session_id) = checkout_order(&app, "delivery").await;

    let event = json!({
        "id": "evt_no_email",
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } }
    });
    let (status, _) = app.deliver_webhook(&event).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was applied and the event was NOT recorded as processed, so a
    // later redelivery (with the email present) can still succeed.
    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, order::OrderStatus::Pending);
    assert!(payment_event::Entity::find()
        .filter(payment_event::Column::EventId.eq("evt_no_email"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn completed_session_for_unknown_order_is_a_hard_failure() {
    let app = TestApp::new().await;

    let event = session_completed_event("evt_orphan", "cs_unknown", "client@example.com");
    let (status, _) = app.deliver_webhook(&event).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_session_cancels_pending_order_only() {
    let app = TestApp::new().await;
    let (order_id, session_id) = checkout_order(&app, "delivery").await;

    let (status, _) = app
        .deliver_webhook(&session_expired_event("evt_exp1", &session_id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, order::OrderStatus::Canceled);
    assert!(order.canceled_at.is_some());
}

#[tokio::test]
async fn expired_session_never_downgrades_a_paid_order() {
    let app = TestApp::new().await;
    let (order_id, session_id) = checkout_order(&app, "delivery").await;

    let (status, _) = app
        .deliver_webhook(&session_completed_event(
            "evt_pay",
            &session_id,
            "client@example.com",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    // A late expiration event (distinct event id) must be a no-op.
    let (status, _) = app
        .deliver_webhook(&session_expired_event("evt_late_exp", &session_id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, order::OrderStatus::Paid);
    assert!(order.canceled_at.is_none());
}

#[tokio::test]
async fn unrecognized_event_types_are_accepted_and_ignored() {
    let app = TestApp::new().await;
    let (_, session_id) = checkout_order(&app, "delivery").await;

    let event = json!({
        "id": "evt_other",
        "type": "charge.refund.updated",
        "data": { "object": { "id": session_id } }
    });
    let (status, _) = app.deliver_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);

    // Still recorded for idempotence.
    assert!(payment_event::Entity::find()
        .filter(payment_event::Column::EventId.eq("evt_other"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .is_some());
}
