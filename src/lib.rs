//! Comptoir Municipal API Library
//!
//! Backend for the municipal boutique storefront: catalogue pricing,
//! hosted-checkout payments confirmed by webhook, pickup and delivery
//! fulfillment, and a retrying transactional-email queue.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
#[allow(elided_lifetimes_in_paths)]
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::events::EventSender;
use crate::services::checkout::CheckoutService;
use crate::services::email_queue::EmailQueueService;
use crate::services::mailer::{EmailTransport, Mailer};
use crate::services::orders::OrderService;
use crate::services::payments::PaymentGateway;
use crate::services::redemption::PickupRedemptionService;
use crate::services::tokens::TokenService;
use crate::services::webhook::WebhookProcessor;

/// Services layer wired at startup and shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub webhook: Arc<WebhookProcessor>,
    pub redemption: Arc<PickupRedemptionService>,
    pub email_queue: Arc<EmailQueueService>,
}

impl AppServices {
    /// Builds the service graph. The gateway and transport are injected so
    /// tests can substitute in-memory doubles; lifecycle is owned by the
    /// process entry point, never by ambient singletons.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: &config::AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        transport: Arc<dyn EmailTransport>,
    ) -> Self {
        let mailer = Mailer::new(
            db.clone(),
            transport,
            config.email_from.clone(),
            config.app_url.clone(),
        );
        let email_queue = Arc::new(EmailQueueService::new(
            db.clone(),
            mailer,
            event_sender.clone(),
            config.email_batch_size,
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            email_queue.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            orders.clone(),
            gateway,
            config.app_url.clone(),
        ));
        let tokens = TokenService::new(config.pickup_token_validity_days);
        let webhook = Arc::new(WebhookProcessor::new(
            db.clone(),
            tokens,
            email_queue.clone(),
            event_sender.clone(),
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs,
            config.pickup_secret_ttl_days,
        ));
        let redemption = Arc::new(PickupRedemptionService::new(db, event_sender));

        Self {
            orders,
            checkout,
            webhook,
            redemption,
            email_queue,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
    pub auth: Arc<auth::AuthService>,
}

/// Liveness/readiness probe; pings the database.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state.db.ping().await.is_ok();
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Assembles the full router.
pub fn app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/pickup/redeem", post(handlers::pickup::redeem))
        .route("/orders/:id", get(handlers::orders::get_order_admin))
        .route(
            "/orders/:id/mark-shipped",
            post(handlers::orders::mark_shipped),
        )
        .route(
            "/orders/:id/resend-email",
            post(handlers::orders::resend_email),
        );

    let api_routes = Router::new()
        .route("/products", get(handlers::products::list_products))
        .route("/cart/totals", post(handlers::products::cart_totals))
        .route("/checkout", post(handlers::checkout::initiate_checkout))
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route("/orders/:id", get(handlers::orders::get_order_public))
        .route("/auth/login", post(handlers::auth::login))
        .route("/openapi.json", get(openapi::openapi_json))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
