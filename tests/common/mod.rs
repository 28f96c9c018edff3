#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use comptoir_api::auth::{hash_password, AuthService};
use comptoir_api::config::AppConfig;
use comptoir_api::db;
use comptoir_api::errors::ServiceError;
use comptoir_api::events::{self, EventSender};
use comptoir_api::services::mailer::{EmailTransport, MailerError, OutboundEmail};
use comptoir_api::services::payments::{
    self, CreateSessionRequest, CreatedSession, PaymentGateway,
};
use comptoir_api::{AppServices, AppState};

pub const STAFF_EMAIL: &str = "staff@comptoir.example";
pub const STAFF_PASSWORD: &str = "counter-duty-2024";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Payment gateway double: records session requests and hands out
/// predictable session ids.
pub struct MockPaymentGateway {
    counter: AtomicUsize,
    pub requests: Mutex<Vec<CreateSessionRequest>>,
    pub fail: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "gateway down (test)".into(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        Ok(CreatedSession {
            session_id: format!("cs_test_{n}"),
            redirect_url: format!("https://pay.example.test/session/cs_test_{n}"),
        })
    }
}

/// Email transport double: records every message; can be switched to fail.
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutboundEmail>>,
    pub fail: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailerError::Transport("smtp relay down (test)".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Test application backed by a throwaway SQLite database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<MockPaymentGateway>,
    pub transport: Arc<RecordingTransport>,
    _db_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir");
        let db_path = db_dir.path().join("comptoir_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_jwt_secret_for_tests_only_0123456789ab".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.payment_webhook_secret = WEBHOOK_SECRET.to_string();
        cfg.admin_email = STAFF_EMAIL.to_string();
        cfg.admin_password_hash = hash_password(STAFF_PASSWORD).expect("hash test password");
        cfg.app_url = "https://boutique.comptoir.example".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(MockPaymentGateway::new());
        let transport = Arc::new(RecordingTransport::new());

        let services = AppServices::build(
            db.clone(),
            &cfg,
            event_sender.clone(),
            gateway.clone(),
            transport.clone(),
        );

        let auth = Arc::new(AuthService::new(
            cfg.jwt_secret.clone(),
            cfg.jwt_expiration,
            cfg.admin_email.clone(),
            cfg.admin_password_hash.clone(),
        ));

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
            auth,
        };

        let router = comptoir_api::app(state.clone());

        Self {
            router,
            state,
            gateway,
            transport,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Sends one request through the router and returns (status, json body).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(json_body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json_body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Initiates a checkout and returns the response body.
    pub async fn checkout(&self, items: Value, mode: &str) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "items": items,
                "fulfillment_mode": mode,
                "consent": true,
            })),
            None,
        )
        .await
    }

    /// Delivers a signed webhook event.
    pub async fn deliver_webhook(&self, event: &Value) -> (StatusCode, Value) {
        let payload = event.to_string();
        let signature =
            payments::signature_header(Utc::now().timestamp(), payload.as_bytes(), WEBHOOK_SECRET);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-payment-signature", signature)
            .body(Body::from(payload))
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Logs the staff account in and returns a bearer token.
    pub async fn staff_token(&self) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                Some(json!({ "email": STAFF_EMAIL, "password": STAFF_PASSWORD })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "staff login failed: {body}");
        body["token"].as_str().expect("token in response").to_string()
    }
}

/// Builds a completed-session event for the given session id.
pub fn session_completed_event(event_id: &str, session_id: &str, email: &str) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "customer_details": { "email": email, "phone": "+33612345678" },
                "payment_intent": format!("pi_{event_id}"),
            }
        }
    })
}

/// Builds an expired-session event for the given session id.
pub fn session_expired_event(event_id: &str, session_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.expired",
        "data": { "object": { "id": session_id } }
    })
}
