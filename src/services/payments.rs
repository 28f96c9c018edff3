//! Payment session gateway contract and HTTP implementation.
//!
//! The gateway hosts the actual payment page: checkout creates a session and
//! redirects the customer to it, then the gateway reports the outcome
//! asynchronously through signed webhook events. Only the contract the core
//! needs is modelled here.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::tokens::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// One display line on the hosted payment page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub description: Option<String>,
    pub unit_amount_cents: i64,
    pub quantity: i64,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Collect the customer's phone number on the payment page (pickup mode).
    pub collect_phone: bool,
    /// Collect a shipping address on the payment page (delivery mode).
    pub collect_shipping_address: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub redirect_url: String,
}

/// External hosted-payment-session provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError>;
}

/// HTTP implementation talking to the gateway's REST API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            secret_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        let body = json!({
            "mode": "payment",
            "line_items": request.line_items,
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
            "metadata": { "order_id": request.order_id },
            "phone_number_collection": { "enabled": request.collect_phone },
            "shipping_address_collection": { "enabled": request.collect_shipping_address },
        });

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Payment session creation request failed: {}", e);
                ServiceError::ExternalServiceError(format!("payment gateway unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(%status, "Payment gateway rejected session creation: {}", text);
            return Err(ServiceError::ExternalServiceError(format!(
                "payment gateway returned {status}"
            )));
        }

        let session: SessionResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid gateway response: {e}"))
        })?;

        Ok(CreatedSession {
            session_id: session.id,
            redirect_url: session.url,
        })
    }
}

/// Computes the hex HMAC-SHA256 signature over `"{timestamp}.{payload}"`.
/// This is both how the gateway signs events and how we verify them.
pub fn signature_for(timestamp: i64, payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds the signature header the gateway sends: `t=<ts>,v1=<hmac>`.
pub fn signature_header(timestamp: i64, payload: &[u8], secret: &str) -> String {
    format!("t={},v1={}", timestamp, signature_for(timestamp, payload, secret))
}

/// Verifies an inbound event signature against the shared webhook secret.
///
/// The header carries `t=<unix-ts>,v1=<hex hmac>`; the timestamp must be
/// within `tolerance_secs` of now, and the HMAC comparison is constant-time.
pub fn verify_event_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    let mut ts = "";
    let mut v1 = "";
    for part in signature_header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }

    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    let Ok(timestamp) = ts.parse::<i64>() else {
        return false;
    };

    let now = Utc::now().timestamp();
    if (now - timestamp).unsigned_abs() > tolerance_secs.unsigned_abs() {
        return false;
    }

    let expected = signature_for(timestamp, payload, secret);
    constant_time_eq(&expected, v1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let now = Utc::now().timestamp();
        let header = signature_header(now, payload, SECRET);
        assert!(verify_event_signature(payload, &header, SECRET, 300));
    }

    #[test]
    fn tampered_payload_fails() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();
        let header = signature_header(now, payload, SECRET);
        assert!(!verify_event_signature(
            br#"{"id":"evt_2"}"#,
            &header,
            SECRET,
            300
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = b"payload";
        let now = Utc::now().timestamp();
        let header = signature_header(now, payload, SECRET);
        assert!(!verify_event_signature(payload, &header, "whsec_other", 300));
    }

    #[test]
    fn stale_timestamp_fails() {
        let payload = b"payload";
        let stale = Utc::now().timestamp() - 3600;
        let header = signature_header(stale, payload, SECRET);
        assert!(!verify_event_signature(payload, &header, SECRET, 300));
    }

    #[test]
    fn malformed_header_fails() {
        assert!(!verify_event_signature(b"p", "", SECRET, 300));
        assert!(!verify_event_signature(b"p", "v1=abc", SECRET, 300));
        assert!(!verify_event_signature(b"p", "t=notanumber,v1=abc", SECRET, 300));
    }
}
