//! Staff authentication for the admin surface.
//!
//! The storefront has a single staff account configured at deploy time; a
//! successful login returns a short-lived JWT whose subject is the staff
//! email. Admin handlers take a [`StaffIdentity`] extractor, and pickup
//! redemption stamps that identity into the token's `used_by` column.

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Staff email
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// Authenticated staff member, extracted from a Bearer JWT.
#[derive(Debug, Clone)]
pub struct StaffIdentity {
    pub email: String,
}

#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    token_ttl_secs: usize,
    admin_email: String,
    admin_password_hash: String,
}

impl AuthService {
    pub fn new(
        jwt_secret: String,
        token_ttl_secs: usize,
        admin_email: String,
        admin_password_hash: String,
    ) -> Self {
        Self {
            jwt_secret,
            token_ttl_secs,
            admin_email,
            admin_password_hash,
        }
    }

    /// Verifies staff credentials and issues a session token.
    pub fn login(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        if email != self.admin_email {
            return Err(ServiceError::Unauthorized("invalid credentials".into()));
        }

        let parsed = PasswordHash::new(&self.admin_password_hash)
            .map_err(|e| ServiceError::InternalError(format!("bad password hash: {e}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| ServiceError::Unauthorized("invalid credentials".into()))?;

        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: email.to_string(),
            iat: now,
            exp: now + self.token_ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("token encoding failed: {e}")))
    }

    /// Validates a session token and returns the staff identity.
    pub fn verify_token(&self, token: &str) -> Result<StaffIdentity, ServiceError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| ServiceError::Unauthorized("invalid or expired session".into()))?;

        Ok(StaffIdentity {
            email: data.claims.sub,
        })
    }

    pub fn token_ttl_secs(&self) -> usize {
        self.token_ttl_secs
    }
}

/// Hashes a password for storage in configuration. Exposed for ops tooling
/// and tests.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {e}")))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for StaffIdentity {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".into()))?;

        state.auth.verify_token(token)
    }
}
