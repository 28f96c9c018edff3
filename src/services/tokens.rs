//! Pickup token issuance and verification.
//!
//! A token is 32 bytes of OS randomness, hex-encoded; only its SHA-256 hash
//! is persisted. The clear secret exists in the customer's email/QR code and
//! transiently in the `pickup_secrets` store for rendering that email.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

const SECRET_BYTES: usize = 32;

/// A freshly issued token pair. The secret goes to the customer; the hash is
/// what gets persisted as the lookup key.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub secret: String,
    pub hash: String,
}

#[derive(Clone, Copy, Debug)]
pub struct TokenService {
    validity_days: i64,
}

impl TokenService {
    pub fn new(validity_days: i64) -> Self {
        Self { validity_days }
    }

    /// Generates a cryptographically secure secret and its one-way hash.
    pub fn issue(&self) -> IssuedToken {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let secret = hex::encode(bytes);
        let hash = Self::hash(&secret);
        IssuedToken { secret, hash }
    }

    /// Deterministic SHA-256 hex digest, used at issuance and at
    /// redemption-time lookup.
    pub fn hash(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recomputes the digest and compares in constant time.
    pub fn verify(secret: &str, hash: &str) -> bool {
        constant_time_eq(&Self::hash(secret), hash)
    }

    /// Expiry timestamp for a token issued at `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.validity_days)
    }

    /// Strictly-greater-than semantics: a token expiring at the exact
    /// current instant is already expired.
    pub fn is_expired(expires_at: DateTime<Utc>) -> bool {
        Utc::now() > expires_at
    }

    pub fn validity_days(&self) -> i64 {
        self.validity_days
    }
}

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_round_trip() {
        let service = TokenService::new(30);
        let issued = service.issue();
        assert_eq!(issued.secret.len(), SECRET_BYTES * 2);
        assert!(TokenService::verify(&issued.secret, &issued.hash));
    }

    #[test]
    fn single_character_mutation_fails_verification() {
        let service = TokenService::new(30);
        let issued = service.issue();

        let mut chars: Vec<char> = issued.secret.chars().collect();
        chars[0] = if chars[0] == 'a' { 'b' } else { 'a' };
        let mutated: String = chars.into_iter().collect();

        assert!(!TokenService::verify(&mutated, &issued.hash));
    }

    #[test]
    fn hashing_is_deterministic_and_collision_free_in_practice() {
        assert_eq!(TokenService::hash("abc"), TokenService::hash("abc"));
        assert_ne!(TokenService::hash("abc"), TokenService::hash("abd"));
    }

    #[test]
    fn distinct_issuances_are_unique() {
        let service = TokenService::new(30);
        let a = service.issue();
        let b = service.issue();
        assert_ne!(a.secret, b.secret);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn expiry_window_matches_validity() {
        let service = TokenService::new(30);
        let now = Utc::now();
        let expires = service.expiry_from(now);
        assert_eq!(expires - now, Duration::days(30));
    }

    #[test]
    fn expiry_boundary_is_strict() {
        // Expiring "now" means expired; a second in the future does not.
        assert!(TokenService::is_expired(Utc::now()));
        assert!(!TokenService::is_expired(Utc::now() + Duration::seconds(1)));
        assert!(TokenService::is_expired(Utc::now() - Duration::seconds(1)));
    }

    #[test]
    fn constant_time_eq_requires_equal_length() {
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("abcd", "abcd"));
        assert!(!constant_time_eq("abcd", "abce"));
    }
}
