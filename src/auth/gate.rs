use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::Mac;
use tracing::warn;

use super::{signing_mac, AuthError, NonceStore, SignedHeaders};

/// Routes served without any signature check.
pub const PUBLIC_ROUTES: &[&str] = &["/", "/health"];

/// Verifies that a request was signed by a registered peer service and
/// has not been seen before.
pub struct AuthGate {
    /// service id -> shared secret
    services: HashMap<String, String>,
    tolerance: Duration,
    nonces: Arc<NonceStore>,
}

impl AuthGate {
    pub fn new(
        services: HashMap<String, String>,
        tolerance: Duration,
        nonces: Arc<NonceStore>,
    ) -> Self {
        Self {
            services,
            tolerance,
            nonces,
        }
    }

    pub fn is_public_route(path: &str) -> bool {
        PUBLIC_ROUTES.contains(&path)
    }

    pub fn nonces(&self) -> &Arc<NonceStore> {
        &self.nonces
    }

    /// Verify against the current clock.
    pub fn verify(&self, headers: &SignedHeaders, body: &[u8]) -> Result<String, AuthError> {
        self.verify_at(Utc::now(), headers, body)
    }

    /// Run the checks in order, stopping at the first failure:
    /// headers present, known service, timestamp within tolerance,
    /// nonce unused, signature matches. On success the nonce is recorded
    /// and the verified service id returned.
    pub fn verify_at(
        &self,
        now: DateTime<Utc>,
        headers: &SignedHeaders,
        body: &[u8],
    ) -> Result<String, AuthError> {
        let result = self.check(now, headers, body);
        if let Err(err) = &result {
            warn!(
                service_id = headers.service_id.as_deref().unwrap_or("-"),
                reason = %err,
                "rejected signed request"
            );
        }
        result
    }

    fn check(
        &self,
        now: DateTime<Utc>,
        headers: &SignedHeaders,
        body: &[u8],
    ) -> Result<String, AuthError> {
        let (Some(service_id), Some(timestamp), Some(nonce), Some(signature)) = (
            present(&headers.service_id),
            present(&headers.timestamp),
            present(&headers.nonce),
            present(&headers.signature),
        ) else {
            return Err(AuthError::MissingHeaders);
        };

        let secret = self
            .services
            .get(service_id)
            .ok_or(AuthError::UnknownService)?;

        // An unparseable timestamp can never fall inside the window.
        let sent_ms: i64 = timestamp
            .parse()
            .map_err(|_| AuthError::TimestampExpired)?;
        let skew_ms = (i128::from(now.timestamp_millis()) - i128::from(sent_ms)).unsigned_abs();
        if skew_ms > self.tolerance.as_millis() {
            return Err(AuthError::TimestampExpired);
        }

        if self.nonces.contains(nonce, now) {
            return Err(AuthError::ReplayDetected);
        }

        // Only the canonical lowercase encoding is accepted.
        if !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(AuthError::InvalidSignature);
        }
        let supplied = hex::decode(signature).map_err(|_| AuthError::InvalidSignature)?;
        // verify_slice compares in constant time and rejects length mismatches.
        signing_mac(secret, service_id, timestamp, nonce, body)
            .verify_slice(&supplied)
            .map_err(|_| AuthError::InvalidSignature)?;

        // A concurrent request with the same nonce may have won the race
        // since the lookup above.
        if !self.nonces.record(nonce, now) {
            return Err(AuthError::ReplayDetected);
        }

        Ok(service_id.to_string())
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
