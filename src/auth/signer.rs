use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::{SignedHeaders, HEADER_NONCE, HEADER_SERVICE_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};

type HmacSha256 = Hmac<Sha256>;

/// MAC over `service_id ∥ timestamp ∥ nonce ∥ body`, ready to finalize or verify.
pub(crate) fn signing_mac(
    secret: &str,
    service_id: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(service_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(nonce.as_bytes());
    mac.update(body);
    mac
}

/// Lowercase hex HMAC-SHA256 signature of a request.
pub fn compute_signature(
    secret: &str,
    service_id: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
) -> String {
    hex::encode(signing_mac(secret, service_id, timestamp, nonce, body).finalize().into_bytes())
}

/// Signs outbound requests on behalf of one registered service.
pub struct RequestSigner {
    service_id: String,
    secret: String,
}

/// Header values for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub service_id: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

impl RequestSigner {
    pub fn new(service_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            secret: secret.into(),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Sign `body` with the current time and a fresh random nonce.
    pub fn sign(&self, body: &[u8]) -> RequestSignature {
        self.sign_at(Utc::now(), &Uuid::new_v4().to_string(), body)
    }

    pub fn sign_at(&self, now: DateTime<Utc>, nonce: &str, body: &[u8]) -> RequestSignature {
        let timestamp = now.timestamp_millis().to_string();
        let signature = compute_signature(&self.secret, &self.service_id, &timestamp, nonce, body);
        RequestSignature {
            service_id: self.service_id.clone(),
            timestamp,
            nonce: nonce.to_string(),
            signature,
        }
    }
}

impl RequestSignature {
    /// `(header name, value)` pairs to attach to the outbound request.
    pub fn header_pairs(&self) -> [(&'static str, &str); 4] {
        [
            (HEADER_SERVICE_ID, &self.service_id),
            (HEADER_TIMESTAMP, &self.timestamp),
            (HEADER_NONCE, &self.nonce),
            (HEADER_SIGNATURE, &self.signature),
        ]
    }

    pub fn to_headers(&self) -> SignedHeaders {
        SignedHeaders {
            service_id: Some(self.service_id.clone()),
            timestamp: Some(self.timestamp.clone()),
            nonce: Some(self.nonce.clone()),
            signature: Some(self.signature.clone()),
        }
    }
}
