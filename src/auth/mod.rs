//! Service-to-service request authentication.
//!
//! Peers sign `serviceId ∥ timestamp ∥ nonce ∥ rawBody` with HMAC-SHA256
//! under a per-service shared secret and send the four values as headers.
//! [`AuthGate`] checks them in a fixed order and remembers accepted nonces
//! in a [`NonceStore`] so a captured request cannot be replayed.

mod gate;
mod nonce;
mod signer;

pub use gate::*;
pub use nonce::*;
pub use signer::*;

use thiserror::Error;

pub const HEADER_SERVICE_ID: &str = "x-service-id";
pub const HEADER_TIMESTAMP: &str = "x-timestamp";
pub const HEADER_NONCE: &str = "x-nonce";
pub const HEADER_SIGNATURE: &str = "x-signature";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing required signature headers")]
    MissingHeaders,

    #[error("Unknown service ID")]
    UnknownService,

    #[error("Request timestamp expired")]
    TimestampExpired,

    #[error("Nonce already used (replay attack detected)")]
    ReplayDetected,

    #[error("Invalid signature")]
    InvalidSignature,
}

/// The four signature attributes as received. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedHeaders {
    pub service_id: Option<String>,
    /// Epoch milliseconds, exactly as signed
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    /// Lowercase hex HMAC-SHA256
    pub signature: Option<String>,
}
