use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

pub type PlayerId = String;

/// A player's wallet balance. Created lazily on first touch with the
/// configured opening balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub player_id: PlayerId,
    pub balance_cents: Cents,
    /// Balance the account was created with
    pub opening_cents: Cents,
    pub updated_at: DateTime<Utc>,
}
